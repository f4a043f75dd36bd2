use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::{
    ApplicationDocument, CreatedDocument, DeletedDocument, DirectoryDocument, FieldDescriptor,
    FieldMetadata, InstanceDocument, InstanceQueryDocument, ModelDef, ModelDocument, ModelRef,
    ObjectReference, PageDocument, Row,
};
use crate::store::traits::ModelStore;

/// Every directory URL lives below this path
pub const ROOT: &str = "/slumber/";

pub struct ServerState<S> {
    pub store: Arc<S>,
    pub page_size: usize,
}

impl<S> ServerState<S> {
    pub fn new(store: Arc<S>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }
}

impl<S> Clone for ServerState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            page_size: self.page_size,
        }
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal(e: anyhow::Error) -> ApiError {
    log::error!("store failure: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(&e.to_string())),
    )
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(message)))
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

/// Answer for a known operation reached with the wrong method
pub async fn method_forbidden(method: Method) -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::new(&format!("Method {} is not allowed here", method))),
    )
}

pub fn app_url(app: &str) -> String {
    format!("{}{}/", ROOT, app)
}

pub fn model_url(model: &ModelRef) -> String {
    format!("{}{}/{}/", ROOT, model.app, model.model)
}

pub fn instance_url(model: &ModelRef, pk: i64) -> String {
    format!("{}data/{}/", model_url(model), pk)
}

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    /// `app.Model` to look up instead of listing applications
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub start_after: Option<i64>,
}

pub async fn get_directory<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Query(query): Query<DirectoryQuery>,
) -> Result<Response, ApiError> {
    if let Some(dotted) = query.model {
        let Some((app, name)) = dotted.rsplit_once('.') else {
            return Err(not_found("Model not found"));
        };
        let model = ModelRef::new(app, name);
        return match state.store.get_model(&model).await.map_err(internal)? {
            Some(_) => Ok((StatusCode::FOUND, [(header::LOCATION, model_url(&model))]).into_response()),
            None => Err(not_found("Model not found")),
        };
    }

    let apps = state
        .store
        .list_applications()
        .await
        .map_err(internal)?
        .into_iter()
        .map(|app| {
            let url = app_url(&app);
            (app, url)
        })
        .collect();
    Ok(Json(DirectoryDocument { apps }).into_response())
}

pub async fn get_application<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path(app): Path<String>,
) -> Result<Json<ApplicationDocument>, ApiError> {
    let models = state
        .store
        .list_models(&app)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("Application not found"))?;

    let models = models
        .iter()
        .map(|model| (model.name.clone(), model_url(&model.model_ref())))
        .collect();
    Ok(Json(ApplicationDocument { models }))
}

pub async fn get_model<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model)): Path<(String, String)>,
) -> Result<Json<ModelDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    let url = model_url(&model.model_ref());

    let fields = model
        .fields
        .iter()
        .map(|(name, field)| {
            let field_type = match &field.reference {
                Some(target) => model_url(target),
                None => field.field_type.clone(),
            };
            (name.clone(), FieldMetadata { field_type })
        })
        .collect();

    let mut operations = BTreeMap::new();
    for operation in ["instances", "get", "create"] {
        operations.insert(operation.to_string(), format!("{}{}/", url, operation));
    }

    Ok(Json(ModelDocument {
        name: model.name.clone(),
        module: model.module.clone(),
        operations,
        fields,
        puttable: model.puttable(),
    }))
}

/// Newest instances first. `next_page` accompanies every non-empty page.
pub async fn list_instances<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    let rows = state
        .store
        .query_rows(&model.model_ref(), &[], query.start_after, state.page_size)
        .await
        .map_err(internal)?;

    let next_page = rows.last().map(|row| {
        format!(
            "{}instances/?start_after={}",
            model_url(&model.model_ref()),
            row.pk
        )
    });
    Ok(Json(PageDocument {
        page: rows.iter().map(|row| page_item(&model, row)).collect(),
        next_page,
    }))
}

pub async fn query_instance<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model)): Path<(String, String)>,
    Query(filter): Query<Vec<(String, String)>>,
) -> Result<Json<InstanceQueryDocument>, ApiError> {
    if filter.is_empty() {
        return Err(bad_request("At least one filter is required"));
    }
    let model = load_model(&*state.store, &app, &model).await?;
    let mut rows = state
        .store
        .query_rows(&model.model_ref(), &filter, None, 2)
        .await
        .map_err(internal)?;

    let row = match rows.len() {
        0 => return Err(not_found("No instance matches the query")),
        1 => rows.remove(0),
        _ => return Err(bad_request("More than one instance matches the query")),
    };
    let fields = instance_fields(&*state.store, &model, &row)
        .await
        .map_err(internal)?;
    Ok(Json(InstanceQueryDocument {
        identity: instance_url(&model.model_ref(), row.pk),
        display: model.display_for(&row),
        fields,
    }))
}

pub async fn get_instance<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model, pk)): Path<(String, String, i64)>,
) -> Result<Json<InstanceDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    let row = load_row(&*state.store, &model, pk).await?;
    let document = instance_document(&*state.store, &model, &row)
        .await
        .map_err(internal)?;
    Ok(Json(document))
}

/// Rows of another model pointing at this instance. Unlike `instances/`,
/// a page shorter than the page size is the last one.
pub async fn list_related<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model, pk, array)): Path<(String, String, i64, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    load_row(&*state.store, &model, pk).await?;

    let relation = related_arrays(&*state.store, &model.model_ref())
        .await
        .map_err(internal)?
        .into_iter()
        .find(|relation| relation.name == array)
        .ok_or_else(|| not_found("Data array not found"))?;

    let filter = vec![(relation.field.clone(), pk.to_string())];
    let rows = state
        .store
        .query_rows(
            &relation.source.model_ref(),
            &filter,
            query.start_after,
            state.page_size,
        )
        .await
        .map_err(internal)?;

    let next_page = match rows.last() {
        Some(last) if rows.len() == state.page_size => Some(format!(
            "{}{}/?start_after={}",
            instance_url(&model.model_ref(), pk),
            array,
            last.pk
        )),
        _ => None,
    };
    Ok(Json(PageDocument {
        page: rows
            .iter()
            .map(|row| page_item(&relation.source, row))
            .collect(),
        next_page,
    }))
}

pub async fn create_instance<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model)): Path<(String, String)>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<CreatedDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    let values = coerce_form(&model, form)?;
    let row = state
        .store
        .insert_row(&model.model_ref(), values)
        .await
        .map_err(internal)?;

    log::info!("created {}.{} {}", model.app, model.name, row.pk);
    Ok(Json(CreatedDocument {
        created: true,
        identity: instance_url(&model.model_ref(), row.pk),
        display: model.display_for(&row),
    }))
}

pub async fn update_instance<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model, pk)): Path<(String, String, i64)>,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Json<InstanceDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    let values = coerce_form(&model, form)?;
    let row = state
        .store
        .update_row(&model.model_ref(), pk, values)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("Instance not found"))?;

    let document = instance_document(&*state.store, &model, &row)
        .await
        .map_err(internal)?;
    Ok(Json(document))
}

pub async fn delete_instance<S: ModelStore>(
    State(state): State<ServerState<S>>,
    Path((app, model, pk)): Path<(String, String, i64)>,
) -> Result<Json<DeletedDocument>, ApiError> {
    let model = load_model(&*state.store, &app, &model).await?;
    let deleted = state
        .store
        .delete_row(&model.model_ref(), pk)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(not_found("Instance not found"));
    }
    log::info!("deleted {}.{} {}", model.app, model.name, pk);
    Ok(Json(DeletedDocument { deleted }))
}

async fn load_model<S: ModelStore + ?Sized>(
    store: &S,
    app: &str,
    model: &str,
) -> Result<ModelDef, ApiError> {
    store
        .get_model(&ModelRef::new(app, model))
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("Model not found"))
}

async fn load_row<S: ModelStore + ?Sized>(
    store: &S,
    model: &ModelDef,
    pk: i64,
) -> Result<Row, ApiError> {
    store
        .get_row(&model.model_ref(), pk)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("Instance not found"))
}

fn coerce_form(
    model: &ModelDef,
    form: Vec<(String, String)>,
) -> Result<BTreeMap<String, Value>, ApiError> {
    let mut values = BTreeMap::new();
    for (name, raw) in form {
        let field = model
            .fields
            .get(&name)
            .ok_or_else(|| bad_request(&format!("Unknown field {}", name)))?;
        if name != "id" {
            values.insert(name, field.coerce(&raw));
        }
    }
    Ok(values)
}

fn page_item(model: &ModelDef, row: &Row) -> ObjectReference {
    let model_ref = model.model_ref();
    ObjectReference {
        model: model_url(&model_ref),
        display: model.display_for(row),
        data: instance_url(&model_ref, row.pk),
        pk: Some(row.pk),
    }
}

/// A reverse relation: rows of `source` whose `field` points at the target
struct RelatedArray {
    name: String,
    source: ModelDef,
    field: String,
}

async fn related_arrays<S: ModelStore + ?Sized>(
    store: &S,
    target: &ModelRef,
) -> anyhow::Result<Vec<RelatedArray>> {
    let mut arrays = Vec::new();
    for source in store.all_models().await? {
        for (field_name, field) in &source.fields {
            if field.reference.as_ref() != Some(target) {
                continue;
            }
            if let Some(name) = &field.related_name {
                arrays.push(RelatedArray {
                    name: name.clone(),
                    source: source.clone(),
                    field: field_name.clone(),
                });
            }
        }
    }
    Ok(arrays)
}

async fn reference_to<S: ModelStore + ?Sized>(
    store: &S,
    target: &ModelRef,
    pk: i64,
) -> anyhow::Result<Option<ObjectReference>> {
    let Some(model) = store.get_model(target).await? else {
        return Ok(None);
    };
    let Some(row) = store.get_row(target, pk).await? else {
        return Ok(None);
    };
    Ok(Some(ObjectReference {
        model: model_url(target),
        display: model.display_for(&row),
        data: instance_url(target, pk),
        pk: None,
    }))
}

async fn instance_fields<S: ModelStore + ?Sized>(
    store: &S,
    model: &ModelDef,
    row: &Row,
) -> anyhow::Result<BTreeMap<String, FieldDescriptor>> {
    let mut fields = BTreeMap::new();
    for (name, field) in &model.fields {
        let value = row.values.get(name).cloned().unwrap_or(Value::Null);
        let descriptor = match &field.reference {
            Some(target) => {
                let reference = match value.as_i64() {
                    Some(pk) => reference_to(store, target, pk).await?,
                    None => None,
                };
                FieldDescriptor::object(&model_url(target), reference)
            }
            None => FieldDescriptor::value(&field.field_type, value),
        };
        fields.insert(name.clone(), descriptor);
    }
    Ok(fields)
}

async fn instance_document<S: ModelStore + ?Sized>(
    store: &S,
    model: &ModelDef,
    row: &Row,
) -> anyhow::Result<InstanceDocument> {
    let identity = instance_url(&model.model_ref(), row.pk);
    let base = model_url(&model.model_ref());

    let mut operations = BTreeMap::new();
    operations.insert("data".to_string(), identity.clone());
    operations.insert("update".to_string(), format!("{}update/{}/", base, row.pk));
    operations.insert("delete".to_string(), format!("{}delete/{}/", base, row.pk));

    let data_arrays = related_arrays(store, &model.model_ref())
        .await?
        .into_iter()
        .map(|relation| {
            let url = format!("{}{}/", identity, relation.name);
            (relation.name, url)
        })
        .collect();

    Ok(InstanceDocument {
        display: model.display_for(row),
        operations,
        fields: instance_fields(store, model, row).await?,
        data_arrays,
        identity,
    })
}
