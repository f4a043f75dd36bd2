use crate::connector::client::{attach, ClientInner};
use crate::connector::request_cache::{self, CachedField, Lookup};
use crate::connector::urls::join_url;
use crate::connector::values::map_fields;
use crate::connector::{ConnectorError, FieldValue, ModelConnector, PagedSequence, Proxy, Result};
use crate::model::{DeletedDocument, InstanceDocument};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Lazy stand-in for one remote instance.
///
/// Only the identity URL, the display string and the model are held by the
/// proxy itself. Field values live in the request cache, so they are shared
/// by every proxy of the same identity and vanish when the request ends.
#[derive(Debug)]
pub struct InstanceProxy {
    identity: String,
    display: String,
    model: Arc<ModelConnector>,
    client: Weak<ClientInner>,
    operations: RwLock<Option<BTreeMap<String, String>>>,
}

impl InstanceProxy {
    fn new(
        identity: String,
        display: String,
        model: Arc<ModelConnector>,
        client: Weak<ClientInner>,
    ) -> Self {
        Self {
            identity,
            display,
            model,
            client,
            operations: RwLock::new(None),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn model(&self) -> &Arc<ModelConnector> {
        &self.model
    }

    /// Read a field, fetching the instance document at most once per request
    pub async fn get(&self, field: &str) -> Result<FieldValue> {
        match request_cache::lookup(&self.identity, field) {
            Lookup::Hit(cached) => {
                log::debug!("cache hit {}#{}", self.identity, field);
                cached.into_result(field)
            }
            Lookup::Miss { fetched: true } => Err(self.unknown_field(field)),
            Lookup::Miss { fetched: false } => {
                self.load().await?;
                match request_cache::lookup(&self.identity, field) {
                    Lookup::Hit(cached) => cached.into_result(field),
                    _ => Err(self.unknown_field(field)),
                }
            }
            Lookup::Inactive => {
                let client = attach(&self.client)?;
                if client.strict_request_scope {
                    return Err(ConnectorError::NoRequestScope);
                }
                log::debug!("no request scope, reading {} uncached", self.identity);
                self.load()
                    .await?
                    .into_iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, cached)| cached.into_result(field))
                    .unwrap_or_else(|| Err(self.unknown_field(field)))
            }
        }
    }

    /// Like [`get`](Self::get), but an absent field is `None`
    pub async fn try_get(&self, field: &str) -> Result<Option<FieldValue>> {
        match self.get(field).await {
            Ok(value) => Ok(Some(value)),
            Err(ConnectorError::UnknownField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a field for the rest of the current request. Nothing is sent to
    /// the server.
    pub fn set(&self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        if request_cache::write(&self.identity, field, value) {
            Ok(())
        } else {
            Err(ConnectorError::NoRequestScope)
        }
    }

    /// Operation name -> absolute URL, from the instance document
    pub async fn operations(&self) -> Result<BTreeMap<String, String>> {
        if let Some(operations) = self.operations.read().clone() {
            return Ok(operations);
        }
        self.load().await?;
        Ok(self.operations.read().clone().unwrap_or_default())
    }

    /// Post `fields` to the instance's update operation. The returned
    /// document replaces anything cached for this identity.
    pub async fn update(&self, fields: &[(&str, &str)]) -> Result<()> {
        let url = self.operation("update").await?;
        let client = attach(&self.client)?;
        let form: Vec<(String, String)> = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        let document: InstanceDocument = client.post_json(&url, &form).await?;
        let mapped = self.map_document(&client, &document)?;
        request_cache::install(&self.identity, &mapped, true);
        log::info!("updated {}", self.identity);
        Ok(())
    }

    /// Delete the remote instance and forget this proxy. Returns what the
    /// server reported.
    pub async fn delete(&self) -> Result<bool> {
        let url = self.operation("delete").await?;
        let client = attach(&self.client)?;

        let document: DeletedDocument = client.post_json(&url, &[]).await?;
        if document.deleted {
            request_cache::forget(&self.identity);
            client.identities.remove(&self.identity);
            log::info!("deleted {}", self.identity);
        }
        Ok(document.deleted)
    }

    /// Fetch the instance document and cache its fields without replacing
    /// values already present
    async fn load(&self) -> Result<Vec<(String, CachedField)>> {
        let client = attach(&self.client)?;
        log::debug!("fetching instance {}", self.identity);
        let document: InstanceDocument = client.get_json(&self.identity).await?;

        let mapped = self.map_document(&client, &document)?;
        request_cache::install(&self.identity, &mapped, false);
        Ok(mapped)
    }

    fn map_document(
        &self,
        client: &Arc<ClientInner>,
        document: &InstanceDocument,
    ) -> Result<Vec<(String, CachedField)>> {
        let mut mapped = map_fields(client, &self.identity, &document.fields)?;
        for (name, url) in &document.data_arrays {
            let sequence = PagedSequence::new(join_url(&self.identity, url)?, Arc::downgrade(client));
            mapped.push((name.clone(), CachedField::Present(FieldValue::Array(sequence))));
        }

        let mut operations = BTreeMap::new();
        for (name, url) in &document.operations {
            operations.insert(name.clone(), join_url(&self.identity, url)?);
        }
        *self.operations.write() = Some(operations);
        Ok(mapped)
    }

    async fn operation(&self, name: &str) -> Result<String> {
        self.operations()
            .await?
            .remove(name)
            .ok_or_else(|| ConnectorError::MissingOperation {
                url: self.identity.clone(),
                operation: name.to_string(),
            })
    }

    fn unknown_field(&self, field: &str) -> ConnectorError {
        ConnectorError::UnknownField {
            identity: self.identity.clone(),
            field: field.to_string(),
        }
    }
}

/// The shared proxy for `identity`, registering a new one if needed. An
/// identity already held by another model connector is a conflict. Eager
/// fields only fill gaps in the current request scope and are dropped when
/// no scope is active.
pub(crate) fn resolve_instance(
    client: &Arc<ClientInner>,
    model: &Arc<ModelConnector>,
    identity: &str,
    display: &str,
    eager: Vec<(String, CachedField)>,
) -> Result<Arc<InstanceProxy>> {
    let weak = Arc::downgrade(client);
    let instance = client
        .identities
        .get_or_register(identity, || {
            Proxy::Instance(Arc::new(InstanceProxy::new(
                identity.to_string(),
                display.to_string(),
                model.clone(),
                weak,
            )))
        })?
        .into_instance()?;

    if !Arc::ptr_eq(&instance.model, model) {
        return Err(ConnectorError::IdentityConflict {
            url: identity.to_string(),
            expected: format!("instance of {}", model.url()),
            found: format!("instance of {}", instance.model.url()),
        });
    }

    for (field, value) in eager {
        request_cache::seed(&instance.identity, &field, value);
    }
    Ok(instance)
}
