use crate::connector::client::{attach, ClientInner};
use crate::connector::instance::resolve_instance;
use crate::connector::urls::{join_url, with_query};
use crate::connector::values::map_fields;
use crate::connector::{ConnectorError, InstanceProxy, PagedSequence, Result};
use crate::model::{CreatedDocument, InstanceQueryDocument, ModelDocument};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;

/// Connection to one remote model type
#[derive(Debug)]
pub struct ModelConnector {
    url: String,
    client: Weak<ClientInner>,
    metadata: OnceCell<ModelDocument>,
}

impl ModelConnector {
    pub(crate) fn new(url: String, client: Weak<ClientInner>) -> Self {
        Self {
            url,
            client,
            metadata: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The model document, fetched on first use. Concurrent first callers
    /// share a single request.
    pub async fn metadata(&self) -> Result<&ModelDocument> {
        self.metadata
            .get_or_try_init(|| async {
                let client = attach(&self.client)?;
                log::debug!("fetching model metadata from {}", self.url);
                client.get_json::<ModelDocument>(&self.url).await
            })
            .await
    }

    pub async fn name(&self) -> Result<&str> {
        Ok(&self.metadata().await?.name)
    }

    pub async fn module(&self) -> Result<&str> {
        Ok(&self.metadata().await?.module)
    }

    pub fn metadata_loaded(&self) -> bool {
        self.metadata.initialized()
    }

    /// Fetch the single instance matching `filter`
    pub async fn get(self: &Arc<Self>, filter: &[(&str, &str)]) -> Result<Arc<InstanceProxy>> {
        if filter.is_empty() {
            return Err(ConnectorError::InvalidQuery(format!(
                "at least one filter is needed to fetch an instance of {}",
                self.url
            )));
        }
        let client = attach(&self.client)?;
        let url = with_query(&join_url(&self.url, "get/")?, filter)?;
        let document: InstanceQueryDocument = client.get_json(&url).await?;

        let identity = join_url(&self.url, &document.identity)?;
        let eager = map_fields(&client, &url, &document.fields)?;
        resolve_instance(&client, self, &identity, &document.display, eager)
    }

    /// Proxy for an instance whose identity URL is already known
    pub fn instance(self: &Arc<Self>, url: &str, display: &str) -> Result<Arc<InstanceProxy>> {
        let client = attach(&self.client)?;
        resolve_instance(&client, self, &join_url(&self.url, url)?, display, Vec::new())
    }

    /// Every instance of the model, newest first, paged by the server
    pub async fn instances(&self) -> Result<PagedSequence> {
        let url = self.operation("instances").await?;
        Ok(PagedSequence::new(url, self.client.clone()))
    }

    /// Sequence over pages served at `url`, relative to the model URL
    pub fn page_sequence(&self, url: &str) -> Result<PagedSequence> {
        Ok(PagedSequence::new(
            join_url(&self.url, url)?,
            self.client.clone(),
        ))
    }

    /// Create a remote instance from form fields
    pub async fn create(self: &Arc<Self>, fields: &[(&str, &str)]) -> Result<Arc<InstanceProxy>> {
        let url = self.operation("create").await?;
        let client = attach(&self.client)?;
        let form: Vec<(String, String)> = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        let created: CreatedDocument = client.post_json(&url, &form).await?;
        log::info!("created {} at {}", created.display, created.identity);
        resolve_instance(
            &client,
            self,
            &join_url(&url, &created.identity)?,
            &created.display,
            Vec::new(),
        )
    }

    async fn operation(&self, name: &str) -> Result<String> {
        let metadata = self.metadata().await?;
        match metadata.operations.get(name) {
            Some(url) => join_url(&self.url, url),
            None => Err(ConnectorError::MissingOperation {
                url: self.url.clone(),
                operation: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::connector::{request_cache, Client, ConnectorError, StaticFetcher};
    use serde_json::json;
    use std::sync::Arc;

    const DIRECTORY: &str = "http://localhost/slumber/";
    const PIZZA: &str = "http://localhost/slumber/slumber_test/Pizza/";

    fn model_document() -> serde_json::Value {
        json!({
            "name": "Pizza",
            "module": "slumber_test.models",
            "operations": {
                "instances": "/slumber/slumber_test/Pizza/instances/",
                "get": "/slumber/slumber_test/Pizza/get/",
                "create": "/slumber/slumber_test/Pizza/create/"
            },
            "fields": {"name": {"type": "django.db.models.fields.CharField"}},
            "puttable": [["id"], ["name"]]
        })
    }

    fn query_document() -> serde_json::Value {
        json!({
            "identity": "/slumber/slumber_test/Pizza/data/1/",
            "display": "S1",
            "fields": {
                "id": {"kind": "value", "type": "django.db.models.fields.AutoField", "data": 1},
                "name": {"kind": "value", "type": "django.db.models.fields.CharField", "data": "S1"}
            }
        })
    }

    fn setup() -> (Arc<StaticFetcher>, Client) {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .with_document(PIZZA, model_document())
                .with_document(&format!("{}get/?pk=1", PIZZA), query_document()),
        );
        let client = Client::new(DIRECTORY, fetcher.clone()).unwrap();
        (fetcher, client)
    }

    #[tokio::test]
    async fn test_metadata_fetched_once_for_both_attributes() {
        let (fetcher, client) = setup();
        let model = client.model_at(PIZZA).unwrap();
        assert!(!model.metadata_loaded());

        assert_eq!(model.name().await.unwrap(), "Pizza");
        assert_eq!(model.module().await.unwrap(), "slumber_test.models");
        assert_eq!(model.metadata().await.unwrap().puttable.len(), 2);
        assert_eq!(fetcher.fetch_count(PIZZA), 1);
    }

    #[tokio::test]
    async fn test_concurrent_metadata_access_coalesces() {
        let (fetcher, client) = setup();
        let model = client.model_at(PIZZA).unwrap();

        let (name, module) = tokio::join!(model.name(), model.module());
        assert_eq!(name.unwrap(), "Pizza");
        assert_eq!(module.unwrap(), "slumber_test.models");
        assert_eq!(fetcher.fetch_count(PIZZA), 1);
    }

    #[tokio::test]
    async fn test_get_without_filter_makes_no_request() {
        let (fetcher, client) = setup();
        let model = client.model_at(PIZZA).unwrap();

        let err = model.get(&[]).await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidQuery(_)));
        assert_eq!(fetcher.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_get_resolves_shared_instance_with_eager_fields() {
        let (fetcher, client) = setup();
        let model = client.model_at(PIZZA).unwrap();

        request_cache::scope(async {
            let first = model.get(&[("pk", "1")]).await.unwrap();
            let second = model.get(&[("pk", "1")]).await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(first.identity(), "http://localhost/slumber/slumber_test/Pizza/data/1/");
            assert_eq!(first.display(), "S1");
            assert!(Arc::ptr_eq(first.model(), &model));

            // eager fields are served without touching the instance URL
            assert_eq!(first.get("name").await.unwrap().as_str(), Some("S1"));
            assert_eq!(fetcher.fetch_count(first.identity()), 0);
        })
        .await;
    }

    #[tokio::test]
    async fn test_get_reports_not_found_distinctly() {
        let (_, client) = setup();
        let model = client.model_at(PIZZA).unwrap();

        let err = model.get(&[("pk", "99")]).await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound { .. }));
        assert!(!err.is_missing_attribute());
    }

    #[tokio::test]
    async fn test_create_posts_form_to_create_operation() {
        let create = "http://localhost/slumber/slumber_test/Pizza/create/";
        let fetcher = Arc::new(
            StaticFetcher::new()
                .with_document(PIZZA, model_document())
                .with_post_response(
                    create,
                    json!({"created": true, "identity": "/slumber/slumber_test/Pizza/data/7/", "display": "Test Pizza"}),
                ),
        );
        let client = Client::new(DIRECTORY, fetcher.clone()).unwrap();
        let model = client.model_at(PIZZA).unwrap();

        let created = model
            .create(&[("name", "Test Pizza"), ("for_sale", "")])
            .await
            .unwrap();
        assert_eq!(created.identity(), "http://localhost/slumber/slumber_test/Pizza/data/7/");
        assert_eq!(created.display(), "Test Pizza");
        assert_eq!(
            fetcher.posted_forms(create),
            vec![vec![
                ("name".to_string(), "Test Pizza".to_string()),
                ("for_sale".to_string(), String::new())
            ]]
        );
    }

    #[tokio::test]
    async fn test_missing_operation() {
        let fetcher = Arc::new(StaticFetcher::new().with_document(
            PIZZA,
            json!({"name": "Pizza", "module": "slumber_test.models"}),
        ));
        let client = Client::new(DIRECTORY, fetcher).unwrap();
        let model = client.model_at(PIZZA).unwrap();

        let err = model.instances().await.unwrap_err();
        assert!(matches!(err, ConnectorError::MissingOperation { ref operation, .. } if operation == "instances"));
    }

    #[tokio::test]
    async fn test_dropped_client_detaches_connectors() {
        let (_, client) = setup();
        let model = client.model_at(PIZZA).unwrap();
        drop(client);

        let err = model.name().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Detached));
    }
}
