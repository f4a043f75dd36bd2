use crate::config::ClientConfig;
use crate::connector::urls::{ensure_absolute, join_url};
use crate::connector::{
    AppConnector, ConnectorError, Fetcher, HttpFetcher, IdentityCache, ModelConnector, Proxy,
    Result,
};
use crate::model::DirectoryDocument;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// State shared by a client and every proxy it hands out. Proxies keep only
/// a weak reference so that the identity cache does not keep itself alive.
pub(crate) struct ClientInner {
    directory: String,
    fetcher: Arc<dyn Fetcher>,
    pub(crate) identities: IdentityCache,
    pub(crate) strict_request_scope: bool,
    tree: RwLock<Option<Arc<ApplicationNode>>>,
}

pub(crate) fn attach(client: &Weak<ClientInner>) -> Result<Arc<ClientInner>> {
    client.upgrade().ok_or(ConnectorError::Detached)
}

impl ClientInner {
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let (status, json) = self.fetcher.fetch_json(url).await?;
        decode(url, status, json)
    }

    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<T> {
        let (status, json) = self.fetcher.post_form(url, fields).await?;
        decode(url, status, json)
    }

    /// Model connector for `url`, reusing the registered one if any
    pub(crate) fn model_at(self: &Arc<Self>, url: &str) -> Result<Arc<ModelConnector>> {
        let client = Arc::downgrade(self);
        self.identities
            .get_or_register(url, || {
                Proxy::Model(Arc::new(ModelConnector::new(url.to_string(), client)))
            })?
            .into_model()
    }

    fn app_at(self: &Arc<Self>, url: &str) -> Result<Arc<AppConnector>> {
        let client = Arc::downgrade(self);
        self.identities
            .get_or_register(url, || {
                Proxy::Application(Arc::new(AppConnector::new(url.to_string(), client)))
            })?
            .into_application()
    }

    async fn discover(self: &Arc<Self>) -> Result<Arc<ApplicationNode>> {
        let document: DirectoryDocument = self.get_json(&self.directory).await?;
        log::info!(
            "discovered {} applications at {}",
            document.apps.len(),
            self.directory
        );

        let mut root = Branch::default();
        for (name, url) in &document.apps {
            let mut branch = &mut root;
            for segment in name.split('.') {
                branch = branch.children.entry(segment.to_string()).or_default();
            }
            branch.url = Some(join_url(&self.directory, url)?);
        }

        let tree = Arc::new(self.build_node(String::new(), root)?);
        *self.tree.write() = Some(tree.clone());
        Ok(tree)
    }

    fn build_node(self: &Arc<Self>, path: String, branch: Branch) -> Result<ApplicationNode> {
        let app = match &branch.url {
            Some(url) => Some(self.app_at(url)?),
            None => None,
        };
        let mut children = BTreeMap::new();
        for (segment, child) in branch.children {
            let child_path = if path.is_empty() {
                segment.clone()
            } else {
                format!("{}.{}", path, segment)
            };
            children.insert(segment, Arc::new(self.build_node(child_path, child)?));
        }
        Ok(ApplicationNode {
            path,
            app,
            children,
        })
    }
}

fn decode<T: DeserializeOwned>(url: &str, status: u16, json: serde_json::Value) -> Result<T> {
    match status {
        200..=299 => serde_json::from_value(json).map_err(|source| {
            ConnectorError::MalformedDocument {
                url: url.to_string(),
                source,
            }
        }),
        404 => Err(ConnectorError::NotFound {
            url: url.to_string(),
        }),
        status => Err(ConnectorError::UnexpectedStatus {
            url: url.to_string(),
            status,
        }),
    }
}

/// Intermediate tree used while splitting dotted application names
#[derive(Default)]
struct Branch {
    url: Option<String>,
    children: BTreeMap<String, Branch>,
}

/// One segment of the dotted application namespace. Bound nodes carry the
/// connector of a concrete application; the others only group children.
#[derive(Debug)]
pub struct ApplicationNode {
    path: String,
    app: Option<Arc<AppConnector>>,
    children: BTreeMap<String, Arc<ApplicationNode>>,
}

impl ApplicationNode {
    /// Dotted path from the directory root, empty for the root itself
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> Option<&str> {
        self.app.as_ref().map(|app| app.url())
    }

    pub fn connector(&self) -> Option<&Arc<AppConnector>> {
        self.app.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.app.is_some()
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.keys().map(|name| name.as_str()).collect()
    }

    pub fn resolve_child(&self, name: &str) -> Option<Arc<ApplicationNode>> {
        self.children.get(name).cloned()
    }

    pub fn child(&self, name: &str) -> Result<Arc<ApplicationNode>> {
        self.resolve_child(name)
            .ok_or_else(|| ConnectorError::UnknownApplication(self.qualify(name)))
    }

    /// Model of the application bound at this node
    pub async fn model(&self, name: &str) -> Result<Arc<ModelConnector>> {
        match &self.app {
            Some(app) => app.model(name).await,
            None => Err(ConnectorError::UnknownModel(self.qualify(name))),
        }
    }

    fn qualify(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }
}

fn walk(root: &ApplicationNode, dotted: &str) -> Option<Arc<ApplicationNode>> {
    let mut segments = dotted.split('.');
    let mut node = root.resolve_child(segments.next()?)?;
    for segment in segments {
        node = node.resolve_child(segment)?;
    }
    Some(node)
}

/// Entry point of the connector: resolves applications from a directory URL
/// and owns the identity cache shared by everything resolved through it.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(directory: &str, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Self::with_fetcher(&ClientConfig::with_directory(directory), fetcher)
    }

    pub fn with_fetcher(config: &ClientConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        ensure_absolute(&config.directory)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                directory: config.directory.clone(),
                fetcher,
                identities: IdentityCache::new(),
                strict_request_scope: config.strict_request_scope,
                tree: RwLock::new(None),
            }),
        })
    }

    /// Client talking HTTP to the configured directory
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(Duration::from_millis(config.request_timeout_ms))?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher))?)
    }

    pub(crate) fn inner(&self) -> &Arc<ClientInner> {
        &self.inner
    }

    pub fn directory(&self) -> &str {
        &self.inner.directory
    }

    pub fn identities(&self) -> &IdentityCache {
        &self.inner.identities
    }

    /// Root of the application tree, discovering it on first use
    pub async fn applications(&self) -> Result<Arc<ApplicationNode>> {
        let cached = self.inner.tree.read().clone();
        match cached {
            Some(tree) => Ok(tree),
            None => self.inner.discover().await,
        }
    }

    /// Fetch the directory again and rebuild the application tree. Connectors
    /// that were already resolved are reused.
    pub async fn rediscover(&self) -> Result<Arc<ApplicationNode>> {
        self.inner.discover().await
    }

    /// Top-level application node `name`. A name missing from the known tree
    /// triggers one fresh discovery before giving up.
    pub async fn resolve_child(&self, name: &str) -> Result<Option<Arc<ApplicationNode>>> {
        if let Some(node) = self.applications().await?.resolve_child(name) {
            return Ok(Some(node));
        }
        Ok(self.rediscover().await?.resolve_child(name))
    }

    /// Application node at a dotted path, e.g. `shop.orders`. A path missing
    /// from the known tree triggers one fresh discovery before giving up.
    pub async fn app(&self, dotted: &str) -> Result<Arc<ApplicationNode>> {
        if let Some(node) = walk(&*self.applications().await?, dotted) {
            return Ok(node);
        }
        walk(&*self.rediscover().await?, dotted)
            .ok_or_else(|| ConnectorError::UnknownApplication(dotted.to_string()))
    }

    /// Model connector for an absolute model URL, reusing a registered one
    pub fn model_at(&self, url: &str) -> Result<Arc<ModelConnector>> {
        self.inner.model_at(url)
    }

    /// Build and register a new model connector; fails if `url` already has
    /// a proxy
    pub fn register_model(&self, url: &str) -> Result<Arc<ModelConnector>> {
        let model = Arc::new(ModelConnector::new(
            url.to_string(),
            Arc::downgrade(&self.inner),
        ));
        self.inner
            .identities
            .register(url, Proxy::Model(model.clone()))?;
        Ok(model)
    }

    /// Forget every resolved proxy and the discovered application tree
    pub fn flush(&self) {
        log::debug!("flushing client caches for {}", self.inner.directory);
        self.inner.identities.clear();
        *self.inner.tree.write() = None;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("directory", &self.inner.directory)
            .field("identities", &self.inner.identities.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::StaticFetcher;
    use serde_json::json;

    const DIRECTORY: &str = "http://localhost/slumber/";

    fn fetcher() -> Arc<StaticFetcher> {
        Arc::new(StaticFetcher::new().with_document(
            DIRECTORY,
            json!({"apps": {
                "shop.orders": "/orders/",
                "django.contrib.auth": "/slumber/django/contrib/auth/"
            }}),
        ))
    }

    #[tokio::test]
    async fn test_dotted_names_build_a_tree() {
        let client = Client::new(DIRECTORY, fetcher()).unwrap();

        let shop = client.app("shop").await.unwrap();
        assert!(!shop.is_bound());
        assert_eq!(shop.child_names(), vec!["orders"]);

        let orders = client.app("shop.orders").await.unwrap();
        assert!(orders.is_bound());
        assert_eq!(orders.url(), Some("http://localhost/orders/"));
        assert_eq!(orders.path(), "shop.orders");

        let auth = client.app("django.contrib.auth").await.unwrap();
        assert_eq!(auth.url(), Some("http://localhost/slumber/django/contrib/auth/"));
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let client = Client::new(DIRECTORY, fetcher()).unwrap();

        let err = client.app("shop.nonexistent").await.unwrap_err();
        match &err {
            ConnectorError::UnknownApplication(name) => assert_eq!(name, "shop.nonexistent"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_missing_attribute());

        assert!(client.resolve_child("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tree_is_reused_and_unknown_names_rediscover() {
        let fetcher = fetcher();
        let client = Client::new(DIRECTORY, fetcher.clone()).unwrap();

        let first = client.app("shop.orders").await.unwrap();
        let second = client.app("shop.orders").await.unwrap();
        assert_eq!(fetcher.fetch_count(DIRECTORY), 1);
        assert!(Arc::ptr_eq(
            first.connector().unwrap(),
            second.connector().unwrap()
        ));

        fetcher.insert(
            DIRECTORY,
            json!({"apps": {"shop.orders": "/orders/", "billing": "/billing/"}}),
        );
        let billing = client.app("billing").await.unwrap();
        assert_eq!(billing.url(), Some("http://localhost/billing/"));
        assert_eq!(fetcher.fetch_count(DIRECTORY), 2);

        // connectors survive a rediscovery
        let third = client.app("shop.orders").await.unwrap();
        assert!(Arc::ptr_eq(
            first.connector().unwrap(),
            third.connector().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_new_app_under_known_namespace_rediscovers() {
        let fetcher = Arc::new(StaticFetcher::new().with_document(
            DIRECTORY,
            json!({"apps": {"shop.orders": "/orders/"}}),
        ));
        let client = Client::new(DIRECTORY, fetcher.clone()).unwrap();
        client.app("shop.orders").await.unwrap();
        assert_eq!(fetcher.fetch_count(DIRECTORY), 1);

        fetcher.insert(
            DIRECTORY,
            json!({"apps": {"shop.orders": "/orders/", "shop.billing": "/billing/"}}),
        );
        let billing = client.app("shop.billing").await.unwrap();
        assert_eq!(billing.url(), Some("http://localhost/billing/"));
        assert_eq!(fetcher.fetch_count(DIRECTORY), 2);

        // only one rediscovery per failed lookup
        let err = client.app("shop.refunds").await.unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownApplication(ref name) if name == "shop.refunds"));
        assert_eq!(fetcher.fetch_count(DIRECTORY), 3);
    }

    #[tokio::test]
    async fn test_flush_forgets_everything() {
        let fetcher = fetcher();
        let client = Client::new(DIRECTORY, fetcher.clone()).unwrap();

        let before = client.app("shop.orders").await.unwrap();
        assert!(!client.identities().is_empty());

        client.flush();
        assert!(client.identities().is_empty());

        let after = client.app("shop.orders").await.unwrap();
        assert!(!Arc::ptr_eq(
            before.connector().unwrap(),
            after.connector().unwrap()
        ));
        assert_eq!(fetcher.fetch_count(DIRECTORY), 2);
    }

    #[tokio::test]
    async fn test_directory_errors_propagate() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.insert_status(DIRECTORY, 500, json!({}));
        let client = Client::new(DIRECTORY, fetcher).unwrap();

        let err = client.app("shop").await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::UnexpectedStatus { status: 500, .. }
        ));
        assert!(!err.is_missing_attribute());
    }

    #[test]
    fn test_from_config_builds_http_client() {
        let client = Client::from_config(&ClientConfig::default()).unwrap();
        assert_eq!(client.directory(), "http://localhost:8000/slumber/");
        assert!(client.identities().is_empty());
    }

    #[test]
    fn test_directory_must_be_absolute() {
        let err = Client::new("/slumber/", Arc::new(StaticFetcher::new())).unwrap_err();
        assert!(matches!(err, ConnectorError::NotAbsolute(_)));
    }

    #[test]
    fn test_register_model_rejects_duplicates() {
        let client = Client::new(DIRECTORY, Arc::new(StaticFetcher::new())).unwrap();
        let url = "http://localhost/slumber/shop/Pizza/";

        let model = client.register_model(url).unwrap();
        assert!(Arc::ptr_eq(&model, &client.model_at(url).unwrap()));
        assert!(matches!(
            client.register_model(url),
            Err(ConnectorError::DuplicateIdentity { .. })
        ));
    }
}
