use crate::connector::client::{attach, ClientInner};
use crate::connector::urls::join_url;
use crate::connector::{ConnectorError, ModelConnector, Result};
use crate::model::ApplicationDocument;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Connection to one remote application. The model list is fetched on the
/// first lookup, not at construction.
#[derive(Debug)]
pub struct AppConnector {
    url: String,
    client: Weak<ClientInner>,
    models: RwLock<Option<BTreeMap<String, Arc<ModelConnector>>>>,
}

impl AppConnector {
    pub(crate) fn new(url: String, client: Weak<ClientInner>) -> Self {
        Self {
            url,
            client,
            models: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Model `name`, or `None` if the application does not expose it. An
    /// unknown name re-reads the model list once.
    pub async fn resolve_child(&self, name: &str) -> Result<Option<Arc<ModelConnector>>> {
        if let Some(model) = self.known(name) {
            return Ok(Some(model));
        }
        let models = self.discover().await?;
        Ok(models.get(name).cloned())
    }

    pub async fn model(&self, name: &str) -> Result<Arc<ModelConnector>> {
        self.resolve_child(name)
            .await?
            .ok_or_else(|| ConnectorError::UnknownModel(name.to_string()))
    }

    pub async fn model_names(&self) -> Result<Vec<String>> {
        let known: Option<Vec<String>> = self
            .models
            .read()
            .as_ref()
            .map(|models| models.keys().cloned().collect());
        match known {
            Some(names) => Ok(names),
            None => Ok(self.discover().await?.into_keys().collect()),
        }
    }

    fn known(&self, name: &str) -> Option<Arc<ModelConnector>> {
        self.models
            .read()
            .as_ref()
            .and_then(|models| models.get(name).cloned())
    }

    async fn discover(&self) -> Result<BTreeMap<String, Arc<ModelConnector>>> {
        let client = attach(&self.client)?;
        let document: ApplicationDocument = client.get_json(&self.url).await?;
        log::debug!("{} exposes {} models", self.url, document.models.len());

        let mut models = BTreeMap::new();
        for (name, url) in &document.models {
            let model_url = join_url(&self.url, url)?;
            models.insert(name.clone(), client.model_at(&model_url)?);
        }
        *self.models.write() = Some(models.clone());
        Ok(models)
    }
}
