use crate::connector::urls::ensure_absolute;
use crate::connector::{AppConnector, ConnectorError, InstanceProxy, ModelConnector, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Any proxy that can be registered under a canonical URL
#[derive(Debug, Clone)]
pub enum Proxy {
    Application(Arc<AppConnector>),
    Model(Arc<ModelConnector>),
    Instance(Arc<InstanceProxy>),
}

impl Proxy {
    pub fn kind(&self) -> &'static str {
        match self {
            Proxy::Application(_) => "application",
            Proxy::Model(_) => "model",
            Proxy::Instance(_) => "instance",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Proxy::Application(app) => app.url(),
            Proxy::Model(model) => model.url(),
            Proxy::Instance(instance) => instance.identity(),
        }
    }

    /// Pointer identity, not structural equality
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        match (self, other) {
            (Proxy::Application(a), Proxy::Application(b)) => Arc::ptr_eq(a, b),
            (Proxy::Model(a), Proxy::Model(b)) => Arc::ptr_eq(a, b),
            (Proxy::Instance(a), Proxy::Instance(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn into_application(self) -> Result<Arc<AppConnector>> {
        match self {
            Proxy::Application(app) => Ok(app),
            other => Err(other.conflict("application")),
        }
    }

    pub fn into_model(self) -> Result<Arc<ModelConnector>> {
        match self {
            Proxy::Model(model) => Ok(model),
            other => Err(other.conflict("model")),
        }
    }

    pub fn into_instance(self) -> Result<Arc<InstanceProxy>> {
        match self {
            Proxy::Instance(instance) => Ok(instance),
            other => Err(other.conflict("instance")),
        }
    }

    fn conflict(&self, expected: &'static str) -> ConnectorError {
        ConnectorError::IdentityConflict {
            url: self.url().to_string(),
            expected: expected.to_string(),
            found: self.kind().to_string(),
        }
    }
}

/// Canonical URL -> live proxy. Cloning yields another handle to the same
/// map, so every resolver sharing a handle sees one proxy per URL.
#[derive(Debug, Clone, Default)]
pub struct IdentityCache {
    entries: Arc<RwLock<HashMap<String, Proxy>>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly built proxy. Callers are expected to have checked
    /// `lookup` first; a second registration for a URL is an error.
    pub fn register(&self, url: &str, proxy: Proxy) -> Result<()> {
        ensure_absolute(url)?;
        let mut entries = self.entries.write();
        if entries.contains_key(url) {
            return Err(ConnectorError::DuplicateIdentity {
                url: url.to_string(),
            });
        }
        entries.insert(url.to_string(), proxy);
        Ok(())
    }

    pub fn lookup(&self, url: &str) -> Option<Proxy> {
        self.entries.read().get(url).cloned()
    }

    /// Return the proxy registered for `url`, building and registering one
    /// with `make` if there is none. Check and insert happen under a single
    /// write lock, so concurrent callers always agree on the winner.
    pub fn get_or_register<F>(&self, url: &str, make: F) -> Result<Proxy>
    where
        F: FnOnce() -> Proxy,
    {
        if let Some(proxy) = self.lookup(url) {
            return Ok(proxy);
        }
        ensure_absolute(url)?;

        let mut entries = self.entries.write();
        if let Some(proxy) = entries.get(url) {
            return Ok(proxy.clone());
        }
        let proxy = make();
        log::debug!("registered {} proxy for {}", proxy.kind(), url);
        entries.insert(url.to_string(), proxy.clone());
        Ok(proxy)
    }

    pub fn remove(&self, url: &str) -> Option<Proxy> {
        self.entries.write().remove(url)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
