use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Transport used by the connector. Implementations report the HTTP status
/// alongside the decoded body; interpreting the status is the caller's job.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and decode the body as JSON
    async fn fetch_json(&self, url: &str) -> Result<(u16, Value)>;
    /// POST `fields` form-encoded to `url` and decode the JSON answer
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<(u16, Value)>;
}

/// Fetcher backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn decode(response: reqwest::Response) -> Result<(u16, Value)> {
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        if body.is_empty() {
            return Ok((status.as_u16(), Value::Null));
        }
        match serde_json::from_slice(&body) {
            Ok(json) => Ok((status.as_u16(), json)),
            // Error pages are rarely JSON; the status is what matters there
            Err(_) if !status.is_success() => Ok((status.as_u16(), Value::Null)),
            Err(e) => Err(e).with_context(|| format!("Response from {} is not JSON", url)),
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<(u16, Value)> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        Self::decode(response).await
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<(u16, Value)> {
        log::debug!("POST {} ({} fields)", url, fields.len());
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(fields)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        Self::decode(response).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One request seen by a [`StaticFetcher`]
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub method: Method,
    pub url: String,
    pub fields: Vec<(String, String)>,
}

/// In-memory fetcher serving canned documents keyed by absolute URL
/// (including any query string). Unknown URLs answer 404. Every request is
/// logged so tests can count round trips.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: RwLock<HashMap<String, (u16, Value)>>,
    post_responses: RwLock<HashMap<String, (u16, Value)>>,
    log: Mutex<Vec<FetchRecord>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, json: Value) -> Self {
        self.insert(url, json);
        self
    }

    pub fn with_post_response(self, url: &str, json: Value) -> Self {
        self.post_responses
            .write()
            .insert(url.to_string(), (200, json));
        self
    }

    /// Serve `json` with status 200 from `url`, replacing any earlier document
    pub fn insert(&self, url: &str, json: Value) {
        self.insert_status(url, 200, json);
    }

    pub fn insert_status(&self, url: &str, status: u16, json: Value) {
        self.documents
            .write()
            .insert(url.to_string(), (status, json));
    }

    pub fn remove(&self, url: &str) {
        self.documents.write().remove(url);
    }

    /// Number of GET requests issued for `url`
    pub fn fetch_count(&self, url: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|record| record.method == Method::Get && record.url == url)
            .count()
    }

    /// Number of requests of any kind
    pub fn total_requests(&self) -> usize {
        self.log.lock().len()
    }

    /// Forms posted to `url`, oldest first
    pub fn posted_forms(&self, url: &str) -> Vec<Vec<(String, String)>> {
        self.log
            .lock()
            .iter()
            .filter(|record| record.method == Method::Post && record.url == url)
            .map(|record| record.fields.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<FetchRecord> {
        self.log.lock().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch_json(&self, url: &str) -> Result<(u16, Value)> {
        self.log.lock().push(FetchRecord {
            method: Method::Get,
            url: url.to_string(),
            fields: Vec::new(),
        });
        Ok(self
            .documents
            .read()
            .get(url)
            .cloned()
            .unwrap_or((404, Value::Null)))
    }

    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> Result<(u16, Value)> {
        self.log.lock().push(FetchRecord {
            method: Method::Post,
            url: url.to_string(),
            fields: fields.to_vec(),
        });
        Ok(self
            .post_responses
            .read()
            .get(url)
            .cloned()
            .unwrap_or((404, Value::Null)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_fetcher_serves_and_logs() {
        let fetcher = StaticFetcher::new()
            .with_document("http://localhost/slumber/", json!({"apps": {}}))
            .with_post_response("http://localhost/slumber/a/M/create/", json!({"created": true}));

        let (status, json) = fetcher.fetch_json("http://localhost/slumber/").await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(json, json!({"apps": {}}));

        let (status, _) = fetcher.fetch_json("http://localhost/missing/").await.unwrap();
        assert_eq!(status, 404);

        let form = vec![("name".to_string(), "S1".to_string())];
        let (status, _) = fetcher
            .post_form("http://localhost/slumber/a/M/create/", &form)
            .await
            .unwrap();
        assert_eq!(status, 200);

        assert_eq!(fetcher.fetch_count("http://localhost/slumber/"), 1);
        assert_eq!(fetcher.total_requests(), 3);
        assert_eq!(
            fetcher.posted_forms("http://localhost/slumber/a/M/create/"),
            vec![form]
        );
    }
}
