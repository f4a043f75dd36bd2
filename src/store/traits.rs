use crate::model::{ModelDef, ModelRef, Row};
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

/// Storage behind the model directory server
#[async_trait::async_trait]
pub trait ModelStore: Send + Sync {
    /// Dotted names of every registered application, sorted
    async fn list_applications(&self) -> Result<Vec<String>>;
    /// Make `app` known even while it has no models
    async fn register_application(&self, app: &str) -> Result<()>;
    /// Models of one application, `None` if the application is unknown
    async fn list_models(&self, app: &str) -> Result<Option<Vec<ModelDef>>>;
    /// Every model of every application
    async fn all_models(&self) -> Result<Vec<ModelDef>>;
    async fn get_model(&self, model: &ModelRef) -> Result<Option<ModelDef>>;
    /// Create or replace a model, registering its application
    async fn upsert_model(&self, model: ModelDef) -> Result<()>;

    async fn get_row(&self, model: &ModelRef, pk: i64) -> Result<Option<Row>>;
    /// Rows matching every `(field, value)` pair in descending pk order,
    /// starting below `start_after` when given
    async fn query_rows(
        &self,
        model: &ModelRef,
        filter: &[(String, String)],
        start_after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Row>>;
    /// Store a new row, assigning the next pk
    async fn insert_row(&self, model: &ModelRef, values: BTreeMap<String, Value>) -> Result<Row>;
    /// Merge `values` into an existing row
    async fn update_row(
        &self,
        model: &ModelRef,
        pk: i64,
        values: BTreeMap<String, Value>,
    ) -> Result<Option<Row>>;
    async fn delete_row(&self, model: &ModelRef, pk: i64) -> Result<bool>;
}
