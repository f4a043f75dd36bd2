use crate::model::{ModelDef, ModelRef, Row};
use crate::store::traits::ModelStore;
use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug)]
struct Table {
    model: ModelDef,
    rows: BTreeMap<i64, Row>,
    next_pk: i64,
}

impl Table {
    fn new(model: ModelDef) -> Self {
        Self {
            model,
            rows: BTreeMap::new(),
            next_pk: 1,
        }
    }
}

/// In-process store keeping every table in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    applications: RwLock<BTreeSet<String>>,
    tables: RwLock<HashMap<ModelRef, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ModelStore for MemoryStore {
    async fn list_applications(&self) -> Result<Vec<String>> {
        Ok(self.applications.read().iter().cloned().collect())
    }

    async fn register_application(&self, app: &str) -> Result<()> {
        self.applications.write().insert(app.to_string());
        Ok(())
    }

    async fn list_models(&self, app: &str) -> Result<Option<Vec<ModelDef>>> {
        if !self.applications.read().contains(app) {
            return Ok(None);
        }
        let mut models: Vec<ModelDef> = self
            .tables
            .read()
            .values()
            .filter(|table| table.model.app == app)
            .map(|table| table.model.clone())
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Some(models))
    }

    async fn all_models(&self) -> Result<Vec<ModelDef>> {
        let mut models: Vec<ModelDef> = self
            .tables
            .read()
            .values()
            .map(|table| table.model.clone())
            .collect();
        models.sort_by(|a, b| (&a.app, &a.name).cmp(&(&b.app, &b.name)));
        Ok(models)
    }

    async fn get_model(&self, model: &ModelRef) -> Result<Option<ModelDef>> {
        Ok(self
            .tables
            .read()
            .get(model)
            .map(|table| table.model.clone()))
    }

    async fn upsert_model(&self, model: ModelDef) -> Result<()> {
        self.applications.write().insert(model.app.clone());
        let mut tables = self.tables.write();
        match tables.get_mut(&model.model_ref()) {
            Some(table) => table.model = model,
            None => {
                tables.insert(model.model_ref(), Table::new(model));
            }
        }
        Ok(())
    }

    async fn get_row(&self, model: &ModelRef, pk: i64) -> Result<Option<Row>> {
        Ok(self
            .tables
            .read()
            .get(model)
            .and_then(|table| table.rows.get(&pk).cloned()))
    }

    async fn query_rows(
        &self,
        model: &ModelRef,
        filter: &[(String, String)],
        start_after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let table = tables
            .get(model)
            .ok_or_else(|| anyhow!("No such model: {}.{}", model.app, model.model))?;

        let upper = start_after.unwrap_or(i64::MAX);
        Ok(table
            .rows
            .range(..upper)
            .rev()
            .map(|(_, row)| row)
            .filter(|row| filter.iter().all(|(field, value)| row.matches(field, value)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_row(&self, model: &ModelRef, values: BTreeMap<String, Value>) -> Result<Row> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(model)
            .ok_or_else(|| anyhow!("No such model: {}.{}", model.app, model.model))?;

        let pk = table.next_pk;
        table.next_pk += 1;

        let mut row = Row {
            pk,
            values: BTreeMap::new(),
        };
        for (name, field) in &table.model.fields {
            let value = values.get(name).cloned().unwrap_or_else(|| {
                if field.field_type.ends_with("BooleanField") {
                    Value::Bool(false)
                } else {
                    Value::Null
                }
            });
            row.values.insert(name.clone(), value);
        }
        row.values.insert("id".to_string(), Value::from(pk));

        table.rows.insert(pk, row.clone());
        log::debug!("inserted {}.{} {}", model.app, model.model, pk);
        Ok(row)
    }

    async fn update_row(
        &self,
        model: &ModelRef,
        pk: i64,
        values: BTreeMap<String, Value>,
    ) -> Result<Option<Row>> {
        let mut tables = self.tables.write();
        let Some(row) = tables
            .get_mut(model)
            .and_then(|table| table.rows.get_mut(&pk))
        else {
            return Ok(None);
        };
        for (name, value) in values {
            if name != "id" {
                row.values.insert(name, value);
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete_row(&self, model: &ModelRef, pk: i64) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .get_mut(model)
            .map(|table| table.rows.remove(&pk).is_some())
            .unwrap_or(false))
    }
}
