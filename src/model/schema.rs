use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Points at a model by application name and model name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub app: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(app: &str, model: &str) -> Self {
        Self {
            app: app.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Fully qualified field type, e.g. `django.db.models.fields.CharField`
    #[serde(rename = "type")]
    pub field_type: String,

    /// Target model for foreign-key style fields
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reference: Option<ModelRef>,

    /// Name under which the target model exposes the reverse array
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub related_name: Option<String>,

    /// Values identify a single row
    #[serde(default)]
    pub unique: bool,
}

impl FieldDef {
    pub fn scalar(field_type: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
            reference: None,
            related_name: None,
            unique: false,
        }
    }

    pub fn char() -> Self {
        Self::scalar("django.db.models.fields.CharField")
    }

    pub fn boolean() -> Self {
        Self::scalar("django.db.models.fields.BooleanField")
    }

    pub fn integer() -> Self {
        Self::scalar("django.db.models.fields.IntegerField")
    }

    pub fn date() -> Self {
        Self::scalar("django.db.models.fields.DateField")
    }

    pub fn auto() -> Self {
        Self::scalar("django.db.models.fields.AutoField").unique()
    }

    pub fn foreign_key(target: ModelRef, related_name: Option<&str>) -> Self {
        Self {
            field_type: "django.db.models.fields.related.ForeignKey".to_string(),
            reference: Some(target),
            related_name: related_name.map(|s| s.to_string()),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Turn a raw form value into the JSON value stored for this field.
    /// Only the coarse shapes are distinguished: booleans, integers, text.
    pub fn coerce(&self, raw: &str) -> Value {
        if self.is_reference() || self.field_type.ends_with("IntegerField")
            || self.field_type.ends_with("AutoField")
        {
            if raw.is_empty() {
                return Value::Null;
            }
            return raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
        }
        if self.field_type.ends_with("BooleanField") {
            let truthy = !matches!(raw.to_ascii_lowercase().as_str(), "" | "0" | "false" | "off");
            return Value::Bool(truthy);
        }
        Value::String(raw.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Dotted application name, e.g. `shop.orders`
    pub app: String,
    pub name: String,
    pub module: String,
    pub fields: BTreeMap<String, FieldDef>,
    /// Field whose value is used as the display string of a row
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_field: Option<String>,
}

impl ModelDef {
    pub fn new(app: &str, name: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), FieldDef::auto());
        Self {
            app: app.to_string(),
            name: name.to_string(),
            module: format!("{}.models", app),
            fields,
            display_field: None,
        }
    }

    pub fn with_field(mut self, name: &str, field: FieldDef) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    pub fn with_display_field(mut self, name: &str) -> Self {
        self.display_field = Some(name.to_string());
        self
    }

    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(&self.app, &self.name)
    }

    /// Field groups whose values identify a row
    pub fn puttable(&self) -> Vec<Vec<String>> {
        self.fields
            .iter()
            .filter(|(_, field)| field.unique)
            .map(|(name, _)| vec![name.clone()])
            .collect()
    }

    pub fn display_for(&self, row: &Row) -> String {
        self.display_field
            .as_ref()
            .and_then(|field| row.values.get(field))
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| format!("{} object", self.name))
    }
}

/// One stored row; `values` always carries `id` equal to `pk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub pk: i64,
    pub values: BTreeMap<String, Value>,
}

impl Row {
    /// Whether the row's value for `field` matches a query string value
    pub fn matches(&self, field: &str, expected: &str) -> bool {
        if field == "pk" {
            return self.pk.to_string() == expected;
        }
        match self.values.get(field) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Bool(b)) => {
                let expected = expected.to_ascii_lowercase();
                (*b && expected == "true") || (!*b && expected == "false")
            }
            Some(Value::Null) | None => expected.is_empty(),
            Some(other) => other.to_string() == expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pizza() -> ModelDef {
        ModelDef::new("slumber_test", "Pizza")
            .with_field("name", FieldDef::char().unique())
            .with_field("for_sale", FieldDef::boolean())
            .with_display_field("name")
    }

    #[test]
    fn test_display_uses_display_field_or_default() {
        let model = pizza();
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), json!("S1"));
        let row = Row { pk: 1, values };
        assert_eq!(model.display_for(&row), "S1");

        let price = ModelDef::new("slumber_test", "PizzaPrice");
        assert_eq!(price.display_for(&row), "PizzaPrice object");
    }

    #[test]
    fn test_puttable_lists_unique_fields() {
        let model = pizza().with_field(
            "exclusive_to",
            FieldDef::foreign_key(ModelRef::new("slumber_test", "Shop"), None),
        );
        assert_eq!(
            model.puttable(),
            vec![vec!["id".to_string()], vec!["name".to_string()]]
        );
    }

    #[test]
    fn test_coerce_form_values() {
        assert_eq!(FieldDef::boolean().coerce(""), json!(false));
        assert_eq!(FieldDef::boolean().coerce("on"), json!(true));
        assert_eq!(FieldDef::integer().coerce("12"), json!(12));
        assert_eq!(FieldDef::char().coerce("12"), json!("12"));
    }

    #[test]
    fn test_row_matches_query_strings() {
        let mut values = BTreeMap::new();
        values.insert("id".to_string(), json!(3));
        values.insert("name".to_string(), json!("S1"));
        values.insert("for_sale".to_string(), json!(true));
        let row = Row { pk: 3, values };

        assert!(row.matches("pk", "3"));
        assert!(row.matches("id", "3"));
        assert!(row.matches("name", "S1"));
        assert!(row.matches("for_sale", "True"));
        assert!(!row.matches("name", "S2"));
    }
}
