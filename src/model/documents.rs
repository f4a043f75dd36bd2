use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root directory listing: dotted application name -> application URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryDocument {
    pub apps: BTreeMap<String, String>,
}

/// Models exposed by one application: model name -> model URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDocument {
    pub models: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    pub name: String,
    pub module: String,
    #[serde(default)]
    pub operations: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMetadata>,
    #[serde(default)]
    pub puttable: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Result of a model `get/` query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceQueryDocument {
    pub identity: String,
    pub display: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDescriptor>,
}

/// Full instance document served from an identity URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDocument {
    pub identity: String,
    pub display: String,
    #[serde(default)]
    pub operations: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDescriptor>,
    #[serde(default)]
    pub data_arrays: BTreeMap<String, String>,
}

/// Wire form of a single field value. `kind` stays a plain string so that
/// kinds unknown to this client survive deserialization and can be reported
/// per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub kind: String,
    #[serde(rename = "type", default)]
    pub field_type: serde_json::Value,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl FieldDescriptor {
    pub const VALUE: &'static str = "value";
    pub const OBJECT: &'static str = "object";
    pub const ARRAY: &'static str = "array";

    pub fn value(field_type: &str, data: serde_json::Value) -> Self {
        Self {
            kind: Self::VALUE.to_string(),
            field_type: serde_json::Value::String(field_type.to_string()),
            data,
        }
    }

    pub fn object(model_url: &str, reference: Option<ObjectReference>) -> Self {
        let data = match reference {
            Some(reference) => serde_json::to_value(reference).unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::Null,
        };
        Self {
            kind: Self::OBJECT.to_string(),
            field_type: serde_json::Value::String(model_url.to_string()),
            data,
        }
    }
}

/// Reference to another instance, embedded in object fields and page items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReference {
    /// URL of the referenced model
    #[serde(rename = "type")]
    pub model: String,
    pub display: String,
    /// Identity URL of the referenced instance
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pk: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    pub page: Vec<ObjectReference>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedDocument {
    pub created: bool,
    pub identity: String,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedDocument {
    pub deleted: bool,
}
