use crate::connector::client::ClientInner;
use crate::connector::instance::resolve_instance;
use crate::connector::request_cache::CachedField;
use crate::connector::urls::join_url;
use crate::connector::{ConnectorError, InstanceProxy, PagedSequence, Result};
use crate::model::{FieldDescriptor, ObjectReference};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Local value of a remote field
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Plain scalar (or any JSON the server sent as a value)
    Value(Value),
    /// Reference to another remote instance; `None` for an empty reference
    Object(Option<Arc<InstanceProxy>>),
    /// Lazily paged collection of related instances
    Array(PagedSequence),
}

impl FieldValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(Value::as_i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_json().and_then(Value::as_bool)
    }

    pub fn as_instance(&self) -> Option<&Arc<InstanceProxy>> {
        match self {
            FieldValue::Object(Some(instance)) => Some(instance),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PagedSequence> {
        match self {
            FieldValue::Array(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Value(Value::Null) | FieldValue::Object(None))
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Value(a), FieldValue::Value(b)) => a == b,
            (FieldValue::Object(Some(a)), FieldValue::Object(Some(b))) => Arc::ptr_eq(a, b),
            (FieldValue::Object(None), FieldValue::Object(None)) => true,
            (FieldValue::Array(a), FieldValue::Array(b)) => a.url() == b.url(),
            _ => false,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Value(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Value(Value::String(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Value(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Value(Value::Bool(value))
    }
}

impl From<Arc<InstanceProxy>> for FieldValue {
    fn from(value: Arc<InstanceProxy>) -> Self {
        FieldValue::Object(Some(value))
    }
}

/// Turn one wire descriptor into a local value. Relative URLs inside the
/// descriptor are resolved against `base`, the URL of the carrying document.
pub(crate) fn map_field(
    client: &Arc<ClientInner>,
    base: &str,
    field: &str,
    descriptor: &FieldDescriptor,
) -> Result<FieldValue> {
    match descriptor.kind.as_str() {
        FieldDescriptor::VALUE => Ok(FieldValue::Value(descriptor.data.clone())),
        FieldDescriptor::OBJECT => {
            if descriptor.data.is_null() {
                return Ok(FieldValue::Object(None));
            }
            let reference: ObjectReference = serde_json::from_value(descriptor.data.clone())
                .map_err(|source| ConnectorError::MalformedDocument {
                    url: base.to_string(),
                    source,
                })?;
            let instance = resolve_reference(client, base, &reference)?;
            Ok(FieldValue::Object(Some(instance)))
        }
        FieldDescriptor::ARRAY => {
            let page: String = serde_json::from_value(descriptor.data.clone()).map_err(
                |source| ConnectorError::MalformedDocument {
                    url: base.to_string(),
                    source,
                },
            )?;
            Ok(FieldValue::Array(PagedSequence::new(
                join_url(base, &page)?,
                Arc::downgrade(client),
            )))
        }
        other => Err(ConnectorError::UnsupportedFieldKind {
            field: field.to_string(),
            kind: other.to_string(),
        }),
    }
}

/// Map every field of a document. An unsupported kind only poisons its own
/// field; any other failure aborts the whole document so that nothing from a
/// half-understood response gets cached.
pub(crate) fn map_fields(
    client: &Arc<ClientInner>,
    base: &str,
    fields: &BTreeMap<String, FieldDescriptor>,
) -> Result<Vec<(String, CachedField)>> {
    let mut mapped = Vec::with_capacity(fields.len());
    for (name, descriptor) in fields {
        let cached = match map_field(client, base, name, descriptor) {
            Ok(value) => CachedField::Present(value),
            Err(ConnectorError::UnsupportedFieldKind { kind, .. }) => {
                log::warn!("{}: field {} has unsupported kind {:?}", base, name, kind);
                CachedField::Unsupported(kind)
            }
            Err(e) => return Err(e),
        };
        mapped.push((name.clone(), cached));
    }
    Ok(mapped)
}

/// Resolve an embedded reference to its (shared) instance proxy
pub(crate) fn resolve_reference(
    client: &Arc<ClientInner>,
    base: &str,
    reference: &ObjectReference,
) -> Result<Arc<InstanceProxy>> {
    let model = client.model_at(&join_url(base, &reference.model)?)?;
    resolve_instance(
        client,
        &model,
        &join_url(base, &reference.data)?,
        &reference.display,
        Vec::new(),
    )
}
