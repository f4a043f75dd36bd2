//! Request-scoped field cache.
//!
//! Each logical request runs inside [`scope`] (or [`sync_scope`]). While the
//! scope is active every field fetched or written for an identity URL is kept
//! here, keyed by `(identity, field)`, so all proxies of one remote object see
//! the same values. The cache is dropped when the scope's future completes,
//! fails, panics or is cancelled, and nothing survives into the next request.
//!
//! Tasks spawned from inside a scope do not inherit it.

use crate::connector::{ConnectorError, FieldValue, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;

tokio::task_local! {
    static REQUEST_CACHE: RefCell<RequestCache>;
}

/// A field as the cache holds it. Fields of a kind this client does not
/// understand are remembered so that reading them reports the problem
/// instead of triggering another fetch.
#[derive(Debug, Clone)]
pub(crate) enum CachedField {
    Present(FieldValue),
    Unsupported(String),
}

impl CachedField {
    pub(crate) fn into_result(self, field: &str) -> Result<FieldValue> {
        match self {
            CachedField::Present(value) => Ok(value),
            CachedField::Unsupported(kind) => Err(ConnectorError::UnsupportedFieldKind {
                field: field.to_string(),
                kind,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct RequestCache {
    fields: HashMap<(String, String), CachedField>,
    /// Identities whose full document has been loaded in this request
    fetched: HashSet<String>,
}

pub(crate) enum Lookup {
    /// No scope is active for the current task
    Inactive,
    Hit(CachedField),
    Miss { fetched: bool },
}

/// Run `future` with a fresh request cache, dropping it afterwards
pub async fn scope<F>(future: F) -> F::Output
where
    F: Future,
{
    log::debug!("request cache opened");
    let output = REQUEST_CACHE
        .scope(RefCell::new(RequestCache::default()), future)
        .await;
    log::debug!("request cache closed");
    output
}

/// Blocking counterpart of [`scope`]
pub fn sync_scope<R, F>(f: F) -> R
where
    F: FnOnce() -> R,
{
    REQUEST_CACHE.sync_scope(RefCell::new(RequestCache::default()), f)
}

/// Whether the current task is inside a request scope
pub fn is_active() -> bool {
    REQUEST_CACHE.try_with(|_| ()).is_ok()
}

/// Number of cached fields in the current scope, `None` outside a scope
pub fn cached_field_count() -> Option<usize> {
    REQUEST_CACHE
        .try_with(|cache| cache.borrow().fields.len())
        .ok()
}

/// Value cached for `(identity, field)` in the current scope, if any
pub fn read(identity: &str, field: &str) -> Option<FieldValue> {
    match lookup(identity, field) {
        Lookup::Hit(CachedField::Present(value)) => Some(value),
        _ => None,
    }
}

pub(crate) fn lookup(identity: &str, field: &str) -> Lookup {
    REQUEST_CACHE
        .try_with(|cache| {
            let cache = cache.borrow();
            match cache.fields.get(&key(identity, field)) {
                Some(cached) => Lookup::Hit(cached.clone()),
                None => Lookup::Miss {
                    fetched: cache.fetched.contains(identity),
                },
            }
        })
        .unwrap_or(Lookup::Inactive)
}

/// Overwrite one field. Returns false when no scope is active.
pub fn write(identity: &str, field: &str, value: impl Into<FieldValue>) -> bool {
    let value = CachedField::Present(value.into());
    REQUEST_CACHE
        .try_with(|cache| {
            cache
                .borrow_mut()
                .fields
                .insert(key(identity, field), value);
        })
        .is_ok()
}

/// Set one field only if it has no value yet
pub(crate) fn seed(identity: &str, field: &str, value: CachedField) -> bool {
    REQUEST_CACHE
        .try_with(|cache| {
            cache
                .borrow_mut()
                .fields
                .entry(key(identity, field))
                .or_insert(value);
        })
        .is_ok()
}

/// Install a whole fetched document and mark the identity as loaded. With
/// `overwrite` unset, values already present (local writes, earlier data)
/// are kept.
pub(crate) fn install(identity: &str, fields: &[(String, CachedField)], overwrite: bool) -> bool {
    REQUEST_CACHE
        .try_with(|cache| {
            let mut cache = cache.borrow_mut();
            for (field, value) in fields {
                let slot = key(identity, field);
                if overwrite {
                    cache.fields.insert(slot, value.clone());
                } else {
                    cache.fields.entry(slot).or_insert_with(|| value.clone());
                }
            }
            cache.fetched.insert(identity.to_string());
        })
        .is_ok()
}

/// Drop everything cached for `identity`
pub(crate) fn forget(identity: &str) {
    let _ = REQUEST_CACHE.try_with(|cache| {
        let mut cache = cache.borrow_mut();
        cache.fields.retain(|(owner, _), _| owner != identity);
        cache.fetched.remove(identity);
    });
}

fn key(identity: &str, field: &str) -> (String, String) {
    (identity.to_string(), field.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PIZZA: &str = "http://localhost/slumber/shop/Pizza/data/1/";

    fn present(value: serde_json::Value) -> CachedField {
        CachedField::Present(FieldValue::Value(value))
    }

    fn hit_value(identity: &str, field: &str) -> Option<serde_json::Value> {
        match lookup(identity, field) {
            Lookup::Hit(CachedField::Present(FieldValue::Value(v))) => Some(v),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_marker_tracks_scope_across_cycles() {
        for _ in 0..2 {
            assert!(!is_active());
            scope(async {
                assert!(is_active());
            })
            .await;
            assert!(!is_active());
        }
    }

    #[tokio::test]
    async fn test_writes_visible_within_scope_only() {
        scope(async {
            assert!(write(PIZZA, "attr", json!("attribute data")));
            assert_eq!(hit_value(PIZZA, "attr"), Some(json!("attribute data")));
            assert_eq!(
                read(PIZZA, "attr").and_then(|v| v.as_str().map(String::from)),
                Some("attribute data".to_string())
            );
            assert!(read(PIZZA, "other").is_none());
        })
        .await;

        scope(async {
            assert!(matches!(
                lookup(PIZZA, "attr"),
                Lookup::Miss { fetched: false }
            ));
        })
        .await;

        assert!(matches!(lookup(PIZZA, "attr"), Lookup::Inactive));
        assert!(!write(PIZZA, "attr", json!(1)));
    }

    #[tokio::test]
    async fn test_install_keeps_local_writes_unless_overwriting() {
        scope(async {
            write(PIZZA, "name", json!("local"));
            let fetched = vec![
                ("name".to_string(), present(json!("remote"))),
                ("for_sale".to_string(), present(json!(true))),
            ];
            install(PIZZA, &fetched, false);
            assert_eq!(hit_value(PIZZA, "name"), Some(json!("local")));
            assert_eq!(hit_value(PIZZA, "for_sale"), Some(json!(true)));
            assert!(matches!(
                lookup(PIZZA, "missing"),
                Lookup::Miss { fetched: true }
            ));

            install(PIZZA, &fetched, true);
            assert_eq!(hit_value(PIZZA, "name"), Some(json!("remote")));
        })
        .await;
    }

    #[tokio::test]
    async fn test_seed_does_not_clobber() {
        scope(async {
            assert!(seed(PIZZA, "name", present(json!("first"))));
            seed(PIZZA, "name", present(json!("second")));
            assert_eq!(hit_value(PIZZA, "name"), Some(json!("first")));
            assert_eq!(cached_field_count(), Some(1));

            forget(PIZZA);
            assert_eq!(cached_field_count(), Some(0));
        })
        .await;
        assert_eq!(cached_field_count(), None);
    }

    #[tokio::test]
    async fn test_concurrent_tasks_have_independent_scopes() {
        let first = tokio::spawn(scope(async {
            write(PIZZA, "owner", json!("first"));
            tokio::task::yield_now().await;
            hit_value(PIZZA, "owner")
        }));
        let second = tokio::spawn(scope(async {
            write(PIZZA, "owner", json!("second"));
            tokio::task::yield_now().await;
            hit_value(PIZZA, "owner")
        }));

        assert_eq!(first.await.unwrap(), Some(json!("first")));
        assert_eq!(second.await.unwrap(), Some(json!("second")));
    }

    #[test]
    fn test_sync_scope() {
        assert!(!is_active());
        let inside = sync_scope(is_active);
        assert!(inside);
        assert!(!is_active());
    }

    #[test]
    fn test_scope_ends_on_panic() {
        let result = std::panic::catch_unwind(|| {
            sync_scope(|| {
                write(PIZZA, "attr", json!(1));
                panic!("request failed");
            })
        });
        assert!(result.is_err());
        assert!(!is_active());
    }
}
