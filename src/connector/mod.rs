//! Lazy client for a remote slumber model directory.
//!
//! A [`Client`] resolves applications, models and instances from a directory
//! URL. Every resolved proxy is registered in the client's identity cache, so
//! one URL always maps to one proxy. Instance field values are fetched on
//! first read and kept in the [`request_cache`] of the current request only.

mod application;
mod client;
mod error;
mod fetcher;
mod identity;
mod instance;
mod middleware;
mod model;
mod paging;
pub mod request_cache;
pub mod urls;
mod values;

pub use application::AppConnector;
pub use client::{ApplicationNode, Client};
pub use error::{ConnectorError, Result};
pub use fetcher::{FetchRecord, Fetcher, HttpFetcher, Method, StaticFetcher};
pub use identity::{IdentityCache, Proxy};
pub use instance::InstanceProxy;
pub use middleware::request_cache_layer;
pub use model::ModelConnector;
pub use paging::{PageCursor, PagedSequence};
pub use values::FieldValue;
