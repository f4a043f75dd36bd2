use thiserror::Error;

/// Errors raised while resolving or reading remote models
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A proxy was constructed for a URL that already has one
    #[error("a proxy is already registered for {url}")]
    DuplicateIdentity { url: String },

    #[error("{url} is registered as {found}, not as {expected}")]
    IdentityConflict {
        url: String,
        expected: String,
        found: String,
    },

    #[error("the URL <{0}> must be absolute")]
    NotAbsolute(String),

    #[error("cannot join {reference} onto {base}: {source}")]
    InvalidUrl {
        base: String,
        reference: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no such application: {0}")]
    UnknownApplication(String),

    #[error("no such model: {0}")]
    UnknownModel(String),

    #[error("{identity} has no field {field}")]
    UnknownField { identity: String, field: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("nothing found at {url}")]
    NotFound { url: String },

    #[error("field {field} has unsupported kind {kind:?}")]
    UnsupportedFieldKind { field: String, kind: String },

    #[error("no request cache scope is active")]
    NoRequestScope,

    #[error("{url} does not offer the {operation} operation")]
    MissingOperation { url: String, operation: String },

    #[error("malformed document from {url}: {source}")]
    MalformedDocument {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url} answered with HTTP status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The client owning this proxy has been dropped
    #[error("the client that produced this proxy no longer exists")]
    Detached,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl ConnectorError {
    /// True for the "no such attribute" class of failures, which callers may
    /// treat as a plain absence rather than a fault.
    pub fn is_missing_attribute(&self) -> bool {
        matches!(
            self,
            Self::UnknownApplication(_) | Self::UnknownModel(_) | Self::UnknownField { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
