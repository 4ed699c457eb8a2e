use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchlinkError {
    #[error("Connection error on {node}: {reason}")]
    Connection { node: String, reason: String },

    #[error("Request to {node} timed out after {timeout_ms}ms")]
    Timeout { node: String, timeout_ms: u64 },

    #[error("HTTP {status} returned by node")]
    Http {
        status: u16,
        body: serde_json::Value,
    },

    #[error("No connections available")]
    NoConnectionsAvailable,

    #[error("Giving up after {attempts} attempts: {last}")]
    MaxRetries {
        attempts: usize,
        #[source]
        last: Box<SearchlinkError>,
    },

    #[error("Sniff failed: {0}")]
    Sniff(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Parameter '{param}' is not accepted by {operation}")]
    InvalidParam { operation: String, param: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchlinkError {
    /// Network-level failure: the node could not be reached or did not
    /// answer in time. Only these quarantine the connection and are retried.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SearchlinkError::Connection { .. } | SearchlinkError::Timeout { .. }
        )
    }

    /// Status code for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchlinkError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchlinkError>;
