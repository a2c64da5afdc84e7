//! Error types for the chatsync ETL
//!
//! Every variant is fatal to the `(day, record type)` run it occurs in. Transient
//! source-API failures never show up here: the fetch client retries them and only
//! the final outcome reaches the caller.

use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    /// A non-200 response reached the fetch loop
    #[error("Source API returned {status}: {body}")]
    FetchFailed { status: u16, body: String },

    /// A 200 response that does not decode as a page
    #[error("Source API returned an unreadable page from {uri}: {reason}")]
    InvalidPage { uri: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("'{0}' is not a recognized record type (expected conversation or message)")]
    UnsupportedRecordType(String),

    #[error("Malformed {record_type} record: {reason}")]
    MalformedRecord { record_type: String, reason: String },

    #[error("Redaction service error: {0}")]
    RedactionService(String),

    /// The warehouse refused the batch; carries its diagnostics
    #[error("Load rejected for {table}: {diagnostics}")]
    LoadRejected { table: String, diagnostics: String },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Invalid execution timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EtlError {
    pub fn malformed(record_type: impl ToString, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record_type: record_type.to_string(),
            reason: reason.into(),
        }
    }

    pub fn redaction(msg: impl Into<String>) -> Self {
        Self::RedactionService(msg.into())
    }

    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<chatsync_common::CommonError> for EtlError {
    fn from(err: chatsync_common::CommonError) -> Self {
        EtlError::Config(err.to_string())
    }
}
