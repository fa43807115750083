//! Error taxonomy for the ingestion and analysis pipeline.
//!
//! | Error | Raised by | Handling |
//! |-------|-----------|----------|
//! | [`ValidationError`] | [`crate::validate`] | file rejected before any read |
//! | [`ExtractionError`] | [`crate::extract`] | file marked `error` |
//! | [`RemoteCallError`] | [`crate::client`] | retried when transient, then surfaced |
//! | [`SchemaParseError`] | [`crate::parse`] | masked by a fallback, except bulk analysis |
//!
//! [`AnalysisError`] is what the bulk analysis pipeline returns.

use thiserror::Error;

/// A file failed the upload policy. The `Display` text is the user-facing
/// rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File size exceeds {limit_mb}MB limit")]
    TooLarge { size: u64, limit_mb: u64 },
    #[error("File type not supported. Allowed types: {allowed}")]
    UnsupportedType {
        extension: Option<String>,
        allowed: String,
    },
}

/// Reading or decoding a file's bytes failed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} is not valid UTF-8 text")]
    InvalidUtf8 { name: String },
    #[error("no extractable text in {name}")]
    Empty { name: String },
}

/// The remote completion endpoint could not produce a reply.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    #[error("{var} is not configured; set it to enable document analysis")]
    MissingCredential { var: String },
    #[error("completion request failed: {0}")]
    Network(String),
    #[error("completion request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("completion API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    MalformedEnvelope(String),
    /// No client could be built; carries the reason.
    #[error("{0}")]
    Unavailable(String),
}

impl RemoteCallError {
    /// Whether a retry with the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteCallError::Network(_) | RemoteCallError::Timeout { .. } => true,
            RemoteCallError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteCallError::MissingCredential { .. }
            | RemoteCallError::MalformedEnvelope(_)
            | RemoteCallError::Unavailable(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteCallError {
    fn from(err: reqwest::Error) -> Self {
        RemoteCallError::Network(err.to_string())
    }
}

/// The model's reply was not the JSON document we asked for.
#[derive(Debug, Error)]
#[error("model reply is not valid analysis JSON: {0}")]
pub struct SchemaParseError(#[from] pub serde_json::Error);

/// Failure of a bulk document analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no completed documents to analyze")]
    NoDocuments,
    #[error(transparent)]
    Remote(#[from] RemoteCallError),
    #[error(transparent)]
    Schema(#[from] SchemaParseError),
}
