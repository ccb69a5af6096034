//! Crate-wide error taxonomy.
//!
//! Six variants, matching the station's error handling design: each is a
//! distinct case callers can match on, never a bag of strings.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header parse failure, hash mismatch, truncated body.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Filesystem or transport short-read / write failure.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Resolve failed or the requested path is not served.
    #[error("not found")]
    NotFound,

    /// Peer responded with a non-200 status.
    #[error("peer responded {code}")]
    HttpNonOk { code: u16 },

    /// Request rejected by the acceptance policy.
    #[error("denied")]
    Denied,

    /// Unreadable or malformed config file. Non-fatal where a default
    /// exists; the caller decides whether to treat it as fatal (identity).
    #[error("config error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidFormat(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            Error::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::HttpNonOk { .. } => StatusCode::BAD_GATEWAY,
            Error::Denied => StatusCode::FORBIDDEN,
            Error::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
