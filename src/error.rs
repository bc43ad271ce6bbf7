//! Error taxonomy for the client core.
//!
//! Every fallible operation in the crate returns [`ApiError`]. The variants
//! mirror how callers need to react: configuration problems disable the
//! session subsystem, `Unauthorized` means the cookie session is gone and
//! recovery was exhausted, and the remaining variants carry the server's
//! message verbatim.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified error type for session, request, and stream operations.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The identity provider is misconfigured (e.g. invalid API key).
    /// Terminal for the session manager: the subsystem disables itself.
    #[error("identity provider configuration error: {0}")]
    Configuration(String),

    /// The session is absent or expired and one-shot recovery failed.
    #[error("HTTP 401: Unauthorized")]
    Unauthorized,

    /// Non-2xx, non-401 response. `message` is the server's `detail` field
    /// when one was present, otherwise a synthesized status line.
    #[error("{message}")]
    HttpStatus { status: u16, message: String },

    /// The feedback stream delivered an explicit `error` record.
    #[error("AI stream error: {0}")]
    StreamProtocol(String),

    /// No response was received at all.
    #[error("network failure: {0}")]
    Network(String),

    /// A 2xx response carried a body that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Numeric HTTP status associated with this error, where one exists.
    ///
    /// `Unauthorized` always reports 401 so callers can pattern-match on the
    /// status even after classification.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error might be resolved by re-authenticating.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::HttpStatus { status: 401, .. }
        )
    }

    /// Check if this error disables the session subsystem.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ApiError::Configuration(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}
