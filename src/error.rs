//! Error types for the saved-search pipeline and the watch engine.
//!
//! Nothing here is fatal to the process: wizard errors are reported back to
//! the user, remote errors are logged by the watch loop and retried on the
//! next cycle.

use thiserror::Error;

use crate::wizard::Prompt;

/// Failures while rendering a filter into a marketplace query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A required identification field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A numeric range has its bounds reversed.
    #[error("invalid range for {0}: lower bound exceeds upper bound")]
    InvalidRange(&'static str),
}

/// Failures of the remote catalog, search and detail endpoints.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// 4xx from the endpoint.
    #[error("bad request: HTTP {status}")]
    BadRequest { status: u16 },

    /// 5xx (or any other non-success) from the endpoint.
    #[error("server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Response body could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Transport level failure.
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),

    /// Call did not complete within the per-call deadline.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl RemoteError {
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        if status.is_client_error() {
            RemoteError::BadRequest {
                status: status.as_u16(),
            }
        } else {
            RemoteError::ServerError {
                status: status.as_u16(),
            }
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::from_status(status)
        } else {
            RemoteError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Malformed(err.to_string())
    }
}

/// Failures while driving the filter wizard.
#[derive(Error, Debug)]
pub enum WizardError {
    /// The selection was not among the options last offered; resend `prompt`.
    #[error("selection is not one of the offered options")]
    InvalidSelection { prompt: Prompt },

    /// The catalog returned nothing (or failed) for the next step.
    #[error("catalog unavailable")]
    CatalogUnavailable,

    /// No wizard is in progress for this user.
    #[error("no search is being built for this user")]
    NotStarted,
}

/// Failures of the saved-search store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no saved search at index {index} (user has {len})")]
    NotFound { index: usize, len: usize },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Errors surfaced to the messaging transport.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("user {0} is not authorized")]
    Unauthorized(crate::models::UserId),

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures talking to the Telegram Bot API.
#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `ok: false`.
    #[error("{method} failed: {description}")]
    Api {
        method: &'static str,
        description: String,
    },
}
