//! Error taxonomy for the control plane
//!
//! Every user-visible failure maps to a stable error code and an HTTP-style
//! status, so the router and the CLI report the same vocabulary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("snapshot not restorable: {0}")]
    NotRestorable(String),

    #[error("backup cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code carried in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) => "bad_request",
            Error::Unavailable(_) => "unavailable",
            Error::InvalidSchedule(_) => "invalid_schedule",
            Error::NotRestorable(_) => "not_restorable",
            Error::Cancelled => "cancelled",
        }
    }

    /// HTTP status the router answers with for this error.
    ///
    /// A non-restorable snapshot maps to 404 alongside missing entities;
    /// transient storage failures map to 503 and are safe to retry.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::NotRestorable(_) => 404,
            Error::BadRequest(_) | Error::InvalidSchedule(_) | Error::Cancelled => 400,
            Error::Unavailable(_) => 503,
        }
    }

    /// Whether a caller may retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}
