//! # Error kinds
//!
//! Every error raised by the clinic crates maps onto one `ErrorKind`.
//! Core goals:
//! - consistent status codes + class names
//! - transport-agnostic (the excluded UI/HTTP layer decides how to serialize)
//!
//! If you enable feature `serde`, you also get `ErrorBody` and `to_json()`.

use std::fmt;

/// Error class names + status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,      // 400
    NotFound,        // 404
    Timeout,         // 408
    Conflict,        // 409
    Unprocessable,   // 422
    GeneralError,    // 500
    BadGateway,      // 502
    Unavailable,     // 503
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 408,
            ErrorKind::Conflict => 409,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
            ErrorKind::BadGateway => 502,
            ErrorKind::Unavailable => 503,
        }
    }

    /// Error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    /// Error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::BadGateway => "bad-gateway",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::BadGateway | ErrorKind::Unavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Implemented by crate error enums so the outer layer can pick a status
/// without matching on every variant.
pub trait ClassifiedError: std::error::Error {
    fn kind(&self) -> ErrorKind;
}

/// Client-safe error payload: kind, code and message only, no source chain.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub name: String,
    pub message: String,
    pub code: u16,
    pub class_name: String,
}

#[cfg(feature = "serde")]
impl ErrorBody {
    pub fn from_error<E: ClassifiedError + ?Sized>(err: &E) -> Self {
        let kind = err.kind();
        Self {
            name: kind.name().to_string(),
            message: err.to_string(),
            code: kind.status_code(),
            class_name: kind.class_name().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
