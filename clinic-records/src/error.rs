use clinic_blob::BlobError;
use clinic_core::{ClassifiedError, ErrorKind};
use thiserror::Error;

/// Result type for record operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors surfaced by the record layer.
///
/// Delete failures and partial batch outcomes are never errors; they travel
/// as counts inside the reports.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Tenant not found: {tenant_id}")]
    TenantNotFound { tenant_id: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Could not allocate a free code after {attempts} attempts")]
    CodeAllocationExhausted { attempts: u32 },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Code already in use: {code}")]
    Conflict { code: String },

    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("An edit session is already open for record {record_id}")]
    SessionAlreadyOpen { record_id: String },

    #[error("Edit session is closed")]
    SessionClosed,

    #[error("Record store error: {message}")]
    Store { message: String },

    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),
}

impl RecordError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn conflict<S: Into<String>>(code: S) -> Self {
        Self::Conflict { code: code.into() }
    }

    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn tenant_not_found<S: Into<String>>(tenant_id: S) -> Self {
        Self::TenantNotFound {
            tenant_id: tenant_id.into(),
        }
    }

    pub fn upload_failed<S: Into<String>>(reason: S) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl ClassifiedError for RecordError {
    fn kind(&self) -> ErrorKind {
        match self {
            RecordError::TenantNotFound { .. } | RecordError::NotFound { .. } => ErrorKind::NotFound,
            RecordError::Validation { .. } => ErrorKind::Unprocessable,
            RecordError::CodeAllocationExhausted { .. } => ErrorKind::Unavailable,
            RecordError::UploadFailed { .. } => ErrorKind::BadGateway,
            RecordError::Conflict { .. } | RecordError::SessionAlreadyOpen { .. } => ErrorKind::Conflict,
            RecordError::SessionClosed => ErrorKind::BadRequest,
            RecordError::Store { .. } => ErrorKind::GeneralError,
            RecordError::Blob(inner) => inner.kind(),
        }
    }
}
