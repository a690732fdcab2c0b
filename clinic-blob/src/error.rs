use clinic_core::{ClassifiedError, ErrorKind};
use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {id}")]
    NotFound { id: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Operation not supported by this store")]
    Unsupported,

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Blob {operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an upload failed error
    pub fn upload_failed<S: Into<String>>(reason: S) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: &'static str, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            after_ms: after.as_millis() as u64,
        }
    }

    /// Deleting something that is already gone counts as done.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ClassifiedError for BlobError {
    fn kind(&self) -> ErrorKind {
        match self {
            BlobError::NotFound { .. } => ErrorKind::NotFound,
            BlobError::Invalid { .. } => ErrorKind::BadRequest,
            BlobError::Unsupported => ErrorKind::Unprocessable,
            BlobError::UploadFailed { .. } | BlobError::Backend { .. } => ErrorKind::BadGateway,
            BlobError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_kind() {
        let cases = [
            (BlobError::not_found("k"), ErrorKind::NotFound),
            (BlobError::invalid("empty body"), ErrorKind::BadRequest),
            (BlobError::Unsupported, ErrorKind::Unprocessable),
            (BlobError::upload_failed("reset"), ErrorKind::BadGateway),
            (
                BlobError::backend(std::io::Error::new(std::io::ErrorKind::Other, "down")),
                ErrorKind::BadGateway,
            ),
            (
                BlobError::timeout("upload", std::time::Duration::from_millis(1500)),
                ErrorKind::Timeout,
            ),
        ];
        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
        assert!(BlobError::not_found("k").is_not_found());
    }
}
