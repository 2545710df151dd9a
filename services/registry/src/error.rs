//! Error types for the registry

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Blob not found
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Manifest not found
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// Upload session not found
    #[error("blob upload not found: {0}")]
    UploadNotFound(String),

    /// Invalid digest format
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// The `digest` query parameter was not supplied on upload completion
    #[error("digest parameter required")]
    MissingDigest,

    /// Upload contents did not hash to the declared digest
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Declared digest
        expected: String,
        /// Computed digest
        actual: String,
    },

    /// Manifest body was not valid JSON
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// The blob store rejected a committed upload
    #[error("failed to store blob: {0}")]
    BlobCommitFailed(#[source] storage::StorageError),

    /// The blob store rejected the manifest mirror write
    #[error("failed to store manifest: {0}")]
    MirrorFailed(#[source] storage::StorageError),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

impl RegistryError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::BlobNotFound(_)
            | RegistryError::ManifestNotFound(_)
            | RegistryError::UploadNotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::InvalidDigest(_)
            | RegistryError::MissingDigest
            | RegistryError::DigestMismatch { .. }
            | RegistryError::InvalidManifest(_) => StatusCode::BAD_REQUEST,
            RegistryError::BlobCommitFailed(_)
            | RegistryError::MirrorFailed(_)
            | RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for the V2 error envelope
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::BlobNotFound(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestNotFound(_) => "MANIFEST_UNKNOWN",
            RegistryError::UploadNotFound(_) => "BLOB_UPLOAD_UNKNOWN",
            RegistryError::InvalidDigest(_)
            | RegistryError::MissingDigest
            | RegistryError::DigestMismatch { .. } => "DIGEST_INVALID",
            RegistryError::InvalidManifest(_) => "MANIFEST_INVALID",
            RegistryError::BlobCommitFailed(_) => "BLOB_UPLOAD_INVALID",
            RegistryError::MirrorFailed(_) => "MANIFEST_BLOB_UNKNOWN",
            RegistryError::Storage(_) => "UNKNOWN",
        }
    }
}

/// V2 error response envelope
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_pairings() {
        let cases: Vec<(RegistryError, StatusCode, &str)> = vec![
            (
                RegistryError::BlobNotFound("sha256:0".into()),
                StatusCode::NOT_FOUND,
                "BLOB_UNKNOWN",
            ),
            (
                RegistryError::ManifestNotFound("repo/latest".into()),
                StatusCode::NOT_FOUND,
                "MANIFEST_UNKNOWN",
            ),
            (
                RegistryError::UploadNotFound("uuid".into()),
                StatusCode::NOT_FOUND,
                "BLOB_UPLOAD_UNKNOWN",
            ),
            (
                RegistryError::MissingDigest,
                StatusCode::BAD_REQUEST,
                "DIGEST_INVALID",
            ),
            (
                RegistryError::InvalidManifest("not json".into()),
                StatusCode::BAD_REQUEST,
                "MANIFEST_INVALID",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.error_code(), code, "{err}");
        }
    }
}
