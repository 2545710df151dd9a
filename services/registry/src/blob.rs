//! Blob and blob-upload operations for the registry

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::Deserialize;

use crate::error::{RegistryError, RegistryResult};
use crate::state::RegistryState;

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
const DOCKER_UPLOAD_UUID: HeaderName = HeaderName::from_static("docker-upload-uuid");

/// Router for blob operations
pub(crate) fn router() -> Router<RegistryState> {
    use axum::routing::{patch, put};

    Router::new()
        .route(
            "/v2/{name}/blobs/{digest}",
            get(get_blob).head(head_blob).delete(delete_blob),
        )
        .route("/v2/{name}/blobs/uploads/", post(start_upload))
        .route(
            "/v2/{name}/blobs/uploads/{uuid}",
            patch(patch_upload)
                .put(complete_upload)
                .get(upload_status)
                .delete(cancel_upload),
        )
}

/// Get a blob
async fn get_blob(
    State(state): State<RegistryState>,
    Path((name, digest)): Path<(String, String)>,
) -> RegistryResult<Response> {
    validate_digest(&digest)?;

    let data = state.blob(&name, &digest).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (DOCKER_CONTENT_DIGEST, digest),
        ],
        data,
    )
        .into_response())
}

/// Check if a blob exists
async fn head_blob(
    State(state): State<RegistryState>,
    Path((name, digest)): Path<(String, String)>,
) -> RegistryResult<Response> {
    validate_digest(&digest)?;

    let size = state.blob_size(&name, &digest).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, size.to_string()),
            (DOCKER_CONTENT_DIGEST, digest),
        ],
    )
        .into_response())
}

/// Delete a blob
async fn delete_blob(
    State(state): State<RegistryState>,
    Path((name, digest)): Path<(String, String)>,
) -> RegistryResult<StatusCode> {
    validate_digest(&digest)?;

    state.delete_blob(&name, &digest).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Open a blob upload session
async fn start_upload(
    State(state): State<RegistryState>,
    Path(name): Path<String>,
) -> RegistryResult<Response> {
    let uuid = state.begin_upload(&name).await;

    tracing::debug!(%name, upload = %uuid, "upload started");

    Ok((
        StatusCode::ACCEPTED,
        [
            (
                header::LOCATION,
                format!("/v2/{name}/blobs/uploads/{uuid}"),
            ),
            (DOCKER_UPLOAD_UUID, uuid),
            (header::RANGE, "bytes=0-0".to_string()),
        ],
    )
        .into_response())
}

/// Append a chunk to an upload session
async fn patch_upload(
    State(state): State<RegistryState>,
    Path((name, uuid)): Path<(String, String)>,
    body: Bytes,
) -> RegistryResult<Response> {
    let size = state.append_upload(&name, &uuid, &body).await?;

    Ok((
        StatusCode::ACCEPTED,
        [
            (
                header::LOCATION,
                format!("/v2/{name}/blobs/uploads/{uuid}"),
            ),
            (DOCKER_UPLOAD_UUID, uuid),
            (header::RANGE, format!("bytes=0-{}", size.saturating_sub(1))),
        ],
    )
        .into_response())
}

/// Query parameters for upload completion
#[derive(Debug, Deserialize)]
struct CompleteUploadQuery {
    digest: Option<String>,
}

/// Complete an upload session, verifying the declared digest
async fn complete_upload(
    State(state): State<RegistryState>,
    Path((name, uuid)): Path<(String, String)>,
    Query(params): Query<CompleteUploadQuery>,
    body: Bytes,
) -> RegistryResult<Response> {
    let digest = params.digest.ok_or(RegistryError::MissingDigest)?;
    validate_digest(&digest)?;

    state.commit_upload(&name, &uuid, &body, &digest).await?;

    tracing::debug!(%name, upload = %uuid, %digest, "upload completed");

    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION, format!("/v2/{name}/blobs/{digest}")),
            (DOCKER_CONTENT_DIGEST, digest),
        ],
    )
        .into_response())
}

/// Report the progress of an upload session
async fn upload_status(
    State(state): State<RegistryState>,
    Path((name, uuid)): Path<(String, String)>,
) -> RegistryResult<Response> {
    let size = state.upload_size(&name, &uuid).await?;

    Ok((
        StatusCode::NO_CONTENT,
        [
            (DOCKER_UPLOAD_UUID, uuid),
            (header::RANGE, format!("bytes=0-{}", size.saturating_sub(1))),
        ],
    )
        .into_response())
}

/// Abort an upload session
async fn cancel_upload(
    State(state): State<RegistryState>,
    Path((_name, uuid)): Path<(String, String)>,
) -> RegistryResult<StatusCode> {
    state.abort_upload(&uuid).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate that a digest is `sha256:` followed by 64 lowercase hex
/// characters.
fn validate_digest(digest: &str) -> RegistryResult<()> {
    let hex = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| RegistryError::InvalidDigest(digest.to_string()))?;

    if hex.len() != 64 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(RegistryError::InvalidDigest(digest.to_string()));
    }

    Ok(())
}
