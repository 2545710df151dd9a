//! Manifest operations for the registry
//!
//! Manifests are stored and served as the exact bytes the client sent;
//! the JSON model below exists to validate uploads and to let callers
//! work with image manifests and multi-platform indexes, never to
//! re-serialize what is on the wire.

use std::collections::BTreeMap;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::state::RegistryState;

/// Media types recognized by the registry, echoed verbatim.
pub mod media_types {
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
    pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
}

/// A content descriptor: a typed, sized pointer to a blob or manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub size: i64,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// A descriptor of a child manifest, annotated with its platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDescriptor {
    #[serde(flatten)]
    pub descriptor: Descriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Platform selector carried by manifest-list entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "os.features", skip_serializing_if = "Option::is_none")]
    pub os_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Image manifest or manifest list, as defined by schema 2 / OCI.
///
/// Either `config` + `layers` (image manifest) or `manifests` (index) is
/// populated; the registry itself only needs the shape for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub schema_version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<ManifestDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Detect a manifest's media type from its content.
///
/// Used when neither the Content-Type header nor the `mediaType` field
/// names one, and when rebuilding the index from mirrored bytes.
pub(crate) fn detect_media_type(data: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Some(media_type) = json.get("mediaType").and_then(|v| v.as_str()) {
            return media_type.to_string();
        }

        if json.get("schemaVersion").and_then(|v| v.as_u64()) == Some(2) {
            if json.get("manifests").is_some() {
                return media_types::DOCKER_MANIFEST_LIST.to_string();
            }
            return media_types::DOCKER_MANIFEST.to_string();
        }
    }

    media_types::OCI_MANIFEST.to_string()
}

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");

/// Router for manifest operations
pub(crate) fn router() -> Router<RegistryState> {
    Router::new()
        .route(
            "/v2/{name}/manifests/{reference}",
            get(get_manifest)
                .head(head_manifest)
                .put(put_manifest)
                .delete(delete_manifest),
        )
        .route("/v2/{name}/tags/list", get(list_tags))
}

/// Get a manifest by tag or digest
async fn get_manifest(
    State(state): State<RegistryState>,
    Path((name, reference)): Path<(String, String)>,
) -> RegistryResult<Response> {
    let record = state.manifest(&name, &reference).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, record.media_type.clone()),
            (header::CONTENT_LENGTH, record.raw.len().to_string()),
            (DOCKER_CONTENT_DIGEST, record.digest.clone()),
        ],
        record.raw.clone(),
    )
        .into_response())
}

/// Check if a manifest exists
async fn head_manifest(
    State(state): State<RegistryState>,
    Path((name, reference)): Path<(String, String)>,
) -> RegistryResult<Response> {
    let record = state.manifest(&name, &reference).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, record.media_type.clone()),
            (header::CONTENT_LENGTH, record.raw.len().to_string()),
            (DOCKER_CONTENT_DIGEST, record.digest.clone()),
        ],
    )
        .into_response())
}

/// Store a manifest under a tag or digest reference
async fn put_manifest(
    State(state): State<RegistryState>,
    Path((name, reference)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> RegistryResult<Response> {
    // Validate the shape without ever re-serializing the raw bytes.
    let manifest: Manifest = serde_json::from_slice(&body)
        .map_err(|err| RegistryError::InvalidManifest(err.to_string()))?;

    // The Content-Type header wins over the embedded mediaType: it is the
    // on-the-wire intent.
    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or(manifest.media_type)
        .unwrap_or_else(|| detect_media_type(&body));

    tracing::debug!(%name, %reference, %media_type, size = body.len(), "storing manifest");

    let record = state
        .put_manifest(&name, &reference, media_type, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        [
            (
                header::LOCATION,
                format!("/v2/{}/manifests/{}", name, record.digest),
            ),
            (DOCKER_CONTENT_DIGEST, record.digest.clone()),
        ],
    )
        .into_response())
}

/// Delete a single manifest reference
async fn delete_manifest(
    State(state): State<RegistryState>,
    Path((name, reference)): Path<(String, String)>,
) -> RegistryResult<StatusCode> {
    state.delete_manifest(&name, &reference).await?;
    Ok(StatusCode::ACCEPTED)
}

/// List tags for a repository
async fn list_tags(
    State(state): State<RegistryState>,
    Path(name): Path<String>,
) -> RegistryResult<axum::Json<TagList>> {
    let tags = state.tags(&name).await;

    Ok(axum::Json(TagList { name, tags }))
}

/// Tag list response
#[derive(Debug, Serialize)]
pub struct TagList {
    pub name: String,
    pub tags: Vec<String>,
}
