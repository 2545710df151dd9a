//! Integration tests for the registry service

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use bytes::Bytes;
use registry::{Manifest, RegistryBuilder, media_types};
use sha2::{Digest, Sha256};
use storage::MemoryStorage;
use tower::ServiceExt;

/// Helper to create a test registry router
fn test_registry() -> Router {
    let storage = MemoryStorage::new();
    RegistryBuilder::new().storage(storage.into()).build().router()
}

fn digest_of(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

async fn body_bytes(response: Response<axum::body::Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

fn header<'r>(response: &'r Response<axum::body::Body>, name: &str) -> &'r str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

async fn error_code(response: Response<axum::body::Body>) -> String {
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    body["errors"][0]["code"].as_str().unwrap().to_string()
}

/// Start an upload and return the upload uuid and Location path.
async fn start_upload(app: &Router, name: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v2/{name}/blobs/uploads/"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(header(&response, "range"), "bytes=0-0");

    let uuid = header(&response, "docker-upload-uuid").to_string();
    let location = header(&response, "location").to_string();
    assert_eq!(location, format!("/v2/{name}/blobs/uploads/{uuid}"));

    (uuid, location)
}

/// Push a blob monolithically and return the digest.
async fn push_blob(app: &Router, name: &str, data: &[u8]) -> String {
    let (_uuid, location) = start_upload(app, name).await;
    let digest = digest_of(data);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={digest}"))
                .body(Body::from(data.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    digest
}

/// Push a manifest under a reference and return the digest.
async fn push_manifest(app: &Router, name: &str, reference: &str, body: &[u8], content_type: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/v2/{name}/manifests/{reference}"))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    header(&response, "docker-content-digest").to_string()
}

fn image_manifest() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": media_types::DOCKER_MANIFEST,
        "config": {
            "mediaType": media_types::DOCKER_CONFIG,
            "size": 1234,
            "digest": "sha256:5f70bf18a086007016e948b04aed3b82103a36bea41755b6cddfaf10ace3c6ef"
        },
        "layers": []
    }))
    .unwrap()
}

#[tokio::test]
async fn test_api_version_check() {
    let app = test_registry();

    let response = app
        .oneshot(Request::builder().uri("/v2/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "docker-distribution-api-version"),
        "registry/2.0"
    );
    assert_eq!(&body_bytes(response).await[..], b"{}");
}

#[tokio::test]
async fn test_blob_round_trip() {
    let app = test_registry();

    let (_uuid, location) = start_upload(&app, "x").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!(
                    "{location}?digest=sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
                ))
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        header(&response, "docker-content-digest"),
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    let blob_location = header(&response, "location").to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(blob_location)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/octet-stream");
    assert_eq!(&body_bytes(response).await[..], b"hello");
}

#[tokio::test]
async fn test_chunked_upload() {
    let app = test_registry();

    let (uuid, location) = start_upload(&app, "chunky").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from("First chunk"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(header(&response, "range"), "bytes=0-10");
    assert_eq!(header(&response, "docker-upload-uuid"), uuid);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from("Second chunk"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(header(&response, "range"), "bytes=0-22");

    let digest = digest_of(b"First chunkSecond chunk");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/chunky/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(&body_bytes(response).await[..], b"First chunkSecond chunk");
}

#[tokio::test]
async fn test_digest_mismatch_leaves_store_unchanged() {
    let app = test_registry();

    let (_uuid, location) = start_upload(&app, "mismatch").await;

    let wrong = "sha256:0000000000000000000000000000000000000000000000000000000000000000";
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={wrong}"))
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "DIGEST_INVALID");

    // Nothing was committed under either digest.
    for digest in [wrong.to_string(), digest_of(b"hello")] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/mismatch/blobs/{digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // The session survived the failed commit and can be completed. The
    // body from the failed attempt was appended.
    let digest = digest_of(b"hello");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_upload_put_requires_digest() {
    let app = test_registry();

    let (_uuid, location) = start_upload(&app, "nodigest").await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(location)
                .body(Body::from("data"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "DIGEST_INVALID");
}

#[tokio::test]
async fn test_empty_blob_round_trip() {
    let app = test_registry();

    let digest = push_blob(&app, "empty", b"").await;
    assert_eq!(
        digest,
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/empty/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_upload_status_and_cancel() {
    let app = test_registry();

    let (uuid, location) = start_upload(&app, "cancel-me").await;

    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from("12345"))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(Request::builder().uri(&location).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(header(&response, "docker-upload-uuid"), uuid);
    assert_eq!(header(&response, "range"), "bytes=0-4");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&location)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from("more"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "BLOB_UPLOAD_UNKNOWN");
}

#[tokio::test]
async fn test_blob_head() {
    let app = test_registry();

    let data = b"test blob data";
    let digest = push_blob(&app, "heads", data).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/v2/heads/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-length"), data.len().to_string());
    assert_eq!(header(&response, "docker-content-digest"), digest);

    let missing = digest_of(b"never pushed");
    let response = app
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/v2/heads/blobs/{missing}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blob_delete() {
    let app = test_registry();

    let digest = push_blob(&app, "deleting", b"here today").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/v2/deleting/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    for method in ["GET", "DELETE"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(format!("/v2/deleting/blobs/{digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_code(response).await, "BLOB_UNKNOWN");
    }
}

#[tokio::test]
async fn test_blobs_are_scoped_to_their_repository() {
    let app = test_registry();

    let digest = push_blob(&app, "repo-a", b"private bytes").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/repo-b/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_digest_is_rejected() {
    let app = test_registry();

    for bad in ["not-a-digest", "sha256:short", "md5:abc"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/repo/blobs/{bad}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{bad}");
        assert_eq!(error_code(response).await, "DIGEST_INVALID");
    }
}

#[tokio::test]
async fn test_manifest_by_tag_and_by_digest() {
    let app = test_registry();

    let body = image_manifest();
    let digest = push_manifest(&app, "img", "v1.0", &body, media_types::DOCKER_MANIFEST).await;
    assert_eq!(digest, digest_of(&body));

    for reference in ["v1.0", digest.as_str()] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/img/manifests/{reference}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-type"), media_types::DOCKER_MANIFEST);
        assert_eq!(header(&response, "docker-content-digest"), digest);
        assert_eq!(&body_bytes(response).await[..], &body[..]);
    }
}

#[tokio::test]
async fn test_manifest_put_location_points_at_digest() {
    let app = test_registry();

    let body = image_manifest();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/v2/img/manifests/v1.0")
                .header(header::CONTENT_TYPE, media_types::DOCKER_MANIFEST)
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        header(&response, "location"),
        format!("/v2/img/manifests/{}", digest_of(&body))
    );
}

#[tokio::test]
async fn test_manifest_head() {
    let app = test_registry();

    let body = image_manifest();
    let digest = push_manifest(&app, "img", "latest", &body, media_types::DOCKER_MANIFEST).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri("/v2/img/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-length"), body.len().to_string());
    assert_eq!(header(&response, "docker-content-digest"), digest);
}

#[tokio::test]
async fn test_content_type_header_wins_over_media_type_field() {
    let app = test_registry();

    // Body claims OCI; the wire says Docker. The wire wins.
    let body = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": media_types::OCI_MANIFEST,
        "layers": []
    }))
    .unwrap();

    push_manifest(&app, "ties", "latest", &body, media_types::DOCKER_MANIFEST).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/ties/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(header(&response, "content-type"), media_types::DOCKER_MANIFEST);
}

#[tokio::test]
async fn test_media_type_field_used_without_header() {
    let app = test_registry();

    let body = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": media_types::OCI_MANIFEST,
        "layers": []
    }))
    .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/v2/untyped/manifests/latest")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/untyped/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(header(&response, "content-type"), media_types::OCI_MANIFEST);
}

#[tokio::test]
async fn test_invalid_manifest_json() {
    let app = test_registry();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/v2/broken/manifests/latest")
                .header(header::CONTENT_TYPE, media_types::DOCKER_MANIFEST)
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "MANIFEST_INVALID");
}

#[tokio::test]
async fn test_multi_arch_manifest_list() {
    let app = test_registry();

    let amd64 = image_manifest();
    let arm64 = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": media_types::DOCKER_MANIFEST,
        "config": {
            "mediaType": media_types::DOCKER_CONFIG,
            "size": 1234,
            "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        },
        "layers": []
    }))
    .unwrap();

    let amd64_digest = push_manifest(&app, "multi", &digest_of(&amd64), &amd64, media_types::DOCKER_MANIFEST).await;
    let arm64_digest = push_manifest(&app, "multi", &digest_of(&arm64), &arm64, media_types::DOCKER_MANIFEST).await;

    let list = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": media_types::DOCKER_MANIFEST_LIST,
        "manifests": [
            {
                "mediaType": media_types::DOCKER_MANIFEST,
                "size": amd64.len(),
                "digest": amd64_digest,
                "platform": { "architecture": "amd64", "os": "linux" }
            },
            {
                "mediaType": media_types::DOCKER_MANIFEST,
                "size": arm64.len(),
                "digest": arm64_digest,
                "platform": { "architecture": "arm64", "os": "linux" }
            }
        ]
    }))
    .unwrap();

    push_manifest(&app, "multi", "latest", &list, media_types::DOCKER_MANIFEST_LIST).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/multi/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-type"),
        media_types::DOCKER_MANIFEST_LIST
    );

    let manifest: Manifest = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(manifest.manifests.len(), 2);

    let platforms: Vec<(String, String)> = manifest
        .manifests
        .iter()
        .map(|m| {
            let platform = m.platform.as_ref().unwrap();
            (platform.architecture.clone(), platform.os.clone())
        })
        .collect();
    assert_eq!(
        platforms,
        vec![
            ("amd64".to_string(), "linux".to_string()),
            ("arm64".to_string(), "linux".to_string())
        ]
    );
}

#[tokio::test]
async fn test_delete_tag_keeps_digest_reference() {
    let app = test_registry();

    let body = image_manifest();
    let digest = push_manifest(&app, "d", "v1.0", &body, media_types::DOCKER_MANIFEST).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/v2/d/manifests/v1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/d/manifests/v1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "MANIFEST_UNKNOWN");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/d/tags/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let tags: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(tags["tags"].as_array().unwrap().is_empty());

    // The record stays reachable through its digest binding.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/d/manifests/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], &body[..]);
}

#[tokio::test]
async fn test_delete_missing_manifest() {
    let app = test_registry();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/v2/ghost/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "MANIFEST_UNKNOWN");
}

#[tokio::test]
async fn test_tags_list_excludes_digest_references() {
    let app = test_registry();

    let body = image_manifest();
    push_manifest(&app, "tagged", "v1.0", &body, media_types::DOCKER_MANIFEST).await;
    push_manifest(&app, "tagged", "latest", &body, media_types::DOCKER_MANIFEST).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/tagged/tags/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let tags: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(tags["name"], "tagged");
    assert_eq!(
        tags["tags"].as_array().unwrap(),
        &vec![
            serde_json::Value::String("latest".to_string()),
            serde_json::Value::String("v1.0".to_string())
        ]
    );
}

#[tokio::test]
async fn test_catalog_lists_repositories_with_manifests() {
    let app = test_registry();

    let body = image_manifest();
    push_manifest(&app, "one", "latest", &body, media_types::DOCKER_MANIFEST).await;
    push_manifest(&app, "two", "latest", &body, media_types::DOCKER_MANIFEST).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/_catalog")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let catalog: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(
        catalog["repositories"].as_array().unwrap(),
        &vec![
            serde_json::Value::String("one".to_string()),
            serde_json::Value::String("two".to_string())
        ]
    );
}

#[tokio::test]
async fn test_names_with_slashes() {
    let app = test_registry();

    let blob_digest = push_blob(&app, "a/b/c", b"nested bytes").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v2/a/b/c/blobs/{blob_digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], b"nested bytes");

    let body = image_manifest();
    push_manifest(&app, "a/b/c", "v1.0", &body, media_types::DOCKER_MANIFEST).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/a/b/c/tags/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let tags: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(tags["name"], "a/b/c");
    assert_eq!(tags["tags"][0], "v1.0");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/_catalog")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let catalog: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(catalog["repositories"][0], "a/b/c");
}

#[tokio::test]
async fn test_rehydrate_restores_digest_references() {
    let shared: storage::Storage = MemoryStorage::new().into();

    // Push through a first registry instance.
    let first = RegistryBuilder::new().storage(shared.clone()).build();
    let app = first.router();
    let body = image_manifest();
    let digest = push_manifest(&app, "persisted", "v1.0", &body, media_types::DOCKER_MANIFEST).await;

    // A fresh instance over the same storage starts empty, then recovers
    // the mirrored manifests.
    let second = RegistryBuilder::new().storage(shared).build();
    let restored = second.rehydrate().await.unwrap();
    assert_eq!(restored, 1);

    let app = second.router();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v2/persisted/manifests/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), media_types::DOCKER_MANIFEST);
    assert_eq!(&body_bytes(response).await[..], &body[..]);

    // Tag bindings are not mirrored, so they do not come back.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/persisted/manifests/v1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
