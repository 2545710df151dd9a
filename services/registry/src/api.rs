//! API server builder and router

use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Json;
use axum::routing::get;
use serde::Serialize;
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;

use crate::error::RegistryResult;
use crate::state::RegistryState;

/// Value of the `Docker-Distribution-API-Version` header carried by every
/// response.
const API_VERSION: &str = "registry/2.0";

/// Per-request deadline for registry handlers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry builder for configuring and creating a registry service
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    storage: Option<storage::Storage>,
}

impl RegistryBuilder {
    /// Create a new registry builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage backend
    pub fn storage(mut self, storage: storage::Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Build the registry service
    pub fn build(self) -> Registry {
        let storage = self.storage.expect("storage backend must be configured");

        Registry {
            state: RegistryState::new(storage),
        }
    }
}

/// One registry instance: the V2 routing tree plus its private manifest
/// index and upload table.
#[derive(Debug, Clone)]
pub struct Registry {
    state: RegistryState,
}

impl Registry {
    /// The V2 router, servable with any tower-compatible server or
    /// mounted as a subtree of another router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v2/", get(api_version_check))
            .route("/v2/_catalog", get(catalog))
            .merge(crate::blob::router())
            .merge(crate::manifest::router())
            .with_state(self.state.clone())
            .layer(axum::middleware::from_fn(crate::rewrite::rewrite_name_paths))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static("docker-distribution-api-version"),
                HeaderValue::from_static(API_VERSION),
            ))
    }

    /// Rebuild digest references from the manifest mirror; returns the
    /// number of manifests restored. Tags are not recoverable.
    pub async fn rehydrate(&self) -> RegistryResult<usize> {
        self.state.rehydrate().await
    }
}

/// API version check endpoint
///
/// Returns 200 with an empty body to indicate the registry speaks V2
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}

/// Catalog response
#[derive(Debug, Serialize)]
pub struct Catalog {
    pub repositories: Vec<String>,
}

/// List the repositories that hold at least one manifest
async fn catalog(State(state): State<RegistryState>) -> Json<Catalog> {
    Json(Catalog {
        repositories: state.repositories().await,
    })
}
