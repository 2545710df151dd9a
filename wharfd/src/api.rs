//! Control-plane API
//!
//! CRUD over repository descriptors, driving the registry lifecycle:
//! creating a docker repository starts (or mounts) its registry, deleting
//! one stops it. Port conflicts are rejected before anything is
//! persisted.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use crate::error::{ApiError, ApiResult};
use crate::manager::RegistryManager;
use crate::models::{CreateRepository, DockerRepositoryConfig, Repository, RepositoryKind};
use crate::store::RepositoryStore;

/// Shared control-plane state
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: RepositoryStore,
    pub manager: Arc<RegistryManager>,
}

/// Create the control-plane router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/repositories",
            get(list_repositories).post(create_repository),
        )
        .route(
            "/api/v1/repositories/{name}",
            get(get_repository).delete(delete_repository),
        )
        .route("/v2/", any(main_port_proxy))
        .route("/v2/{*rest}", any(main_port_proxy))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "time": Utc::now() }))
}

async fn list_repositories(State(state): State<AppState>) -> ApiResult<Json<Vec<Repository>>> {
    Ok(Json(state.store.list().await?))
}

async fn get_repository(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Repository>> {
    Ok(Json(state.store.get(&name).await?))
}

/// Resolve a docker create request's config payload.
///
/// Returns the effective configuration and whether the client asked for
/// the main-port mount. Explicitly setting a port field with both ports
/// zero is the mount request; omitting ports entirely falls back to the
/// default listener port.
fn resolve_docker_config(
    config: Option<&serde_json::Value>,
) -> ApiResult<(DockerRepositoryConfig, bool)> {
    let Some(value) = config else {
        return Ok((DockerRepositoryConfig::default(), false));
    };

    let parsed: DockerRepositoryConfig = serde_json::from_value(value.clone()).map_err(|_| {
        ApiError::BadRequest("Invalid Docker repository configuration".to_string())
    })?;

    if parsed.wants_main_port() {
        let ports_named = value.get("http_port").is_some() || value.get("https_port").is_some();
        if ports_named {
            return Ok((parsed, true));
        }

        return Ok((
            DockerRepositoryConfig {
                v1_enabled: parsed.v1_enabled,
                ..DockerRepositoryConfig::default()
            },
            false,
        ));
    }

    Ok((parsed, false))
}

async fn create_repository(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request: CreateRepository = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;

    if request.name.is_empty() {
        return Err(ApiError::BadRequest("Repository name is required".to_string()));
    }

    let mut repo = Repository {
        name: request.name,
        kind: request.kind,
        description: request.description,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        config: request.config,
    };

    let mut docker = None;
    if repo.kind == RepositoryKind::Docker {
        let (config, wants_main_port) = resolve_docker_config(repo.config.as_ref())?;

        if wants_main_port {
            if let Some(occupant) = state.manager.main_mount_occupant().await {
                return Err(ApiError::Conflict(format!(
                    "Main port already in use by repository {occupant}"
                )));
            }
        } else if let Some(conflict) = state
            .manager
            .is_port_in_use(config.http_port, config.https_port)
            .await
        {
            return Err(ApiError::Conflict(format!(
                "Port already in use by repository {conflict}"
            )));
        }

        repo.config = Some(
            serde_json::to_value(&config).map_err(|err| ApiError::Internal(err.to_string()))?,
        );
        docker = Some((config, wants_main_port));
    }

    state.store.create(&mut repo).await?;

    if let Some((config, wants_main_port)) = docker {
        let started = if wants_main_port {
            state.manager.mount_main(&repo).await
        } else {
            state.manager.start(&repo, &config).await.map(|_| ())
        };

        if let Err(err) = started {
            // Roll the descriptor back so a failed start leaves nothing
            // behind.
            if let Err(delete_err) = state.store.delete(&repo.name).await {
                tracing::error!(
                    repository = %repo.name,
                    error = %delete_err,
                    "rollback delete failed"
                );
            }
            return Err(ApiError::Internal(format!(
                "Failed to start Docker registry: {err}"
            )));
        }
    }

    Ok((StatusCode::CREATED, Json(repo)).into_response())
}

async fn delete_repository(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let repo = state.store.get(&name).await?;

    if repo.kind == RepositoryKind::Docker {
        // Stop errors are logged but do not block deleting the
        // descriptor.
        if !state.manager.unmount_main(&name).await {
            if let Err(err) = state.manager.stop(&name).await {
                tracing::error!(repository = %name, error = %err, "failed to stop docker registry");
            }
        }
    }

    state.store.delete(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Forward `/v2/` traffic to the registry holding the main-port slot.
async fn main_port_proxy(State(state): State<AppState>, request: Request) -> Response {
    match state.manager.main_router().await {
        Some(router) => match router.oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        },
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
