//! Server assembly and lifecycle
//!
//! Wires the storage tree, the descriptor store, and the registry
//! manager together, restarts the registries of persisted repositories
//! at boot, and serves the control-plane router until shutdown.

use std::sync::Arc;

use axum::Router;
use eyre::WrapErr;
use storage::StorageConfig;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::WharfConfig;
use crate::manager::{RegistryManager, TlsSettings};
use crate::models::{DockerRepositoryConfig, RepositoryKind};
use crate::store::{RepositoryStore, StorageKv};

pub struct Server {
    config: WharfConfig,
    store: RepositoryStore,
    manager: Arc<RegistryManager>,
}

impl Server {
    pub fn new(config: WharfConfig) -> eyre::Result<Self> {
        let artifacts = StorageConfig::Local {
            path: config.data_dir.join("artifacts"),
        }
        .build()
        .wrap_err("open artifact storage")?;
        let descriptors = StorageConfig::Local {
            path: config.db_path.clone(),
        }
        .build()
        .wrap_err("open descriptor storage")?;

        let store = RepositoryStore::new(StorageKv::new(&descriptors, "repositories"));
        let tls = TlsSettings {
            cert_file: config.cert_file.clone(),
            key_file: config.key_file.clone(),
        };
        let manager = Arc::new(RegistryManager::new(artifacts, Some(tls)));

        Ok(Self {
            config,
            store,
            manager,
        })
    }

    /// The control-plane router: the API surface, the main-port `/v2/`
    /// proxy, and per-request tracing.
    pub fn router(&self) -> Router {
        api::router(AppState {
            store: self.store.clone(),
            manager: self.manager.clone(),
        })
        .layer(TraceLayer::new_for_http())
    }

    /// Restart the registries of persisted docker repositories: a
    /// dedicated listener per nonzero-port repository, and the main-port
    /// mount for the zero-port one.
    async fn start_repositories(&self) {
        let repos = match self.store.list().await {
            Ok(repos) => repos,
            Err(err) => {
                tracing::error!(error = %err, "failed to list repositories");
                return;
            }
        };

        for repo in repos {
            if repo.kind != RepositoryKind::Docker {
                continue;
            }

            let config: DockerRepositoryConfig = match repo.config.as_ref() {
                Some(value) => match serde_json::from_value(value.clone()) {
                    Ok(config) => config,
                    Err(err) => {
                        tracing::error!(
                            repository = %repo.name,
                            error = %err,
                            "invalid docker repository configuration"
                        );
                        continue;
                    }
                },
                None => DockerRepositoryConfig::default(),
            };

            let started = if config.wants_main_port() {
                self.manager.mount_main(&repo).await
            } else {
                self.manager.start(&repo, &config).await.map(|_| ())
            };

            if let Err(err) = started {
                tracing::error!(
                    repository = %repo.name,
                    error = %err,
                    "failed to start docker registry"
                );
            }
        }
    }

    /// Bind the control-plane listener and serve until a shutdown signal
    /// arrives, then stop every registry.
    pub async fn run(self) -> eyre::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .wrap_err_with(|| format!("bind control-plane listener on {addr}"))?;
        let local_addr = listener.local_addr().wrap_err("listener address")?;

        if self.config.port == 0 {
            info!("Using dynamic port: {}", local_addr.port());
        }

        self.start_repositories().await;

        info!("Starting control-plane server on {local_addr}");

        let router = self.router();
        let manager = self.manager.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .wrap_err("serve control plane")?;

        manager.stop_all().await;
        info!("Server shutdown complete");

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
