//! Registry lifecycle management
//!
//! The manager owns every running registry: one dedicated listener per
//! docker repository with a nonzero port, plus the single main-port slot
//! whose registry is mounted under `/v2/` on the control-plane router.
//! Port uniqueness is enforced here, before any listener is opened.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use camino::Utf8PathBuf;
use registry::RegistryBuilder;
use storage::Storage;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;

use crate::models::{DockerRepositoryConfig, Repository};

/// Deadline for a registry to drain in-flight requests on stop.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Certificate material for the deployment's TLS termination.
///
/// The manager only carries these paths through; terminating TLS 1.2+ in
/// front of the listeners is the deployment's concern.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    pub cert_file: Utf8PathBuf,
    pub key_file: Utf8PathBuf,
}

/// Errors from registry lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("registry already running for repository {0}")]
    AlreadyRunning(String),

    #[error("either http_port or https_port must be specified")]
    NoPorts,

    #[error("port conflict with repository {0}")]
    PortConflict(String),

    #[error("main port already in use by repository {0}")]
    MainSlotOccupied(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("no registry running for repository {0}")]
    NotRunning(String),

    #[error("registry for repository {0} did not stop within the deadline")]
    StopTimeout(String),
}

#[derive(Debug)]
struct RunningRegistry {
    config: DockerRepositoryConfig,
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// The registry currently mounted on the control-plane port.
#[derive(Debug, Clone)]
struct MountedRegistry {
    name: String,
    router: Router,
}

/// Shared handle on the main-port mount slot.
pub(crate) type MainMount = Arc<RwLock<Option<MountedRegistry>>>;

/// Owns all running registry instances and the main-port slot.
#[derive(Debug)]
pub struct RegistryManager {
    storage: Storage,
    tls: Option<TlsSettings>,
    registries: RwLock<HashMap<String, RunningRegistry>>,
    main_mount: MainMount,
}

impl RegistryManager {
    pub fn new(storage: Storage, tls: Option<TlsSettings>) -> Self {
        Self {
            storage,
            tls,
            registries: RwLock::new(HashMap::new()),
            main_mount: Arc::new(RwLock::new(None)),
        }
    }

    /// Start a dedicated registry for a repository.
    ///
    /// Fails without opening a listener when the repository already has a
    /// registry, declares no port at all, or collides with a running
    /// registry's port.
    pub async fn start(
        &self,
        repo: &Repository,
        config: &DockerRepositoryConfig,
    ) -> Result<SocketAddr, ManagerError> {
        let mut registries = self.registries.write().await;

        if registries.contains_key(&repo.name) {
            return Err(ManagerError::AlreadyRunning(repo.name.clone()));
        }

        if config.wants_main_port() {
            return Err(ManagerError::NoPorts);
        }

        for (name, running) in registries.iter() {
            if (config.http_port > 0 && config.http_port == running.config.http_port)
                || (config.https_port > 0 && config.https_port == running.config.https_port)
            {
                return Err(ManagerError::PortConflict(name.clone()));
            }
        }

        let port = if config.https_port > 0 {
            config.https_port
        } else {
            config.http_port
        };
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ManagerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ManagerError::Bind { addr, source })?;

        let registry = self.build_registry().await;

        tracing::info!(
            repository = %repo.name,
            address = %local_addr,
            tls = config.https_port > 0 && self.tls.is_some(),
            "starting docker registry"
        );

        let (shutdown, rx) = oneshot::channel::<()>();
        let router = registry.router();
        let name = repo.name.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = rx.await;
            });
            if let Err(err) = serve.await {
                tracing::error!(repository = %name, error = %err, "registry server failed");
            }
        });

        registries.insert(
            repo.name.clone(),
            RunningRegistry {
                config: config.clone(),
                addr: local_addr,
                shutdown,
                task,
            },
        );

        Ok(local_addr)
    }

    /// Stop a running registry, waiting up to the shutdown deadline for
    /// in-flight requests to drain.
    pub async fn stop(&self, name: &str) -> Result<(), ManagerError> {
        let running = self
            .registries
            .write()
            .await
            .remove(name)
            .ok_or_else(|| ManagerError::NotRunning(name.to_string()))?;

        let _ = running.shutdown.send(());

        let mut task = running.task;
        match tokio::time::timeout(SHUTDOWN_DEADLINE, &mut task).await {
            Ok(_) => {
                tracing::info!(repository = %name, "docker registry stopped");
                Ok(())
            }
            Err(_) => {
                task.abort();
                Err(ManagerError::StopTimeout(name.to_string()))
            }
        }
    }

    /// Stop every running registry and clear the main-port slot.
    pub async fn stop_all(&self) {
        let drained: Vec<(String, RunningRegistry)> =
            self.registries.write().await.drain().collect();

        for (name, running) in drained {
            let _ = running.shutdown.send(());
            let mut task = running.task;
            if tokio::time::timeout(SHUTDOWN_DEADLINE, &mut task)
                .await
                .is_err()
            {
                task.abort();
                tracing::error!(repository = %name, "registry did not stop within the deadline");
            }
        }

        *self.main_mount.write().await = None;
    }

    /// The repository whose running registry claims one of the ports, if
    /// any. Used by the control API before persisting a new repository.
    pub async fn is_port_in_use(&self, http_port: u16, https_port: u16) -> Option<String> {
        let registries = self.registries.read().await;
        for (name, running) in registries.iter() {
            if (http_port > 0 && http_port == running.config.http_port)
                || (https_port > 0 && https_port == running.config.https_port)
            {
                return Some(name.clone());
            }
        }
        None
    }

    /// The bound address of a running registry.
    pub async fn address(&self, name: &str) -> Option<SocketAddr> {
        self.registries.read().await.get(name).map(|r| r.addr)
    }

    /// Mount a repository's registry on the control-plane port. At most
    /// one repository may hold the slot.
    pub async fn mount_main(&self, repo: &Repository) -> Result<(), ManagerError> {
        let mut mount = self.main_mount.write().await;

        if let Some(mounted) = mount.as_ref() {
            if mounted.name != repo.name {
                return Err(ManagerError::MainSlotOccupied(mounted.name.clone()));
            }
        }

        let registry = self.build_registry().await;
        *mount = Some(MountedRegistry {
            name: repo.name.clone(),
            router: registry.router(),
        });

        tracing::info!(repository = %repo.name, "docker registry mounted on main server port");
        Ok(())
    }

    /// Release the main-port slot if `name` holds it. Returns whether it
    /// did.
    pub async fn unmount_main(&self, name: &str) -> bool {
        let mut mount = self.main_mount.write().await;
        if mount.as_ref().is_some_and(|mounted| mounted.name == name) {
            *mount = None;
            tracing::info!(repository = %name, "docker registry unmounted from main server port");
            true
        } else {
            false
        }
    }

    /// The repository currently holding the main-port slot.
    pub async fn main_mount_occupant(&self) -> Option<String> {
        self.main_mount
            .read()
            .await
            .as_ref()
            .map(|mounted| mounted.name.clone())
    }

    /// The currently mounted main-port router, for the control-plane
    /// proxy.
    pub(crate) async fn main_router(&self) -> Option<Router> {
        self.main_mount
            .read()
            .await
            .as_ref()
            .map(|mounted| mounted.router.clone())
    }

    async fn build_registry(&self) -> registry::Registry {
        let registry = RegistryBuilder::new()
            .storage(self.storage.clone())
            .build();

        // Recover digest references from the manifest mirror. Failure is
        // not fatal: the registry starts with whatever was readable.
        match registry.rehydrate().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(manifests = count, "manifest index rehydrated"),
            Err(err) => tracing::warn!(error = %err, "manifest rehydration failed"),
        }

        registry
    }
}
