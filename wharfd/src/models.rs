//! Repository descriptors and their configuration payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of a repository, which decides how its contents are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// Served through the Docker Registry V2 API by a registry instance.
    Docker,
    /// Plain artifact namespace with no serving surface of its own.
    Raw,
}

/// A repository descriptor, persisted in the `repositories` bucket keyed
/// by name.
///
/// `config` is an opaque payload interpreted per kind, so new kinds can
/// carry their own options without a schema migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Body of `POST /api/v1/repositories`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRepository {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Recognized options of a docker repository's config payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerRepositoryConfig {
    #[serde(default)]
    pub http_port: u16,
    #[serde(default)]
    pub https_port: u16,
    #[serde(default)]
    pub v1_enabled: bool,
}

impl Default for DockerRepositoryConfig {
    fn default() -> Self {
        Self {
            http_port: 5000,
            https_port: 0,
            v1_enabled: false,
        }
    }
}

impl DockerRepositoryConfig {
    /// Whether this configuration asks for the main-port mount instead of
    /// a dedicated listener.
    pub fn wants_main_port(&self) -> bool {
        self.http_port == 0 && self.https_port == 0
    }
}
