//! Persistent repository descriptors
//!
//! Descriptors live in a key/value bucket named `repositories`, keyed by
//! repository name with JSON-encoded values. The bucket itself is an
//! interface ([`KvBucket`]); the default implementation keeps one object
//! per key inside a bucket of a [`storage::Storage`].

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::Utc;
use storage::{Storage, StorageBucket, StorageError};
use tokio::io::BufReader;

use crate::models::Repository;

/// Key/value bucket operations assumed by the repository store.
#[async_trait::async_trait]
pub trait KvBucket: fmt::Debug + Send + Sync {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn iter(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

/// [`KvBucket`] keeping one object per key in a storage bucket.
#[derive(Debug, Clone)]
pub struct StorageKv {
    bucket: StorageBucket,
}

impl StorageKv {
    pub fn new(storage: &Storage, bucket: impl Into<String>) -> Self {
        Self {
            bucket: storage.bucket(bucket),
        }
    }

    fn path(key: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(key)
    }
}

#[async_trait::async_trait]
impl KvBucket for StorageKv {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut reader = BufReader::new(value);
        self.bucket.upload(&Self::path(key), &mut reader).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut value = Vec::new();
        match self.bucket.download(&Self::path(key), &mut value).await {
            Ok(()) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn iter(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut entries = Vec::new();
        for key in self.bucket.list(None).await? {
            let mut value = Vec::new();
            self.bucket.download(&Self::path(&key), &mut value).await?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        match self.bucket.delete(&Self::path(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Errors from the repository store.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryStoreError {
    #[error("Repository already exists")]
    AlreadyExists,

    #[error("Repository not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("descriptor encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// CRUD over repository descriptors.
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    bucket: Arc<dyn KvBucket>,
}

impl RepositoryStore {
    pub fn new(bucket: impl KvBucket + 'static) -> Self {
        Self {
            bucket: Arc::new(bucket),
        }
    }

    /// Persist a new descriptor, stamping its timestamps.
    pub async fn create(&self, repo: &mut Repository) -> Result<(), RepositoryStoreError> {
        if self.bucket.get(&repo.name).await?.is_some() {
            return Err(RepositoryStoreError::AlreadyExists);
        }

        repo.created_at = Utc::now();
        repo.updated_at = repo.created_at;

        let data = serde_json::to_vec(repo)?;
        self.bucket.put(&repo.name, &data).await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Repository, RepositoryStoreError> {
        let data = self
            .bucket
            .get(name)
            .await?
            .ok_or(RepositoryStoreError::NotFound)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn list(&self) -> Result<Vec<Repository>, RepositoryStoreError> {
        let mut repos = Vec::new();
        for (key, data) in self.bucket.iter().await? {
            let repo: Repository = serde_json::from_slice(&data).map_err(|err| {
                tracing::error!(%key, error = %err, "undecodable repository descriptor");
                RepositoryStoreError::Encoding(err)
            })?;
            repos.push(repo);
        }
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    pub async fn delete(&self, name: &str) -> Result<(), RepositoryStoreError> {
        if !self.bucket.delete(name).await? {
            return Err(RepositoryStoreError::NotFound);
        }
        Ok(())
    }
}
