//! # Storage backends
//!
//! Configuration and unification for the storage backends.
//!
//! [`Storage`] wraps any [`Driver`] behind a cheap-to-clone handle; the
//! registry and the control plane share one instance. [`StorageBucket`]
//! pins a handle to a single bucket for callers that only ever touch one
//! namespace.

use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use serde::Deserialize;
use tokio::io;

pub(crate) mod local;
pub(crate) mod memory;
pub(crate) mod temp;

#[doc(inline)]
pub use local::LocalDriver;

#[doc(inline)]
pub use memory::MemoryStorage;

#[doc(inline)]
pub use temp::TempDriver;

#[doc(inline)]
pub use storage_driver::{Driver, Metadata, StorageError, StorageErrorKind};

/// Backend selection, deserialized from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    Memory {
        bucket: String,
    },

    Local {
        path: Utf8PathBuf,
    },

    Temp,
}

impl StorageConfig {
    /// Build the configured backend into a [`Storage`] handle.
    #[tracing::instrument]
    pub fn build(self) -> Result<Storage, StorageError> {
        let storage: Storage = match self {
            StorageConfig::Memory { bucket } => MemoryStorage::with_buckets(&[&bucket]).into(),
            StorageConfig::Local { path } => LocalDriver::new(path).into(),
            StorageConfig::Temp => TempDriver::new()
                .map_err(StorageError::with("temp", StorageErrorKind::Io))?
                .into(),
        };
        Ok(storage)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// Shared handle over a storage driver.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Pin this handle to a single bucket.
    pub fn bucket<S: Into<String>>(&self, bucket: S) -> StorageBucket {
        StorageBucket {
            driver: self.driver.clone(),
            bucket: bucket.into(),
        }
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn metadata(
        &self,
        bucket: &str,
        remote: &Utf8Path,
    ) -> Result<Metadata, StorageError> {
        self.driver.metadata(bucket, remote).await
    }

    /// Whether an object exists at `remote`. A missing bucket reads as a
    /// missing object.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn exists(&self, bucket: &str, remote: &Utf8Path) -> Result<bool, StorageError> {
        match self.driver.metadata(bucket, remote).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self, writer), fields(driver = self.driver.name()))]
    pub async fn download<'d, W>(
        &'d self,
        bucket: &str,
        remote: &Utf8Path,
        writer: &mut W,
    ) -> Result<(), StorageError>
    where
        W: io::AsyncWrite + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Downloading from: {bucket}/{remote}");
        self.driver.download(bucket, remote, writer).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, reader), fields(driver = self.driver.name(), bucket))]
    pub async fn upload<'d, R>(
        &'d self,
        bucket: &str,
        remote: &Utf8Path,
        reader: &mut R,
    ) -> Result<(), StorageError>
    where
        R: io::AsyncBufRead + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Uploading to: {bucket}/{remote}");
        self.driver.upload(bucket, remote, reader).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), bucket))]
    pub async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        self.driver.list(bucket, prefix).await
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn delete(&self, bucket: &str, path: &Utf8Path) -> Result<(), StorageError> {
        self.driver.delete(bucket, path).await
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn buckets(&self) -> Result<Vec<String>, StorageError> {
        self.driver.buckets().await
    }
}

/// A [`Storage`] handle pinned to a single bucket.
#[derive(Debug, Clone)]
pub struct StorageBucket {
    pub bucket: String,
    driver: ArcDriver,
}

impl StorageBucket {
    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), bucket = %self.bucket))]
    pub async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.metadata(&self.bucket, remote).await
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), bucket = %self.bucket))]
    pub async fn exists(&self, remote: &Utf8Path) -> Result<bool, StorageError> {
        match self.driver.metadata(&self.bucket, remote).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self, writer), fields(driver = self.driver.name(), bucket = %self.bucket))]
    pub async fn download<'d, W>(
        &'d self,
        remote: &Utf8Path,
        writer: &mut W,
    ) -> Result<(), StorageError>
    where
        W: io::AsyncWrite + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Downloading from: {}/{remote}", self.bucket);
        self.driver.download(&self.bucket, remote, writer).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, reader), fields(driver = self.driver.name(), bucket = %self.bucket))]
    pub async fn upload<'d, R>(
        &'d self,
        remote: &Utf8Path,
        reader: &mut R,
    ) -> Result<(), StorageError>
    where
        R: io::AsyncBufRead + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Uploading to: {}/{remote}", self.bucket);
        self.driver.upload(&self.bucket, remote, reader).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), bucket = %self.bucket))]
    pub async fn list(&self, prefix: Option<&Utf8Path>) -> Result<Vec<String>, StorageError> {
        self.driver.list(&self.bucket, prefix).await
    }

    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), bucket = %self.bucket))]
    pub async fn delete(&self, path: &Utf8Path) -> Result<(), StorageError> {
        self.driver.delete(&self.bucket, path).await
    }
}
