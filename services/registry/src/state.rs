//! Shared registry state
//!
//! A single readers/writer lock guards both the manifest index and the
//! upload table. Blob store I/O never runs while that lock is held: write
//! paths mutate the in-memory state under the lock, release it, and only
//! then touch storage. A mirror or commit write that fails afterwards
//! surfaces as a 500 without unwinding the index, which is fine because
//! reads are served from the index, not the mirror.

use std::sync::Arc;

use bytes::Bytes;
use camino::Utf8PathBuf;
use storage::Storage;
use tokio::io::BufReader;
use tokio::sync::RwLock;

use crate::error::{RegistryError, RegistryResult};
use crate::index::{ManifestIndex, ManifestRecord};
use crate::manifest::detect_media_type;
use crate::upload::{sha256_digest, UploadTable};

#[derive(Debug, Default)]
struct Shared {
    index: ManifestIndex,
    uploads: UploadTable,
}

/// Handler-facing registry state: a handle on the shared blob store plus
/// the in-memory index and upload table.
#[derive(Debug, Clone)]
pub struct RegistryState {
    storage: Storage,
    shared: Arc<RwLock<Shared>>,
}

fn blob_path(digest: &str) -> Utf8PathBuf {
    format!("blobs/{digest}").into()
}

fn manifest_path(reference: &str) -> Utf8PathBuf {
    format!("manifests/{reference}").into()
}

impl RegistryState {
    pub(crate) fn new(storage: Storage) -> Self {
        Self {
            storage,
            shared: Arc::new(RwLock::new(Shared::default())),
        }
    }

    pub(crate) async fn repositories(&self) -> Vec<String> {
        self.shared.read().await.index.repositories()
    }

    pub(crate) async fn tags(&self, repo: &str) -> Vec<String> {
        self.shared.read().await.index.tags(repo)
    }

    pub(crate) async fn manifest(
        &self,
        repo: &str,
        reference: &str,
    ) -> RegistryResult<Arc<ManifestRecord>> {
        self.shared
            .read()
            .await
            .index
            .get(repo, reference)
            .ok_or_else(|| RegistryError::ManifestNotFound(format!("{repo}/{reference}")))
    }

    /// Store a manifest under `reference` and mirror its bytes into the
    /// blob store under `manifests/<digest>`.
    pub(crate) async fn put_manifest(
        &self,
        repo: &str,
        reference: &str,
        media_type: String,
        raw: Bytes,
    ) -> RegistryResult<Arc<ManifestRecord>> {
        let digest = sha256_digest(&raw);

        let record = {
            let mut shared = self.shared.write().await;
            shared.index.insert(
                repo,
                reference,
                ManifestRecord {
                    media_type,
                    digest: digest.clone(),
                    raw,
                },
            )
        };

        let mut reader = BufReader::new(record.raw.as_ref());
        self.storage
            .upload(repo, &manifest_path(&digest), &mut reader)
            .await
            .map_err(RegistryError::MirrorFailed)?;

        Ok(record)
    }

    /// Remove the `reference` binding. The mirror delete is best-effort
    /// and keyed by the reference as given, so deleting a tag leaves the
    /// digest-named mirror file in place.
    pub(crate) async fn delete_manifest(&self, repo: &str, reference: &str) -> RegistryResult<()> {
        {
            let mut shared = self.shared.write().await;
            shared
                .index
                .remove(repo, reference)
                .ok_or_else(|| RegistryError::ManifestNotFound(format!("{repo}/{reference}")))?;
        }

        if let Err(err) = self.storage.delete(repo, &manifest_path(reference)).await {
            if !err.is_not_found() {
                tracing::warn!(%repo, %reference, error = %err, "manifest mirror delete failed");
            }
        }

        Ok(())
    }

    pub(crate) async fn blob(&self, repo: &str, digest: &str) -> RegistryResult<Vec<u8>> {
        let path = blob_path(digest);

        if !self.storage.exists(repo, &path).await? {
            return Err(RegistryError::BlobNotFound(digest.to_string()));
        }

        let mut data = Vec::new();
        self.storage
            .download(repo, &path, &mut data)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    RegistryError::BlobNotFound(digest.to_string())
                } else {
                    err.into()
                }
            })?;

        Ok(data)
    }

    pub(crate) async fn blob_size(&self, repo: &str, digest: &str) -> RegistryResult<u64> {
        match self.storage.metadata(repo, &blob_path(digest)).await {
            Ok(metadata) => Ok(metadata.size),
            Err(err) if err.is_not_found() => Err(RegistryError::BlobNotFound(digest.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) async fn delete_blob(&self, repo: &str, digest: &str) -> RegistryResult<()> {
        self.storage
            .delete(repo, &blob_path(digest))
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    RegistryError::BlobNotFound(digest.to_string())
                } else {
                    err.into()
                }
            })
    }

    pub(crate) async fn begin_upload(&self, repo: &str) -> String {
        self.shared.write().await.uploads.begin(repo)
    }

    pub(crate) async fn append_upload(
        &self,
        repo: &str,
        id: &str,
        chunk: &[u8],
    ) -> RegistryResult<u64> {
        self.shared.write().await.uploads.append(repo, id, chunk)
    }

    pub(crate) async fn upload_size(&self, repo: &str, id: &str) -> RegistryResult<u64> {
        self.shared.read().await.uploads.size(repo, id)
    }

    /// Commit an upload session: the append/verify/remove sequence runs
    /// under the exclusive lock, then the verified buffer is stored as
    /// `blobs/<digest>` with the lock released.
    pub(crate) async fn commit_upload(
        &self,
        repo: &str,
        id: &str,
        remainder: &[u8],
        digest: &str,
    ) -> RegistryResult<()> {
        let buffer = {
            let mut shared = self.shared.write().await;
            shared.uploads.commit(repo, id, remainder, digest)?
        };

        let mut reader = BufReader::new(&buffer[..]);
        self.storage
            .upload(repo, &blob_path(digest), &mut reader)
            .await
            .map_err(RegistryError::BlobCommitFailed)?;

        Ok(())
    }

    pub(crate) async fn abort_upload(&self, id: &str) {
        self.shared.write().await.uploads.abort(id);
    }

    /// Rebuild digest references from the manifest mirror.
    ///
    /// Scans `manifests/` in every bucket, re-inserting each mirrored
    /// manifest under the digest of its bytes with a media type detected
    /// from the content. Tag bindings are not recorded in the mirror and
    /// are not rebuilt.
    pub(crate) async fn rehydrate(&self) -> RegistryResult<usize> {
        let mut restored = 0;

        for repo in self.storage.buckets().await? {
            let mirrored = self
                .storage
                .list(&repo, Some(camino::Utf8Path::new("manifests")))
                .await?;

            for path in mirrored {
                let mut raw = Vec::new();
                self.storage
                    .download(&repo, camino::Utf8Path::new(&path), &mut raw)
                    .await?;

                let media_type = detect_media_type(&raw);
                let digest = sha256_digest(&raw);

                let mut shared = self.shared.write().await;
                shared.index.insert(
                    &repo,
                    &digest,
                    ManifestRecord {
                        media_type,
                        digest: digest.clone(),
                        raw: Bytes::from(raw),
                    },
                );
                restored += 1;
            }
        }

        if restored > 0 {
            tracing::info!(manifests = restored, "rehydrated manifest index from mirror");
        }

        Ok(restored)
    }
}
