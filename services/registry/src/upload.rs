//! Blob upload sessions
//!
//! One table per registry, keyed by an opaque upload id. A session moves
//! through `open → committed` or `open → aborted`; the whole lifecycle is
//! kept here so the append/verify/remove sequence on commit stays in one
//! place. The table is ephemeral: restarts forget in-flight uploads and
//! clients start over with a fresh id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RegistryError, RegistryResult};

/// Digest string (`sha256:<hex>`) of a byte slice.
pub(crate) fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// An in-progress blob upload accumulating bytes in memory.
#[derive(Debug)]
struct UploadSession {
    repo: String,
    started_at: DateTime<Utc>,
    buffer: Vec<u8>,
}

/// Table of open upload sessions.
///
/// An upload id is bound to the repository it was created under; the same
/// id presented under another repository name does not resolve.
#[derive(Debug, Default)]
pub(crate) struct UploadTable {
    sessions: HashMap<String, UploadSession>,
}

impl UploadTable {
    /// Open a session and return its upload id.
    pub(crate) fn begin(&mut self, repo: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(
            id.clone(),
            UploadSession {
                repo: repo.to_string(),
                started_at: Utc::now(),
                buffer: Vec::new(),
            },
        );
        id
    }

    fn session_mut(&mut self, repo: &str, id: &str) -> RegistryResult<&mut UploadSession> {
        self.sessions
            .get_mut(id)
            .filter(|session| session.repo == repo)
            .ok_or_else(|| RegistryError::UploadNotFound(id.to_string()))
    }

    /// Append a chunk and return the accumulated size.
    pub(crate) fn append(&mut self, repo: &str, id: &str, chunk: &[u8]) -> RegistryResult<u64> {
        let session = self.session_mut(repo, id)?;
        session.buffer.extend_from_slice(chunk);
        Ok(session.buffer.len() as u64)
    }

    /// Accumulated size of an open session.
    pub(crate) fn size(&self, repo: &str, id: &str) -> RegistryResult<u64> {
        self.sessions
            .get(id)
            .filter(|session| session.repo == repo)
            .map(|session| session.buffer.len() as u64)
            .ok_or_else(|| RegistryError::UploadNotFound(id.to_string()))
    }

    /// Commit a session: append any trailing bytes, verify the declared
    /// digest against the accumulated contents, and close the session.
    ///
    /// On a digest mismatch the session stays open (with the trailing
    /// bytes appended) so the client can retry the completion.
    pub(crate) fn commit(
        &mut self,
        repo: &str,
        id: &str,
        remainder: &[u8],
        digest: &str,
    ) -> RegistryResult<Vec<u8>> {
        let session = self.session_mut(repo, id)?;
        session.buffer.extend_from_slice(remainder);

        let actual = sha256_digest(&session.buffer);
        if actual != digest {
            return Err(RegistryError::DigestMismatch {
                expected: digest.to_string(),
                actual,
            });
        }

        let session = self.sessions.remove(id).expect("session resolved above");
        tracing::debug!(
            upload = id,
            repo = %session.repo,
            size = session.buffer.len(),
            age = %(Utc::now() - session.started_at),
            "upload committed"
        );
        Ok(session.buffer)
    }

    /// Drop a session. Unknown ids are ignored, matching the always-204
    /// contract of upload DELETE.
    pub(crate) fn abort(&mut self, id: &str) {
        if self.sessions.remove(id).is_some() {
            tracing::debug!(upload = id, "upload aborted");
        }
    }
}
