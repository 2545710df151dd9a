//! In-memory manifest index
//!
//! The index is the authoritative read path for manifests. It maps each
//! repository to its references (tags and digests); storing under a tag
//! also binds the record under its digest, so every manifest is
//! addressable both ways.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

/// Whether a reference addresses a manifest by digest rather than by tag.
pub(crate) fn is_digest_reference(reference: &str) -> bool {
    reference.starts_with("sha256:")
}

/// A stored manifest: the exact bytes received, the media type chosen at
/// upload time, and the digest of those bytes.
///
/// `raw` is immutable once stored; retagging creates a new record and the
/// old bytes stay reachable through their digest binding.
#[derive(Debug, Clone)]
pub struct ManifestRecord {
    pub media_type: String,
    pub digest: String,
    pub raw: Bytes,
}

/// Two-level map from repository to reference to manifest record.
#[derive(Debug, Default)]
pub(crate) struct ManifestIndex {
    repos: HashMap<String, HashMap<String, Arc<ManifestRecord>>>,
}

impl ManifestIndex {
    /// Insert a record under `reference`. A tag reference is additionally
    /// bound under the record's digest, pointing at the same record.
    pub(crate) fn insert(
        &mut self,
        repo: &str,
        reference: &str,
        record: ManifestRecord,
    ) -> Arc<ManifestRecord> {
        let record = Arc::new(record);
        let references = self.repos.entry(repo.to_string()).or_default();

        references.insert(reference.to_string(), record.clone());
        if !is_digest_reference(reference) {
            references.insert(record.digest.clone(), record.clone());
        }

        record
    }

    pub(crate) fn get(&self, repo: &str, reference: &str) -> Option<Arc<ManifestRecord>> {
        self.repos.get(repo)?.get(reference).cloned()
    }

    /// Remove only the given binding. Other bindings to the same record
    /// survive, so deleting a tag leaves the digest reference intact.
    pub(crate) fn remove(&mut self, repo: &str, reference: &str) -> Option<Arc<ManifestRecord>> {
        self.repos.get_mut(repo)?.remove(reference)
    }

    /// Repositories known to the index.
    pub(crate) fn repositories(&self) -> Vec<String> {
        let mut repos: Vec<String> = self.repos.keys().cloned().collect();
        repos.sort();
        repos
    }

    /// Tag references for a repository; digest references are excluded.
    pub(crate) fn tags(&self, repo: &str) -> Vec<String> {
        let mut tags: Vec<String> = self
            .repos
            .get(repo)
            .map(|references| {
                references
                    .keys()
                    .filter(|reference| !is_digest_reference(reference))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tags.sort();
        tags
    }
}
