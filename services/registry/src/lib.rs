//! # Docker Registry V2 / OCI Distribution service
//!
//! This crate implements the registry core of wharf: a content-addressed
//! blob and manifest store behind the [Docker Registry V2
//! API](https://github.com/opencontainers/distribution-spec), serving
//! push, pull, list, and delete for container images, including
//! multi-architecture manifest indexes.
//!
//! ## Features
//!
//! - Full V2 route surface: blobs, chunked blob uploads, manifests,
//!   tags, catalog
//! - Manifests addressable by tag and by digest, byte-for-byte faithful
//!   to what was pushed
//! - Repository names with slashes (`library/app/worker`)
//! - Pluggable storage backend via the `storage` crate
//!
//! ## Example
//!
//! ```no_run
//! use registry::RegistryBuilder;
//! use storage::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::new();
//! let registry = RegistryBuilder::new()
//!     .storage(storage.into())
//!     .build();
//!
//! // Serve registry.router() with axum, or mount it in a larger app.
//! # Ok(())
//! # }
//! ```

mod api;
mod blob;
mod error;
mod index;
mod manifest;
mod rewrite;
mod state;
mod upload;

pub use api::{Catalog, Registry, RegistryBuilder};
pub use error::{RegistryError, RegistryResult};
pub use index::ManifestRecord;
pub use manifest::{Descriptor, Manifest, ManifestDescriptor, Platform, TagList, media_types};
