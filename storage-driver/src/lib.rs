//! # Storage driver interface
//!
//! The [`Driver`] trait is the seam between wharf and whatever holds its
//! bytes. Every blob, manifest mirror, and descriptor write goes through a
//! driver; the higher layers only ever see buckets and paths.
//!
//! Buckets are namespaces: a path stored in one bucket must never be
//! visible from another. The registry leans on this to isolate image
//! repositories from each other.

mod driver;
mod error;

pub use driver::{Driver, Metadata, Reader, Writer};
pub use error::{StorageError, StorageErrorBuilder, StorageErrorKind};
