//! Blob storage for table files, duplicate side-files and order outputs
//!
//! The pipeline only talks to [`BlobStore`]; whether bytes land on local disk
//! or somewhere else is the store's business. Writes go through a
//! [`BlobSink`] that only becomes visible at `commit`. A sink dropped before
//! commit leaves the target untouched.

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::Result;
use std::io::{Read, Write};

/// Read/write capability over opaque blob paths (e.g. `tables/<id>.csv`)
pub trait BlobStore: Send + Sync {
    /// Open a blob for streaming reads
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Check whether a blob exists
    fn exists(&self, path: &str) -> Result<bool>;

    /// Start writing a blob. Nothing is visible at `path` until `commit`.
    fn create(&self, path: &str) -> Result<Box<dyn BlobSink>>;

    /// Delete a blob. Missing blobs are not an error.
    fn remove(&self, path: &str) -> Result<()>;
}

/// An in-progress blob write
pub trait BlobSink: Write + Send {
    /// Atomically publish the written bytes and return the blob location
    fn commit(self: Box<Self>) -> Result<String>;
}
