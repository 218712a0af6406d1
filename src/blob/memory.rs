//! In-memory blob store with read instrumentation

use super::{BlobSink, BlobStore};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    blobs: HashMap<String, Vec<u8>>,
    opens: HashMap<String, usize>,
    unreadable: HashSet<String>,
    unwritable: HashSet<String>,
}

/// Blob store kept in memory.
///
/// Counts opens per path and bytes handed out so callers can check how much
/// of a source was actually read.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
    bytes_read: Arc<AtomicU64>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked mid-write
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store bytes directly
    pub fn put(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().blobs.insert(path.to_string(), bytes.into());
    }

    /// Fetch stored bytes
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(path).cloned()
    }

    /// Fetch stored bytes as UTF-8 text
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Make `open` fail for a path even if it exists
    pub fn mark_unreadable(&self, path: &str) {
        self.lock().unreadable.insert(path.to_string());
    }

    /// Make `commit` fail for a path, as a full disk would
    pub fn fail_commits(&self, path: &str) {
        self.lock().unwritable.insert(path.to_string());
    }

    /// Number of times `open` was called for a path
    pub fn open_count(&self, path: &str) -> usize {
        self.lock().opens.get(path).copied().unwrap_or(0)
    }

    /// Total number of `open` calls
    pub fn total_opens(&self) -> usize {
        self.lock().opens.values().sum()
    }

    /// Total bytes handed out by readers
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().blobs.keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl BlobStore for MemoryBlobStore {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let mut inner = self.lock();
        *inner.opens.entry(path.to_string()).or_insert(0) += 1;

        if inner.unreadable.contains(path) {
            return Err(Error::Blob(format!("{path}: permission denied")));
        }
        let bytes = inner
            .blobs
            .get(path)
            .cloned()
            .ok_or_else(|| Error::BlobNotFound(path.to_string()))?;

        Ok(Box::new(CountingReader {
            inner: Cursor::new(bytes),
            counter: Arc::clone(&self.bytes_read),
        }))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock().blobs.contains_key(path))
    }

    fn create(&self, path: &str) -> Result<Box<dyn BlobSink>> {
        Ok(Box::new(MemorySink {
            store: self.clone(),
            path: path.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.lock().blobs.remove(path);
        Ok(())
    }
}

struct CountingReader {
    inner: Cursor<Vec<u8>>,
    counter: Arc<AtomicU64>,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

struct MemorySink {
    store: MemoryBlobStore,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobSink for MemorySink {
    fn commit(self: Box<Self>) -> Result<String> {
        let MemorySink {
            store,
            path,
            buffer,
        } = *self;
        if store.lock().unwritable.contains(&path) {
            return Err(Error::Blob(format!("{path}: no space left on device")));
        }
        store.put(&path, buffer);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncommitted_sink_is_invisible() {
        let store = MemoryBlobStore::new();
        let mut sink = store.create("a").unwrap();
        sink.write_all(b"data").unwrap();
        assert!(!store.exists("a").unwrap());
        sink.commit().unwrap();
        assert_eq!(store.get_string("a").as_deref(), Some("data"));
    }

    #[test]
    fn test_failed_commit_keeps_previous_blob() {
        let store = MemoryBlobStore::new();
        store.put("a", "old");
        store.fail_commits("a");
        let mut sink = store.create("a").unwrap();
        sink.write_all(b"new").unwrap();
        assert!(matches!(sink.commit(), Err(Error::Blob(_))));
        assert_eq!(store.get_string("a").as_deref(), Some("old"));
    }

    #[test]
    fn test_open_instrumentation() {
        let store = MemoryBlobStore::new();
        store.put("a", "abcdef");
        let mut buf = [0u8; 2];
        store.open("a").unwrap().read_exact(&mut buf).unwrap();

        assert_eq!(store.open_count("a"), 1);
        assert_eq!(store.bytes_read(), 2);

        store.mark_unreadable("a");
        assert!(store.open("a").is_err());
        assert_eq!(store.total_opens(), 2);
    }
}
