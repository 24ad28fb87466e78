//! File-backed cache for resolved favicon URLs.
//!
//! One flat file per entry under a configured directory, named by a
//! fixed prefix plus the SHA-256 of the canonical base URL. Freshness
//! is derived from the file's mtime; entries carry no other metadata.
//!
//! Concurrent writers of the same key are last-writer-wins. Entries
//! for different URLs never collide.

pub mod hash;

pub use hash::cache_key;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// File name prefix for cache entries.
pub const ENTRY_PREFIX: &str = "favicon.";

/// Storage interface for resolved favicon URLs, keyed by URL hash.
///
/// Kept as a trait so tests can substitute an in-memory store.
pub trait CacheStore: Send + Sync {
    /// Whether an entry for `key` exists.
    fn exists(&self, key: &str) -> bool;

    /// Whether the entry for `key` exists and can be opened for reading.
    fn is_readable(&self, key: &str) -> bool;

    /// Whether the entry for `key` exists and can be overwritten.
    fn is_writable(&self, key: &str) -> bool;

    /// Last modification time of the entry for `key`.
    fn mtime(&self, key: &str) -> Option<SystemTime>;

    /// Stored value for `key`, if present and readable.
    fn read(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any existing entry.
    fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()>;

    /// On-disk path the entry for `key` lives at, whether or not it exists.
    fn entry_path(&self, key: &str) -> PathBuf;

    /// Whether the entry for `key` was written less than `timeout` ago.
    fn is_fresh(&self, key: &str, timeout: Duration) -> bool {
        match self.mtime(key).map(|mtime| mtime.elapsed()) {
            Some(Ok(age)) => age < timeout,
            // An mtime in the future counts as fresh.
            Some(Err(_)) => true,
            None => false,
        }
    }
}

/// Cache entries stored as flat files under a single directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at `dir`. The directory is created lazily
    /// on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the cache entries live under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CacheStore for FileCache {
    fn exists(&self, key: &str) -> bool {
        self.entry_path(key).is_file()
    }

    fn is_readable(&self, key: &str) -> bool {
        fs::File::open(self.entry_path(key)).is_ok()
    }

    fn is_writable(&self, key: &str) -> bool {
        fs::metadata(self.entry_path(key))
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false)
    }

    fn mtime(&self, key: &str) -> Option<SystemTime> {
        fs::metadata(self.entry_path(key)).ok()?.modified().ok()
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.entry_path(key)).ok()
    }

    fn write(&self, key: &str, value: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.entry_path(key), value)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{ENTRY_PREFIX}{key}"))
    }
}
