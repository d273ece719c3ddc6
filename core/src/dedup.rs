//! Source-file deduplication.
//!
//! A file whose content hash was recorded by a previous import is treated as
//! fully processed and never decoded again.

use crate::types::FileHash;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Stable content digest of a source file (lower-case hex SHA-256).
pub fn file_hash(bytes: &[u8]) -> FileHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Set of hashes already imported. Loaded once from the store, then only
/// appended to by the single producer that owns it.
#[derive(Debug, Default, Clone)]
pub struct DedupTracker {
    known: HashSet<FileHash>,
}

impl DedupTracker {
    pub fn new(hashes: impl IntoIterator<Item = FileHash>) -> Self {
        Self {
            known: hashes.into_iter().filter(|h| !h.is_empty()).collect(),
        }
    }

    /// An empty hash is never known: a file we could not hash is always read.
    pub fn is_known(&self, hash: &str) -> bool {
        !hash.is_empty() && self.known.contains(hash)
    }

    /// Returns `true` when the hash was new.
    pub fn record(&mut self, hash: &str) -> bool {
        if hash.is_empty() {
            return false;
        }
        self.known.insert(hash.to_string())
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
