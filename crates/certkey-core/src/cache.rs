//! Session cache from database path to the certificate that unlocked it.
//!
//! An entry is recorded as pending right after a key is derived and only
//! becomes usable once the host confirms the database actually opened with
//! that key. Until then lookups ignore it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct CacheEntry {
    thumbprint: String,
    confirmed: bool,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the certificate used for `database`, replacing any earlier entry.
    pub fn remember(&self, database: &Path, thumbprint: &str) {
        self.entries.write().insert(
            database.to_path_buf(),
            CacheEntry {
                thumbprint: thumbprint.to_string(),
                confirmed: false,
            },
        );
    }

    /// Mark the pending entry for `database` as usable. Returns false when
    /// nothing was recorded for it.
    pub fn confirm(&self, database: &Path) -> bool {
        match self.entries.write().get_mut(database) {
            Some(entry) => {
                entry.confirmed = true;
                true
            }
            None => false,
        }
    }

    pub fn confirmed_thumbprint(&self, database: &Path) -> Option<String> {
        self.entries
            .read()
            .get(database)
            .filter(|entry| entry.confirmed)
            .map(|entry| entry.thumbprint.clone())
    }

    pub fn invalidate(&self, database: &Path) -> bool {
        self.entries.write().remove(database).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
