//! Durable JSON key/value caches
//!
//! Every `set` rewrites the whole file while holding the lock, so a reader in
//! another process never sees a half-written key. I/O failures are logged and
//! behave like misses.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub struct DiskCache {
    path: Option<PathBuf>,
    entries: Mutex<Map<String, Value>>,
}

impl DiskCache {
    /// Open (or create on first write) a cache file
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path);
        tracing::debug!(path = %path.display(), entries = entries.len(), "cache opened");
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// Cache that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Map::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &entries) {
                tracing::warn!(path = %path.display(), error = %e, "cache write failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn load(path: &Path) -> Map<String, Value> {
    if !path.exists() {
        return Map::new();
    }
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|body| serde_json::from_str::<Map<String, Value>>(&body).map_err(|e| e.to_string()));
    match parsed {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache unreadable, starting empty");
            Map::new()
        }
    }
}

fn persist(path: &Path, entries: &Map<String, Value>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string(entries)?;
    fs::write(path, body)
}
