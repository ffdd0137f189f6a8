// Durable string-keyed storage shared by the geocode cache and favorites.
//
// Values are opaque strings; callers serialize their own payloads. Both
// implementations are cheap to clone and clones share the same entries, so the
// geocode cache and the favorites list can live in one file without
// overwriting each other.

use crate::error::{DaladalaError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(key, |_| Ok((Some(value.to_string()), ())))
    }

    /// Read-modify-write of one key, holding the store lock throughout.
    /// `f` sees the current value and returns the replacement (`None` leaves
    /// the entry untouched) plus whatever the caller wants back.
    fn update<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Option<&str>) -> Result<(Option<String>, T)>;
}

/// Runs store work on tokio's blocking pool so file writes never stall an
/// async worker.
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(DaladalaError::FileError(format!("Store task failed: {}", e))),
    }
}

// ============================================================================
// JSON file store
// ============================================================================

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl JsonFileStore {
    const FILE_NAME: &'static str = "store.json";

    /// Default location: `<user cache dir>/daladala/store.json`.
    pub fn default_path(cache_dir: Option<&Path>) -> PathBuf {
        let mut path = match cache_dir {
            Some(dir) => dir.to_path_buf(),
            None => {
                let mut base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
                base.push("daladala");
                base
            }
        };
        path.push(Self::FILE_NAME);
        path
    }

    /// Opens the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        JsonFileStore {
            path,
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        if !path.exists() {
            log::info!("ℹ️  No store found at {:?}, starting empty", path);
            return BTreeMap::new();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => {
                    log::info!("✓ Store loaded from {:?} ({} entries)", path, entries.len());
                    entries
                }
                Err(e) => {
                    log::warn!("⚠️  Failed to parse store {:?} ({}), starting empty", path, e);
                    BTreeMap::new()
                }
            },
            Err(e) => {
                log::warn!("⚠️  Failed to read store {:?} ({}), starting empty", path, e);
                BTreeMap::new()
            }
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    DaladalaError::FileError(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| DaladalaError::FileError(format!("Failed to serialize store: {}", e)))?;

        fs::write(&self.path, json)
            .map_err(|e| DaladalaError::FileError(format!("Failed to write store: {}", e)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(e) => {
                log::warn!("⚠️  Store lock poisoned on read: {}", e);
                None
            }
        }
    }

    /// A write that fails to reach disk is rolled back in memory as well.
    fn update<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Option<&str>) -> Result<(Option<String>, T)>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| DaladalaError::FileError(format!("Failed to lock store: {}", e)))?;

        let (next, output) = f(entries.get(key).map(String::as_str))?;
        let Some(next) = next else {
            return Ok(output);
        };

        let previous = entries.insert(key.to_string(), next);
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(value) => {
                    entries.insert(key.to_string(), value);
                }
                None => {
                    entries.remove(key);
                }
            }
            return Err(e);
        }
        Ok(output)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn update<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Option<&str>) -> Result<(Option<String>, T)>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| DaladalaError::FileError(format!("Failed to lock store: {}", e)))?;
        let (next, output) = f(entries.get(key).map(String::as_str))?;
        if let Some(next) = next {
            entries.insert(key.to_string(), next);
        }
        Ok(output)
    }
}
