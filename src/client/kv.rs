//! Local key-value persistence for client state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Result;

/// String-keyed, string-valued local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn clear(&self, key: &str) -> Result<()>;
}

/// In-process store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// A single JSON object on disk, rewritten on every change.
pub struct FileKv {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileKv {
    /// Open `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "client state file unreadable, starting empty");
                HashMap::new()
            }),
            Err(_) => {
                debug!(path = %path.display(), "no client state file yet");
                HashMap::new()
            }
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let text = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn clear(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_get_set_clear() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a"), None);
        kv.set("a", "1").unwrap();
        assert_eq!(kv.get("a").as_deref(), Some("1"));
        kv.clear("a").unwrap();
        assert_eq!(kv.get("a"), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("signal-hub-kv-{}.json", uuid::Uuid::new_v4()));
        {
            let kv = FileKv::open(&path);
            kv.set("alpha_taken_signals", "[3,1]").unwrap();
            kv.set("scratch", "x").unwrap();
            kv.clear("scratch").unwrap();
        }
        let kv = FileKv::open(&path);
        assert_eq!(kv.get("alpha_taken_signals").as_deref(), Some("[3,1]"));
        assert_eq!(kv.get("scratch"), None);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let path = std::env::temp_dir().join(format!("signal-hub-kv-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not json").unwrap();
        let kv = FileKv::open(&path);
        assert_eq!(kv.get("anything"), None);
        std::fs::remove_file(path).ok();
    }
}
