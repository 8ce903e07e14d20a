//! String-only key-value persistence primitive.
//!
//! Mirrors the contract of platform storage layers that can only hold
//! strings, which is why timestamps are serialized as plain integers
//! further up the stack.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Minimal durable string store. Implementations must be safe to call from
/// multiple tasks; all methods are synchronous and cheap enough to run
/// inline (the persistent cache above this is debounced and fire-and-forget).
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// File-backed implementation: one file per key inside a directory.
///
/// Writes go to a temp file first and are renamed into place, so an
/// unexpected shutdown mid-write can never leave a corrupt entry.
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating kv dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys can contain path separators (conversation ids are opaque), so
        // every byte outside [A-Za-z0-9_-] is percent-encoded. The escape is
        // reversible, so distinct keys can never share a file.
        let mut safe = String::with_capacity(key.len());
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => safe.push(byte as char),
                other => safe.push_str(&format!("%{other:02X}")),
            }
        }
        self.dir.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileKvStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, value).with_context(|| format!("writing {}", temp.display()))?;
        fs::rename(&temp, &path).with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory implementation, for tests and embedders without durable
/// storage. Entries live as long as the process.
#[derive(Default)]
pub struct MemoryKvStore {
    items: parking_lot::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }
}
