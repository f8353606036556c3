use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Raw string storage behind the ordering preferences.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// No persistent context at all. Reads are empty, writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedStore;

impl KeyValueStore for DetachedStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&mut self, key: &str, _value: &str) -> anyhow::Result<()> {
        debug!(key, "storage detached; dropping write");
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let dir = dir.to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        info!(dir = %dir.display(), "opened ordering store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed reading stored key");
                None
            }
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// Directory-backed storage when the directory can be opened, detached
/// otherwise.
#[derive(Debug, Clone)]
pub enum LocalStore {
    File(FileStore),
    Detached(DetachedStore),
}

impl LocalStore {
    pub fn open_or_detached(dir: &Path) -> Self {
        match FileStore::open(dir) {
            Ok(store) => Self::File(store),
            Err(err) => {
                warn!(
                    dir = %dir.display(),
                    error = %format!("{err:#}"),
                    "ordering storage unavailable; preferences will not persist"
                );
                Self::Detached(DetachedStore)
            }
        }
    }
}

impl KeyValueStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::File(store) => store.get(key),
            Self::Detached(store) => store.get(key),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match self {
            Self::File(store) => store.set(key, value),
            Self::Detached(store) => store.set(key, value),
        }
    }

    fn is_available(&self) -> bool {
        match self {
            Self::File(store) => store.is_available(),
            Self::Detached(store) => store.is_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn file_store_roundtrips_and_sanitizes_names() {
        let temp = tempdir().expect("tempdir");
        let mut store = FileStore::open(temp.path()).expect("open store");

        assert_eq!(store.get("gantt/task order"), None);
        store.set("gantt/task order", "[1]").expect("set");
        assert_eq!(store.get("gantt/task order").as_deref(), Some("[1]"));
        assert!(temp.path().join("gantt_task_order.json").exists());
    }

    #[test]
    fn detached_store_never_holds_anything() {
        let mut store = DetachedStore;
        store.set("k", "v").expect("detached writes are accepted");
        assert_eq!(store.get("k"), None);
        assert!(!store.is_available());
    }

    #[test]
    fn local_store_detaches_when_directory_is_blocked() {
        let temp = tempdir().expect("tempdir");
        let blocked = temp.path().join("ordering");
        fs::write(&blocked, "not a directory").expect("block path");

        let mut store = LocalStore::open_or_detached(&blocked);
        assert!(matches!(store, LocalStore::Detached(_)));
        assert!(!store.is_available());
        store.set("k", "v").expect("detached writes are accepted");
        assert_eq!(store.get("k"), None);

        let open = LocalStore::open_or_detached(&temp.path().join("fine"));
        assert!(open.is_available());
    }
}
