use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// Learned name → category code associations, append-only.
///
/// Keys are normalized event names. Recording an existing key is a no-op, so
/// a mapping learned once keeps its first category forever.
pub trait MappingStore: Send + Sync {
    fn get(&self, key: &str) -> Option<&str>;

    /// Returns `true` when the key was new.
    fn record(&mut self, key: &str, code: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist pending mappings.
    fn flush(&mut self) -> Result<()>;
}

/// Store that lives only for the current run.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    mappings: BTreeMap<String, String>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryMappingStore {
    fn get(&self, key: &str) -> Option<&str> {
        self.mappings.get(key).map(String::as_str)
    }

    fn record(&mut self, key: &str, code: &str) -> bool {
        if self.mappings.contains_key(key) {
            return false;
        }
        self.mappings.insert(key.to_string(), code.to_string());
        true
    }

    fn len(&self) -> usize {
        self.mappings.len()
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// JSON-file store written with temp-file + rename.
#[derive(Debug)]
pub struct FileMappingStore {
    path: PathBuf,
    mappings: BTreeMap<String, String>,
    dirty: bool,
}

impl FileMappingStore {
    /// Open the store, starting empty when the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mappings = Self::read_file(&path)?;
        tracing::debug!(path = %path.display(), mappings = mappings.len(), "Opened mapping store");
        Ok(Self {
            path,
            mappings,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Persistence(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&json)
            .map_err(|e| Error::Persistence(format!("Corrupt mapping store {}: {}", path.display(), e)))
    }

    fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(tmp_path, path)
    }
}

impl MappingStore for FileMappingStore {
    fn get(&self, key: &str) -> Option<&str> {
        self.mappings.get(key).map(String::as_str)
    }

    fn record(&mut self, key: &str, code: &str) -> bool {
        if self.mappings.contains_key(key) {
            return false;
        }
        self.mappings.insert(key.to_string(), code.to_string());
        self.dirty = true;
        true
    }

    fn len(&self) -> usize {
        self.mappings.len()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        // Entries written by an earlier run since we opened keep their value.
        // A file we cannot read or parse is left untouched.
        let mut merged = Self::read_file(&self.path)?;
        for (key, code) in &self.mappings {
            merged.entry(key.clone()).or_insert_with(|| code.clone());
        }

        let json = serde_json::to_vec_pretty(&merged)?;
        Self::atomic_write(&self.path, &json).map_err(|e| {
            Error::Persistence(format!("Cannot write {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(path = %self.path.display(), mappings = merged.len(), "Flushed mapping store");
        self.mappings = merged;
        self.dirty = false;
        Ok(())
    }
}
