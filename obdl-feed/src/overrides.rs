//! Persisted presentation overrides
//!
//! Two independent maps survive restarts:
//! - expansion flags (`expanded_states`): whether a card's artifact section is open
//! - label overrides (`custom_labels`): user-chosen card titles
//!
//! Both are loaded once at startup and rewritten in full, synchronously, after
//! every mutation. Nothing from the feed ever writes to them; only explicit
//! user actions and removal do.
//!
//! Storage failures never abort the session: a corrupt or unreadable map
//! loads as empty, and a failed write keeps the in-memory value so the
//! current session stays consistent even though durability is lost.

use obdl_common::{EventKey, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Storage name of the expansion map
pub const EXPANSION_STORE: &str = "expanded_states";

/// Storage name of the label override map
pub const LABEL_STORE: &str = "custom_labels";

/// Durable key → document storage for the override maps
pub trait OverrideStorage: Send {
    /// Read a stored document; `Ok(None)` when it was never written
    fn load(&self, name: &str) -> Result<Option<String>>;

    /// Replace a stored document
    fn store(&self, name: &str, contents: &str) -> Result<()>;
}

/// One `<name>.json` file per map inside a state directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl OverrideStorage for FileStorage {
    fn load(&self, name: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, name: &str, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        // Write to a sibling temp file first so a crash never leaves half a map
        let path = self.path_for(name);
        let tmp = self.dir.join(format!("{}.json.tmp", name));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process storage; clones share the same documents
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    documents: HashMap<String, String>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document as if it had been written earlier
    pub fn with_document(self, name: &str, contents: &str) -> Self {
        self.lock().documents.insert(name.to_string(), contents.to_string());
        self
    }

    /// Make every subsequent `store` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn document(&self, name: &str) -> Option<String> {
        self.lock().documents.get(name).cloned()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means another test thread panicked mid-write
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OverrideStorage for MemoryStorage {
    fn load(&self, name: &str) -> Result<Option<String>> {
        Ok(self.lock().documents.get(name).cloned())
    }

    fn store(&self, name: &str, contents: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(obdl_common::Error::Io(std::io::Error::new(
                ErrorKind::PermissionDenied,
                "memory storage is read-only",
            )));
        }
        inner.documents.insert(name.to_string(), contents.to_string());
        inner.writes += 1;
        Ok(())
    }
}

/// Expansion flags and label overrides, backed by durable storage
pub struct Overrides {
    expansion: BTreeMap<EventKey, bool>,
    labels: BTreeMap<EventKey, String>,
    storage: Box<dyn OverrideStorage>,
}

impl std::fmt::Debug for Overrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overrides")
            .field("expansion", &self.expansion)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

impl Overrides {
    /// Load both maps from `storage`
    ///
    /// Missing documents load as empty maps; corrupt ones are treated the same
    /// way with a warning.
    pub fn load(storage: impl OverrideStorage + 'static) -> Self {
        let expansion = load_map(&storage, EXPANSION_STORE);
        let labels = load_map(&storage, LABEL_STORE);
        debug!(
            expanded = expansion.len(),
            labels = labels.len(),
            "Loaded presentation overrides"
        );
        Self {
            expansion,
            labels,
            storage: Box::new(storage),
        }
    }

    /// Empty overrides on a fresh [`MemoryStorage`]
    pub fn in_memory() -> Self {
        Self::load(MemoryStorage::new())
    }

    /// Stored expansion flag, if the user ever toggled this card
    pub fn expansion(&self, key: &EventKey) -> Option<bool> {
        self.expansion.get(key).copied()
    }

    /// Expansion flag with the collapsed default applied
    pub fn is_expanded(&self, key: &EventKey) -> bool {
        self.expansion(key).unwrap_or(false)
    }

    pub fn label(&self, key: &EventKey) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn expansion_len(&self) -> usize {
        self.expansion.len()
    }

    pub fn label_len(&self) -> usize {
        self.labels.len()
    }

    pub fn set_expanded(&mut self, key: &EventKey, expanded: bool) {
        self.expansion.insert(key.clone(), expanded);
        self.persist_expansion();
    }

    /// Flip the expansion flag and return the new value
    pub fn toggle_expanded(&mut self, key: &EventKey) -> bool {
        let expanded = !self.is_expanded(key);
        self.set_expanded(key, expanded);
        expanded
    }

    pub fn set_label(&mut self, key: &EventKey, label: impl Into<String>) {
        self.labels.insert(key.clone(), label.into());
        self.persist_labels();
    }

    /// Drop a label override; returns whether one existed
    pub fn clear_label(&mut self, key: &EventKey) -> bool {
        let existed = self.labels.remove(key).is_some();
        if existed {
            self.persist_labels();
        }
        existed
    }

    /// Remove every override for `key` and persist both maps
    pub fn purge(&mut self, key: &EventKey) -> bool {
        let had_expansion = self.expansion.remove(key).is_some();
        let had_label = self.labels.remove(key).is_some();
        self.persist_expansion();
        self.persist_labels();
        had_expansion || had_label
    }

    fn persist_expansion(&self) {
        persist_map(self.storage.as_ref(), EXPANSION_STORE, &self.expansion);
    }

    fn persist_labels(&self) {
        persist_map(self.storage.as_ref(), LABEL_STORE, &self.labels);
    }
}

fn load_map<V: DeserializeOwned>(
    storage: &dyn OverrideStorage,
    name: &str,
) -> BTreeMap<EventKey, V> {
    match storage.load(name) {
        Ok(Some(contents)) => match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(e) => {
                warn!(store = name, error = %e, "Stored overrides are corrupt, starting empty");
                BTreeMap::new()
            }
        },
        Ok(None) => BTreeMap::new(),
        Err(e) => {
            warn!(store = name, error = %e, "Could not read stored overrides, starting empty");
            BTreeMap::new()
        }
    }
}

fn persist_map<V: Serialize>(storage: &dyn OverrideStorage, name: &str, map: &BTreeMap<EventKey, V>) {
    let contents = match serde_json::to_string(map) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(store = name, error = %e, "Could not encode overrides");
            return;
        }
    };

    if let Err(e) = storage.store(name, &contents) {
        warn!(
            store = name,
            error = %e,
            "Failed to persist overrides, keeping in-memory value for this session"
        );
    }
}
