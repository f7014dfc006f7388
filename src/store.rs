//! Durable tempo presets.
//!
//! The whole preset set lives in one JSON record under the key [`DATA_KEY`]
//! of a [`KeyValueStore`]. [`PresetStore`] keeps no copy of it: every
//! [`get`](PresetStore::get) re-reads and re-parses the stored bytes, so the
//! durable record is the only source of truth.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::tempo::TempoPreset;

/// Key the preset record is stored under.
pub const DATA_KEY: &str = "data";

/// Name of the preset seeded on first run.
pub const DEFAULT_PRESET_NAME: &str = "Default";

/// Goal tempo of the preset seeded on first run.
pub const DEFAULT_GOAL_BPM: u32 = 120;

/// The persisted record: every preset plus which one is selected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedData {
    /// Name of the selected preset
    pub current_name: String,
    /// Presets in display order; identity is the name
    pub tempos: Vec<TempoPreset>,
}

impl PersistedData {
    /// The record written on first run: a single "Default" preset, selected.
    pub fn seed() -> Self {
        let preset = TempoPreset::new(DEFAULT_PRESET_NAME, DEFAULT_GOAL_BPM, 1);
        Self {
            current_name: preset.name.clone(),
            tempos: vec![preset],
        }
    }

    /// The selected preset, or `None` if `current_name` matches none.
    pub fn current(&self) -> Option<&TempoPreset> {
        self.find(&self.current_name)
    }

    pub fn current_mut(&mut self) -> Option<&mut TempoPreset> {
        let name = self.current_name.clone();
        self.tempos.iter_mut().find(|t| t.name == name)
    }

    pub fn find(&self, name: &str) -> Option<&TempoPreset> {
        self.tempos.iter().find(|t| t.name == name)
    }

    /// Select `name` if such a preset exists. Returns whether it did.
    pub fn select(&mut self, name: &str) -> bool {
        if self.find(name).is_some() {
            self.current_name = name.to_string();
            true
        } else {
            false
        }
    }

    /// Presets sorted by their `order`, ties kept in insertion order.
    pub fn sorted(&self) -> Vec<&TempoPreset> {
        let mut sorted: Vec<_> = self.tempos.iter().collect();
        sorted.sort_by_key(|t| t.order);
        sorted
    }
}

/// Durable string storage addressed by key.
pub trait KeyValueStore {
    /// The value under `key`, or `None` if nothing was ever stored there.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One file per key, `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a torn record behind.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir` for storage, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process storage; contents are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads and writes the [`PersistedData`] record.
pub struct PresetStore<S: KeyValueStore> {
    storage: S,
}

impl<S: KeyValueStore> PresetStore<S> {
    /// Wrap `storage`, seeding the default record if none exists yet.
    pub fn open(storage: S) -> Result<Self, StoreError> {
        let mut store = Self { storage };
        store.ensure_seeded()?;
        Ok(store)
    }

    /// Write the default record iff no record is stored.
    ///
    /// An existing record is left alone even if it is malformed.
    pub fn ensure_seeded(&mut self) -> Result<(), StoreError> {
        if self.storage.get(DATA_KEY)?.is_none() {
            debug!("no preset record found, seeding default");
            self.save(&PersistedData::seed())?;
        }
        Ok(())
    }

    /// Parse the stored record.
    ///
    /// A malformed record is reported as [`StoreError::Parse`] and left
    /// untouched; deciding whether to [`reseed`](Self::reseed) is up to the
    /// caller. A record deleted from the storage after [`open`](Self::open)
    /// is [`StoreError::Missing`] until [`ensure_seeded`](Self::ensure_seeded)
    /// writes a new one.
    pub fn get(&self) -> Result<PersistedData, StoreError> {
        let raw = self.storage.get(DATA_KEY)?.ok_or_else(|| StoreError::Missing {
            key: DATA_KEY.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|source| {
            warn!("persisted preset record is malformed");
            StoreError::Parse {
                key: DATA_KEY.to_string(),
                source,
            }
        })
    }

    /// Overwrite the stored record. Last writer wins.
    pub fn save(&mut self, data: &PersistedData) -> Result<(), StoreError> {
        let json = serde_json::to_string(data).map_err(StoreError::Serialize)?;
        self.storage.set(DATA_KEY, &json)
    }

    /// Replace whatever is stored with the default record.
    pub fn reseed(&mut self) -> Result<PersistedData, StoreError> {
        let seed = PersistedData::seed();
        self.save(&seed)?;
        Ok(seed)
    }

    /// The underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}
