//! Persistent geocode cache.
//!
//! The store is a single JSON object mapping the composite query key to the final
//! (already jittered) coordinates, the tier that produced them and, once looked up, the
//! municipality (gmina) containing the point:
//!
//! ```json
//! { "X1_Żarów_dolnośląskie_ul. Armii Krajowej 50_58-130":
//!     { "coordinates": [50.9413, 16.4951], "tier": "external_provider", "municipality": "Żarów" } }
//! ```
//!
//! Stores written by the older tooling are read as well: bare `[lat, lon]` pairs and
//! `{ "coordinates", "municipality" }` objects. Entries without a tier get [`LEGACY_TIER`].
//! Flushes always write the full form.
//!
//! Entries never expire. Flushes write a sorted snapshot to a temporary file in the same
//! directory and rename it over the store.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::models::{AdminLabel, Coordinates, Tier};

/// Tier given to stored entries that carry none.
pub const LEGACY_TIER: Tier = Tier::ExternalProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredEntry")]
pub struct CacheEntry {
    pub coordinates: Coordinates,
    pub tier: Tier,
    /// `None` until the municipality pass has looked the point up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub municipality: Option<AdminLabel>,
}

impl CacheEntry {
    pub fn new(coordinates: Coordinates, tier: Tier) -> Self {
        Self {
            coordinates,
            tier,
            municipality: None,
        }
    }

    pub fn with_municipality(mut self, municipality: AdminLabel) -> Self {
        self.municipality = Some(municipality);
        self
    }
}

/// Every entry shape found in existing stores.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Pair(Coordinates),
    Object {
        coordinates: Coordinates,
        #[serde(default)]
        tier: Option<Tier>,
        #[serde(default)]
        municipality: Option<AdminLabel>,
    },
}

impl From<StoredEntry> for CacheEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Pair(coordinates) => CacheEntry::new(coordinates, LEGACY_TIER),
            StoredEntry::Object {
                coordinates,
                tier,
                municipality,
            } => CacheEntry {
                coordinates,
                tier: tier.unwrap_or(LEGACY_TIER),
                municipality,
            },
        }
    }
}

pub struct GeocodeCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Writes since the last successful flush
    dirty: AtomicUsize,
}

impl GeocodeCache {
    /// Load the store at `path`. A missing file is an empty cache; anything unreadable or
    /// malformed is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str::<HashMap<String, CacheEntry>>(&content)
                .map_err(|source| CacheError::Corrupt {
                    path: path.clone(),
                    source,
                })?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("No cache at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(source) => return Err(CacheError::Read { path, source }),
        };

        info!("Loaded {} cached locations from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            dirty: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Insert or overwrite an entry.
    pub fn put(&self, key: impl Into<String>, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), entry);
        self.dirty.fetch_add(1, Ordering::Relaxed);
    }

    /// Entries the municipality pass has not visited yet, ordered by key.
    pub fn missing_municipality(&self) -> Vec<(String, CacheEntry)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut missing: Vec<(String, CacheEntry)> = entries
            .iter()
            .filter(|(_, entry)| entry.municipality.is_none())
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        missing.sort_by(|a, b| a.0.cmp(&b.0));
        missing
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Persist the full map atomically.
    pub fn flush(&self) -> Result<(), CacheError> {
        let (snapshot, dirty) = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            // Sorted keys keep the file byte-stable across flushes
            let snapshot: BTreeMap<&str, &CacheEntry> =
                entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
            (serde_json::to_vec_pretty(&snapshot)?, self.dirty.load(Ordering::Relaxed))
        };

        let tmp = self.temp_path();
        fs::write(&tmp, &snapshot).map_err(|source| CacheError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.dirty.fetch_sub(dirty, Ordering::Relaxed);
        debug!("Flushed geocode cache to {}", self.path.display());
        Ok(())
    }

    /// Flush only when something changed since the last flush.
    pub fn flush_if_dirty(&self) -> Result<bool, CacheError> {
        if self.dirty_count() == 0 {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "geocode-cache.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
