//! Curated city dictionary.
//!
//! Entries keep their file order; partial matching walks them in that order and the
//! first hit wins, so more important cities should be listed first.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, Tier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub name: String,
    pub coordinates: Coordinates,
    pub province: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

/// How a city name matched the dictionary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DictionaryMatch<'a> {
    Exact(&'a DictionaryEntry),
    Partial(&'a DictionaryEntry),
}

impl<'a> DictionaryMatch<'a> {
    pub fn entry(&self) -> &'a DictionaryEntry {
        match self {
            DictionaryMatch::Exact(entry) | DictionaryMatch::Partial(entry) => entry,
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            DictionaryMatch::Exact(_) => Tier::ExactDictionary,
            DictionaryMatch::Partial(_) => Tier::PartialDictionary,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CityDictionary {
    entries: Vec<DictionaryEntry>,
    by_name: HashMap<String, usize>,
    by_lowercase: HashMap<String, usize>,
}

impl CityDictionary {
    pub fn new(entries: Vec<DictionaryEntry>) -> Self {
        let mut dictionary = Self::default();
        for entry in entries {
            dictionary.upsert(entry);
        }
        dictionary
    }

    /// Insert an entry, replacing any entry with the same name in place.
    pub fn upsert(&mut self, entry: DictionaryEntry) {
        if let Some(&idx) = self.by_name.get(&entry.name) {
            self.entries[idx] = entry;
            return;
        }
        let idx = self.entries.len();
        self.by_name.insert(entry.name.clone(), idx);
        self.by_lowercase
            .entry(entry.name.to_lowercase())
            .or_insert(idx);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    /// Verbatim match first, then a case-insensitive one.
    pub fn get_exact(&self, name: &str) -> Option<&DictionaryEntry> {
        self.by_name
            .get(name)
            .or_else(|| self.by_lowercase.get(&name.to_lowercase()))
            .map(|&idx| &self.entries[idx])
    }

    /// First entry whose name contains `name` or is contained in it, ignoring case.
    pub fn find_partial(&self, name: &str) -> Option<&DictionaryEntry> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.entries.iter().find(|entry| {
            let key = entry.name.to_lowercase();
            key.contains(&needle) || needle.contains(&key)
        })
    }

    pub fn lookup(&self, name: &str) -> Option<DictionaryMatch<'_>> {
        if let Some(entry) = self.get_exact(name) {
            return Some(DictionaryMatch::Exact(entry));
        }
        self.find_partial(name).map(DictionaryMatch::Partial)
    }
}
