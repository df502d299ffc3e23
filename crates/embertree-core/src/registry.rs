//! Monitor registry: display label -> cached normalized value
//!
//! The registry is the single source of truth for variable exposure and
//! feedback evaluation. Its lifecycle is:
//! - constructed empty
//! - populated by discovery or explicit registration
//! - replaced wholesale on reconfiguration ([`MonitorRegistry::rebuild`])
//!
//! Every rebuild bumps the registry [`Generation`]. Registrations carry the
//! generation they were started under, so a traversal left over from an
//! earlier configuration is refused instead of leaking into the new set.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Hard bound on the number of monitored entries
pub const MAX_MONITORED: usize = 2048;

/// Registry rebuild counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

/// A single monitored parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredEntry {
    /// Dotted numeric address of the parameter
    pub path: String,
    /// Display label (unique key)
    pub label: String,
    /// Normalized cached value
    pub value: String,
    /// When the cached value was last written
    pub updated_at: Option<DateTime<Utc>>,
    /// Bumped on every value write
    #[serde(default)]
    pub revision: u64,
}

/// Label-keyed set of monitored entries, in registration order
#[derive(Debug, Clone, Default)]
pub struct MonitorRegistry {
    entries: IndexMap<String, MonitoredEntry>,
    generation: Generation,
}

impl MonitorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Clear all entries and start a new generation
    pub fn rebuild(&mut self) -> Generation {
        self.entries.clear();
        self.generation = Generation(self.generation.0 + 1);
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_MONITORED
    }

    /// Register a path under a label.
    ///
    /// Returns `true` for a new entry. Re-registering an existing label
    /// repoints it at the new path and keeps its cached value.
    pub fn register(
        &mut self,
        generation: Generation,
        path: &str,
        label: &str,
    ) -> Result<bool, RegistryError> {
        if generation != self.generation {
            return Err(RegistryError::Stale {
                held: generation.0,
                current: self.generation.0,
            });
        }

        if let Some(existing) = self.entries.get_mut(label) {
            existing.path = path.to_string();
            return Ok(false);
        }

        if self.is_full() {
            return Err(RegistryError::Full(MAX_MONITORED));
        }

        self.entries.insert(
            label.to_string(),
            MonitoredEntry {
                path: path.to_string(),
                label: label.to_string(),
                value: String::new(),
                updated_at: None,
                revision: 0,
            },
        );
        Ok(true)
    }

    /// Write the cached value for a label; false if the label is unknown
    pub fn set_value(&mut self, label: &str, value: String) -> bool {
        match self.entries.get_mut(label) {
            Some(entry) => {
                entry.value = value;
                entry.updated_at = Some(Utc::now());
                entry.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Write the cached value only if no write happened since `revision`
    pub fn set_value_if(&mut self, label: &str, revision: u64, value: String) -> bool {
        match self.entries.get(label) {
            Some(entry) if entry.revision == revision => self.set_value(label, value),
            _ => false,
        }
    }

    /// Current write revision of a label
    pub fn revision(&self, label: &str) -> Option<u64> {
        self.entries.get(label).map(|e| e.revision)
    }

    /// Write the cached value of every entry monitoring `path`.
    ///
    /// Returns the labels that were updated.
    pub fn update_path(&mut self, path: &str, value: &str) -> Vec<String> {
        let now = Utc::now();
        let mut updated = Vec::new();
        for entry in self.entries.values_mut().filter(|e| e.path == path) {
            entry.value = value.to_string();
            entry.updated_at = Some(now);
            entry.revision += 1;
            updated.push(entry.label.clone());
        }
        updated
    }

    pub fn get(&self, label: &str) -> Option<&MonitoredEntry> {
        self.entries.get(label)
    }

    /// Cached value for a label
    pub fn value(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(|e| e.value.as_str())
    }

    /// Path registered under a label
    pub fn path_for(&self, label: &str) -> Option<&str> {
        self.entries.get(label).map(|e| e.path.as_str())
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &MonitoredEntry> {
        self.entries.values()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Owned copy of all entries
    pub fn snapshot(&self) -> Vec<MonitoredEntry> {
        self.entries.values().cloned().collect()
    }
}
