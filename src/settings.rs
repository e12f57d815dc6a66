//! Persistent user settings.
//!
//! The host controller never reads settings from a global; it is handed a
//! [`SettingsStore`] at construction and reads through it on every access.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use toml::Value;

use crate::error::SettingsError;
use crate::protocol::{Configuration, MAX_RESULTS_RANGE};

pub mod keys {
    pub const API_KEY: &str = "apiKey";
    pub const BASE_URL: &str = "baseUrl";
    pub const MODEL: &str = "model";
    pub const MAX_RESULTS: &str = "maxResults";
    pub const OUTPUT_DIR: &str = "outputDir";
}

/// Key/value settings storage owned by the hosting environment.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError>;
}

/// Reads a full [`Configuration`], substituting defaults for anything
/// missing or of the wrong type.
pub fn read_configuration(store: &dyn SettingsStore) -> Configuration {
    let defaults = Configuration::default();
    let string = |key: &str, default: String| match store.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => default,
    };

    let max_results = store
        .get(keys::MAX_RESULTS)
        .and_then(|v| v.as_integer())
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| MAX_RESULTS_RANGE.contains(n))
        .unwrap_or(defaults.max_results);

    Configuration {
        api_key: string(keys::API_KEY, defaults.api_key),
        base_url: string(keys::BASE_URL, defaults.base_url),
        model: string(keys::MODEL, defaults.model),
        max_results,
        output_dir: string(keys::OUTPUT_DIR, defaults.output_dir),
    }
}

/// Settings kept in a flat TOML table on disk, re-read on every `get`.
pub struct TomlSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TomlSettingsStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> Result<toml::Table, SettingsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(toml::Table::new()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        contents.parse::<toml::Table>().map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl SettingsStore for TomlSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        match self.read_table() {
            Ok(mut table) => table.remove(key),
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default for {key}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read_table()?;
        table.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = toml::to_string_pretty(&table)?;
        fs::write(&self.path, contents).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "stored setting {key}");
        Ok(())
    }
}

/// In-memory store, used for headless runs and tests. Counts writes.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.into());
        self
    }

    /// Keys written through [`SettingsStore::set`], in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.to_string());
        Ok(())
    }
}
