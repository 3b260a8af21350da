//! Local key-value persistence. A JSON file holds an object of string
//! values, and the configuration is kept as one JSON blob under a single key.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::config::ApiConfig;
use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_KEY: &str = "apigrid.config";
pub const DEFAULT_STORE_FILE: &str = ".apigrid-store.json";

#[derive(Debug, Clone)]
pub struct KeyValueStore {
    path: PathBuf,
}

impl KeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Format(format!(
                "Store file {} does not contain a JSON object",
                self.path.display()
            ))),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }

    /// # Errors
    /// Fails when the store file exists but cannot be read or parsed.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_all()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// # Errors
    /// Fails when the store file cannot be read, parsed or written.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_all()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.write_all(&map)
    }

    /// Returns whether the key was present.
    ///
    /// # Errors
    /// Fails when the store file cannot be read, parsed or written.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut map = self.read_all()?;
        let existed = map.remove(key).is_some();
        if existed {
            self.write_all(&map)?;
        }
        Ok(existed)
    }
}

/// The saved configuration, as a single entry of a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    kv: KeyValueStore,
    key: String,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, DEFAULT_CONFIG_KEY)
    }

    pub fn with_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            kv: KeyValueStore::new(path),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.kv.path()
    }

    /// Saved configuration merged over defaults. Anything unreadable yields
    /// the default configuration.
    #[must_use]
    pub fn load(&self) -> ApiConfig {
        let raw = match self.kv.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ApiConfig::default(),
            Err(e) => {
                tracing::warn!(path = %self.path().display(), error = %e, "store unreadable, using defaults");
                return ApiConfig::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key = %self.key, error = %e, "saved configuration is corrupt, using defaults");
            ApiConfig::default()
        })
    }

    /// # Errors
    /// Fails when the store cannot be written.
    pub fn save(&self, config: &ApiConfig) -> Result<()> {
        let blob = serde_json::to_string(config)?;
        self.kv.set(&self.key, &blob)?;
        tracing::debug!(path = %self.path().display(), bytes = blob.len(), "configuration saved");
        Ok(())
    }

    /// # Errors
    /// Fails when the store cannot be read or written.
    pub fn clear(&self) -> Result<bool> {
        self.kv.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameter;

    fn temp_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("store.json"));
        (dir, store)
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load(), ApiConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = temp_store();
        let mut cfg = ApiConfig::default();
        cfg.api.endpoint = "https://x.test/items".to_string();
        cfg.api.default_params = vec![Parameter::new("a", "1").disabled()];
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn test_save_then_load_keeps_padded_values() {
        let (_dir, store) = temp_store();
        let mut cfg = ApiConfig::default();
        cfg.api.test_params = crate::params::parse_any("q=%20hello%20").params;
        cfg.api.url_params = vec![Parameter::new("id", " 7 ")];
        assert_eq!(cfg.api.test_params, vec![Parameter::new("q", " hello ")]);
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn test_load_merges_partial_blob_with_defaults() {
        let (_dir, store) = temp_store();
        store
            .kv
            .set(DEFAULT_CONFIG_KEY, r#"{"api":{"endpoint":"https://x.test"},"pagination":{"enabled":true}}"#)
            .unwrap();
        let cfg = store.load();
        assert_eq!(cfg.api.method, "GET");
        assert!(cfg.pagination.enabled);
        assert_eq!(cfg.pagination.page_size, 10);
    }

    #[test]
    fn test_load_corrupt_blob_gives_default() {
        let (_dir, store) = temp_store();
        store.kv.set(DEFAULT_CONFIG_KEY, "{not json").unwrap();
        assert_eq!(store.load(), ApiConfig::default());
    }

    #[test]
    fn test_other_keys_are_preserved() {
        let (_dir, store) = temp_store();
        store.kv.set("theme", "dark").unwrap();
        store.save(&ApiConfig::default()).unwrap();
        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.kv.get("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_kv_rejects_non_object_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2]").unwrap();
        let kv = KeyValueStore::new(&path);
        assert!(matches!(kv.get("x"), Err(Error::Format(_))));
    }
}
