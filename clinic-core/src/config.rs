//! # Configuration
//!
//! A minimal key/value configuration store. Typed configuration structs in
//! the other crates (`BlobConfig`, `RecordsConfig`) are resolved from a
//! [`ClinicConfigSnapshot`] once at startup and then passed into services,
//! so request handling never reads process-wide state.
//!
//! ```rust
//! use clinic_core::ClinicConfig;
//! let mut config = ClinicConfig::new();
//!
//! config.set("records.code_prefix", "HN");
//! config.set("records.code_width", "4");
//!
//! assert_eq!(config.get("records.code_prefix"), Some("HN"));
//! assert_eq!(config.snapshot().get_usize("records.code_width"), Some(4));
//! ```
//!
//! Environment overrides use a prefix and `__` as the path separator:
//!
//! ```bash
//! export CLINIC__RECORDS__CODE_PREFIX=PT
//! ```

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ClinicConfig {
    values: HashMap<String, String>,
}

impl ClinicConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every variable starting with `prefix` into the store.
    ///
    /// `CLINIC__BLOB__CALL_TIMEOUT_MS` with prefix `CLINIC__` becomes
    /// `blob.call_timeout_ms`. Returns the number of keys loaded.
    pub fn load_env(&mut self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    /// Same as [`ClinicConfig::load_env`] over an explicit variable list.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut loaded = 0;
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn snapshot(&self) -> ClinicConfigSnapshot {
        ClinicConfigSnapshot::new(self.values.clone())
    }
}

/// Immutable copy of the configuration taken at startup.
#[derive(Debug, Clone, Default)]
pub struct ClinicConfigSnapshot {
    map: HashMap<String, String>,
}

impl ClinicConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse::<u32>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }
}
