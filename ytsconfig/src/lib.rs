//! # YTStreamer configuration
//!
//! This crate provides configuration management for YTStreamer:
//! - Loading configuration from a YAML file
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for the host-level values
//!
//! Other crates add their own typed accessors through extension traits
//! (`BroadcastConfigExt`, `MediaConfigExt`, `PipelineConfigExt`) built on
//! [`Config::get_value`] and the `*_or` helpers.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ytsconfig::Config;
//!
//! let config = Arc::new(Config::load_config("")?);
//!
//! let port = config.get_http_port();
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use dirs::home_dir;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    net::IpAddr,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

// Built-in default configuration
const DEFAULT_CONFIG: &str = include_str!("ytstreamer.yaml");

const ENV_CONFIG_DIR: &str = "YTSTREAMER_CONFIG";
const ENV_PREFIX: &str = "YTSTREAMER_CONFIG__";
const CONFIG_DIR_NAME: &str = ".ytstreamer";
const CONFIG_FILE_NAME: &str = "config.yaml";

// Default values for configuration
pub const DEFAULT_HTTP_PORT: u16 = 8000;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_HOST_NAME: &str = "YTStreamer";
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Configuration manager for YTStreamer
///
/// Holds the merged YAML document behind a mutex. Every setter writes the
/// document back to `config.yaml`, so the file always reflects the values in
/// use, defaults included.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        // 1. Try provided directory
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Creates the directory if needed and checks it is readable and writable
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("cannot create config directory {}", path.display()))?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let marker = path.join(".write_test");
        fs::write(&marker, b"test")?;
        fs::remove_file(&marker)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `YTSTREAMER_CONFIG` environment variable
    /// 3. `.ytstreamer` in the current directory
    /// 4. `.ytstreamer` in the user's home directory
    pub fn config_dir(directory: &str) -> Result<PathBuf> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(&dir_path)?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external `config.yaml` file if present (keys
    ///    are case-insensitive)
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join(CONFIG_FILE_NAME);

        let mut config_value = Self::lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);

        let yaml_data = match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                data
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
                DEFAULT_CONFIG.as_bytes().to_vec()
            }
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)
            .with_context(|| format!("invalid YAML in {}", path.display()))?;
        // lowercase before merging, or `HOST:` would shadow the whole `host:` section
        merge_yaml(&mut config_value, &Self::lower_keys_value(external_value));

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Directory holding `config.yaml`; relative paths in the document resolve against it.
    pub fn directory(&self) -> &Path {
        &self.config_dir
    }

    /// Saves the current configuration to the `config.yaml` file
    pub fn save(&self) -> Result<()> {
        let yaml = {
            let data = self.data.lock();
            serde_yaml::to_string(&*data)?
        };
        fs::write(&self.path, yaml)
            .with_context(|| format!("cannot write {}", self.path.display()))?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// `path` is an array of keys, e.g. `&["host", "http_port"]`.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, error = %e, "Ignoring environment override");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path relative to the config directory unless it is absolute
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Resolves a directory managed by the configuration
    ///
    /// The directory may be absolute or relative to the config directory and
    /// is created if missing. When the key is absent, `default` is written
    /// back to the document.
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<PathBuf> {
        let dir_path = match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => {
                self.set_value(path, Value::String(default.to_string()))?;
                default.to_string()
            }
        };

        let absolute = self.resolve_path(&dir_path);
        if !absolute.exists() {
            fs::create_dir_all(&absolute)?;
            info!(directory = %absolute.display(), "Created managed directory");
        }
        Ok(absolute)
    }

    /// Reads an unsigned integer, accepting numbers and numeric strings
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!(path = %path.join("."), value = %s, default, "Invalid integer, using default");
                default
            }),
            _ => default,
        }
    }

    pub fn get_usize_or(&self, path: &[&str], default: usize) -> usize {
        usize::try_from(self.get_u64_or(path, default as u64)).unwrap_or(default)
    }

    pub fn get_bool_or(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            Ok(Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    pub fn set_u64(&self, path: &[&str], value: u64) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value)))
    }

    /// Gets the HTTP port from configuration
    ///
    /// Falls back to 8000 when the value is missing or invalid.
    pub fn get_http_port(&self) -> u16 {
        let raw = self.get_u64_or(&["host", "http_port"], u64::from(DEFAULT_HTTP_PORT));
        u16::try_from(raw).unwrap_or_else(|_| {
            warn!(port = raw, "HTTP port out of range, using default {}", DEFAULT_HTTP_PORT);
            DEFAULT_HTTP_PORT
        })
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_u64(&["host", "http_port"], u64::from(port))
    }

    /// Address the broadcast server binds to
    pub fn get_bind_address(&self) -> IpAddr {
        let raw = self.get_string_or(&["host", "bind_address"], DEFAULT_BIND_ADDRESS);
        raw.parse().unwrap_or_else(|_| {
            warn!(address = %raw, "Invalid bind address, using {}", DEFAULT_BIND_ADDRESS);
            IpAddr::from([0, 0, 0, 0])
        })
    }

    pub fn set_bind_address(&self, address: IpAddr) -> Result<()> {
        self.set_value(&["host", "bind_address"], Value::String(address.to_string()))
    }

    /// Display name used in logs, the player page and `icy-name`
    pub fn get_host_name(&self) -> String {
        self.get_string_or(&["host", "name"], DEFAULT_HOST_NAME)
    }

    pub fn get_log_min_level(&self) -> String {
        self.get_string_or(&["host", "logger", "min_level"], DEFAULT_LOG_MIN_LEVEL)
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }

    pub fn get_log_enable_console(&self) -> bool {
        self.get_bool_or(&["host", "logger", "enable_console"], DEFAULT_LOG_ENABLE_CONSOLE)
    }

    pub fn set_log_enable_console(&self, enabled: bool) -> Result<()> {
        self.set_value(&["host", "logger", "enable_console"], Value::Bool(enabled))
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings merge key by key; scalars and sequences from `external` replace
/// the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_in(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_are_loaded_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        assert_eq!(config.get_http_port(), 8000);
        assert_eq!(config.get_host_name(), "YTStreamer");
        assert_eq!(config.get_log_min_level(), "INFO");
        assert!(dir.path().join("config.yaml").exists());
    }

    #[test]
    fn test_user_file_is_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "HOST:\n  HTTP_PORT: 9100\n  logger:\n    min_level: DEBUG\n",
        )
        .unwrap();

        let config = load_in(&dir);
        assert_eq!(config.get_http_port(), 9100);
        assert_eq!(config.get_log_min_level(), "DEBUG");
        // Keys not present in the user file keep their default
        assert!(config.get_log_enable_console());
        assert_eq!(config.get_u64_or(&["server", "bind_attempts"], 0), 10);
    }

    #[test]
    fn test_uppercase_user_keys_keep_default_siblings() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "HOST:\n  HTTP_PORT: 9000\n").unwrap();

        let config = load_in(&dir);
        assert_eq!(config.get_http_port(), 9000);
        // read from the merged document, not from a getter fallback
        assert_eq!(
            config.get_value(&["host", "name"]).unwrap(),
            Value::String("YTStreamer".into())
        );
        assert!(config.get_value(&["host", "bind_address"]).is_ok());

        let saved = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(saved.contains("name: YTStreamer"));
        assert!(!saved.contains("HOST"));
    }

    #[test]
    fn test_set_value_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        config.set_http_port(8123).unwrap();

        let reloaded = load_in(&dir);
        assert_eq!(reloaded.get_http_port(), 8123);
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        env::set_var("YTSTREAMER_CONFIG__TESTONLY__VALUE", "42");
        let config = load_in(&dir);
        env::remove_var("YTSTREAMER_CONFIG__TESTONLY__VALUE");

        assert_eq!(config.get_u64_or(&["testonly", "value"], 0), 42);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);
        config
            .set_value(&["host", "http_port"], Value::String("not-a-port".into()))
            .unwrap();
        config
            .set_value(&["host", "bind_address"], Value::String("nowhere".into()))
            .unwrap();

        assert_eq!(config.get_http_port(), DEFAULT_HTTP_PORT);
        assert_eq!(config.get_bind_address(), IpAddr::from([0, 0, 0, 0]));
    }

    #[test]
    fn test_managed_dir_is_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(&dir);

        let work = config.get_managed_dir(&["media", "scratch"], "scratch").unwrap();
        assert_eq!(work, dir.path().join("scratch"));
        assert!(work.is_dir());
        assert_eq!(
            config.get_value(&["media", "scratch"]).unwrap(),
            Value::String("scratch".into())
        );
    }

    #[test]
    fn test_merge_replaces_scalars_and_keeps_siblings() {
        let mut base: Value = serde_yaml::from_str("a: {b: 1, c: 2}\nd: [1, 2]").unwrap();
        let ext: Value = serde_yaml::from_str("a: {b: 5}\nd: [9]").unwrap();
        merge_yaml(&mut base, &ext);

        assert_eq!(Config::get_value_internal(&base, &["a", "b"]).unwrap(), Value::from(5));
        assert_eq!(Config::get_value_internal(&base, &["a", "c"]).unwrap(), Value::from(2));
        assert_eq!(
            Config::get_value_internal(&base, &["d"]).unwrap(),
            serde_yaml::from_str::<Value>("[9]").unwrap()
        );
    }
}
