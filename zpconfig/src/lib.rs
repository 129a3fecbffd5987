//! Configuration store for the ZPMusic controller.
//!
//! The configuration lives in a single `config.yaml` file inside the
//! configuration directory. Missing values are taken from the built-in
//! default configuration, and any value can be overridden through
//! environment variables of the form `ZPMUSIC_CONFIG__SECTION__KEY`.
//!
//! Most callers go through [`get_config`], which loads the file once
//! and hands out a shared handle.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

// Configuration par défaut, embarquée dans le binaire.
const DEFAULT_CONFIG: &str = include_str!("zpmusic.yaml");

/// Environment variable naming the configuration directory.
pub const ENV_CONFIG_DIR: &str = "ZPMUSIC_CONFIG";

/// Prefix of environment variables overriding individual values.
const ENV_PREFIX: &str = "ZPMUSIC_CONFIG__";

const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_DIR_NAME: &str = ".zpmusic";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Unable to load the ZPMusic configuration"));
}

/// Return the shared configuration, loading it on first use.
///
/// The configuration directory is resolved from the `ZPMUSIC_CONFIG`
/// environment variable, a `.zpmusic` directory in the current
/// directory, or `~/.zpmusic`.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// The ZPMusic configuration tree.
///
/// Keys are normalised to lowercase on load, and every mutation is
/// written back to `config.yaml` immediately.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().expect("Config mutex poisoned").clone();
        Config {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Load the configuration from `directory`.
    ///
    /// An empty `directory` triggers the standard resolution order
    /// (environment variable, `.zpmusic` in the current directory,
    /// home directory). The on-disk file is merged over the built-in
    /// defaults, then environment overrides are applied, and the
    /// resulting tree is saved back.
    pub fn load_config(directory: &str) -> Result<Config> {
        let config_dir = Config::find_config_dir(directory)?;
        Config::validate_config_dir(&config_dir)?;

        let path = Path::new(&config_dir).join(CONFIG_FILE);

        // Charger d'abord la configuration par défaut.
        let mut data: Value =
            serde_yaml::from_str(DEFAULT_CONFIG).context("Invalid built-in configuration")?;

        if path.exists() {
            let external = fs::read_to_string(&path)
                .with_context(|| format!("Unable to read {}", path.display()))?;
            let external: Value = serde_yaml::from_str(&external)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?;
            merge_yaml(&mut data, external);
            debug!(path = %path.display(), "Merged external configuration");
        } else {
            info!(path = %path.display(), "No configuration file found, using defaults");
        }

        let mut data = lower_keys_value(data);
        Config::apply_env_overrides(&mut data);

        let config = Config {
            config_dir,
            path: path.to_string_lossy().to_string(),
            data: Mutex::new(data),
        };
        config.save()?;

        Ok(config)
    }

    /// The directory holding `config.yaml`.
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Full path of the configuration file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read the value at `path`, a sequence of mapping keys.
    ///
    /// Keys are matched case-insensitively. Returns an error when the
    /// path does not exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().expect("Config mutex poisoned");
        Config::get_value_internal(&data, path)
    }

    /// Write `value` at `path`, creating intermediate mappings, and
    /// save the file.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            bail!("Cannot set the configuration root");
        }
        {
            let mut data = self.data.lock().expect("Config mutex poisoned");
            Config::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Write the current tree back to `config.yaml`.
    pub fn save(&self) -> Result<()> {
        let serialized = {
            let data = self.data.lock().expect("Config mutex poisoned");
            serde_yaml::to_string(&*data).context("Unable to serialize the configuration")?
        };
        fs::write(&self.path, serialized)
            .with_context(|| format!("Unable to write {}", self.path))?;
        Ok(())
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let Some((head, rest)) = path.split_first() else {
            return Ok(data.clone());
        };
        let key = head.to_lowercase();
        match data {
            Value::Mapping(map) => {
                let entry = map
                    .get(&Value::String(key.clone()))
                    .ok_or_else(|| anyhow!("Missing configuration key: {key}"))?;
                Config::get_value_internal(entry, rest)
            }
            _ => Err(anyhow!("Configuration value at {key} is not a mapping")),
        }
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        let Some((head, rest)) = path.split_first() else {
            bail!("Cannot set the configuration root");
        };
        let key = Value::String(head.to_lowercase());
        match data {
            Value::Mapping(map) => {
                if rest.is_empty() {
                    map.insert(key, value);
                    return Ok(());
                }
                let child = map
                    .entry(key)
                    .or_insert_with(|| Value::Mapping(Mapping::new()));
                if !child.is_mapping() {
                    // Un scalaire en travers du chemin est remplacé.
                    *child = Value::Mapping(Mapping::new());
                }
                Config::set_value_internal(child, rest, value)
            }
            _ => Err(anyhow!("Configuration value at {} is not a mapping", head)),
        }
    }

    /// Resolve the configuration directory.
    fn find_config_dir(directory: &str) -> Result<String> {
        if !directory.is_empty() {
            return Ok(directory.to_string());
        }

        if let Ok(dir) = env::var(ENV_CONFIG_DIR) {
            if !dir.is_empty() {
                return Ok(dir);
            }
        }

        if let Ok(cwd) = env::current_dir() {
            let candidate = cwd.join(DEFAULT_DIR_NAME);
            if candidate.is_dir() {
                return Ok(candidate.to_string_lossy().to_string());
            }
        }

        if let Some(home) = dirs::home_dir() {
            return Ok(home.join(DEFAULT_DIR_NAME).to_string_lossy().to_string());
        }

        Ok(DEFAULT_DIR_NAME.to_string())
    }

    /// Create the configuration directory if needed and check that it
    /// is readable and writable.
    fn validate_config_dir(config_dir: &str) -> Result<()> {
        let dir = Path::new(config_dir);

        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Unable to create {}", dir.display()))?;
            info!(dir = %dir.display(), "Created configuration directory");
        }

        if !dir.is_dir() {
            bail!("{} exists but is not a directory", dir.display());
        }

        // Vérifier que le répertoire est utilisable.
        let probe = dir.join(".zpmusic_probe");
        fs::write(&probe, b"probe")
            .with_context(|| format!("Configuration directory {} is not writable", dir.display()))?;
        fs::read(&probe)
            .with_context(|| format!("Configuration directory {} is not readable", dir.display()))?;
        let _ = fs::remove_file(&probe);

        Ok(())
    }

    /// Apply `ZPMUSIC_CONFIG__SECTION__KEY=value` overrides to the tree.
    fn apply_env_overrides(data: &mut Value) {
        for (name, raw) in env::vars() {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let segments: Vec<String> = rest.split("__").map(|s| s.to_lowercase()).collect();
            let path: Vec<&str> = segments.iter().map(String::as_str).collect();
            let value = convert_env_value(&raw);
            match Config::set_value_internal(data, &path, value) {
                Ok(()) => debug!(variable = name.as_str(), "Applied environment override"),
                Err(err) => warn!(
                    variable = name.as_str(),
                    error = %err,
                    "Ignoring malformed environment override"
                ),
            }
        }
    }
}

macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $default:expr, $($path:expr),+) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value(&[$($path),+])? {
                Value::Number(n) => Ok(n.as_u64().unwrap_or($default as u64) as usize),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value(&[$($path),+], Value::Number(value.into()))
        }
    };
}

impl Config {
    impl_usize_config!(
        get_browse_page_size,
        set_browse_page_size,
        100,
        "controller",
        "browse",
        "page_size"
    );

    /// Minimum log level configured for the controller.
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["controller", "logger", "min_level"])? {
            Value::String(level) if !level.is_empty() => Ok(level),
            _ => Ok("INFO".to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: &str) -> Result<()> {
        self.set_value(
            &["controller", "logger", "min_level"],
            Value::String(level.to_string()),
        )
    }
}

/// Merge `other` over `base`, recursing into mappings.
fn merge_yaml(base: &mut Value, other: Value) {
    match other {
        Value::Mapping(other_map) => {
            if let Value::Mapping(base_map) = base {
                for (key, value) in other_map {
                    match base_map.get_mut(&key) {
                        Some(existing) => merge_yaml(existing, value),
                        None => {
                            base_map.insert(key, value);
                        }
                    }
                }
            } else {
                *base = Value::Mapping(other_map);
            }
        }
        other => *base = other,
    }
}

/// Lowercase every string key of the tree.
fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut lowered = Mapping::new();
            for (key, entry) in map {
                let key = match key {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                lowered.insert(key, lower_keys_value(entry));
            }
            Value::Mapping(lowered)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        other => other,
    }
}

/// Parse an environment override into the closest YAML type.
fn convert_env_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Number(serde_yaml::Number::from(f));
    }
    Value::String(raw.to_string())
}
