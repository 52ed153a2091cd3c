//! Layered configuration for `offtrac`.
//!
//! Precedence, lowest to highest: built-in defaults, the user file
//! (`~/.config/offtrac/config.yaml`), the project file (`./offtrac.yaml`),
//! `OFFTRAC_*` environment variables, then command-line flags. Keys are
//! normalized to lower-case kebab form (`batch_size` == `batch-size`).

use crate::error::{OfftracError, Result};
use crate::remote::{DEFAULT_BATCH_SIZE, DEFAULT_RPC_PATH, RemoteConfig};
use crate::snapshot::GitIdentity;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the project config file, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "offtrac.yaml";
const ENV_PREFIX: &str = "OFFTRAC_";

/// One source of key/value settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Build a layer from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let mut flat = HashMap::new();
        flatten_yaml(&value, "", &mut flat);
        let mut layer = Self::default();
        for (key, value) in flat {
            layer.set(&key, value);
        }
        Ok(layer)
    }

    /// Build a layer from `OFFTRAC_*` variables.
    #[must_use]
    pub fn from_env_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.set(stripped, value);
            }
        }
        layer
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }
}

/// Command-line overrides (the highest-precedence layer).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root: Option<PathBuf>,
    pub url: Option<String>,
    pub user: Option<String>,
    pub batch_size: Option<usize>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        if let Some(root) = &self.root {
            layer.set("root", root.to_string_lossy());
        }
        if let Some(url) = &self.url {
            layer.set("url", url.clone());
        }
        if let Some(user) = &self.user {
            layer.set("user", user.clone());
        }
        if let Some(batch_size) = self.batch_size {
            layer.set("batch-size", batch_size.to_string());
        }
        layer
    }
}

/// Built-in defaults.
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.set("url", "https://trac.example.org");
    layer.set("rpc-path", DEFAULT_RPC_PATH);
    layer.set("user", env::var("USER").unwrap_or_default());
    layer.set("password", "");
    layer.set("root", "./db");
    layer.set("database", "offtrac.db");
    layer.set("batch-size", DEFAULT_BATCH_SIZE.to_string());
    layer.set("retries", "3");
    layer.set("retry-delay-ms", "10");
    layer.set("timeout-secs", "60");
    layer.set("git", "git");
    layer.set("git-author-name", "offtrac");
    layer.set("git-author-email", "offtrac@localhost");
    layer
}

/// Load user config (`~/.config/offtrac/config.yaml`).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("offtrac")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Load project config (`./offtrac.yaml`).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(dir: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&dir.join(PROJECT_CONFIG_FILE))
}

/// Resolve settings from every layer.
///
/// # Errors
///
/// Returns an error if a config file cannot be parsed or a value is invalid.
pub fn load_settings(overrides: &CliOverrides) -> Result<Settings> {
    let cwd = env::current_dir()?;
    let merged = ConfigLayer::merge_layers(&[
        default_config_layer(),
        load_user_config()?,
        load_project_config(&cwd)?,
        ConfigLayer::from_env(),
        overrides.as_layer(),
    ]);
    Settings::from_layer(&merged)
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub url: String,
    pub rpc_path: String,
    pub user: String,
    pub password: String,
    pub root: PathBuf,
    pub database: String,
    pub batch_size: usize,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub git: String,
    pub git_author_name: String,
    pub git_author_email: String,
}

impl Settings {
    /// Read settings from a merged layer; missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `Config` for unparseable numbers or a zero batch size.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let mut merged = default_config_layer();
        merged.merge_from(layer);
        let text = |key: &str| merged.get(key).unwrap_or_default().to_string();

        let batch_size: usize = parse_value(&merged, "batch-size")?;
        if batch_size == 0 {
            return Err(OfftracError::Config(
                "batch-size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            url: text("url"),
            rpc_path: text("rpc-path"),
            user: text("user"),
            password: text("password"),
            root: PathBuf::from(text("root")),
            database: text("database"),
            batch_size,
            retries: parse_value(&merged, "retries")?,
            retry_delay_ms: parse_value(&merged, "retry-delay-ms")?,
            timeout_secs: parse_value(&merged, "timeout-secs")?,
            git: text("git"),
            git_author_name: text("git-author-name"),
            git_author_email: text("git-author-email"),
        })
    }

    /// Path of the relational index inside the snapshot root.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.root.join(&self.database)
    }

    #[must_use]
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            url: self.url.clone(),
            rpc_path: self.rpc_path.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            retries: self.retries,
            retry_delay_ms: self.retry_delay_ms,
            timeout_secs: self.timeout_secs,
            batch_size: self.batch_size,
        }
    }

    #[must_use]
    pub fn git_identity(&self) -> GitIdentity {
        GitIdentity {
            name: self.git_author_name.clone(),
            email: self.git_author_email.clone(),
        }
    }
}

fn parse_value<T: FromStr>(layer: &ConfigLayer, key: &str) -> Result<T> {
    let raw = layer.get(key).unwrap_or_default().trim();
    raw.parse()
        .map_err(|_| OfftracError::Config(format!("Invalid value for {key}: {raw:?}")))
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
