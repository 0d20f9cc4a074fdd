mod loader;
pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use value::{ConfigValue, FromConfigValue};

/// Environment variable selecting the active profile.
pub const PROFILE_ENV: &str = "RPCNEST_PROFILE";

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key is not set.
    NotFound(String),
    /// The value exists but has the wrong shape.
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A file could not be read or parsed.
    Load(String),
    /// A value parsed but is not acceptable.
    Invalid { key: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch {
                key,
                expected,
                found,
            } => write!(f, "Config type mismatch for '{key}': expected {expected}, found {found}"),
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration from YAML files, `.env` files and the
/// environment.
///
/// Resolution order, lowest priority first:
/// 1. `application.yaml`
/// 2. `application-{profile}.yaml`
/// 3. `.env` then `.env.{profile}` (never overwrite variables already set)
/// 4. environment variables (`RPC_HTTP_PREFIX` overrides `rpc.http.prefix`)
///
/// The profile is `RPCNEST_PROFILE` if set, else the argument.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl RpcConfig {
    /// Load from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile)
    }

    /// Load the configuration files found in `dir`.
    pub fn load_from(dir: &Path, profile: &str) -> Result<Self, ConfigError> {
        let profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| profile.to_string());
        let mut values = HashMap::new();

        loader::load_yaml_file(&dir.join("application.yaml"), &mut values)?;
        loader::load_yaml_file(&dir.join(format!("application-{profile}.yaml")), &mut values)?;

        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{profile}")));

        // `RPC_AUTO_DISCOVERY` also overrides `rpc.auto-discovery`.
        for (env_key, env_val) in std::env::vars() {
            let key = env_key.to_lowercase().replace('_', ".");
            let hyphenated: Vec<String> = values
                .keys()
                .filter(|k| k.contains('-') && dotted(k) == key)
                .cloned()
                .collect();
            for k in hyphenated {
                values.insert(k, ConfigValue::String(env_val.clone()));
            }
            values.insert(key, ConfigValue::String(env_val));
        }

        Ok(Self { values, profile })
    }

    /// Build a configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(Self {
            values,
            profile: profile.to_string(),
        })
    }

    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Read `key`. A hyphenated key absent from the files is also looked up
    /// in its environment spelling, so `rpc.sse.heartbeat-ms` reads
    /// `RPC_SSE_HEARTBEAT_MS`.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .lookup(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    fn lookup(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key).or_else(|| {
            if key.contains('-') {
                self.values.get(&dotted(key))
            } else {
                None
            }
        })
    }

    /// Read `key`, falling back to `default` only when it is absent. A present
    /// value of the wrong type is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Direct child names under `prefix`, sorted. `children("rpc.hints")`
    /// lists the routers that have hints.
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let lead = format!("{prefix}.");
        let mut names: Vec<String> = self
            .values
            .keys()
            .filter_map(|key| key.strip_prefix(&lead))
            .filter(|rest| !rest.is_empty() && !rest.contains('.'))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

fn dotted(key: &str) -> String {
    key.replace('-', ".")
}
