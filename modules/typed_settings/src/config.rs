//! Configuration for the settings store

use crate::contract::PropertyType;
use crate::domain::crypto::Crypto;
use anyhow::Context;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variables overriding file configuration, e.g. `SETTINGS_DEFAULTS__INT=1`
pub const ENV_PREFIX: &str = "SETTINGS_";

/// Settings store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Repository used by settings types that do not name one
    #[serde(default = "default_repository")]
    pub default_repository: String,

    /// Named repositories
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryConfig>,

    /// Base64 32-byte key for encrypted properties
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Fallback values per scalar type
    #[serde(default)]
    pub defaults: ScalarDefaults,

    /// What to do with "Create…" migrations that match no settings type
    #[serde(default)]
    pub migration_resolution: ResolutionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_repository: default_repository(),
            repositories: BTreeMap::new(),
            encryption_key: None,
            defaults: ScalarDefaults::default(),
            migration_resolution: ResolutionPolicy::default(),
        }
    }
}

fn default_repository() -> String {
    "default".to_string()
}

/// Backend of a named repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum RepositoryConfig {
    /// SQL database reached through sea-orm
    Database {
        url: String,
        #[serde(default)]
        max_connections: Option<u32>,
    },
    /// Process-local map
    Memory,
}

/// Global default table used when a property has no declared default
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalarDefaults {
    #[serde(rename = "bool", default)]
    pub boolean: bool,
    #[serde(default)]
    pub int: i64,
    #[serde(default)]
    pub float: f64,
    #[serde(default)]
    pub string: String,
    #[serde(default)]
    pub list: Vec<Value>,
}

impl Default for ScalarDefaults {
    fn default() -> Self {
        Self {
            boolean: false,
            int: 0,
            float: 0.0,
            string: String::new(),
            list: Vec::new(),
        }
    }
}

impl ScalarDefaults {
    /// Default for a built-in scalar or list type
    pub fn for_type(&self, ty: &PropertyType) -> Option<Value> {
        match ty {
            PropertyType::Bool => Some(Value::Bool(self.boolean)),
            PropertyType::Int => Some(Value::from(self.int)),
            PropertyType::Float => Some(Value::from(self.float)),
            PropertyType::String => Some(Value::String(self.string.clone())),
            PropertyType::List(_) => Some(Value::Array(self.list.clone())),
            _ => None,
        }
    }
}

/// Resolution policy for migrations named after settings types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// Unresolvable migrations do nothing
    #[default]
    Soft,
    /// Unresolvable migrations fail with `UnresolvedMigration`
    Strict,
}

impl Config {
    /// Layered sources: optional YAML file, then `SETTINGS_*` environment
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        figment
            .extract()
            .context("failed to load settings store configuration")
    }

    /// Cipher for encrypted properties
    ///
    /// Without a configured key a random one is generated, so encrypted
    /// values written by this process cannot be read after a restart.
    pub fn crypto(&self) -> anyhow::Result<Crypto> {
        match &self.encryption_key {
            Some(key) => Crypto::from_base64_key(key).context("invalid encryption_key"),
            None => {
                tracing::warn!("no encryption_key configured, using an ephemeral key");
                Ok(Crypto::generate())
            }
        }
    }
}
