//! Configuration management for the schema resolver
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-resolver.toml)
//! - Environment variables (SCHEMA_RESOLVER__*)
//!
//! ## Example config file (schema-resolver.toml):
//! ```toml
//! [resolver]
//! auto-register = true
//! auto-register-if-exists = "RETURN_OR_UPDATE"
//! find-latest = false
//!
//! [strategy]
//! table-id-header = "__from_table"
//!
//! [transform]
//! topic-regex = "mimic4demo.(.*)"
//! header-name = "__dbz_table"
//! header-value-format = "__$1"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::artifact::IfExists;
use crate::cache::header_value::DEFAULT_CAPACITY;
use crate::strategy::DEFAULT_TABLE_ID_HEADER;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Artifact reference strategy settings
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Topic-name header enrichment, disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TopicHeaderConfig>,
}

/// Resolver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolverConfig {
    /// Register schemas that are not in the registry yet
    #[serde(default, alias = "auto_register")]
    pub auto_register: bool,

    /// Policy when an auto-registered artifact already exists
    #[serde(default, alias = "auto_register_if_exists")]
    pub auto_register_if_exists: IfExists,

    /// Resolve the latest version by coordinates instead of by content
    #[serde(default, alias = "find_latest")]
    pub find_latest: bool,

    /// Fetch content with nested references inlined
    #[serde(default, alias = "register_dereferenced")]
    pub register_dereferenced: bool,

    /// Schema to register when the payload does not carry one
    #[serde(default, alias = "explicit_schema_location", skip_serializing_if = "Option::is_none")]
    pub explicit_schema_location: Option<String>,

    #[serde(default, alias = "explicit_artifact_group_id", skip_serializing_if = "Option::is_none")]
    pub explicit_artifact_group_id: Option<String>,

    #[serde(default, alias = "explicit_artifact_id", skip_serializing_if = "Option::is_none")]
    pub explicit_artifact_id: Option<String>,

    #[serde(default, alias = "explicit_artifact_version", skip_serializing_if = "Option::is_none")]
    pub explicit_artifact_version: Option<String>,
}

/// Strategy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StrategyConfig {
    /// Header carrying the originating table
    #[serde(default = "default_table_id_header", alias = "table_id_header")]
    pub table_id_header: String,
}

/// Topic-name header enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TopicHeaderConfig {
    /// Must match the whole topic name
    #[serde(alias = "topic_regex")]
    pub topic_regex: String,

    #[serde(alias = "header_name")]
    pub header_name: String,

    /// `$n` inserts capture group `n`, `\` escapes the next character
    #[serde(alias = "header_value_format")]
    pub header_value_format: String,

    /// Number of topics whose header value is memoized
    #[serde(default = "default_cache_size", alias = "cache_size")]
    pub cache_size: usize,
}

// Default value functions
fn default_table_id_header() -> String {
    DEFAULT_TABLE_ID_HEADER.to_string()
}

fn default_cache_size() -> usize {
    DEFAULT_CAPACITY
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            table_id_header: default_table_id_header(),
        }
    }
}

impl TopicHeaderConfig {
    pub fn new(
        topic_regex: impl Into<String>,
        header_name: impl Into<String>,
        header_value_format: impl Into<String>,
    ) -> Self {
        Self {
            topic_regex: topic_regex.into(),
            header_name: header_name.into(),
            header_value_format: header_value_format.into(),
            cache_size: default_cache_size(),
        }
    }
}

impl Settings {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "schema-resolver.toml",
            ".schema-resolver.toml",
            "config/schema-resolver.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "cdc", "schema-resolver") {
            let xdg_config = config_dir.config_dir().join("schema-resolver.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (SCHEMA_RESOLVER__*)
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_RESOLVER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
