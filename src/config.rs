//! Server configuration layered from an optional TOML file and
//! `BINSIFT__*` environment variables.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::search::SearchConfig;
use crate::types::{DocumentScope, DEFAULT_DIMENSION};

/// Top-level application configuration loaded from file + environment.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub search: SearchSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from disk and environment.
    ///
    /// Environment variables use the `BINSIFT` prefix and `__` between
    /// section and key, e.g. `BINSIFT__SEARCH__SCAN_CAP=50000`.
    pub fn load() -> Result<Self> {
        let config_path = env::var("BINSIFT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let mut builder = config::Config::builder();

        if Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::from(PathBuf::from(&config_path)));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("BINSIFT")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("search.document_kinds")
                .with_list_parse_key("search.document_statuses")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        let mut config: Self = settings.try_deserialize()?;

        if config.logging.level.trim().is_empty() {
            config.logging.level = "info".to_string();
        }

        Ok(config)
    }

    /// Validate the search section into runtime funnel parameters.
    pub fn search_config(&self) -> Result<SearchConfig> {
        let search = SearchConfig {
            dimension: self.search.dimension,
            scan_cap: self.search.scan_cap,
            candidate_factor: self.search.candidate_factor,
            rerank_factor: self.search.rerank_factor,
            scope: DocumentScope {
                kinds: self.search.document_kinds.clone(),
                statuses: self.search.document_statuses.clone(),
            },
        };
        search.validate().context("invalid search configuration")?;
        Ok(search)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub dimension: usize,
    pub scan_cap: usize,
    pub candidate_factor: usize,
    pub rerank_factor: usize,
    /// Empty means every kind is searchable
    pub document_kinds: Vec<String>,
    pub document_statuses: Vec<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        let defaults = SearchConfig::default();
        Self {
            dimension: DEFAULT_DIMENSION,
            scan_cap: defaults.scan_cap,
            candidate_factor: defaults.candidate_factor,
            rerank_factor: defaults.rerank_factor,
            document_kinds: defaults.scope.kinds,
            document_statuses: defaults.scope.statuses,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    /// Directory for the embedding journal; unset keeps everything in memory
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}
