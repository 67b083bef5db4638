//! Configuration loading
//!
//! Settings come from a TOML file (`tern.toml` by default) overlaid with
//! `TERN__...` environment variables, using `__` as the nesting separator:
//!
//! ```toml
//! directory = "tern/"
//!
//! [adapter]
//! backend = "postgres"
//! host = "localhost"
//! dbname = "app"
//! username = "app"
//! password = "secret"
//! table = "tern"
//! ```
//!
//! `TERN__ADAPTER__PASSWORD=...` overrides `adapter.password`, and so on.

use crate::adapter::tracking::{self, DEFAULT_TABLE};
use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Backend selection and connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Registry name of the backend
    pub backend: String,
    /// Server host, or the database file for sqlite
    pub host: Option<String>,
    pub dbname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Full connection URL; overrides the individual parts where supported
    pub url: Option<String>,
    /// Tracking table name
    pub table: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            backend: "postgres".to_string(),
            host: None,
            dbname: None,
            username: None,
            password: None,
            url: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("tern/")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TernConfig {
    /// Changeset directory; relative paths are resolved against the config file
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub adapter: AdapterConfig,
}

impl Default for TernConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            adapter: AdapterConfig::default(),
        }
    }
}

impl TernConfig {
    pub const DEFAULT_FILE: &'static str = "tern.toml";
    pub const ENV_PREFIX: &'static str = "TERN";

    /// Load from `path` (required) or `tern.toml` (optional), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(Self::ENV_PREFIX).separator("__"))
    }

    /// Like [`TernConfig::load`] with an explicit environment source
    pub fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(Self::DEFAULT_FILE), false),
        };
        log::debug!("Loading configuration from {}", file.display());

        let settings = Config::builder()
            .add_source(File::new(&file.to_string_lossy(), FileFormat::Toml).required(required))
            .add_source(environment)
            .build()?;
        let mut loaded: TernConfig = settings.try_deserialize()?;

        tracking::validate_table_name(&loaded.adapter.table)?;
        if loaded.directory.is_relative() {
            if let Some(parent) = file.parent() {
                loaded.directory = parent.join(&loaded.directory);
            }
        }
        Ok(loaded)
    }
}
