//! Configuration
//!
//! Layered, lowest precedence first:
//! 1. built-in defaults
//! 2. `dungeon-dsl.toml` in the working directory, or the file named by
//!    `--config` / `DUNGEON_DSL_CONFIG_PATH`
//! 3. `DUNGEON_DSL_*` environment variables, `__` between section and key
//!    (`DUNGEON_DSL_LOGGING__FILTER=debug`); `.env` files are read first
//! 4. explicit builder overrides

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};


pub const CONFIG_PATH_ENV: &str = "DUNGEON_DSL_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "dungeon-dsl.toml";
const ENV_PREFIX: &str = "DUNGEON_DSL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Files and directories to load
    pub paths: Vec<PathBuf>,
    /// Extension of source files found in directories
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Entry point `run` evaluates when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives
    pub filter: String,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Configuration from files and environment, without overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    source_paths: Vec<PathBuf>,
    entry_point: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Replaces the configured source paths; may be given more than once
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_paths.push(path.into());
        self
    }

    pub fn entry_point(mut self, entry_point: Option<String>) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn build(self) -> Result<Config> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let explicit_path = self
            .config_path
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut builder = config::Config::builder()
            .set_default("sources.paths", vec!["."])?
            .set_default("sources.extension", "dng")?
            .set_default("logging.filter", "info")?;

        builder = match &explicit_path {
            Some(path) => {
                let name = path.to_string_lossy();
                builder.add_source(File::new(&name, FileFormat::Toml).required(true))
            }
            None => builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("sources.paths")
                .try_parsing(true),
        );

        if !self.source_paths.is_empty() {
            let paths: Vec<String> = self
                .source_paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            builder = builder.set_override("sources.paths", paths)?;
        }
        if let Some(entry_point) = self.entry_point {
            builder = builder.set_override("interpreter.entry_point", entry_point)?;
        }

        let config = builder
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .with_context(|| match &explicit_path {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        tracing::debug!(
            sources = config.sources.paths.len(),
            extension = %config.sources.extension,
            "Configuration loaded"
        );
        Ok(config)
    }
}
