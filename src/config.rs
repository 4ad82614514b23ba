//! Configuration module for ilignore.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.ilignorerc.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Configuration file
//!
//! `--config <path>` wins and must exist. Otherwise `.ilignorerc.toml` is
//! looked up in the current directory, then in the home directory.
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `ILIGNORE_` and use double
//! underscores to separate nested levels:
//! - `ILIGNORE_CHECK__CONCURRENCY=4` sets `check.concurrency`
//! - `ILIGNORE_GIT__DIFF_FILTER=AM` sets `git.diff_filter`
//! - `ILIGNORE_LOGGING__DEFAULT=info` sets `logging.default`

use crate::pipeline::stages::checker::IGNORE_FILE;
use crate::pipeline::stages::source::DEFAULT_DIFF_FILTER;
use crate::pipeline::types::{ConflictField, FieldSelection, OutputFormat};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file.
pub const CONFIG_FILE: &str = ".ilignorerc.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "ILIGNORE_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file {path} not found")]
    NotFound { path: PathBuf },

    #[error("{path} already exists. Use --force to overwrite")]
    AlreadyExists { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// What to check and how to report it
    #[serde(default)]
    pub check: CheckConfig,

    /// Staged changes source
    #[serde(default)]
    pub git: GitConfig,

    /// Channel sizes of the check pipeline
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CheckConfig {
    /// Pattern files in .gitignore format
    #[serde(default = "default_ignore_files")]
    pub ignore_files: Vec<PathBuf>,

    /// Worker count: 0 = no concurrency, < 0 = one worker per CPU
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,

    /// Command whose output lists the files to check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Conflict fields to output (empty = all)
    #[serde(default)]
    pub fields: Vec<ConflictField>,

    /// Output only the names of conflicting files
    #[serde(default)]
    pub name_only: bool,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Exit with code 1 when conflicts are found
    #[serde(default)]
    pub fail_on_conflict: bool,

    /// Skip blank lines in explicit paths and command output instead of stopping
    #[serde(default = "default_true")]
    pub continue_on_empty: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GitConfig {
    /// Check changed files from `git diff` when no paths or input command are given
    #[serde(default)]
    pub staged: bool,

    /// Diff the index (`--cached`) rather than the work tree
    #[serde(default = "default_true")]
    pub cached: bool,

    /// Value of `--diff-filter`
    #[serde(default = "default_diff_filter")]
    pub diff_filter: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineSettings {
    #[serde(default = "default_path_channel_size")]
    pub path_channel_size: usize,

    #[serde(default = "default_job_channel_size")]
    pub job_channel_size: usize,

    /// Small on purpose: a slow consumer stalls the workers here
    #[serde(default = "default_conflict_channel_size")]
    pub conflict_channel_size: usize,

    #[serde(default = "default_error_channel_size")]
    pub error_channel_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `ilignore::pipeline = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_ignore_files() -> Vec<PathBuf> {
    vec![PathBuf::from(IGNORE_FILE)]
}
fn default_concurrency() -> i64 {
    -1
}
fn default_true() -> bool {
    true
}
fn default_diff_filter() -> String {
    DEFAULT_DIFF_FILTER.to_string()
}
fn default_path_channel_size() -> usize {
    256
}
fn default_job_channel_size() -> usize {
    256
}
fn default_conflict_channel_size() -> usize {
    16
}
fn default_error_channel_size() -> usize {
    16
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            check: CheckConfig::default(),
            git: GitConfig::default(),
            pipeline: PipelineSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            ignore_files: default_ignore_files(),
            concurrency: default_concurrency(),
            input: None,
            fields: Vec::new(),
            name_only: false,
            format: OutputFormat::default(),
            fail_on_conflict: false,
            continue_on_empty: true,
        }
    }
}

impl CheckConfig {
    /// Fields to output. `name_only` wins over `fields`.
    pub fn field_selection(&self) -> FieldSelection {
        if self.name_only {
            FieldSelection::name_only()
        } else {
            FieldSelection::new(self.fields.iter().copied())
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            staged: false,
            cached: true,
            diff_filter: default_diff_filter(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            path_channel_size: default_path_channel_size(),
            job_channel_size: default_job_channel_size(),
            conflict_channel_size: default_conflict_channel_size(),
            error_channel_size: default_error_channel_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Same config with another default level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.default = level.into();
        self
    }
}

impl Settings {
    /// Load configuration from all sources, reading `config_file` instead of
    /// the default lookup when given. A given file that does not exist is an
    /// error.
    pub fn load_with(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match config_file {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };
        match &config_path {
            Some(path) => tracing::debug!("[config] using {}", path.display()),
            None => tracing::debug!("[config] no {CONFIG_FILE} found, using defaults"),
        }
        Self::figment(config_path.as_deref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(Some(path.as_ref()))
    }

    fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        // Double underscore (__) separates nested levels
        figment.merge(
            Env::prefixed(ENV_PREFIX)
                .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
        )
    }

    /// Find `.ilignorerc.toml` in the current directory, then in the home
    /// directory.
    pub fn find_config_file() -> Option<PathBuf> {
        let local = std::env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE));
        let home = dirs::home_dir().map(|dir| dir.join(CONFIG_FILE));
        [local, home].into_iter().flatten().find(|path| path.is_file())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Create a default settings file in `dir`, plus a commented `.ilignore`
    /// template when none exists yet.
    pub fn init_config_file(dir: impl AsRef<Path>, force: bool) -> Result<PathBuf, ConfigError> {
        let dir = dir.as_ref();
        let config_path = dir.join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists { path: config_path });
        }

        Settings::default().save(&config_path)?;
        Self::create_default_ignore_file(dir)?;

        Ok(config_path)
    }

    fn create_default_ignore_file(dir: &Path) -> Result<(), ConfigError> {
        let ignore_path = dir.join(IGNORE_FILE);
        if ignore_path.exists() {
            return Ok(());
        }

        let default_content = r#"# ilignore patterns (gitignore syntax)
# https://git-scm.com/docs/gitignore
#
# Files matching these patterns must not be committed, even when they are
# already tracked. Check staged files with:
#
#   ilignore check --staged
#
# Later patterns take precedence; prefix a pattern with ! to re-include files.

# Local environment
.env
*.local

# Secrets
*.pem
*.key
"#;
        std::fs::write(&ignore_path, default_content)?;
        Ok(())
    }
}
