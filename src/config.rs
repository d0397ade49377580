//! Batch settings and the optional TOML config file.
//!
//! Precedence is CLI flag > config file > built-in default. The library only
//! knows [`BatchSettings`] and [`FileConfig`]; merging CLI flags on top is the
//! binary's job.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::fetch::constants::DEFAULT_MAX_ATTEMPTS;
use crate::pool::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::storage::DEFAULT_PRESIGN_TTL;

/// Default maximum number of items per batch.
pub const DEFAULT_MAX_ITEMS: usize = 50;

/// Upper bound accepted for `max_items`.
pub const MAX_ITEMS_LIMIT: usize = 1000;

/// Default file name of the produced archive.
pub const DEFAULT_ARCHIVE_NAME: &str = "trackbatch-tracks.zip";

/// Upper bound accepted for item and batch timeouts, in seconds.
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Upper bound accepted for presigned URL lifetimes (7 days), in seconds.
const MAX_PRESIGN_TTL_SECS: u64 = 604_800;

/// Upper bound accepted for `max_attempts`.
const MAX_ATTEMPTS_LIMIT: u32 = 20;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: String,
        /// Accepted range or shape.
        expected: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        field: &'static str,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// Outbound call retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempts per call on HTTP 429, first attempt included.
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Settings governing one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    /// Maximum number of items per batch.
    pub max_items: usize,
    /// Concurrent fetches.
    pub concurrency: usize,
    /// Per-item deadline.
    pub item_timeout: Option<Duration>,
    /// Whole-batch deadline.
    pub batch_timeout: Option<Duration>,
    /// Lifetime of the issued download URL.
    pub presign_ttl: Duration,
    /// Parent directory for workspaces; system temp when `None`.
    pub workspace_root: Option<PathBuf>,
    /// File name of the produced archive.
    pub archive_name: String,
    /// Outbound call retry settings.
    pub retry: RetrySettings,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            concurrency: DEFAULT_CONCURRENCY,
            item_timeout: None,
            batch_timeout: None,
            presign_ttl: DEFAULT_PRESIGN_TTL,
            workspace_root: None,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl BatchSettings {
    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ITEMS_LIMIT).contains(&self.max_items) {
            return Err(ConfigError::invalid(
                "max_items",
                self.max_items,
                format!("range 1..={MAX_ITEMS_LIMIT}"),
            ));
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                self.concurrency,
                format!("range {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"),
            ));
        }
        validate_timeout("item_timeout_secs", self.item_timeout, MAX_TIMEOUT_SECS)?;
        validate_timeout("batch_timeout_secs", self.batch_timeout, MAX_TIMEOUT_SECS)?;
        validate_timeout(
            "presign_ttl_secs",
            Some(self.presign_ttl),
            MAX_PRESIGN_TTL_SECS,
        )?;
        validate_archive_name(&self.archive_name)?;
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.retry.max_attempts) {
            return Err(ConfigError::invalid(
                "max_attempts",
                self.retry.max_attempts,
                format!("range 1..={MAX_ATTEMPTS_LIMIT}"),
            ));
        }
        Ok(())
    }
}

fn validate_timeout(
    field: &'static str,
    value: Option<Duration>,
    max_secs: u64,
) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.is_zero() || value.as_secs() > max_secs {
        return Err(ConfigError::invalid(
            field,
            value.as_secs(),
            format!("range 1..={max_secs}"),
        ));
    }
    Ok(())
}

fn validate_archive_name(name: &str) -> Result<(), ConfigError> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && name.to_lowercase().ends_with(".zip");
    if plain {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "archive_name",
            name,
            "a plain file name ending in .zip",
        ))
    }
}

/// TOML-backed file configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Maximum number of items per batch.
    pub max_items: Option<usize>,
    /// Concurrent fetches.
    pub concurrency: Option<usize>,
    /// Per-item deadline in seconds.
    pub item_timeout_secs: Option<u64>,
    /// Whole-batch deadline in seconds.
    pub batch_timeout_secs: Option<u64>,
    /// Download URL lifetime in seconds.
    pub presign_ttl_secs: Option<u64>,
    /// Parent directory for workspaces.
    pub workspace_root: Option<PathBuf>,
    /// Archive file name.
    pub archive_name: Option<String>,
    /// Attempts per outbound call on HTTP 429.
    pub max_attempts: Option<u32>,
    /// Directory backing the local object store.
    pub store_dir: Option<PathBuf>,
    /// External fetch program.
    pub fetcher: Option<String>,
    /// Argument template for the fetch program.
    pub fetcher_args: Option<Vec<String>>,
    /// Base URL of the track metadata API.
    pub api_base: Option<String>,
}

impl FileConfig {
    /// Parses config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Overlays the values present in this file onto `settings`.
    #[must_use]
    pub fn apply_to(&self, mut settings: BatchSettings) -> BatchSettings {
        if let Some(max_items) = self.max_items {
            settings.max_items = max_items;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if let Some(secs) = self.item_timeout_secs {
            settings.item_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.batch_timeout_secs {
            settings.batch_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.presign_ttl_secs {
            settings.presign_ttl = Duration::from_secs(secs);
        }
        if let Some(root) = &self.workspace_root {
            settings.workspace_root = Some(root.clone());
        }
        if let Some(name) = &self.archive_name {
            settings.archive_name.clone_from(name);
        }
        if let Some(max_attempts) = self.max_attempts {
            settings.retry.max_attempts = max_attempts;
        }
        settings
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/trackbatch/config.toml`
/// 2. `$HOME/.config/trackbatch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("trackbatch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("trackbatch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` if given (it must exist), else the default path if present.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file exists but cannot be read or parsed.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>, ConfigError> {
    if let Some(path) = explicit {
        return FileConfig::load(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => FileConfig::load(&path).map(Some),
        _ => Ok(None),
    }
}
