//! Configuration boundary: loading settings and validating the watch target.
//!
//! Settings are read once at startup and shared read-only for the whole
//! session. Both JSON and TOML documents are accepted; the format is chosen by
//! file extension (`.toml` is TOML, anything else is JSON).
//!
//! # Configuration File Format
//!
//! ```json
//! {
//!     "watch_directory": "/home/user/Downloads",
//!     "handle_duplicates": true,
//!     "categories": {
//!         "Images": [".jpg", ".png"],
//!         "Documents": { "PDF": [".pdf"], "Word": [".docx"] },
//!         "Temp": [".tmp", ".crdownload"]
//!     },
//!     "debounce_ms": 500,
//!     "poll_interval_ms": 1000,
//!     "progress_interval": 10,
//!     "ignore": {
//!         "filenames": ["desktop.ini"],
//!         "patterns": ["~$*"],
//!         "regex": [],
//!         "skip_hidden": false
//!     }
//! }
//! ```
//!
//! Every field is optional. A missing `categories` table falls back to the
//! built-in one; a missing `watch_directory` must be supplied by the caller
//! before a session can start.

use crate::file_category::CategoryTable;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name probed in the watch directory to prove it is writable.
const WRITE_PROBE: &str = ".__dirsorter_write_test.tmp";

/// Errors that can occur while loading configuration or validating the target.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("No watch directory configured; choose a folder to organize first")]
    MissingWatchDirectory,

    #[error("Cannot use {} as watch directory: {reason}", path.display())]
    InvalidWatchDirectory { path: PathBuf, reason: String },

    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Settings for one organizer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    /// Directory to organize and watch. Empty means "not chosen yet".
    pub watch_directory: String,
    /// Ordered category table.
    pub categories: CategoryTable,
    /// Rename colliding destinations to `name (n).ext` instead of replacing them.
    pub handle_duplicates: bool,
    /// Delay before classifying a freshly created file.
    pub debounce_ms: u64,
    /// How often the polling watcher rescans the directory.
    pub poll_interval_ms: u64,
    /// Emit a sweep progress event every this many files; 0 disables them.
    pub progress_interval: usize,
    /// Files neither the sweep nor the watcher should touch.
    pub ignore: IgnoreRules,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            watch_directory: String::new(),
            categories: CategoryTable::default(),
            handle_duplicates: true,
            debounce_ms: 500,
            poll_interval_ms: 1000,
            progress_interval: 10,
            ignore: IgnoreRules::default(),
        }
    }
}

impl OrganizerConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. `dirsorter.json`, then `dirsorter.toml`, in the current directory
    /// 3. `~/.config/dirsorter/config.toml`
    /// 4. Built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered or explicitly given file cannot be
    /// read or parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        for local in ["dirsorter.json", "dirsorter.toml"] {
            let local_config = PathBuf::from(local);
            if local_config.exists() {
                return Self::load_from_file(&local_config);
            }
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dirsorter")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };

        parsed.map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Validates the configured watch directory.
    ///
    /// # Errors
    ///
    /// `MissingWatchDirectory` if none is configured, otherwise whatever
    /// [`WatchTarget::validate`] reports.
    pub fn watch_target(&self) -> Result<WatchTarget, ConfigError> {
        if self.watch_directory.trim().is_empty() {
            return Err(ConfigError::MissingWatchDirectory);
        }
        WatchTarget::validate(Path::new(self.watch_directory.trim()))
    }
}

/// A directory that exists, is writable, and is given as a canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    path: PathBuf,
}

impl WatchTarget {
    /// Checks that `path` is an existing, writable directory.
    ///
    /// Writability is proven by creating and removing a small probe file.
    pub fn validate(path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidWatchDirectory {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if !path.exists() {
            return Err(invalid("the folder does not exist"));
        }
        if !path.is_dir() {
            return Err(invalid("not a folder"));
        }

        let canonical = path
            .canonicalize()
            .map_err(|e| invalid(&format!("cannot resolve path: {}", e)))?;

        let probe = canonical.join(WRITE_PROBE);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .map_err(|e| invalid(&format!("the folder is not writable: {}", e)))?;
        fs::remove_file(&probe)
            .map_err(|e| invalid(&format!("could not remove write probe: {}", e)))?;

        Ok(Self { path: canonical })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Files to leave alone entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreRules {
    /// Exact file names (e.g. "desktop.ini").
    pub filenames: Vec<String>,
    /// Glob patterns matched against the file name (e.g. "~$*").
    pub patterns: Vec<String>,
    /// Regex patterns matched against the file name.
    pub regex: Vec<String>,
    /// Skip names starting with a dot.
    pub skip_hidden: bool,
}

impl IgnoreRules {
    /// Compile the rules for matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn compile(&self) -> Result<CompiledIgnore, ConfigError> {
        let patterns = self
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let regexes = self
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledIgnore {
            skip_hidden: self.skip_hidden,
            filenames: self.filenames.iter().cloned().collect(),
            patterns,
            regexes,
        })
    }
}

/// Pre-compiled ignore rules.
#[derive(Debug, Clone, Default)]
pub struct CompiledIgnore {
    skip_hidden: bool,
    filenames: HashSet<String>,
    patterns: Vec<Pattern>,
    regexes: Vec<Regex>,
}

impl CompiledIgnore {
    /// Whether the file at `path` must not be classified.
    ///
    /// Checks, in order: hidden names, exact names, globs, regexes.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        if self.skip_hidden && file_name.starts_with('.') {
            return true;
        }
        if self.filenames.contains(file_name.as_ref()) {
            return true;
        }
        if self.patterns.iter().any(|p| p.matches(&file_name)) {
            return true;
        }
        self.regexes.iter().any(|r| r.is_match(&file_name))
    }
}
