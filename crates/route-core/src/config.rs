//! Configuration parsing for the router.
//!
//! Uses a key=value format read from `.router/config`.
//! Precedence: CLI flags > `--config` file > `.router/config` > defaults.

use crate::skills::{HITL_CATEGORY, SEQUENCE_CATEGORY};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("invalid number for {key}: {value} (expected a value within [0, 1])")]
    InvalidThreshold { key: String, value: String },
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: String,
        value: String,
        min: usize,
        max: usize,
    },
}

/// Upper bound on candidates returned with a decision.
pub const MAX_CANDIDATES: usize = 5;

/// Upper bound on message characters stored with a logged decision.
pub const MAX_SNIPPET_CHARS: usize = 200;

/// Router configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    // Routing thresholds
    /// Minimum confidence for a sequence to win the first phase (default: 0.7).
    pub sequence_threshold: f64,
    /// Minimum confidence for any candidate to be selected (default: 0.5).
    pub individual_threshold: f64,
    /// Maximum candidates returned with a decision (1..=5, default: 5).
    pub max_candidates: usize,

    // Categories
    pub sequence_category: String,
    pub hitl_category: String,

    // Semantic matching
    /// Merge similarity matches into the individual phase (default: false).
    pub semantic_enabled: bool,
    pub semantic_threshold: f64,
    pub semantic_limit: usize,
    pub embedding_dims: usize,

    // Catalog import
    /// Directory of YAML skill definitions imported on daemon start (default: skills/).
    pub catalog_dir: PathBuf,
    pub catalog_import_on_start: bool,

    // Decision log
    pub log_decisions: bool,
    /// Maximum characters of the message stored with a logged decision (1..=200, default: 200).
    pub message_snippet_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sequence_threshold: 0.7,
            individual_threshold: 0.5,
            max_candidates: MAX_CANDIDATES,
            sequence_category: SEQUENCE_CATEGORY.to_string(),
            hitl_category: HITL_CATEGORY.to_string(),
            semantic_enabled: false,
            semantic_threshold: 0.5,
            semantic_limit: 5,
            embedding_dims: 384,
            catalog_dir: PathBuf::from("skills"),
            catalog_import_on_start: true,
            log_decisions: true,
            message_snippet_chars: MAX_SNIPPET_CHARS,
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    /// Apply a single config value.
    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "sequence_threshold" => self.sequence_threshold = Self::parse_threshold(key, value)?,
            "individual_threshold" => {
                self.individual_threshold = Self::parse_threshold(key, value)?;
            }
            "max_candidates" => {
                self.max_candidates = Self::parse_int_in(key, value, 1, MAX_CANDIDATES)?;
            }
            "sequence_category" => self.sequence_category = value.to_string(),
            "hitl_category" => self.hitl_category = value.to_string(),
            "semantic_enabled" => self.semantic_enabled = Self::parse_bool(key, value)?,
            "semantic_threshold" => self.semantic_threshold = Self::parse_threshold(key, value)?,
            "semantic_limit" => self.semantic_limit = Self::parse_int(key, value)?,
            "embedding_dims" => {
                let dims = Self::parse_int(key, value)?;
                if dims == 0 {
                    return Err(ConfigError::InvalidInt {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.embedding_dims = dims;
            }
            "catalog_dir" => self.catalog_dir = PathBuf::from(value),
            "catalog_import_on_start" => {
                self.catalog_import_on_start = Self::parse_bool(key, value)?;
            }
            "log_decisions" => self.log_decisions = Self::parse_bool(key, value)?,
            "message_snippet_chars" => {
                self.message_snippet_chars = Self::parse_int_in(key, value, 1, MAX_SNIPPET_CHARS)?;
            }
            _ => {
                tracing::warn!(key, "unknown config key");
            }
        }
        Ok(())
    }

    /// Parse a boolean value.
    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn parse_int(key: &str, value: &str) -> Result<usize, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_int_in(key: &str, value: &str, min: usize, max: usize) -> Result<usize, ConfigError> {
        let n = Self::parse_int(key, value)?;
        if !(min..=max).contains(&n) {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                value: value.to_string(),
                min,
                max,
            });
        }
        Ok(n)
    }

    /// Parse a confidence threshold; must lie within `[0, 1]`.
    fn parse_threshold(key: &str, value: &str) -> Result<f64, ConfigError> {
        match value.parse::<f64>() {
            Ok(v) if (0.0..=1.0).contains(&v) => Ok(v),
            _ => Err(ConfigError::InvalidThreshold {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Candidate cap actually applied, for configs built without `parse_content`.
    pub fn candidate_cap(&self) -> usize {
        self.max_candidates.clamp(1, MAX_CANDIDATES)
    }

    /// Snippet length actually applied, capped at [`MAX_SNIPPET_CHARS`].
    pub fn snippet_chars(&self) -> usize {
        self.message_snippet_chars.clamp(1, MAX_SNIPPET_CHARS)
    }

    /// Resolve relative paths against a workspace root.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if self.catalog_dir.is_relative() {
            self.catalog_dir = workspace_root.join(&self.catalog_dir);
        }
    }
}
