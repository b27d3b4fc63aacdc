//! Pipeline configuration.
//!
//! A configuration is an ordered mapping from operation name to argument.
//! Key order is the order operations are applied to each image, so it is kept
//! exactly as written:
//!
//! ```json
//! {
//!   "extract": { "left": 0, "top": 0, "width": 800, "height": 600 },
//!   "resize": [400, null, { "fit": "inside" }],
//!   "rotate": true,
//!   "output": "webp"
//! }
//! ```
//!
//! The same configuration in TOML (no `null`: omit trailing dimensions):
//!
//! ```toml
//! extract = { left = 0, top = 0, width = 800, height = 600 }
//! resize = [400]
//! rotate = true
//! output = "webp"
//! ```
//!
//! ## Rules
//!
//! - At least one of `resize`, `extract` or `scale` must be present.
//! - `resize` must be an array: `[width, height?, options?]`.
//! - `output` names the target encoding. It is applied after every other step
//!   and renames the file's extension.
//! - `null` values are treated as absent, so optional steps can be switched
//!   off without removing the key.
//!
//! Argument shapes are decided here, once, not per file: a JSON array becomes
//! [`Args::Positional`], anything else [`Args::Single`].

use crate::imaging::OutputFormat;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("imgpipe: Missing options object")]
    Missing,
    #[error("imgpipe: options object must be a plain key-value mapping")]
    NotAMapping,
    #[error("imgpipe: Please specify an extract, resize or scale property in your options object")]
    NoSizingStep,
    #[error("imgpipe: options.resize must be an array")]
    ResizeNotSequence,
    #[error("imgpipe: options.output must name a format (jpeg, png, webp, tiff, avif), got {0}")]
    UnknownOutputFormat(String),
    #[error("imgpipe: invalid argument for options.{key}: {reason}")]
    InvalidArgument { key: String, reason: String },
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unsupported config file type: {0} (expected .json or .toml)")]
    UnsupportedFile(PathBuf),
}

/// Argument to a configured operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Args {
    /// Passed as the sole argument.
    Single(Value),
    /// Spread as positional arguments.
    Positional(Vec<Value>),
}

impl From<Value> for Args {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Args::Positional(items),
            other => Args::Single(other),
        }
    }
}

/// Requested output encoding, with the name as written (used for the new extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub name: String,
    pub format: OutputFormat,
}

/// Validated, ordered configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    entries: Vec<(String, Args)>,
    output: Option<Output>,
}

const SIZING_KEYS: [&str; 3] = ["resize", "extract", "scale"];

fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

impl Configuration {
    /// Validate a raw configuration value.
    ///
    /// `Value::Null` stands for a missing configuration object.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = match value {
            Value::Null => return Err(ConfigError::Missing),
            Value::Object(map) => map,
            _ => return Err(ConfigError::NotAMapping),
        };

        if SIZING_KEYS.iter().all(|key| present(map, key).is_none()) {
            return Err(ConfigError::NoSizingStep);
        }
        if present(map, "resize").is_some_and(|v| !v.is_array()) {
            return Err(ConfigError::ResizeNotSequence);
        }

        let output = match present(map, "output") {
            None => None,
            Some(Value::String(name)) => {
                let format = OutputFormat::from_name(name)
                    .ok_or_else(|| ConfigError::UnknownOutputFormat(name.clone()))?;
                Some(Output {
                    name: name.clone(),
                    format,
                })
            }
            Some(other) => return Err(ConfigError::UnknownOutputFormat(other.to_string())),
        };

        let entries = map
            .iter()
            .filter(|(key, value)| key.as_str() != "output" && !value.is_null())
            .map(|(key, value)| (key.clone(), Args::from(value.clone())))
            .collect();

        Ok(Self { entries, output })
    }

    /// Layer `overrides` on top of `defaults` and validate the result.
    pub fn with_defaults(defaults: &Value, overrides: &Value) -> Result<Self, ConfigError> {
        if overrides.is_null() {
            return Err(ConfigError::Missing);
        }
        Self::from_value(&merge(defaults, overrides))
    }

    /// Configured steps in application order, `output` excluded.
    pub fn entries(&self) -> &[(String, Args)] {
        &self.entries
    }

    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }
}

/// Deep-merge two configuration values into a new one.
///
/// Objects merge key by key: keys from `defaults` keep their position,
/// overriding values replace them in place, and new keys are appended.
/// Anything else in `overrides` (arrays included) replaces the default.
/// A `null` override replaces the default, which switches that step off.
pub fn merge(defaults: &Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                let next = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, over) => over.clone(),
    }
}

/// Read a configuration file, choosing the parser by extension.
///
/// Key order is preserved for both JSON and TOML.
pub fn load(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "json" => Ok(serde_json::from_str(&content)?),
        "toml" => Ok(toml::from_str(&content)?),
        _ => Err(ConfigError::UnsupportedFile(path.to_path_buf())),
    }
}
