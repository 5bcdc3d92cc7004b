//! Tool configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (named by GLANG_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use glang_core::{Extension, ParserOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parser options.
    pub parser: ParserOptions,
    /// Extension manifests to register at startup.
    pub extensions: ExtensionsConfig,
}

impl Config {
    /// Loads configuration from `path`, or from GLANG_CONFIG if no path is
    /// given, then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("GLANG_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup (the environment, in
    /// production).
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("GLANG_VALIDATE") {
            self.parser.validate = parse_bool(&v);
        }
        if let Some(v) = var("GLANG_STRICT") {
            self.parser.strict = parse_bool(&v);
        }
        if let Some(v) = var("GLANG_MAX_DEPTH") {
            if let Ok(n) = v.parse() {
                self.parser.max_depth = n;
            }
        }
        if let Some(v) = var("GLANG_EXTENSIONS") {
            self.extensions.paths = v
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parser.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "parser.max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.to_lowercase() == "true"
}

/// Extension manifest configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Manifest files (YAML, or JSON with a `.json` extension).
    pub paths: Vec<PathBuf>,
}

/// Reads an extension manifest.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Extension, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed: Result<Extension, String> = if is_json {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
