// src/config/options.rs

use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ConfigError;

/// Caller-set build options, usually read from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    /// Path within the code bundle to the payload config
    pub payload_config_path: Option<String>,

    /// Whether the VM exposes its debug surface
    pub debug_mode: bool,

    /// Requested RAM in MiB (0 = manager default)
    pub memory_mib: i32,
}

impl BuildOptions {
    /// Parses options from a YAML document
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|e| ConfigError::OptionsParseError(e.to_string()))
    }

    /// Loads options from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)
            .map_err(|e| ConfigError::OptionsReadError {
                path: path.as_ref().to_string_lossy().into_owned(),
                error: e.to_string(),
            })?;

        let options = Self::from_yaml(&text)?;

        info!("Build options loaded from {}", path.as_ref().display());

        Ok(options)
    }
}
