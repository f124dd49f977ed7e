//! Module system configuration
//!
//! Covers platform overrides for resolution, repository chain search
//! behavior, reserved name prefixes and the optional on-disk module
//! directory. Loadable from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ModuleError;

/// Module system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSystemConfig {
    /// Platform override for resolution (default: the running platform)
    #[serde(default)]
    pub platform: Option<String>,

    /// Architecture override for resolution (default: the running arch)
    #[serde(default)]
    pub arch: Option<String>,

    /// Whether resolution searches parent repositories
    #[serde(default = "default_search_parents")]
    pub search_parents: bool,

    /// Name prefixes whose modules may never be released
    #[serde(default = "default_reserved_prefixes")]
    pub reserved_prefixes: Vec<String>,

    /// Directory scanned for installed module manifests
    #[serde(default)]
    pub modules_dir: Option<PathBuf>,
}

fn default_search_parents() -> bool {
    true
}

fn default_reserved_prefixes() -> Vec<String> {
    vec!["platform.".to_string(), "runtime.".to_string()]
}

impl Default for ModuleSystemConfig {
    fn default() -> Self {
        Self {
            platform: None,
            arch: None,
            search_parents: true,
            reserved_prefixes: default_reserved_prefixes(),
            modules_dir: None,
        }
    }
}

impl ModuleSystemConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ModuleError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ModuleError> {
        for prefix in &self.reserved_prefixes {
            if prefix.is_empty() {
                return Err(ModuleError::InvalidConfig(
                    "reserved_prefixes entries must be non-empty".to_string(),
                ));
            }
        }
        if matches!(&self.platform, Some(p) if p.is_empty()) {
            return Err(ModuleError::InvalidConfig(
                "platform override must be non-empty".to_string(),
            ));
        }
        if matches!(&self.arch, Some(a) if a.is_empty()) {
            return Err(ModuleError::InvalidConfig(
                "arch override must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}
