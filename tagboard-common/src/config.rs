//! Configuration loading
//!
//! Static settings resolve with ENV → TOML priority: an environment variable
//! always beats the config file, and each resolved field logs its source so
//! a misconfigured deployment is diagnosable from the startup log.
//!
//! The mutable safety gates (pause flag, daily cap) deliberately do NOT live
//! in this struct — the worker re-reads them every loop iteration through its
//! gates abstraction, so an operator can flip them without a restart.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Raw TOML file contents. Every field optional; ENV fills the gaps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub database_url: Option<String>,
    pub tagger_endpoint: Option<String>,
    pub tagger_api_key: Option<String>,
    pub tagger_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub idle_interval_secs: Option<u64>,
    pub daily_cap: Option<u32>,
    pub public_url_base: Option<String>,
    pub signed_url_base: Option<String>,
    /// Stopwords added on top of the built-in defaults.
    pub extra_stopwords: Option<Vec<String>>,
}

impl TomlConfig {
    /// Load from a TOML file; a missing file is an empty config, a malformed
    /// one is a hard error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid TOML in {}: {e}", path.display())))?;
        info!("Loaded config file {}", path.display());
        Ok(config)
    }
}

/// Read an environment variable, treating empty/whitespace values as unset.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Resolve one string setting with ENV → TOML priority.
pub fn resolve_setting(
    name: &str,
    env_name: &str,
    toml_value: Option<&String>,
) -> Option<String> {
    if let Some(value) = env_var(env_name) {
        info!("{name} loaded from environment variable");
        return Some(value);
    }
    if let Some(value) = toml_value {
        info!("{name} loaded from config file");
        return Some(value.clone());
    }
    None
}
