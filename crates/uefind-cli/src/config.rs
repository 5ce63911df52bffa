//! CLI configuration file (`uefind.toml`).
//!
//! ```toml
//! module_name = "Game-Win64-Shipping.exe"
//! base_address = 0x140000000
//!
//! [scan]
//! chunk_size = 0x20000
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uefind_core::{DEFAULT_IMAGE_BASE, ScanConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub scan: ScanConfig,
    /// Module name reported for loaded images instead of the file name
    pub module_name: Option<String>,
    /// Base address images are mapped at
    pub base_address: Option<u64>,
}

impl CliConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid config file")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text)
    }

    /// Load `path`, falling back to defaults when it is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn base_address(&self) -> u64 {
        self.base_address.unwrap_or(DEFAULT_IMAGE_BASE)
    }
}
