//! Scan configuration
//!
//! Defaults mirror the values the locator was tuned with; everything can be
//! overridden from the CLI config file.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default chunk size for chunked region scans (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 0x10000;

/// Image size assumed when the transport reports 0 (16MB)
pub const DEFAULT_IMAGE_SIZE: u64 = 0x100_0000;

/// Bytes searched on each side of a match for the real instruction start
pub const DEFAULT_RESOLVE_WINDOW: usize = 30;

/// Lowest address accepted as a resolved global
pub const MIN_TARGET_ADDRESS: u64 = 0x10000;

/// Highest address accepted as a resolved global (top of user space)
pub const MAX_TARGET_ADDRESS: u64 = 0x7FFF_FFFF_FFFF;

/// Read retry settings
pub mod read {
    /// Retries for the single whole-image read before falling back to chunks
    pub const IMAGE_READ_RETRIES: u32 = 1;

    /// Retries for generic reads
    pub const READ_RETRIES: u32 = 3;

    /// Fixed delay between read attempts (ms)
    pub const RETRY_DELAY_MS: u64 = 10;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub chunk_size: usize,
    pub image_read_retries: u32,
    pub read_retries: u32,
    pub retry_delay_ms: u64,
    pub fallback_image_size: u64,
    pub resolve_window: usize,
    pub min_target_address: u64,
    pub max_target_address: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            image_read_retries: read::IMAGE_READ_RETRIES,
            read_retries: read::READ_RETRIES,
            retry_delay_ms: read::RETRY_DELAY_MS,
            fallback_image_size: DEFAULT_IMAGE_SIZE,
            resolve_window: DEFAULT_RESOLVE_WINDOW,
            min_target_address: MIN_TARGET_ADDRESS,
            max_target_address: MAX_TARGET_ADDRESS,
        }
    }
}

impl ScanConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn valid_targets(&self) -> RangeInclusive<u64> {
        self.min_target_address..=self.max_target_address
    }
}
