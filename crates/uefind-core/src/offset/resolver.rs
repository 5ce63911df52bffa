//! RIP-relative address resolution
//!
//! Signatures are anchored on surrounding code, so a match does not always
//! start at the instruction that references the global. The resolver looks
//! for a known opcode prefix near the match, then decodes the 32-bit
//! displacement that follows it.
//!
//! Only the fixed `prefix(3) + disp32(4)` shape is understood. Any other
//! encoding resolves to a garbage target, which the range check rejects.

use std::ops::RangeInclusive;

use tracing::debug;

use super::TargetClass;
use crate::config::ScanConfig;

/// Offset of the displacement from the instruction start
pub const DISPLACEMENT_OFFSET: usize = 3;

/// Prefix length plus displacement length
pub const INSTRUCTION_LEN: usize = 7;

#[derive(Debug, Clone)]
pub struct InstructionOffsetResolver {
    window: usize,
    valid_targets: RangeInclusive<u64>,
}

impl Default for InstructionOffsetResolver {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl InstructionOffsetResolver {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            window: config.resolve_window,
            valid_targets: config.valid_targets(),
        }
    }

    /// Locate the referencing instruction around `match_offset`.
    ///
    /// Positions `match_offset - window ..= match_offset + window` are tried
    /// from low to high; at each position the class prefixes are tried in
    /// order. Without a hit the match offset itself is returned.
    pub fn find_instruction_start(
        &self,
        buffer: &[u8],
        match_offset: usize,
        class: TargetClass,
    ) -> usize {
        let prefixes = class.instruction_prefixes();
        let first = match_offset.saturating_sub(self.window);
        let last = match_offset
            .saturating_add(self.window)
            .min(buffer.len().saturating_sub(DISPLACEMENT_OFFSET));

        (first..=last)
            .find(|&pos| {
                buffer
                    .get(pos..pos + DISPLACEMENT_OFFSET)
                    .is_some_and(|bytes| prefixes.iter().any(|p| p == bytes))
            })
            .unwrap_or(match_offset)
    }

    /// Absolute target of the instruction at `instruction_offset`, without
    /// any plausibility check. `None` if the displacement is out of bounds.
    pub fn target_address(
        &self,
        buffer: &[u8],
        instruction_offset: usize,
        base_address: u64,
    ) -> Option<u64> {
        let start = instruction_offset.checked_add(DISPLACEMENT_OFFSET)?;
        let bytes: [u8; 4] = buffer.get(start..start + 4)?.try_into().ok()?;
        let displacement = i32::from_le_bytes(bytes);

        let next_ip = base_address
            .wrapping_add(instruction_offset as u64)
            .wrapping_add(INSTRUCTION_LEN as u64);
        Some(next_ip.wrapping_add_signed(displacement as i64))
    }

    pub fn is_plausible(&self, address: u64) -> bool {
        self.valid_targets.contains(&address)
    }

    /// Resolve a signature match at `match_offset` in `buffer`, where
    /// `buffer[0]` lives at `base_address`.
    pub fn resolve(
        &self,
        buffer: &[u8],
        match_offset: usize,
        class: TargetClass,
        base_address: u64,
    ) -> Option<u64> {
        let instruction = self.find_instruction_start(buffer, match_offset, class);
        let target = self.target_address(buffer, instruction, base_address)?;

        if !self.is_plausible(target) {
            debug!(
                "{}: target 0x{:X} from instruction at +0x{:X} is out of range",
                class, target, instruction
            );
            return None;
        }
        Some(target)
    }
}
