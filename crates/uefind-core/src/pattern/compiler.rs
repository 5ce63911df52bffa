use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How a pattern position is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskBit {
    Exact,
    Wildcard,
}

/// A byte signature with a parallel wildcard mask.
///
/// Always non-empty, and `bytes().len() == mask().len()`. Wildcard positions
/// hold byte 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    bytes: Vec<u8>,
    mask: Vec<MaskBit>,
}

impl CompiledPattern {
    /// Compile whitespace-separated hex tokens; `?` and `??` are wildcards.
    ///
    /// ```
    /// use uefind_core::pattern::{CompiledPattern, MaskBit};
    ///
    /// let pattern = CompiledPattern::compile("48 8B 05 ?? ?? ?? ??").unwrap();
    /// assert_eq!(pattern.len(), 7);
    /// assert_eq!(pattern.mask()[3], MaskBit::Wildcard);
    /// ```
    pub fn compile(text: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();

        for token in text.split_whitespace() {
            if token == "??" || token == "?" {
                bytes.push(0);
                mask.push(MaskBit::Wildcard);
                continue;
            }

            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::InvalidPattern(format!(
                    "invalid token '{}' in '{}'",
                    token, text
                )));
            }
            let value = u8::from_str_radix(digits, 16).map_err(|e| {
                Error::InvalidPattern(format!("token '{}' out of range: {}", token, e))
            })?;
            bytes.push(value);
            mask.push(MaskBit::Exact);
        }

        Self::from_parts(bytes, mask)
    }

    pub fn from_parts(bytes: Vec<u8>, mask: Vec<MaskBit>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidPattern("pattern is empty".to_string()));
        }
        if bytes.len() != mask.len() {
            return Err(Error::InvalidPattern(format!(
                "pattern has {} bytes but mask has {} entries",
                bytes.len(),
                mask.len()
            )));
        }

        let bytes = bytes
            .into_iter()
            .zip(&mask)
            .map(|(b, bit)| if *bit == MaskBit::Wildcard { 0 } else { b })
            .collect();
        Ok(Self { bytes, mask })
    }

    /// Build from bytes plus an `x`/`?` mask string.
    pub fn from_code_mask(bytes: &[u8], mask: &str) -> Result<Self> {
        let mask = mask
            .chars()
            .map(|c| match c {
                'x' | 'X' => Ok(MaskBit::Exact),
                '?' => Ok(MaskBit::Wildcard),
                other => Err(Error::InvalidPattern(format!("invalid mask character '{}'", other))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_parts(bytes.to_vec(), mask)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mask(&self) -> &[MaskBit] {
        &self.mask
    }

    pub fn is_wildcard(&self, index: usize) -> bool {
        self.mask.get(index) == Some(&MaskBit::Wildcard)
    }

    /// First exact position and its byte, used to seed candidate search.
    pub fn anchor(&self) -> Option<(usize, u8)> {
        self.mask
            .iter()
            .position(|bit| *bit == MaskBit::Exact)
            .map(|i| (i, self.bytes[i]))
    }

    /// True when the pattern matches `buffer` starting at `pos`.
    pub fn matches_at(&self, buffer: &[u8], pos: usize) -> bool {
        let Some(window) = buffer.get(pos..pos.saturating_add(self.len())) else {
            return false;
        };
        if window.len() != self.len() {
            return false;
        }

        window
            .iter()
            .zip(self.bytes.iter().zip(&self.mask))
            .all(|(actual, (expected, bit))| *bit == MaskBit::Wildcard || actual == expected)
    }
}

impl FromStr for CompiledPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (byte, bit)) in self.bytes.iter().zip(&self.mask).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match bit {
                MaskBit::Exact => write!(f, "{:02X}", byte)?,
                MaskBit::Wildcard => f.write_str("??")?,
            }
        }
        Ok(())
    }
}
