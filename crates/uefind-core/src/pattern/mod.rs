//! Byte signatures: compilation and scanning

mod compiler;
mod scanner;

pub use compiler::{CompiledPattern, MaskBit};
pub use scanner::{RegionChunk, RegionChunks, find_first, scan_region};
