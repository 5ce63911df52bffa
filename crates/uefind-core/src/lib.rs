//! # uefind-core
//!
//! Locates Unreal Engine global pointers (GWorld, GNames, GObjects) in the
//! memory of a running process.
//!
//! This crate provides:
//! - Wildcard byte-pattern compilation and chunked region scanning
//! - RIP-relative instruction resolution
//! - Multi-variant signature search over the main module
//! - A single-worker task engine that keeps transport I/O off the caller's thread
//!
//! The memory transport itself is supplied by the caller through
//! [`MemoryPort`]. [`ImageFile`] serves a dumped module from disk.

pub mod config;
pub mod error;
pub mod memory;
pub mod offset;
pub mod pattern;
pub mod retry;
pub mod task;
pub mod uefind;

pub use config::ScanConfig;
pub use error::{Error, Result};
pub use memory::{
    AttachTarget, DEFAULT_IMAGE_BASE, ImageFile, MemoryPort, MemoryReader, ModuleInfo,
    ProcessInfo,
};
pub use offset::{
    GameInfo, GlobalLocator, InstructionOffsetResolver, OffsetEntry, OffsetList, ResolvedGlobals,
    Signature, SignatureTable, TargetClass, format_hex_address, load_signatures,
    parse_hex_address, save_signatures,
};
pub use pattern::{CompiledPattern, MaskBit, find_first, scan_region};
pub use retry::{FixedDelay, NoRetry, RetryStrategy};
pub use task::{AsyncResult, AsyncTaskEngine, EngineState, TaskKind};
pub use uefind::UeFind;
