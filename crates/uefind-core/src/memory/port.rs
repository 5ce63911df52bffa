//! Transport contract
//!
//! Everything the locator needs from the memory transport. Implementations
//! never fail loudly: a failed read returns 0 bytes, a failed enumeration
//! returns an empty list.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A module mapped in the attached process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub base_address: u64,
    pub image_size: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, base_address: u64, image_size: u64) -> Self {
        Self {
            name: name.into(),
            base_address,
            image_size,
        }
    }

    pub fn end_address(&self) -> u64 {
        self.base_address.saturating_add(self.image_size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address < self.end_address()
    }
}

/// A process visible to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub base_address: u64,
    pub image_size: u64,
}

/// What to attach to: a PID or an executable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachTarget {
    Pid(u32),
    Name(String),
}

impl AttachTarget {
    pub fn matches(&self, process: &ProcessInfo) -> bool {
        match self {
            AttachTarget::Pid(pid) => process.pid == *pid,
            AttachTarget::Name(name) => process.name.eq_ignore_ascii_case(name),
        }
    }
}

impl FromStr for AttachTarget {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for AttachTarget {
    /// All-digit input is a PID, anything else a process name.
    fn from(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<u32>() {
            Ok(pid) => AttachTarget::Pid(pid),
            Err(_) => AttachTarget::Name(s.to_string()),
        }
    }
}

impl From<u32> for AttachTarget {
    fn from(pid: u32) -> Self {
        AttachTarget::Pid(pid)
    }
}

impl fmt::Display for AttachTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachTarget::Pid(pid) => write!(f, "PID {}", pid),
            AttachTarget::Name(name) => f.write_str(name),
        }
    }
}

/// Byte-level access to a remote process.
///
/// Implementations are shared with the worker thread, hence `Send + Sync`;
/// attachment state lives behind interior mutability.
pub trait MemoryPort: Send + Sync {
    /// Read into `buf`, returning the number of bytes actually read (0 on failure).
    fn read(&self, address: u64, buf: &mut [u8]) -> usize;

    /// Write `data`, returning the number of bytes actually written.
    fn write(&self, address: u64, data: &[u8]) -> usize;

    /// Read a little-endian 64-bit pointer, 0 on failure.
    fn read_pointer(&self, address: u64) -> u64 {
        let mut buf = [0u8; 8];
        if self.read(address, &mut buf) == buf.len() {
            u64::from_le_bytes(buf)
        } else {
            0
        }
    }

    /// Modules of the attached process in load order.
    fn list_modules(&self) -> Vec<ModuleInfo>;

    fn list_processes(&self) -> Vec<ProcessInfo>;

    fn attach(&self, target: &AttachTarget) -> bool;

    fn detach(&self);

    /// The attached process, if any.
    fn current_process(&self) -> Option<ProcessInfo>;

    fn is_connected(&self) -> bool {
        self.current_process().is_some()
    }
}

impl<P: MemoryPort + ?Sized> MemoryPort for Arc<P> {
    fn read(&self, address: u64, buf: &mut [u8]) -> usize {
        (**self).read(address, buf)
    }

    fn write(&self, address: u64, data: &[u8]) -> usize {
        (**self).write(address, data)
    }

    fn read_pointer(&self, address: u64) -> u64 {
        (**self).read_pointer(address)
    }

    fn list_modules(&self) -> Vec<ModuleInfo> {
        (**self).list_modules()
    }

    fn list_processes(&self) -> Vec<ProcessInfo> {
        (**self).list_processes()
    }

    fn attach(&self, target: &AttachTarget) -> bool {
        (**self).attach(target)
    }

    fn detach(&self) {
        (**self).detach()
    }

    fn current_process(&self) -> Option<ProcessInfo> {
        (**self).current_process()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
