use std::thread;

use tracing::{debug, warn};

use super::{MemoryPort, ModuleInfo};
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::pattern::{CompiledPattern, scan_region};
use crate::retry::RetryStrategy;

/// Higher-level reads on top of a [`MemoryPort`].
pub struct MemoryReader<'a, P: MemoryPort + ?Sized> {
    port: &'a P,
}

impl<'a, P: MemoryPort + ?Sized> MemoryReader<'a, P> {
    pub fn new(port: &'a P) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &'a P {
        self.port
    }

    /// Read up to `size` bytes; the result is truncated to what was read.
    pub fn read_bytes(&self, address: u64, size: usize) -> Vec<u8> {
        let mut buffer = vec![0u8; size];
        let read = self.port.read(address, &mut buffer);
        buffer.truncate(read);
        buffer
    }

    /// Fill `buf`, retrying after short reads.
    ///
    /// Partial progress is kept between attempts. Returns the total number of
    /// bytes read, which may be less than `buf.len()` once retries run out.
    pub fn read_with_retry<R: RetryStrategy + ?Sized>(
        &self,
        address: u64,
        buf: &mut [u8],
        strategy: &R,
    ) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let retries = strategy.retries();
        let mut total = 0usize;

        for attempt in 0..=retries {
            let read = self.port.read(address + total as u64, &mut buf[total..]);
            total += read;

            if total >= buf.len() {
                break;
            }

            if read == 0 && attempt < retries {
                thread::sleep(strategy.delay(attempt + 1));
            }
        }

        if total < buf.len() {
            debug!(
                "Short read at 0x{:X}: {} of {} bytes after {} retries",
                address,
                total,
                buf.len(),
                retries
            );
        }
        total
    }

    /// Read a NUL-terminated string of at most `max_len` bytes.
    pub fn read_string(&self, address: u64, max_len: usize) -> String {
        let bytes = self.read_bytes(address, max_len);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Follow a pointer chain.
    ///
    /// Every offset but the last is added and dereferenced; the last is added
    /// to the final pointer. A null pointer anywhere yields 0.
    pub fn read_pointer_chain(&self, base: u64, offsets: &[u64]) -> u64 {
        let Some((last, hops)) = offsets.split_last() else {
            return 0;
        };

        let mut address = base;
        for (i, offset) in hops.iter().enumerate() {
            let slot = address.wrapping_add(*offset);
            address = self.port.read_pointer(slot);
            if address == 0 {
                debug!("Null pointer at hop {} (0x{:X})", i, slot);
                return 0;
            }
        }

        address.wrapping_add(*last)
    }

    /// Module by name, ASCII case-insensitive.
    pub fn find_module(&self, name: &str) -> Option<ModuleInfo> {
        self.port
            .list_modules()
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// The attached process's executable module.
    ///
    /// Prefers the module named like the process, then the first module.
    /// An image size of 0 is replaced by `fallback_size`.
    pub fn main_module(&self, fallback_size: u64) -> Option<ModuleInfo> {
        let process = self.port.current_process()?;
        let modules = self.port.list_modules();

        let mut module = modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(&process.name))
            .or_else(|| modules.first())
            .cloned()
            .or_else(|| {
                (process.base_address != 0).then(|| {
                    ModuleInfo::new(process.name.clone(), process.base_address, process.image_size)
                })
            })?;

        if module.base_address == 0 {
            return None;
        }
        if module.image_size == 0 {
            warn!(
                "Module {} reports no image size, assuming 0x{:X}",
                module.name, fallback_size
            );
            module.image_size = fallback_size;
        }
        Some(module)
    }

    /// Scan for a textual signature.
    ///
    /// `start == 0` means the main module base, `size == 0` the main module
    /// size. Returns the absolute match address.
    pub fn scan_signature(
        &self,
        pattern: &str,
        start: u64,
        size: u64,
        config: &ScanConfig,
    ) -> Result<Option<u64>> {
        let compiled = CompiledPattern::compile(pattern)?;
        if !self.port.is_connected() {
            return Err(Error::NotConnected);
        }

        let (start, size) = if start == 0 || size == 0 {
            let module = self
                .main_module(config.fallback_image_size)
                .ok_or(Error::ModuleNotFound)?;
            (
                if start == 0 { module.base_address } else { start },
                if size == 0 { module.image_size } else { size },
            )
        } else {
            (start, size)
        };

        debug!("Scanning for {} at 0x{:X}+0x{:X}", compiled, start, size);
        Ok(scan_region(self.port, start, size, &compiled, config.chunk_size))
    }

    pub fn scan_signature_in_module(
        &self,
        pattern: &str,
        module_name: &str,
        config: &ScanConfig,
    ) -> Result<Option<u64>> {
        let module = self
            .find_module(module_name)
            .ok_or_else(|| Error::ProcessNotFound(format!("module {}", module_name)))?;
        if module.image_size == 0 {
            return Ok(None);
        }
        self.scan_signature(pattern, module.base_address, module.image_size, config)
    }
}
