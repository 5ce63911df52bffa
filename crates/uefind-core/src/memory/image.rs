//! File-backed transport
//!
//! Serves a dumped module image as if it were mapped in a live process. Used
//! by the CLI for offline scans and by the integration tests.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use super::{AttachTarget, MemoryPort, ModuleInfo, ProcessInfo};
use crate::error::{Error, Result};

/// Default image base for 64-bit executables.
pub const DEFAULT_IMAGE_BASE: u64 = 0x1_4000_0000;

const IMAGE_PID: u32 = 1;

pub struct ImageFile {
    process: ProcessInfo,
    image: RwLock<Vec<u8>>,
    attached: Mutex<bool>,
}

impl ImageFile {
    /// Load an image dump from disk. The module is named after the file.
    pub fn open<P: AsRef<Path>>(path: P, base_address: u64) -> Result<Self> {
        let path = path.as_ref();
        let image = fs::read(path).map_err(|e| {
            Error::DeviceInitFailure(format!("cannot read image {}: {}", path.display(), e))
        })?;
        if image.is_empty() {
            return Err(Error::DeviceInitFailure(format!(
                "image {} is empty",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.bin".to_string());

        info!(
            "Loaded image {} ({} bytes) at base 0x{:X}",
            path.display(),
            image.len(),
            base_address
        );
        Ok(Self::from_bytes(name, base_address, image))
    }

    pub fn from_bytes(name: impl Into<String>, base_address: u64, image: Vec<u8>) -> Self {
        let process = ProcessInfo {
            pid: IMAGE_PID,
            name: name.into(),
            base_address,
            image_size: image.len() as u64,
        };
        Self {
            process,
            image: RwLock::new(image),
            attached: Mutex::new(false),
        }
    }

    /// Rename the module, e.g. to match the executable the dump came from.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.process.name = name.into();
        self
    }

    pub fn module(&self) -> ModuleInfo {
        ModuleInfo::new(
            self.process.name.clone(),
            self.process.base_address,
            self.process.image_size,
        )
    }

    /// Offset into the image for `address`, if it is mapped.
    fn image_offset(&self, address: u64) -> Option<usize> {
        let offset = address.checked_sub(self.process.base_address)?;
        (offset < self.process.image_size).then_some(offset as usize)
    }

    fn attached(&self) -> bool {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryPort for ImageFile {
    fn read(&self, address: u64, buf: &mut [u8]) -> usize {
        if !self.attached() {
            debug!("Read at 0x{:X} while not attached", address);
            return 0;
        }
        let Some(start) = self.image_offset(address) else {
            return 0;
        };

        let image = self.image.read().unwrap_or_else(PoisonError::into_inner);
        let count = buf.len().min(image.len() - start);
        buf[..count].copy_from_slice(&image[start..start + count]);
        count
    }

    fn write(&self, address: u64, data: &[u8]) -> usize {
        if !self.attached() {
            return 0;
        }
        let Some(start) = self.image_offset(address) else {
            return 0;
        };

        let mut image = self.image.write().unwrap_or_else(PoisonError::into_inner);
        let count = data.len().min(image.len() - start);
        image[start..start + count].copy_from_slice(&data[..count]);
        count
    }

    fn list_modules(&self) -> Vec<ModuleInfo> {
        if self.attached() {
            vec![self.module()]
        } else {
            Vec::new()
        }
    }

    fn list_processes(&self) -> Vec<ProcessInfo> {
        vec![self.process.clone()]
    }

    fn attach(&self, target: &AttachTarget) -> bool {
        if !target.matches(&self.process) {
            return false;
        }
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = true;
        true
    }

    fn detach(&self) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn current_process(&self) -> Option<ProcessInfo> {
        self.attached().then(|| self.process.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_and_read() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x4D, 0x5A, 0x90, 0x00]).unwrap();

        let image = ImageFile::open(file.path(), DEFAULT_IMAGE_BASE).unwrap();
        let name = image.module().name;
        assert!(image.attach(&AttachTarget::Name(name)));

        let mut buf = [0u8; 2];
        assert_eq!(image.read(DEFAULT_IMAGE_BASE, &mut buf), 2);
        assert_eq!(buf, [0x4D, 0x5A]);
    }

    #[test]
    fn test_open_missing_file_is_device_failure() {
        let err = ImageFile::open("/nonexistent/uefind/image.bin", DEFAULT_IMAGE_BASE)
            .err()
            .unwrap();
        assert!(matches!(err, Error::DeviceInitFailure(_)));
    }

    #[test]
    fn test_reads_outside_image_fail() {
        let image = ImageFile::from_bytes("Game.exe", 0x1000, vec![1; 16]);
        assert!(image.attach(&AttachTarget::Pid(IMAGE_PID)));

        let mut buf = [0u8; 4];
        assert_eq!(image.read(0xFFF, &mut buf), 0);
        assert_eq!(image.read(0x1010, &mut buf), 0);
        assert_eq!(image.read(0x100E, &mut buf), 2);
    }

    #[test]
    fn test_not_attached_reads_nothing() {
        let image = ImageFile::from_bytes("Game.exe", 0x1000, vec![1; 16]);
        let mut buf = [0u8; 4];
        assert_eq!(image.read(0x1000, &mut buf), 0);
        assert!(image.list_modules().is_empty());
        assert!(!image.attach(&AttachTarget::from("Other.exe")));
    }

    #[test]
    fn test_with_name() {
        let image = ImageFile::from_bytes("dump.bin", 0x1000, vec![0; 4]).with_name("Game.exe");
        assert!(image.attach(&AttachTarget::from("GAME.EXE")));
        assert_eq!(image.list_modules()[0].name, "Game.exe");
    }
}
