//! In-memory transport for tests

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use super::{AttachTarget, MemoryPort, ModuleInfo, ProcessInfo};

const MOCK_PID: u32 = 4242;

#[derive(Debug)]
struct MockRegion {
    base: u64,
    data: Vec<u8>,
}

impl MockRegion {
    fn range(&self) -> Range<u64> {
        self.base..self.base + self.data.len() as u64
    }
}

/// Transport backed by planted byte regions.
#[derive(Debug)]
pub struct MockMemory {
    regions: RwLock<Vec<MockRegion>>,
    modules: Vec<ModuleInfo>,
    processes: Vec<ProcessInfo>,
    unreadable: Vec<Range<u64>>,
    max_read_size: Option<usize>,
    attached: Mutex<Option<ProcessInfo>>,
    read_calls: AtomicUsize,
}

impl MockMemory {
    /// Number of `read` calls served so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn is_unreadable(&self, range: &Range<u64>) -> bool {
        self.unreadable
            .iter()
            .any(|bad| range.start < bad.end && bad.start < range.end)
    }
}

impl MemoryPort for MockMemory {
    fn read(&self, address: u64, buf: &mut [u8]) -> usize {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        if buf.is_empty() || !self.is_connected() {
            return 0;
        }
        if self.max_read_size.is_some_and(|max| buf.len() > max) {
            return 0;
        }

        let requested = address..address.saturating_add(buf.len() as u64);
        if self.is_unreadable(&requested) {
            return 0;
        }

        let regions = self.regions.read().unwrap_or_else(PoisonError::into_inner);
        let Some(region) = regions.iter().find(|r| r.range().contains(&address)) else {
            return 0;
        };

        let start = (address - region.base) as usize;
        let count = buf.len().min(region.data.len() - start);
        buf[..count].copy_from_slice(&region.data[start..start + count]);
        count
    }

    fn write(&self, address: u64, data: &[u8]) -> usize {
        if data.is_empty() || !self.is_connected() {
            return 0;
        }

        let mut regions = self.regions.write().unwrap_or_else(PoisonError::into_inner);
        let Some(region) = regions.iter_mut().find(|r| r.range().contains(&address)) else {
            return 0;
        };

        let start = (address - region.base) as usize;
        let count = data.len().min(region.data.len() - start);
        region.data[start..start + count].copy_from_slice(&data[..count]);
        count
    }

    fn list_modules(&self) -> Vec<ModuleInfo> {
        if self.is_connected() {
            self.modules.clone()
        } else {
            Vec::new()
        }
    }

    fn list_processes(&self) -> Vec<ProcessInfo> {
        self.processes.clone()
    }

    fn attach(&self, target: &AttachTarget) -> bool {
        let Some(process) = self.processes.iter().find(|p| target.matches(p)) else {
            return false;
        };
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = Some(process.clone());
        true
    }

    fn detach(&self) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn current_process(&self) -> Option<ProcessInfo> {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builder for [`MockMemory`].
///
/// The first module doubles as the process image; the mock starts attached
/// to it unless [`detached`](Self::detached) is called.
#[derive(Debug, Default)]
pub struct MockMemoryBuilder {
    regions: Vec<MockRegion>,
    modules: Vec<ModuleInfo>,
    processes: Vec<ProcessInfo>,
    unreadable: Vec<Range<u64>>,
    max_read_size: Option<usize>,
    detached: bool,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `data` as a module whose image size is `data.len()`.
    pub fn module(self, name: &str, base: u64, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        self.module_with_size(name, base, data, size)
    }

    /// Map `data` as a module but report `image_size` to callers.
    pub fn module_with_size(mut self, name: &str, base: u64, data: Vec<u8>, image_size: u64) -> Self {
        self.modules.push(ModuleInfo::new(name, base, image_size));
        self.regions.push(MockRegion { base, data });
        self
    }

    /// Map raw bytes that belong to no module.
    pub fn region(mut self, base: u64, data: Vec<u8>) -> Self {
        self.regions.push(MockRegion { base, data });
        self
    }

    pub fn process(mut self, pid: u32, name: &str) -> Self {
        self.processes.push(ProcessInfo {
            pid,
            name: name.to_string(),
            base_address: 0,
            image_size: 0,
        });
        self
    }

    /// Any read touching `[start, start + len)` returns 0 bytes.
    pub fn unreadable(mut self, start: u64, len: u64) -> Self {
        self.unreadable.push(start..start + len);
        self
    }

    /// Reads larger than `max` bytes return 0 bytes.
    pub fn max_read_size(mut self, max: usize) -> Self {
        self.max_read_size = Some(max);
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn build(mut self) -> MockMemory {
        if self.processes.is_empty()
            && let Some(main) = self.modules.first()
        {
            self.processes.push(ProcessInfo {
                pid: MOCK_PID,
                name: main.name.clone(),
                base_address: main.base_address,
                image_size: main.image_size,
            });
        }

        let attached = if self.detached {
            None
        } else {
            self.processes.first().cloned()
        };

        MockMemory {
            regions: RwLock::new(self.regions),
            modules: self.modules,
            processes: self.processes,
            unreadable: self.unreadable,
            max_read_size: self.max_read_size,
            attached: Mutex::new(attached),
            read_calls: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_within_region() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![1, 2, 3, 4])
            .build();
        let mut buf = [0u8; 2];
        assert_eq!(mock.read(0x1001, &mut buf), 2);
        assert_eq!(buf, [2, 3]);
    }

    #[test]
    fn test_read_clamped_at_region_end() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![1, 2, 3, 4])
            .build();
        let mut buf = [0u8; 8];
        assert_eq!(mock.read(0x1002, &mut buf), 2);
        assert_eq!(buf[..2], [3, 4]);
    }

    #[test]
    fn test_read_unmapped_and_unreadable() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![0; 0x100])
            .unreadable(0x1080, 0x10)
            .build();
        let mut buf = [0u8; 0x20];
        assert_eq!(mock.read(0x5000, &mut buf), 0);
        assert_eq!(mock.read(0x1070, &mut buf), 0);
        assert_eq!(mock.read(0x1000, &mut buf), 0x20);
        assert_eq!(mock.read_calls(), 3);
    }

    #[test]
    fn test_max_read_size() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![0; 0x100])
            .max_read_size(0x10)
            .build();
        let mut big = [0u8; 0x20];
        let mut small = [0u8; 0x10];
        assert_eq!(mock.read(0x1000, &mut big), 0);
        assert_eq!(mock.read(0x1000, &mut small), 0x10);
    }

    #[test]
    fn test_detached_reads_fail_until_attach() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![0xAA; 8])
            .detached()
            .build();
        assert!(!mock.is_connected());
        assert!(mock.list_modules().is_empty());
        assert_eq!(mock.read_pointer(0x1000), 0);

        assert!(mock.attach(&AttachTarget::from("game.exe")));
        assert_eq!(mock.read_pointer(0x1000), 0xAAAA_AAAA_AAAA_AAAA);

        mock.detach();
        assert!(!mock.is_connected());
    }

    #[test]
    fn test_attach_unknown_process() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![0; 8])
            .detached()
            .build();
        assert!(!mock.attach(&AttachTarget::from("Other.exe")));
        assert!(!mock.attach(&AttachTarget::Pid(1)));
        assert!(mock.attach(&AttachTarget::Pid(MOCK_PID)));
    }

    #[test]
    fn test_write_then_read() {
        let mock = MockMemoryBuilder::new()
            .module("Game.exe", 0x1000, vec![0; 16])
            .build();
        assert_eq!(mock.write(0x1004, &[9, 9]), 2);
        let mut buf = [0u8; 2];
        mock.read(0x1004, &mut buf);
        assert_eq!(buf, [9, 9]);
    }
}
