//! Buffer and region scanning

use tracing::debug;

use super::CompiledPattern;
use crate::memory::MemoryPort;

/// Find the first offset in `buffer` where `pattern` matches.
///
/// Exact positions are compared byte for byte, wildcard positions are
/// ignored. Candidates are seeded with `memchr` on the first exact byte, so
/// results come back in ascending offset order.
pub fn find_first(buffer: &[u8], pattern: &CompiledPattern) -> Option<usize> {
    if pattern.len() > buffer.len() {
        return None;
    }
    let last = buffer.len() - pattern.len();

    let Some((anchor_index, anchor_byte)) = pattern.anchor() else {
        // All wildcards: matches at the very start.
        return Some(0);
    };

    let haystack = &buffer[anchor_index..=last + anchor_index];
    memchr::memchr_iter(anchor_byte, haystack).find(|&start| pattern.matches_at(buffer, start))
}

/// One chunk read from a region.
#[derive(Debug, Clone)]
pub struct RegionChunk {
    pub address: u64,
    pub data: Vec<u8>,
}

/// Iterator over fixed-size chunks of a remote address range.
///
/// Chunk `n` starts at `start + n * chunk_size` and reads `chunk_size +
/// overlap` bytes (clamped to the region end), so anything up to `overlap + 1`
/// bytes long that starts inside a chunk is fully contained in it. Chunks that
/// fail to read are skipped.
pub struct RegionChunks<'a, P: MemoryPort + ?Sized> {
    port: &'a P,
    start: u64,
    size: u64,
    chunk_size: u64,
    overlap: u64,
    offset: u64,
    skipped: usize,
}

impl<'a, P: MemoryPort + ?Sized> RegionChunks<'a, P> {
    pub fn new(port: &'a P, start: u64, size: u64, chunk_size: usize, overlap: usize) -> Self {
        Self {
            port,
            start,
            size,
            chunk_size: chunk_size.max(1) as u64,
            overlap: overlap as u64,
            offset: 0,
            skipped: 0,
        }
    }

    /// Number of chunks that returned no bytes so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<P: MemoryPort + ?Sized> Iterator for RegionChunks<'_, P> {
    type Item = RegionChunk;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.size {
            let remaining = self.size - self.offset;
            let read_len = remaining.min(self.chunk_size + self.overlap) as usize;
            let address = self.start.wrapping_add(self.offset);
            self.offset += self.chunk_size;

            let mut data = vec![0u8; read_len];
            let read = self.port.read(address, &mut data);
            if read == 0 {
                debug!("Unreadable chunk at 0x{:X} ({} bytes), skipping", address, read_len);
                self.skipped += 1;
                continue;
            }

            data.truncate(read);
            return Some(RegionChunk { address, data });
        }

        None
    }
}

/// Scan `[start, start + size)` for `pattern`, reading `chunk_size` bytes at a time.
///
/// Returns the absolute address of the first match in ascending address order.
pub fn scan_region<P: MemoryPort + ?Sized>(
    port: &P,
    start: u64,
    size: u64,
    pattern: &CompiledPattern,
    chunk_size: usize,
) -> Option<u64> {
    let mut chunks = RegionChunks::new(port, start, size, chunk_size, pattern.len() - 1);

    let found = chunks.by_ref().find_map(|chunk| {
        find_first(&chunk.data, pattern).map(|offset| chunk.address + offset as u64)
    });

    if chunks.skipped() > 0 {
        debug!(
            "Region scan 0x{:X}+0x{:X}: {} unreadable chunk(s) skipped",
            start,
            size,
            chunks.skipped()
        );
    }

    found
}
