//! Global pointer locator
//!
//! Reads the main module once and tries every signature variant of a target
//! class in priority order. When the transport refuses the whole-image read,
//! each variant is scanned chunk by chunk instead and only the bytes around a
//! match are re-read for resolution.

use tracing::{debug, info, warn};

use super::{
    INSTRUCTION_LEN, InstructionOffsetResolver, ResolvedGlobals, Signature, SignatureTable,
    TargetClass,
};
use crate::config::ScanConfig;
use crate::error::Result;
use crate::memory::{MemoryPort, MemoryReader, ModuleInfo};
use crate::pattern::{find_first, scan_region};
use crate::retry::FixedDelay;

const DOS_SIGNATURE: &[u8; 2] = b"MZ";

/// Where variant scans read from.
enum ScanSource {
    /// The whole image, read in one go.
    Image(Vec<u8>),
    /// Whole-image read failed; scan the module chunk by chunk.
    Chunked,
}

pub struct GlobalLocator<'a, P: MemoryPort + ?Sized> {
    port: &'a P,
    signatures: &'a SignatureTable,
    config: &'a ScanConfig,
    resolver: InstructionOffsetResolver,
}

impl<'a, P: MemoryPort + ?Sized> GlobalLocator<'a, P> {
    pub fn new(port: &'a P, signatures: &'a SignatureTable, config: &'a ScanConfig) -> Self {
        Self {
            port,
            signatures,
            config,
            resolver: InstructionOffsetResolver::new(config),
        }
    }

    /// Address of `class`, or 0 when no variant resolves.
    pub fn locate(&self, class: TargetClass) -> u64 {
        let Some(module) = self.main_module() else {
            return 0;
        };
        let source = self.read_source(&module);
        self.locate_with(&module, &source, class)
    }

    /// Same as [`locate`](Self::locate), with the class given by name.
    pub fn locate_by_name(&self, name: &str) -> Result<u64> {
        let class = TargetClass::from_name(name)?;
        Ok(self.locate(class))
    }

    /// Locate every target class. The image is read once and shared.
    pub fn locate_all(&self) -> ResolvedGlobals {
        let mut globals = ResolvedGlobals::default();
        let Some(module) = self.main_module() else {
            return globals;
        };

        let source = self.read_source(&module);
        for class in TargetClass::all() {
            globals.set(class, self.locate_with(&module, &source, class));
        }
        globals
    }

    fn main_module(&self) -> Option<ModuleInfo> {
        if !self.port.is_connected() {
            warn!("Locate requested while not connected");
            return None;
        }

        let module = MemoryReader::new(self.port).main_module(self.config.fallback_image_size);
        if module.is_none() {
            warn!("Failed to get main module base address");
        }
        module
    }

    fn read_source(&self, module: &ModuleInfo) -> ScanSource {
        info!(
            "Scanning main module {} (base 0x{:X}, size 0x{:X})",
            module.name, module.base_address, module.image_size
        );

        let Ok(size) = usize::try_from(module.image_size) else {
            warn!("Module image too large to buffer, using chunked scan");
            return ScanSource::Chunked;
        };

        let mut image = vec![0u8; size];
        let strategy = FixedDelay::new(self.config.image_read_retries, self.config.retry_delay());
        let read = MemoryReader::new(self.port).read_with_retry(
            module.base_address,
            &mut image,
            &strategy,
        );

        if read == 0 {
            warn!("Failed to read module memory, trying chunked scan");
            return ScanSource::Chunked;
        }

        image.truncate(read);
        debug!("Read {} of {} image bytes", read, size);

        if image.len() >= 2 && !image.starts_with(DOS_SIGNATURE) {
            warn!(
                "Image at 0x{:X} does not start with MZ (got {:02X} {:02X})",
                module.base_address, image[0], image[1]
            );
        }

        ScanSource::Image(image)
    }

    fn locate_with(&self, module: &ModuleInfo, source: &ScanSource, class: TargetClass) -> u64 {
        let variants = self.signatures.variants(class);
        if variants.is_empty() {
            warn!("No signatures for {}", class);
            return 0;
        }

        let found = variants.iter().find_map(|signature| {
            debug!("Trying {}", signature.name);
            let address = match source {
                ScanSource::Image(image) => {
                    self.try_in_image(image, module.base_address, class, signature)
                }
                ScanSource::Chunked => self.try_chunked(module, class, signature),
            };
            address.map(|a| (signature, a))
        });

        match found {
            Some((signature, address)) => {
                info!("{} found by {} at 0x{:X}", class, signature.name, address);
                address
            }
            None => {
                info!("{} not found", class);
                0
            }
        }
    }

    fn try_in_image(
        &self,
        image: &[u8],
        base_address: u64,
        class: TargetClass,
        signature: &Signature,
    ) -> Option<u64> {
        let offset = find_first(image, &signature.pattern)?;
        debug!("{} matched at image offset 0x{:X}", signature.name, offset);

        let address = self.resolver.resolve(image, offset, class, base_address);
        if address.is_none() {
            debug!("{} rejected, continuing search", signature.name);
        }
        address
    }

    fn try_chunked(
        &self,
        module: &ModuleInfo,
        class: TargetClass,
        signature: &Signature,
    ) -> Option<u64> {
        let found = scan_region(
            self.port,
            module.base_address,
            module.image_size,
            &signature.pattern,
            self.config.chunk_size,
        )?;
        debug!("{} matched at 0x{:X} (chunked)", signature.name, found);

        // Re-read the resolver window around the match, clamped to the module.
        let window = self.config.resolve_window as u64;
        let start = found.saturating_sub(window).max(module.base_address);
        let end = found
            .saturating_add(signature.pattern.len() as u64 + window + INSTRUCTION_LEN as u64)
            .min(module.end_address());
        let mut context = vec![0u8; (end - start) as usize];
        let strategy = FixedDelay::new(self.config.read_retries, self.config.retry_delay());
        let read = MemoryReader::new(self.port).read_with_retry(start, &mut context, &strategy);
        context.truncate(read);
        if context.is_empty() {
            debug!("Context around 0x{:X} unreadable, skipping", found);
            return None;
        }

        let address = self
            .resolver
            .resolve(&context, (found - start) as usize, class, start);
        if address.is_none() {
            debug!("{} rejected, continuing search", signature.name);
        }
        address
    }
}
