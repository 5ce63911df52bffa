//! Asynchronous front end.
//!
//! [`UeFind`] owns the transport and the task engine. Every operation is
//! queued onto the worker and reports back through a callback that runs on
//! the caller's thread during [`UeFind::pump`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use uefind_core::{ImageFile, UeFind};
//!
//! let image = ImageFile::from_bytes("Game.exe", 0x1_4000_0000, vec![0; 0x1000]);
//! let finder = UeFind::new(Arc::new(image)).unwrap();
//!
//! finder.submit_attach("Game.exe", |result| assert!(result.is_success));
//! while finder.has_pending() {
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! finder.pump();
//! ```

use std::sync::Arc;

use tracing::{error, info};

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::memory::{AttachTarget, MemoryPort, MemoryReader};
use crate::offset::{
    GlobalLocator, ResolvedGlobals, SignatureTable, TargetClass, format_hex_address,
};
use crate::task::{AsyncResult, AsyncTaskEngine, EngineState, TaskKind};

pub const GLOBALS_NOT_FOUND: &str = "Failed to find any Unreal Engine globals";

pub struct UeFind<P: MemoryPort + 'static> {
    port: Arc<P>,
    signatures: Arc<SignatureTable>,
    config: Arc<ScanConfig>,
    engine: AsyncTaskEngine,
}

impl<P: MemoryPort + 'static> UeFind<P> {
    /// Built-in signatures and default scan settings.
    pub fn new(port: Arc<P>) -> Result<Self> {
        Self::with_config(port, SignatureTable::default(), ScanConfig::default())
    }

    pub fn with_config(
        port: Arc<P>,
        signatures: SignatureTable,
        config: ScanConfig,
    ) -> Result<Self> {
        Ok(Self {
            port,
            signatures: Arc::new(signatures),
            config: Arc::new(config),
            engine: AsyncTaskEngine::new()?,
        })
    }

    pub fn port(&self) -> &Arc<P> {
        &self.port
    }

    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Attach to a process by name or PID (all-digit input).
    pub fn submit_attach<C>(&self, target: &str, callback: C)
    where
        C: FnOnce(AsyncResult<bool>) + Send + 'static,
    {
        let target = AttachTarget::from(target);
        let port = Arc::clone(&self.port);
        let id = format!("attach_{}", target);

        self.engine.submit(
            TaskKind::Attach,
            format!("Attaching to process: {}", target),
            Some(id),
            move || {
                if port.attach(&target) {
                    info!("Attached to {}", target);
                    return Ok(AsyncResult::success(
                        true,
                        format!("Successfully attached to {}", target),
                    ));
                }

                if !port.list_processes().iter().any(|p| target.matches(p)) {
                    error!("Process not found: {}", target);
                    return Err(Error::ProcessNotFound(target.to_string()));
                }
                error!("Failed to attach to {}", target);
                Ok(AsyncResult::failure(false, format!("Failed to attach to {}", target)))
            },
            callback,
        );
    }

    pub fn submit_detach<C>(&self, callback: C)
    where
        C: FnOnce(AsyncResult<bool>) + Send + 'static,
    {
        let port = Arc::clone(&self.port);
        self.engine.submit(
            TaskKind::Detach,
            "Detaching from process",
            Some("detach".to_string()),
            move || {
                let Some(process) = port.current_process() else {
                    return Err(Error::NotConnected);
                };
                port.detach();
                info!("Detached from {}", process.name);
                Ok(AsyncResult::success(true, format!("Detached from {}", process.name)))
            },
            callback,
        );
    }

    /// Locate every target class.
    ///
    /// Succeeds when at least one class was found; the payload is delivered
    /// either way.
    pub fn submit_scan_all_globals<C>(&self, callback: C)
    where
        C: FnOnce(AsyncResult<ResolvedGlobals>) + Send + 'static,
    {
        let (port, signatures, config) = self.shared();
        self.engine.submit(
            TaskKind::ScanGlobals,
            "Scanning for Unreal Engine globals",
            Some("scan_globals".to_string()),
            move || {
                if !port.is_connected() {
                    return Err(Error::NotConnected);
                }

                let globals = GlobalLocator::new(&*port, &signatures, &config).locate_all();
                if !globals.is_valid() {
                    return Ok(AsyncResult::failure(globals, GLOBALS_NOT_FOUND));
                }

                let found = globals
                    .found()
                    .map(|(class, address)| {
                        format!("{}: {}", class, format_hex_address(address, true))
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(AsyncResult::success(
                    globals,
                    format!("Unreal globals found - {}", found),
                ))
            },
            callback,
        );
    }

    /// Locate one class given by name. Unknown names fail the task.
    pub fn submit_locate<C>(&self, class_name: &str, callback: C)
    where
        C: FnOnce(AsyncResult<u64>) + Send + 'static,
    {
        let (port, signatures, config) = self.shared();
        let class_name = class_name.to_string();

        self.engine.submit(
            TaskKind::Locate,
            format!("Scanning for {}", class_name),
            Some(format!("locate_{}", class_name)),
            move || {
                let class = TargetClass::from_name(&class_name)?;
                if !port.is_connected() {
                    return Err(Error::NotConnected);
                }

                let address = GlobalLocator::new(&*port, &signatures, &config).locate(class);
                if address == 0 {
                    return Ok(AsyncResult::failure(0, format!("{} not found", class)));
                }
                Ok(AsyncResult::success(
                    address,
                    format!("{}: {}", class, format_hex_address(address, true)),
                ))
            },
            callback,
        );
    }

    pub fn submit_main_module_base<C>(&self, callback: C)
    where
        C: FnOnce(AsyncResult<u64>) + Send + 'static,
    {
        let (port, _, config) = self.shared();
        self.engine.submit(
            TaskKind::MainModuleBase,
            "Getting main module base",
            None,
            move || {
                if !port.is_connected() {
                    return Err(Error::NotConnected);
                }
                let module = MemoryReader::new(&*port)
                    .main_module(config.fallback_image_size)
                    .ok_or(Error::ModuleNotFound)?;
                Ok(AsyncResult::success(
                    module.base_address,
                    format!(
                        "Main module {} at {}",
                        module.name,
                        format_hex_address(module.base_address, true)
                    ),
                ))
            },
            callback,
        );
    }

    /// Scan the main module for a textual signature.
    pub fn submit_scan_signature<C>(&self, pattern: &str, callback: C)
    where
        C: FnOnce(AsyncResult<u64>) + Send + 'static,
    {
        let (port, _, config) = self.shared();
        let pattern = pattern.to_string();

        self.engine.submit(
            TaskKind::ScanSignature,
            format!("Scanning for signature: {}", pattern),
            None,
            move || {
                let found = MemoryReader::new(&*port).scan_signature(&pattern, 0, 0, &config)?;
                Ok(match found {
                    Some(address) => AsyncResult::success(
                        address,
                        format!("Signature found at {}", format_hex_address(address, true)),
                    ),
                    None => AsyncResult::failure(0, "Signature not found"),
                })
            },
            callback,
        );
    }

    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    pub fn has_pending(&self) -> bool {
        self.engine.has_pending()
    }

    pub fn cancel_all(&self) -> usize {
        self.engine.cancel_all()
    }

    /// Deliver finished results to their callbacks on this thread.
    pub fn pump(&self) -> usize {
        self.engine.pump()
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    fn shared(&self) -> (Arc<P>, Arc<SignatureTable>, Arc<ScanConfig>) {
        (
            Arc::clone(&self.port),
            Arc::clone(&self.signatures),
            Arc::clone(&self.config),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn settle<P: MemoryPort + 'static>(finder: &UeFind<P>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while finder.has_pending() {
            assert!(Instant::now() < deadline, "tasks did not finish");
            thread::sleep(Duration::from_millis(1));
        }
        finder.pump();
    }

    #[test]
    fn test_attach_by_name_and_pid() {
        let port = MockMemoryBuilder::new()
            .module("Game.exe", 0x1_4000_0000, vec![0; 0x100])
            .process(77, "Game.exe")
            .detached()
            .build();
        let finder = UeFind::new(Arc::new(port)).unwrap();
        let (tx, rx) = mpsc::channel();

        let by_name = tx.clone();
        finder.submit_attach("game.exe", move |r| by_name.send(r).unwrap());
        finder.submit_attach("77", move |r| tx.send(r).unwrap());
        settle(&finder);

        let first = rx.try_recv().unwrap();
        assert!(first.is_success);
        assert_eq!(first.log_message, "Successfully attached to game.exe");
        assert!(rx.try_recv().unwrap().payload);
    }

    #[test]
    fn test_attach_unknown_process_fails() {
        let port = MockMemoryBuilder::new()
            .module("Game.exe", 0x1_4000_0000, vec![0; 0x100])
            .detached()
            .build();
        let finder = UeFind::new(Arc::new(port)).unwrap();
        let (tx, rx) = mpsc::channel();

        finder.submit_attach("Other.exe", move |r| tx.send(r).unwrap());
        settle(&finder);

        let result = rx.try_recv().unwrap();
        assert!(result.is_complete);
        assert!(!result.is_success);
        assert_eq!(result.error_message, "Process not found: Other.exe");
    }

    #[test]
    fn test_scan_requires_connection() {
        let port = MockMemoryBuilder::new()
            .module("Game.exe", 0x1_4000_0000, vec![0; 0x100])
            .detached()
            .build();
        let finder = UeFind::new(Arc::new(port)).unwrap();
        let (tx, rx) = mpsc::channel();

        finder.submit_scan_all_globals(move |r| tx.send(r).unwrap());
        settle(&finder);

        let result = rx.try_recv().unwrap();
        assert!(!result.is_success);
        assert!(!result.payload.is_valid());
        assert_eq!(result.error_message, "Not connected to any process");
    }

    #[test]
    fn test_scan_without_globals_reports_failure() {
        let mut image = vec![0u8; 0x1000];
        image[..2].copy_from_slice(b"MZ");
        let port = MockMemoryBuilder::new()
            .module("Game.exe", 0x1_4000_0000, image)
            .build();
        let finder = UeFind::new(Arc::new(port)).unwrap();
        let (tx, rx) = mpsc::channel();

        finder.submit_scan_all_globals(move |r| tx.send(r).unwrap());
        settle(&finder);

        let result = rx.try_recv().unwrap();
        assert!(!result.is_success);
        assert_eq!(result.error_message, GLOBALS_NOT_FOUND);
    }

    #[test]
    fn test_locate_unknown_class() {
        let port = MockMemoryBuilder::new()
            .module("Game.exe", 0x1_4000_0000, vec![0; 0x100])
            .build();
        let finder = UeFind::new(Arc::new(port)).unwrap();
        let (tx, rx) = mpsc::channel();

        finder.submit_locate("GEngine", move |r| tx.send(r).unwrap());
        settle(&finder);

        let result = rx.try_recv().unwrap();
        assert!(!result.is_success);
        assert_eq!(result.error_message, "Unknown target class: GEngine");
    }

    #[test]
    fn test_main_module_base_and_signature_scan() {
        let mut image = vec![0u8; 0x800];
        image[0x410..0x414].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let port = MockMemoryBuilder::new()
            .module("Game.exe", 0x1_4000_0000, image)
            .build();
        let finder = UeFind::new(Arc::new(port)).unwrap();
        let (tx, rx) = mpsc::channel();

        let base_tx = tx.clone();
        let missing_tx = tx.clone();
        finder.submit_main_module_base(move |r| base_tx.send(r).unwrap());
        finder.submit_scan_signature("DE AD ?? EF", move |r| tx.send(r).unwrap());
        finder.submit_scan_signature("CA FE", move |r| missing_tx.send(r).unwrap());
        settle(&finder);

        assert_eq!(rx.try_recv().unwrap().payload, 0x1_4000_0000);
        assert_eq!(rx.try_recv().unwrap().payload, 0x1_4000_0410);
        let missing = rx.try_recv().unwrap();
        assert!(!missing.is_success);
        assert_eq!(missing.payload, 0);
    }

    #[test]
    fn test_detach() {
        let port = Arc::new(
            MockMemoryBuilder::new()
                .module("Game.exe", 0x1_4000_0000, vec![0; 0x100])
                .build(),
        );
        let finder = UeFind::new(Arc::clone(&port)).unwrap();
        let (tx, rx) = mpsc::channel();

        let first = tx.clone();
        finder.submit_detach(move |r| first.send(r).unwrap());
        finder.submit_detach(move |r| tx.send(r).unwrap());
        settle(&finder);

        assert!(rx.try_recv().unwrap().is_success);
        assert!(!rx.try_recv().unwrap().is_success);
        assert!(!port.is_connected());
    }
}
