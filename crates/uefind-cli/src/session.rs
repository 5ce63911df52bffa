//! Offline session over a dumped module image.
//!
//! Opens the image as a transport, attaches through the task engine and
//! pumps completions on the main thread until each request is answered.

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, warn};
use uefind_core::{AsyncResult, ImageFile, MemoryPort, ScanConfig, SignatureTable, UeFind};

use crate::config::CliConfig;
use crate::shutdown::ShutdownSignal;

/// Delay between pump passes
pub const POLL_TICK: Duration = Duration::from_millis(16);

/// How an image is mapped into the session.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    pub base_address: Option<u64>,
    pub module_name: Option<String>,
}

pub struct Session<P: MemoryPort + 'static> {
    finder: UeFind<P>,
    signal: Arc<ShutdownSignal>,
}

impl Session<ImageFile> {
    /// Load `image` and attach to it.
    pub fn open_image(
        image: &Path,
        options: &ImageOptions,
        config: &CliConfig,
        signatures: SignatureTable,
        signal: Arc<ShutdownSignal>,
    ) -> Result<Self> {
        let base = options.base_address.unwrap_or_else(|| config.base_address());
        let mut port = ImageFile::open(image, base)
            .with_context(|| format!("Failed to open image {}", image.display()))?;
        if let Some(name) = options.module_name.as_ref().or(config.module_name.as_ref()) {
            port = port.with_name(name.clone());
        }

        let target = port.module().name;
        let session = Self::new(Arc::new(port), signatures, config.scan.clone(), signal)?;
        session.attach(&target)?;
        Ok(session)
    }
}

impl<P: MemoryPort + 'static> Session<P> {
    pub fn new(
        port: Arc<P>,
        signatures: SignatureTable,
        scan: ScanConfig,
        signal: Arc<ShutdownSignal>,
    ) -> Result<Self> {
        let finder = UeFind::with_config(port, signatures, scan)?;
        Ok(Self { finder, signal })
    }

    pub fn finder(&self) -> &UeFind<P> {
        &self.finder
    }

    pub fn attach(&self, target: &str) -> Result<()> {
        let result = self.request(|finder, tx| finder.submit_attach(target, forward(tx)))?;
        result.into_result().map_err(|e| anyhow!(e))?;
        info!("Attached to {}", target);
        Ok(())
    }

    /// Submit one request and block until its callback has run.
    ///
    /// `submit` receives a sender its callback must reply through.
    pub fn request<T, S>(&self, submit: S) -> Result<AsyncResult<T>>
    where
        T: Send + 'static,
        S: FnOnce(&UeFind<P>, Sender<AsyncResult<T>>),
    {
        let (reply, answer) = mpsc::channel();
        submit(&self.finder, reply);
        self.wait_idle()?;
        answer
            .try_recv()
            .map_err(|_| anyhow!("Request finished without a result"))
    }

    /// Pump until no task is queued or running.
    fn wait_idle(&self) -> Result<()> {
        loop {
            let ran = self.finder.pump();
            if ran > 0 {
                debug!("Dispatched {} completion(s)", ran);
            }
            if !self.finder.has_pending() {
                // Completions are queued before the pending count drops.
                self.finder.pump();
                return Ok(());
            }
            if self.signal.wait(POLL_TICK) {
                let dropped = self.finder.cancel_all();
                warn!("Interrupted, dropped {} queued task(s)", dropped);
                bail!("Interrupted");
            }
        }
    }
}

/// Callback that sends its result down `tx`.
pub fn forward<T>(tx: Sender<AsyncResult<T>>) -> impl FnOnce(AsyncResult<T>) + Send + 'static
where
    T: Send + 'static,
{
    move |result| {
        // The receiver is only gone once the request was abandoned.
        let _ = tx.send(result);
    }
}
