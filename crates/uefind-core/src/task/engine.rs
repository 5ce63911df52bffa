//! Single-worker task queue
//!
//! Every operation that touches the transport runs on one background thread.
//! Results are parked in a completion list and handed to their callbacks only
//! when the owner calls [`AsyncTaskEngine::pump`] on its own thread.
//!
//! The queue lock and the completion lock are never held at the same time.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use strum::Display;
use tracing::{debug, warn};

use super::AsyncResult;
use crate::error::{Error, Result};

const WORKER_NAME: &str = "uefind-worker";

/// What a queued task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TaskKind {
    ScanGlobals,
    Locate,
    MainModuleBase,
    ScanSignature,
    Attach,
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EngineState {
    Active,
    StopRequested,
    Stopped,
}

type Completion = Box<dyn FnOnce() + Send>;
type Job = Box<dyn FnOnce() -> Completion + Send>;

/// A task waiting in the queue.
pub struct PendingTask {
    pub kind: TaskKind,
    pub description: String,
    pub id: Option<String>,
    job: Job,
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<PendingTask>,
    stopping: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    pending: AtomicUsize,
    completions: Mutex<Vec<Completion>>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn completions(&self) -> MutexGuard<'_, Vec<Completion>> {
        self.completions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AsyncTaskEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncTaskEngine {
    /// Start the engine and its worker thread.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(&worker_shared))?;

        debug!("Task engine started");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue `task`; `callback` receives its result on the next [`pump`](Self::pump)
    /// after it finishes.
    ///
    /// An `Err` from the task or a panic inside it becomes a failed result.
    /// Once the engine is stopped the callback gets a failed result instead.
    pub fn submit<T, F, C>(
        &self,
        kind: TaskKind,
        description: impl Into<String>,
        id: Option<String>,
        task: F,
        callback: C,
    ) where
        T: Default + Send + 'static,
        F: FnOnce() -> Result<AsyncResult<T>> + Send + 'static,
        C: FnOnce(AsyncResult<T>) + Send + 'static,
    {
        let description = description.into();

        let mut queue = self.shared.queue();
        if queue.stopping {
            drop(queue);
            warn!("Task engine stopped, rejecting: {}", description);
            let result = AsyncResult::from(Error::TaskFault("task engine is stopped".to_string()));
            self.shared
                .completions()
                .push(Box::new(move || callback(result)));
            return;
        }

        let job: Job = Box::new(move || -> Completion {
            let result = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => AsyncResult::from(e),
                Err(payload) => {
                    let fault = Error::TaskFault(panic_message(payload.as_ref()));
                    warn!("{}", fault);
                    AsyncResult::from(fault)
                }
            };
            Box::new(move || callback(result))
        });

        debug!("Queued {} task: {}", kind, description);
        queue.tasks.push_back(PendingTask {
            kind,
            description,
            id,
            job,
        });
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        drop(queue);

        self.shared.available.notify_one();
    }

    /// Run the callbacks of every finished task on the calling thread, in the
    /// order the tasks finished. Returns how many ran.
    ///
    /// If a callback panics, the callbacks after it stay queued for the next
    /// pump and the panic propagates to the caller.
    pub fn pump(&self) -> usize {
        let mut batch = Batch {
            shared: &self.shared,
            rest: mem::take(&mut *self.shared.completions()).into(),
        };
        let mut count = 0;
        while let Some(completion) = batch.rest.pop_front() {
            completion();
            count += 1;
        }
        count
    }

    /// Tasks queued or running.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Ids of tasks still waiting to run.
    pub fn queued_ids(&self) -> Vec<String> {
        self.shared
            .queue()
            .tasks
            .iter()
            .filter_map(|task| task.id.clone())
            .collect()
    }

    /// Drop every task that has not started. A running task is unaffected.
    pub fn cancel_all(&self) -> usize {
        let cancelled = {
            let mut queue = self.shared.queue();
            let cancelled = queue.tasks.len();
            queue.tasks.clear();
            cancelled
        };
        self.shared.pending.fetch_sub(cancelled, Ordering::SeqCst);

        if cancelled > 0 {
            debug!("Cancelled {} queued task(s)", cancelled);
        }
        cancelled
    }

    pub fn state(&self) -> EngineState {
        let running = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        match (self.shared.queue().stopping, running) {
            (false, _) => EngineState::Active,
            (true, true) => EngineState::StopRequested,
            (true, false) => EngineState::Stopped,
        }
    }

    /// Stop the worker after its current task. Queued tasks are discarded.
    pub fn shutdown(&self) {
        let discarded = {
            let mut queue = self.shared.queue();
            queue.stopping = true;
            let discarded = queue.tasks.len();
            queue.tasks.clear();
            discarded
        };
        self.shared.pending.fetch_sub(discarded, Ordering::SeqCst);
        self.shared.available.notify_all();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("Task worker exited abnormally");
            }
            debug!("Task engine stopped ({} queued task(s) discarded)", discarded);
        }
    }
}

impl Drop for AsyncTaskEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Completions taken by one pump; whatever has not run goes back to the
/// front of the shared list on drop.
struct Batch<'a> {
    shared: &'a Shared,
    rest: VecDeque<Completion>,
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if self.rest.is_empty() {
            return;
        }
        let mut completions = self.shared.completions();
        let later = mem::take(&mut *completions);
        completions.extend(self.rest.drain(..));
        completions.extend(later);
    }
}

fn run_worker(shared: &Shared) {
    loop {
        let task = {
            let mut queue = shared.queue();
            loop {
                if queue.stopping {
                    return;
                }
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        debug!("Running {} task: {}", task.kind, task.description);
        let completion = (task.job)();

        // Park the result before the count drops so an idle engine always
        // has its results ready to pump.
        shared.completions().push(completion);
        shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
