use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use uefind_core::memory::{MockMemory, MockMemoryBuilder};
use uefind_core::{AttachTarget, MemoryPort, ModuleInfo, ProcessInfo, UeFind};

const BASE: u64 = 0x1_4000_0000;

fn settle<P: MemoryPort + 'static>(finder: &UeFind<P>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while finder.has_pending() {
        assert!(Instant::now() < deadline, "tasks did not finish");
        thread::sleep(Duration::from_millis(1));
    }
}

fn game_image() -> MockMemory {
    let mut image = vec![0u8; 0x4000];
    image[..2].copy_from_slice(b"MZ");
    MockMemoryBuilder::new().module("Game.exe", BASE, image).build()
}

/// Transport whose reads block until the gate is opened.
struct GatedPort {
    inner: MockMemory,
    open: Mutex<bool>,
    opened: Condvar,
    entered: Mutex<Option<Sender<()>>>,
}

impl GatedPort {
    fn new(inner: MockMemory) -> (Self, Receiver<()>) {
        let (tx, rx) = mpsc::channel();
        let port = Self {
            inner,
            open: Mutex::new(false),
            opened: Condvar::new(),
            entered: Mutex::new(Some(tx)),
        };
        (port, rx)
    }

    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl MemoryPort for GatedPort {
    fn read(&self, address: u64, buf: &mut [u8]) -> usize {
        if let Some(entered) = self.entered.lock().unwrap().take() {
            entered.send(()).unwrap();
        }
        let open = self.open.lock().unwrap();
        drop(self.opened.wait_while(open, |open| !*open).unwrap());
        self.inner.read(address, buf)
    }

    fn write(&self, address: u64, data: &[u8]) -> usize {
        self.inner.write(address, data)
    }

    fn list_modules(&self) -> Vec<ModuleInfo> {
        self.inner.list_modules()
    }

    fn list_processes(&self) -> Vec<ProcessInfo> {
        self.inner.list_processes()
    }

    fn attach(&self, target: &AttachTarget) -> bool {
        self.inner.attach(target)
    }

    fn detach(&self) {
        self.inner.detach()
    }

    fn current_process(&self) -> Option<ProcessInfo> {
        self.inner.current_process()
    }
}

#[test]
fn test_results_dispatch_in_submission_order() {
    let finder = UeFind::new(Arc::new(game_image())).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&order);
    finder.submit_main_module_base(move |result| {
        assert_eq!(result.payload, BASE);
        first.lock().unwrap().push("T1");
    });
    let second = Arc::clone(&order);
    finder.submit_locate("GWorld", move |result| {
        assert!(result.is_complete);
        second.lock().unwrap().push("T2");
    });

    settle(&finder);
    finder.pump();
    finder.pump();
    assert_eq!(*order.lock().unwrap(), vec!["T1", "T2"]);
}

#[test]
fn test_cancel_all_leaves_running_task() {
    let (port, entered) = GatedPort::new(game_image());
    let port = Arc::new(port);
    let finder = UeFind::new(Arc::clone(&port)).unwrap();
    let dispatched = Arc::new(Mutex::new(Vec::new()));

    let running = Arc::clone(&dispatched);
    finder.submit_scan_all_globals(move |result| {
        assert!(result.is_complete);
        running.lock().unwrap().push("scan".to_string());
    });
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    for class in ["GWorld", "GNames", "GObjects"] {
        let queued = Arc::clone(&dispatched);
        finder.submit_locate(class, move |_| queued.lock().unwrap().push(class.to_string()));
    }
    assert_eq!(finder.pending_count(), 4);

    assert_eq!(finder.cancel_all(), 3);
    assert_eq!(finder.pending_count(), 1);

    port.release();
    settle(&finder);
    assert_eq!(finder.pump(), 1);
    assert_eq!(*dispatched.lock().unwrap(), vec!["scan".to_string()]);
}

#[test]
fn test_pump_is_non_blocking_while_worker_is_busy() {
    let (port, entered) = GatedPort::new(game_image());
    let port = Arc::new(port);
    let finder = UeFind::new(Arc::clone(&port)).unwrap();

    finder.submit_scan_signature("DE AD BE EF", |_| {});
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    assert_eq!(finder.pump(), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(finder.has_pending());

    port.release();
    settle(&finder);
    assert_eq!(finder.pump(), 1);
}
