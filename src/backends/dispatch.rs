//! Coalescing deferred-flush dispatcher.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::backends::{FlushDispatcher, FlushHandler};
use crate::error::DispatchError;

enum Command {
    Run(String),
    Shutdown,
}

/// Channel-backed [`FlushDispatcher`] with per-counter coalescing.
///
/// A pending set guards the job queue: scheduling a counter that already
/// has a queued or running job is a no-op, so rapid increments of a hot
/// counter collapse into a single flush. The entry is cleared only after
/// the handler returns, giving at most one in-flight flush per counter.
///
/// Jobs run on a background worker thread once
/// [`start`](WorkerDispatcher::start) is called. Tests that want
/// deterministic execution skip `start` and pump queued jobs with
/// [`drain`](WorkerDispatcher::drain) instead; the two modes should not
/// be mixed. The worker holds the handler weakly, so dropping the engine
/// stops the worker rather than leaking it.
pub struct WorkerDispatcher {
    tx: Sender<Command>,
    rx: Receiver<Command>,
    pending: Arc<Mutex<HashSet<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerDispatcher {
    /// Creates a dispatcher with an empty queue and no worker.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            pending: Arc::new(Mutex::new(HashSet::new())),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the background worker delivering jobs to `handler`.
    ///
    /// Jobs scheduled before `start` are delivered once it runs.
    pub fn start(&self, handler: &Arc<dyn FlushHandler>) {
        let rx = self.rx.clone();
        let pending = Arc::clone(&self.pending);
        let weak: Weak<dyn FlushHandler> = Arc::downgrade(handler);
        let mut worker = self.worker.lock().expect("dispatcher lock poisoned");
        if worker.is_some() {
            return;
        }
        *worker = Some(std::thread::spawn(move || {
            while let Ok(command) = rx.recv() {
                match command {
                    Command::Shutdown => break,
                    Command::Run(name) => {
                        let Some(handler) = weak.upgrade() else {
                            break;
                        };
                        handler.run_flush(&name);
                        pending
                            .lock()
                            .expect("dispatcher lock poisoned")
                            .remove(&name);
                    }
                }
            }
        }));
    }

    /// Runs every currently queued job on the calling thread.
    ///
    /// Returns the number of jobs executed. Only meaningful when no
    /// worker was started.
    pub fn drain(&self, handler: &dyn FlushHandler) -> usize {
        let mut executed = 0;
        while let Ok(command) = self.rx.try_recv() {
            if let Command::Run(name) = command {
                handler.run_flush(&name);
                self.pending
                    .lock()
                    .expect("dispatcher lock poisoned")
                    .remove(&name);
                executed += 1;
            }
        }
        executed
    }

    /// Number of jobs queued or running.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("dispatcher lock poisoned").len()
    }

    /// Stops the worker after it finishes the jobs already queued.
    ///
    /// Idempotent; also invoked on drop.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().expect("dispatcher lock poisoned").take();
        if let Some(handle) = handle {
            let _ = self.tx.send(Command::Shutdown);
            if handle.join().is_err() {
                debug!("dispatcher worker panicked during shutdown");
            }
        }
    }
}

impl Default for WorkerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDispatcher")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl FlushDispatcher for WorkerDispatcher {
    fn schedule(&self, name: &str) -> Result<(), DispatchError> {
        {
            let mut pending = self.pending.lock().expect("dispatcher lock poisoned");
            if !pending.insert(name.to_string()) {
                // Already queued or running: coalesce.
                return Ok(());
            }
        }
        if self.tx.send(Command::Run(name.to_string())).is_err() {
            self.pending
                .lock()
                .expect("dispatcher lock poisoned")
                .remove(name);
            return Err(DispatchError::Unavailable("dispatcher stopped".into()));
        }
        Ok(())
    }
}
