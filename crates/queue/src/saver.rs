//! Background queue saving.
//!
//! A single worker thread executes save requests one at a time, in the order
//! they were submitted, so producers never wait on disk I/O. Each request
//! carries a snapshot of the jobs and the generation the producer had observed
//! when it submitted, so a request that runs late still cannot clobber a file
//! someone else rewrote in the meantime.

use crate::job::Job;
use crate::store::{QueueStore, SaveOutcome};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendError, Sender};
use encode_queue_config::{RelocationConfig, SaverConfig};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One unit of work for the save worker.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub jobs: Vec<Job>,
    pub path: PathBuf,
    pub relocation: Option<RelocationConfig>,
    pub expected_generation: Option<String>,
}

impl SaveRequest {
    /// Run the request synchronously against `store`, logging instead of
    /// returning any failure.
    fn execute(self, store: &QueueStore) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            store.save(
                &self.jobs,
                &self.path,
                self.relocation.as_ref(),
                self.expected_generation.as_deref(),
            )
        }));

        match result {
            Ok(Ok(SaveOutcome::Committed { generation })) => {
                debug!(path = %self.path.display(), generation = %generation, "Async queue save committed")
            }
            Ok(Ok(SaveOutcome::Skipped { .. })) => {
                debug!(path = %self.path.display(), "Async queue save skipped")
            }
            Ok(Err(e)) => error!(path = %self.path.display(), "Async queue save failed: {}", e),
            Err(_) => error!(path = %self.path.display(), "Async queue save panicked"),
        }
    }
}

enum WorkerMessage {
    Save(SaveRequest),
    /// Acknowledged once every message queued before it has been handled.
    Flush(Sender<()>),
    Stop,
}

/// Handle to the background save thread.
pub struct SaveWorker {
    store: Arc<QueueStore>,
    tx: Sender<WorkerMessage>,
    stop: Arc<AtomicBool>,
    /// Disconnects when the worker thread exits.
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl SaveWorker {
    /// Spawn the worker thread.
    pub fn start(store: Arc<QueueStore>, cfg: &SaverConfig) -> io::Result<Self> {
        let (tx, rx) = unbounded();
        let (exited_tx, exited) = bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let poll_interval = cfg.poll_interval();

        let handle = {
            let store = Arc::clone(&store);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("queue-saver".into())
                .spawn(move || {
                    // Dropped on exit, including unwinding
                    let _exited_tx = exited_tx;
                    run_worker(&store, &rx, &stop, poll_interval);
                })?
        };

        debug!("Started queue save worker");
        Ok(Self {
            store,
            tx,
            stop,
            exited,
            handle: Some(handle),
        })
    }

    /// Queue a save of `jobs` to `path`.
    ///
    /// The generation this process last observed for `path` is captured now,
    /// not when the request runs. The jobs are snapshotted so the caller may
    /// keep mutating its own list.
    pub fn save(&self, jobs: &[Job], path: &Path, relocation: Option<&RelocationConfig>) {
        let request = SaveRequest {
            jobs: jobs.to_vec(),
            path: path.to_path_buf(),
            relocation: relocation.cloned(),
            expected_generation: self.store.generations().get(path),
        };
        self.submit(request);
    }

    /// Queue an already built request. If the worker is gone the save runs
    /// synchronously instead of being lost.
    pub fn submit(&self, request: SaveRequest) {
        if let Err(SendError(WorkerMessage::Save(request))) =
            self.tx.send(WorkerMessage::Save(request))
        {
            warn!(path = %request.path.display(), "Save worker is gone, saving synchronously");
            request.execute(&self.store);
        }
    }

    /// Block until every request submitted before this call has been handled,
    /// or `timeout` elapses. Returns whether the checkpoint was reached.
    ///
    /// The worker keeps running afterwards.
    pub fn wait_for_pending(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(WorkerMessage::Flush(ack_tx)).is_err() {
            return false;
        }

        match ack_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "Timed out waiting for pending queue saves");
                false
            }
        }
    }

    /// Stop the worker, letting it finish what is already queued for at most
    /// `timeout`. Returns whether the thread exited in time; if not, it is
    /// left to finish detached so shutdown never hangs.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Release);
        let _ = self.tx.send(WorkerMessage::Stop);

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("Queue save worker panicked");
                    }
                }
                info!("Queue save worker stopped");
                true
            }
            _ => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Queue save worker did not stop in time"
                );
                false
            }
        }
    }
}

fn run_worker(
    store: &QueueStore,
    rx: &Receiver<WorkerMessage>,
    stop: &AtomicBool,
    poll_interval: Duration,
) {
    loop {
        match rx.recv_timeout(poll_interval) {
            Ok(WorkerMessage::Save(request)) => request.execute(store),
            Ok(WorkerMessage::Flush(ack)) => {
                let _ = ack.send(());
            }
            Ok(WorkerMessage::Stop) => break,
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Queue save worker exiting");
}
