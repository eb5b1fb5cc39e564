use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8PathBuf;
use longship_config::Settings;
use longship_pipeline::{
    DefaultSyncEngine, ProgressSnapshot, SyncEvent, SyncOptions, SyncProgress, SyncRequest,
};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::{RunId, UpdateEvent};
use crate::setup;

/// Bound of the pipeline's internal event channel.
const SYNC_EVENT_CAPACITY: usize = 64;
const UPDATE_EVENT_CAPACITY: usize = 256;
const PROGRESS_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("an update is already running")]
    AlreadyRunning,
    #[error("failed to spawn sync worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to start async runtime: {0}")]
    Runtime(String),
    #[error("sync worker panicked")]
    WorkerPanicked,
}

/// Clears the running flag when the worker ends, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A started cycle.
pub struct RunHandle {
    id: RunId,
    cancel: CancellationToken,
    thread: JoinHandle<()>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker thread exits.
    pub fn join(self) -> Result<(), ControllerError> {
        self.thread.join().map_err(|_| ControllerError::WorkerPanicked)
    }
}

/// Presentation boundary: start one update at a time, read progress, cancel.
pub struct UpdateController {
    engine: Arc<DefaultSyncEngine>,
    options: SyncOptions,
    progress: Arc<SyncProgress>,
    running: Arc<AtomicBool>,
    cancel: Mutex<Option<CancellationToken>>,
    tx: mpsc::Sender<UpdateEvent>,
}

impl UpdateController {
    pub fn new(
        engine: Arc<DefaultSyncEngine>,
        options: SyncOptions,
    ) -> (Self, mpsc::Receiver<UpdateEvent>) {
        let (tx, rx) = mpsc::channel(UPDATE_EVENT_CAPACITY);
        let controller = Self {
            engine,
            options,
            progress: Arc::new(SyncProgress::new()),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
            tx,
        };
        (controller, rx)
    }

    pub fn from_settings(
        settings: &Settings,
        use_cache: bool,
    ) -> anyhow::Result<(Self, mpsc::Receiver<UpdateEvent>)> {
        let engine = setup::build_engine(settings, use_cache)?;
        Ok(Self::new(Arc::new(engine), setup::sync_options(settings)))
    }

    /// Sender for other publishers, such as the announcement watcher.
    pub fn events(&self) -> mpsc::Sender<UpdateEvent> {
        self.tx.clone()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        let guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = guard.as_ref() {
            token.cancel();
        }
    }

    /// Start a cycle for `root` on the `longship-sync` worker thread.
    pub fn start(
        &self,
        root: Utf8PathBuf,
        cancel: CancellationToken,
    ) -> Result<RunHandle, ControllerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ControllerError::AlreadyRunning);
        }
        let guard = RunningGuard(self.running.clone());

        let rt = crate::async_runtime::runtime()?;
        let run_id = Uuid::new_v4();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());

        let req = SyncRequest {
            local_root: root,
            options: self.options.clone(),
        };
        let engine = self.engine.clone();
        let progress = self.progress.clone();
        let tx = self.tx.clone();
        let token = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("longship-sync".into())
            .spawn(move || {
                rt.block_on(async move {
                    info!("update {} started for {}", run_id, req.local_root);
                    let _ = tx.try_send(UpdateEvent::Started { run_id });

                    let (ev_tx, mut ev_rx) = mpsc::channel(SYNC_EVENT_CAPACITY);
                    let work = engine.run(&req, progress.clone(), Some(ev_tx), token);
                    tokio::pin!(work);

                    let mut ticker = interval(PROGRESS_TICK);
                    let mut dirty = false;
                    let res = loop {
                        tokio::select! {
                            res = &mut work => break res,
                            Some(ev) = ev_rx.recv() => match ev {
                                SyncEvent::EntrySynced { .. } => dirty = true,
                                SyncEvent::Retrying { attempt, max_attempts } => {
                                    let _ = tx.try_send(UpdateEvent::Retrying { attempt, max_attempts });
                                }
                                SyncEvent::Phase(_) => {}
                            },
                            _ = ticker.tick() => {
                                if dirty {
                                    dirty = false;
                                    let _ = tx.try_send(UpdateEvent::Progress(progress.snapshot()));
                                }
                            }
                        }
                    };

                    // Final snapshot is sent reliably so the bar never stops short.
                    let _ = tx.send(UpdateEvent::Progress(progress.snapshot())).await;
                    let terminal = match res {
                        Ok(report) => UpdateEvent::Finished(Ok(report)),
                        Err(e) if e.is_cancelled() => UpdateEvent::Cancelled,
                        Err(e) => {
                            warn!("update {} failed: {}", run_id, e);
                            UpdateEvent::Finished(Err(e.user_message()))
                        }
                    };
                    drop(guard);
                    let _ = tx.send(terminal).await;
                });
            })
            .map_err(ControllerError::Spawn)?;

        Ok(RunHandle {
            id: run_id,
            cancel,
            thread,
        })
    }
}
