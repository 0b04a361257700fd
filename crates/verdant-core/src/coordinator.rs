//! Serialized sync pipeline.
//!
//! [`SyncCoordinator`] owns a single worker task that consumes a FIFO queue of
//! jobs. Full syncs and any other store-mutating operation submitted through a
//! [`SyncHandle`] run one at a time, strictly in submission order. Callers
//! await a one-shot reply and are never blocked by the queue itself.
//!
//! # Architecture
//!
//! The worker opens one store handle per job and drops it when the job ends.
//! A sync shares its handle across the four phases, which always run in the
//! same order:
//!
//! 1. pull reference tables
//! 2. pull sensor history
//! 3. push reference tables
//! 4. push sensor history
//!
//! A phase that ends with errors aborts the remaining phases. Completed phases
//! are not rolled back.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use verdant_store::Store;

use crate::error::{Error, Result};
use crate::options::SyncOptions;
use crate::reference::{ReferenceTableSyncer, TablePush, TableStats};
use crate::timeseries::{DeviceHistoryReport, TimeSeriesSyncer};
use crate::transport::Transport;
use crate::upload::UploadBatcher;

/// The four phases of a sync, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    PullReference,
    PullHistory,
    PushReference,
    PushHistory,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::PullReference => "pull reference tables",
            SyncPhase::PullHistory => "pull sensor history",
            SyncPhase::PushReference => "push reference tables",
            SyncPhase::PushHistory => "push sensor history",
        };
        f.write_str(name)
    }
}

/// The phase that stopped a sync and why.
#[derive(Debug)]
pub struct PhaseFailure {
    /// Failing phase.
    pub phase: SyncPhase,
    /// Every error the phase collected.
    pub errors: Vec<Error>,
}

/// Outcome of one full sync.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Phases that finished cleanly, in order.
    pub completed: Vec<SyncPhase>,
    /// The phase that failed, if any.
    pub failure: Option<PhaseFailure>,
    /// Merge counts per pulled reference table.
    pub reference_pull: Vec<TableStats>,
    /// Per-device history pull outcomes.
    pub history_pull: Vec<DeviceHistoryReport>,
    /// Rows posted per reference table.
    pub reference_push: Vec<TablePush>,
    /// Never-uploaded blocks committed.
    pub blocks_uploaded: usize,
    /// Re-edited slices committed.
    pub slices_reuploaded: usize,
}

impl SyncReport {
    /// Whether all four phases completed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Errors of the failing phase. Empty on success.
    pub fn errors(&self) -> &[Error] {
        self.failure
            .as_ref()
            .map(|f| f.errors.as_slice())
            .unwrap_or_default()
    }

    /// Record the end of `phase`. Returns whether the pipeline may continue.
    fn finish(&mut self, phase: SyncPhase, errors: Vec<Error>) -> bool {
        if errors.is_empty() {
            self.completed.push(phase);
            return true;
        }

        for e in &errors {
            error!(%phase, error = %e, "Sync phase error");
        }
        error!(%phase, errors = errors.len(), "Sync aborted");
        self.failure = Some(PhaseFailure { phase, errors });
        false
    }
}

type StoreJob = Box<dyn FnOnce(&Path) + Send + 'static>;

enum Job {
    Sync(oneshot::Sender<Result<SyncReport>>),
    Run(StoreJob),
    Shutdown(oneshot::Sender<()>),
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Sync(_) => f.write_str("Sync"),
            Job::Run(_) => f.write_str("Run"),
            Job::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// Single-consumer worker running the sync pipeline.
///
/// Note: the store is not held across jobs. The worker keeps the path and
/// opens a fresh handle for each job.
pub struct SyncCoordinator {
    jobs: mpsc::UnboundedReceiver<Job>,
    store_path: PathBuf,
    transport: Arc<dyn Transport>,
    options: SyncOptions,
}

impl SyncCoordinator {
    /// Start the worker on the current tokio runtime.
    ///
    /// The worker stops after [`SyncHandle::shutdown`] or once every handle
    /// has been dropped.
    pub fn spawn(
        store_path: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
        options: SyncOptions,
    ) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            jobs: rx,
            store_path: store_path.into(),
            transport,
            options,
        };
        tokio::spawn(worker.run());
        SyncHandle { jobs: tx }
    }

    async fn run(mut self) {
        info!(store = %self.store_path.display(), "Sync coordinator started");

        while let Some(job) = self.jobs.recv().await {
            match job {
                Job::Sync(reply) => {
                    let report = self.sync_once().await;
                    let _ = reply.send(report);
                }
                Job::Run(op) => {
                    let path = self.store_path.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || op(&path)).await {
                        error!("Store job failed: {e}");
                    }
                }
                Job::Shutdown(reply) => {
                    let _ = reply.send(());
                    break;
                }
            }
        }

        info!("Sync coordinator stopped");
    }

    // Store calls inside the phases stay on this task: they interleave with
    // transport awaits on a `&mut Store`, and this task is the store's only user.
    async fn sync_once(&self) -> Result<SyncReport> {
        let mut store = Store::open(&self.store_path)?;
        let transport = self.transport.as_ref();
        let mut report = SyncReport::default();
        info!("Sync started");

        let pull = ReferenceTableSyncer::new(transport).pull(&mut store).await;
        report.reference_pull = pull.tables;
        if !report.finish(SyncPhase::PullReference, pull.errors) {
            return Ok(report);
        }

        let history = TimeSeriesSyncer::new(transport, &self.options)
            .pull(&mut store)
            .await;
        report.history_pull = history.devices;
        if !report.finish(SyncPhase::PullHistory, history.errors) {
            return Ok(report);
        }

        let push = ReferenceTableSyncer::new(transport).push(&mut store).await;
        report.reference_push = push.tables;
        if !report.finish(SyncPhase::PushReference, push.errors) {
            return Ok(report);
        }

        let upload = UploadBatcher::new(transport, &self.options)
            .push(&mut store)
            .await;
        report.blocks_uploaded = upload.uploaded;
        report.slices_reuploaded = upload.reuploaded;
        if !report.finish(SyncPhase::PushHistory, upload.errors) {
            return Ok(report);
        }

        info!(
            blocks_uploaded = report.blocks_uploaded,
            slices_reuploaded = report.slices_reuploaded,
            "Sync completed"
        );
        Ok(report)
    }
}

/// Cloneable entry point to a running [`SyncCoordinator`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use verdant_core::{MockTransport, SyncCoordinator, SyncOptions};
///
/// #[tokio::main]
/// async fn main() -> verdant_core::Result<()> {
///     let handle = SyncCoordinator::spawn(
///         "verdant.db",
///         Arc::new(MockTransport::new()),
///         SyncOptions::default(),
///     );
///
///     let report = handle.sync().await?;
///     println!("sync ok: {}", report.is_success());
///
///     let blocks = handle.run(|store| Ok(store.count_history(None)?)).await?;
///     println!("{blocks} history blocks");
///
///     handle.shutdown().await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SyncHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SyncHandle {
    /// Queue a full sync and wait for its report.
    ///
    /// An `Err` means the sync could not start (store unavailable, worker
    /// stopped). Phase failures are reported in the [`SyncReport`].
    pub async fn sync(&self) -> Result<SyncReport> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::Sync(reply))?;
        rx.await.map_err(|_| Error::CoordinatorStopped)?
    }

    /// Queue a store operation behind any pending jobs and return its result.
    pub async fn run<F, R>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Store) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: StoreJob = Box::new(move |path: &Path| {
            let result = Store::open(path)
                .map_err(Error::from)
                .and_then(|mut store| op(&mut store));
            let _ = reply.send(result);
        });
        self.submit(Job::Run(job))?;
        rx.await.map_err(|_| {
            if self.is_running() {
                Error::JobPanicked
            } else {
                Error::CoordinatorStopped
            }
        })?
    }

    /// Let queued jobs finish, then stop the worker.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::Shutdown(reply))?;
        rx.await.map_err(|_| Error::CoordinatorStopped)
    }

    /// Whether the worker is still accepting jobs.
    pub fn is_running(&self) -> bool {
        !self.jobs.is_closed()
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.jobs.send(job).map_err(|_| Error::CoordinatorStopped)
    }
}
