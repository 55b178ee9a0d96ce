//! One-shot bounded-concurrency admission gate.
//!
//! A [`Gate`] admits at most `capacity` jobs at a time. Each admitted job runs on
//! its own tokio task; there is no worker fleet and no internal queue. The
//! "queue" is simply the set of callers parked in [`Gate::submit`] waiting for a
//! slot.
//!
//! Slots are permits of a tokio [`Semaphore`]. [`Gate::close_and_wait`] flips the
//! closed flag and then acquires every permit, which can only succeed once all
//! in-flight jobs have released theirs. That is the join; no separate counter is
//! involved. After the join the error stream is closed. The drain runs on its
//! own task, so abandoning a `close_and_wait` future (for example under a
//! timeout) never leaves the gate half closed.
//!
//! Panics inside a job are caught at the task boundary and logged. They never
//! leak a slot and never reach the error stream.
use std::{
    any::Any,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use eyre::Report;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{
    OwnedSemaphorePermit, Semaphore,
    mpsc::{self, error::TrySendError},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    config::models::GateConfig,
    core::error_stream::{DEFAULT_ERROR_BUFFER, ErrorStream, MAX_ERROR_BUFFER},
    metrics,
    ports::job::{Job, SharedJob},
    tracing_setup,
};

/// Errors returned synchronously from the admission path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    /// The gate has started (or finished) shutting down.
    #[error("gate is shutting down")]
    Shutdown,

    /// No job was supplied.
    #[error("nil job submitted")]
    NilJob,

    /// The caller's cancellation fired before a slot became free.
    #[error("submission cancelled while waiting for a slot")]
    Cancelled,

    /// The caller's deadline elapsed before a slot became free.
    #[error("deadline exceeded while waiting for a slot")]
    DeadlineExceeded,
}

impl GateError {
    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::Shutdown => "shutdown",
            GateError::NilJob => "nil_job",
            GateError::Cancelled => "cancelled",
            GateError::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Result type alias for admission.
pub type GateResult<T> = Result<T, GateError>;

/// Limits the number of concurrently running jobs.
///
/// One-shot: after [`close_and_wait`](Gate::close_and_wait) every submission
/// fails with [`GateError::Shutdown`] and the error stream is closed. Build a new
/// gate for another run.
pub struct Gate {
    label: Arc<str>,
    capacity: usize,
    closed: AtomicBool,
    slots: Arc<Semaphore>,
    errors_tx: Arc<ArcSwapOption<mpsc::Sender<Report>>>,
    errors_rx: ErrorStream,
    drained: CancellationToken,
}

impl Gate {
    /// Largest capacity a gate accepts; larger requests are clamped.
    pub const MAX_CAPACITY: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
        Semaphore::MAX_PERMITS
    } else {
        u32::MAX as usize
    };

    /// Create a gate admitting up to `capacity` jobs at once.
    ///
    /// A capacity of zero is coerced to one.
    pub fn new(capacity: usize) -> Self {
        Self::build("default", capacity, DEFAULT_ERROR_BUFFER)
    }

    /// Create a gate from configuration (capacity, error buffer, label).
    pub fn with_config(config: &GateConfig) -> Self {
        Self::build(&config.label, config.capacity, config.error_buffer)
    }

    fn build(label: &str, capacity: usize, error_buffer: usize) -> Self {
        let capacity = capacity.clamp(1, Self::MAX_CAPACITY);
        let error_buffer = error_buffer.clamp(1, MAX_ERROR_BUFFER);
        let (tx, rx) = mpsc::channel(error_buffer);

        tracing::debug!(gate = label, capacity, error_buffer, "gate created");

        Self {
            label: Arc::from(label),
            capacity,
            closed: AtomicBool::new(false),
            slots: Arc::new(Semaphore::new(capacity)),
            errors_tx: Arc::new(ArcSwapOption::from_pointee(tx)),
            errors_rx: ErrorStream::new(rx),
            drained: CancellationToken::new(),
        }
    }

    /// Admit `job`, waiting for a free slot or for `cancel` to fire.
    ///
    /// Returns as soon as the job has been started; it does not wait for the
    /// job to finish. The same token is handed to the job.
    pub async fn submit<J: Job>(&self, cancel: &CancellationToken, job: J) -> GateResult<()> {
        self.submit_shared(cancel, Some(Arc::new(job))).await
    }

    /// Dynamic flavour of [`submit`](Gate::submit) accepting an optional,
    /// type-erased job. `None` is rejected with [`GateError::NilJob`] without
    /// touching the slot pool.
    pub async fn submit_shared(
        &self,
        cancel: &CancellationToken,
        job: Option<SharedJob>,
    ) -> GateResult<()> {
        let Some(job) = job else {
            return Err(self.reject(GateError::NilJob));
        };

        let cancelled = async {
            cancel.cancelled().await;
            GateError::Cancelled
        };
        self.admit(job, cancel.clone(), cancelled).await
    }

    /// Admit `job`, waiting at most `timeout` for a free slot.
    ///
    /// The job itself runs with a fresh token that is never cancelled by the
    /// gate; use [`submit`](Gate::submit) to plumb a caller token through.
    pub async fn submit_timeout<J: Job>(&self, timeout: Duration, job: J) -> GateResult<()> {
        let deadline = async {
            tokio::time::sleep(timeout).await;
            GateError::DeadlineExceeded
        };
        self.admit(Arc::new(job), CancellationToken::new(), deadline)
            .await
    }

    async fn admit<A>(
        &self,
        job: SharedJob,
        run_token: CancellationToken,
        abort: A,
    ) -> GateResult<()>
    where
        A: Future<Output = GateError>,
    {
        if self.is_closed() {
            return Err(self.reject(GateError::Shutdown));
        }

        // A caller whose signal already fired never takes a slot.
        let permit = tokio::select! {
            biased;
            err = abort => return Err(self.reject(err)),
            acquired = self.slots.clone().acquire_owned() => match acquired {
                Ok(permit) => permit,
                // The semaphore is only closed once the gate has drained.
                Err(_) => return Err(self.reject(GateError::Shutdown)),
            },
        };

        // Shutdown may have begun while we were parked on the semaphore.
        if self.is_closed() {
            drop(permit);
            return Err(self.reject(GateError::Shutdown));
        }

        let worker = Worker {
            label: self.label.clone(),
            capacity: self.capacity,
            slots: self.slots.clone(),
            errors_tx: self.errors_tx.clone(),
        };
        let span = tracing_setup::create_job_span(&self.label, job.name());

        tracing::debug!(gate = %self.label, job = job.name(), "job admitted");
        metrics::increment_admitted(&self.label);
        metrics::set_slots_in_use(&self.label, self.in_use());

        tokio::spawn(worker.run(permit, job, run_token).instrument(span));
        Ok(())
    }

    fn reject(&self, err: GateError) -> GateError {
        tracing::debug!(gate = %self.label, reason = err.reason(), "submission rejected");
        metrics::increment_rejected(&self.label, err.reason());
        err
    }

    /// Stop admissions, wait for every in-flight job to finish, then close the
    /// error stream.
    ///
    /// Idempotent: the first call starts the drain and every call, concurrent
    /// or later, returns once it has completed. The drain itself runs on a
    /// spawned task; dropping this future stops the wait, not the drain.
    pub async fn close_and_wait(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(gate = %self.label, "gate already closed, waiting for drain");
        } else {
            tracing::info!(
                gate = %self.label,
                in_use = self.in_use(),
                "Gate closing, waiting for in-flight jobs to finish"
            );
            let drain = Drain {
                label: self.label.clone(),
                capacity: self.capacity,
                slots: self.slots.clone(),
                errors_tx: self.errors_tx.clone(),
                drained: self.drained.clone(),
            };
            tokio::spawn(drain.run());
        }

        self.drained.cancelled().await;
    }

    /// Read side of the error stream.
    ///
    /// Every call returns a handle on the same stream, so several consumers
    /// may read concurrently. Consumers should drain it for the gate's
    /// lifetime; it ends once [`close_and_wait`](Gate::close_and_wait) has
    /// completed.
    pub fn errors(&self) -> ErrorStream {
        self.errors_rx.clone()
    }

    /// Number of occupied slots. Advisory only.
    ///
    /// After shutdown the drain holds every slot, so this equals
    /// [`capacity`](Gate::capacity).
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.slots.available_permits())
    }

    /// `capacity() - in_use()`. Advisory only.
    pub fn available(&self) -> usize {
        self.capacity() - self.in_use()
    }

    /// Maximum number of concurrently running jobs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether shutdown has been initiated.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Join of a closing gate. Holds clones of the shared state so it can outlive
/// the `close_and_wait` call that started it.
struct Drain {
    label: Arc<str>,
    capacity: usize,
    slots: Arc<Semaphore>,
    errors_tx: Arc<ArcSwapOption<mpsc::Sender<Report>>>,
    drained: CancellationToken,
}

impl Drain {
    async fn run(self) {
        // Taking every permit only succeeds once no job holds one.
        match self.slots.acquire_many(self.capacity as u32).await {
            Ok(all) => all.forget(),
            Err(_) => tracing::warn!(gate = %self.label, "slot pool closed before drain completed"),
        }
        // Wake anyone still parked in submit; they observe Shutdown.
        self.slots.close();

        drop(self.errors_tx.swap(None));
        let in_use = self.capacity.saturating_sub(self.slots.available_permits());
        metrics::set_slots_in_use(&self.label, in_use);

        tracing::info!(gate = %self.label, in_use, "Gate drained, error stream closed");
        self.drained.cancel();
    }
}

/// Per-job execution unit. Owns everything a spawned job needs after `submit`
/// has returned.
struct Worker {
    label: Arc<str>,
    capacity: usize,
    slots: Arc<Semaphore>,
    errors_tx: Arc<ArcSwapOption<mpsc::Sender<Report>>>,
}

impl Worker {
    async fn run(self, permit: OwnedSemaphorePermit, job: SharedJob, cancel: CancellationToken) {
        // Declared first so it is dropped last, on every path.
        let _slot = SlotGuard {
            permit: Some(permit),
            label: self.label.clone(),
            capacity: self.capacity,
            slots: self.slots.clone(),
        };

        if cancel.is_cancelled() {
            tracing::debug!(gate = %self.label, "job cancelled before start, skipping");
            return;
        }

        let timer = metrics::JobTimer::new(&self.label);
        let outcome = AssertUnwindSafe(async { job.run(cancel).await })
            .catch_unwind()
            .await;
        tracing::Span::current().record("duration_ms", timer.elapsed_ms());

        match outcome {
            Ok(Ok(())) => tracing::debug!(gate = %self.label, "job finished"),
            Ok(Err(err)) => {
                tracing::debug!(gate = %self.label, error = %err, "job failed");
                metrics::increment_job_error(&self.label);
                self.report(err);
            }
            Err(payload) => {
                tracing::error!(
                    gate = %self.label,
                    panic = %panic_message(payload.as_ref()),
                    "job panicked, fault contained"
                );
                metrics::increment_panic(&self.label);
            }
        }
    }

    /// Best-effort, non-blocking delivery to the error stream.
    fn report(&self, err: Report) {
        let Some(tx) = self.errors_tx.load_full() else {
            tracing::warn!(gate = %self.label, error = %err, "error stream closed, dropping job error");
            return;
        };

        match tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                tracing::warn!(gate = %self.label, error = %err, "error stream full, dropping job error");
                metrics::increment_dropped_error(&self.label);
            }
            Err(TrySendError::Closed(err)) => {
                tracing::debug!(gate = %self.label, error = %err, "error stream has no consumer, dropping job error");
            }
        }
    }
}

/// Returns the slot when the worker exits, however it exits.
struct SlotGuard {
    permit: Option<OwnedSemaphorePermit>,
    label: Arc<str>,
    capacity: usize,
    slots: Arc<Semaphore>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        let in_use = self.capacity.saturating_sub(self.slots.available_permits());
        metrics::set_slots_in_use(&self.label, in_use);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
