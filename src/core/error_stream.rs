//! Read side of a gate's best-effort error stream.
//!
//! Jobs that fail push their `eyre::Report` into a bounded channel without
//! blocking; when the buffer is full the error is dropped. The stream ends
//! once the owning gate has fully drained in `close_and_wait`.
//!
//! Every [`ErrorStream`] handed out by a gate reads from the same channel.
//! Concurrent readers compete for errors (each error is seen by exactly one
//! of them) and all of them observe the end of the stream.
use std::sync::Arc;

use eyre::Report;
use futures_util::{Stream, stream};
use tokio::sync::{Mutex, mpsc};

/// Default number of buffered job errors per gate.
pub const DEFAULT_ERROR_BUFFER: usize = 10;

/// Largest error buffer a gate accepts; larger requests are clamped.
pub const MAX_ERROR_BUFFER: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Receiving half of a gate's error stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ErrorStream {
    rx: Arc<Mutex<mpsc::Receiver<Report>>>,
}

impl ErrorStream {
    pub(crate) fn new(rx: mpsc::Receiver<Report>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Receive the next job error.
    ///
    /// Returns `None` once the gate has closed the stream and every buffered
    /// error has been consumed.
    pub async fn recv(&self) -> Option<Report> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking receive. `None` means nothing is buffered right now, the
    /// stream has ended, or another reader is currently waiting on it.
    pub fn try_recv(&self) -> Option<Report> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Drain the remaining errors until the stream closes.
    pub async fn collect_all(self) -> Vec<Report> {
        let mut errors = Vec::new();
        while let Some(err) = self.recv().await {
            errors.push(err);
        }
        errors
    }

    /// Adapt this handle into a [`Stream`] of job errors.
    pub fn into_stream(self) -> impl Stream<Item = Report> + Send + 'static {
        stream::unfold(self, |errors| async move {
            let err = errors.recv().await?;
            Some((err, errors))
        })
    }
}
