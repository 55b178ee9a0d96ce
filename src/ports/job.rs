use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tokio_util::sync::CancellationToken;

/// Job defines the port (interface) for a unit of work run by a [`Gate`](crate::Gate).
///
/// Implementations should return promptly once `cancel` fires. Any `Err` returned
/// from `run` is forwarded, best effort, to the gate's error stream.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Run the job to completion.
    ///
    /// # Arguments
    /// * `cancel` - Cancellation signal plumbed through from the submitter
    async fn run(&self, cancel: CancellationToken) -> Result<()>;

    /// Short name used in logs and spans.
    fn name(&self) -> &str {
        "job"
    }
}

/// Type-erased, shareable job handle accepted by [`Gate::submit_shared`](crate::Gate::submit_shared).
pub type SharedJob = Arc<dyn Job>;

#[async_trait]
impl<J: Job + ?Sized> Job for Arc<J> {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        (**self).run(cancel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
