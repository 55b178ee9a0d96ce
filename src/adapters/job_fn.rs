use std::future::Future;

use async_trait::async_trait;
use eyre::Result;
use tokio_util::sync::CancellationToken;

use crate::ports::job::Job;

/// Adapter turning an async closure into a [`Job`].
///
/// ```no_run
/// use slotgate::{Gate, adapters::JobFn};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> eyre::Result<()> {
/// let gate = Gate::new(4);
/// gate.submit(
///     &CancellationToken::new(),
///     JobFn::named("tick", |_cancel| async { Ok(()) }),
/// )
/// .await?;
/// gate.close_and_wait().await;
/// # Ok(()) }
/// ```
pub struct JobFn<F> {
    name: String,
    f: F,
}

impl<F, Fut> JobFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self::named("job_fn", f)
    }

    pub fn named(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        (self.f)(cancel).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_closure_with_token() {
        let job = JobFn::named("probe", |cancel: CancellationToken| async move {
            if cancel.is_cancelled() {
                eyre::bail!("cancelled");
            }
            Ok(())
        });
        assert_eq!(job.name(), "probe");
        assert!(job.run(CancellationToken::new()).await.is_ok());

        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(job.run(token).await.unwrap_err().to_string(), "cancelled");
    }
}
