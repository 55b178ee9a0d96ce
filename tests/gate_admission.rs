// Admission behaviour of the gate: capacity bound, back-pressure and cancellation.
#[cfg(test)]
mod test {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use slotgate::{Gate, GateError, Job, adapters::JobFn};
    use tokio_util::sync::CancellationToken;

    /// Job that runs until `release` is cancelled.
    struct Held(CancellationToken);

    #[async_trait]
    impl Job for Held {
        async fn run(&self, _cancel: CancellationToken) -> eyre::Result<()> {
            self.0.cancelled().await;
            Ok(())
        }
    }

    fn held(release: &CancellationToken) -> Held {
        Held(release.clone())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocks_at_capacity_and_releases() {
        let gate = Gate::new(1);
        let errors = gate.errors();
        let release = CancellationToken::new();

        gate.submit(&CancellationToken::new(), held(&release))
            .await
            .expect("first submit");

        // The second submit must wait; a short deadline proves it blocks.
        let err = gate
            .submit_timeout(Duration::from_millis(120), held(&release))
            .await
            .unwrap_err();
        assert_eq!(err, GateError::DeadlineExceeded);

        // Free the first slot; the retry gets in.
        release.cancel();
        gate.submit(&CancellationToken::new(), held(&release))
            .await
            .expect("submit after release");

        gate.close_and_wait().await;
        assert!(errors.collect_all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_admission_does_not_take_slot() {
        let gate = Gate::new(1);
        let release = CancellationToken::new();
        gate.submit(&CancellationToken::new(), held(&release))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            canceller.cancel();
        });

        let err = gate.submit(&cancel, held(&release)).await.unwrap_err();
        assert_eq!(err, GateError::Cancelled);
        assert_eq!(gate.in_use(), 1);

        release.cancel();
        gate.close_and_wait().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_running_jobs_never_exceed_capacity() {
        const CAPACITY: usize = 3;
        let gate = Arc::new(Gate::new(CAPACITY));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut submitters = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            let running = running.clone();
            let peak = peak.clone();
            let finished = finished.clone();
            submitters.push(tokio::spawn(async move {
                for _ in 0..5 {
                    let running = running.clone();
                    let peak = peak.clone();
                    let finished = finished.clone();
                    let job = JobFn::new(move |_| {
                        let running = running.clone();
                        let peak = peak.clone();
                        let finished = finished.clone();
                        async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                            finished.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    });
                    gate.submit(&CancellationToken::new(), job).await.unwrap();
                    assert!(gate.in_use() <= CAPACITY);
                }
            }));
        }
        for submitter in submitters {
            submitter.await.unwrap();
        }

        gate.close_and_wait().await;
        assert_eq!(finished.load(Ordering::SeqCst), 20);
        assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_extra_submit_waits_for_free_slot() {
        let gate = Arc::new(Gate::new(2));
        let release = CancellationToken::new();
        for _ in 0..2 {
            gate.submit(&CancellationToken::new(), held(&release))
                .await
                .unwrap();
        }

        let waiting = {
            let gate = gate.clone();
            let release = release.clone();
            tokio::spawn(async move { gate.submit(&CancellationToken::new(), held(&release)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());
        assert_eq!(gate.in_use(), 2);

        release.cancel();
        assert_eq!(waiting.await.unwrap(), Ok(()));

        gate.close_and_wait().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_in_use_and_available() {
        let gate = Gate::new(3);
        let errors = gate.errors();
        let release = CancellationToken::new();

        gate.submit(&CancellationToken::new(), held(&release))
            .await
            .unwrap();
        assert_eq!(gate.in_use(), 1);
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.capacity(), 3);

        release.cancel();
        gate.close_and_wait().await;
        assert!(errors.collect_all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nil_job_rejected() {
        let gate = Gate::new(1);
        assert_eq!(
            gate.submit_shared(&CancellationToken::new(), None).await,
            Err(GateError::NilJob)
        );
        assert_eq!(gate.available(), 1);
        gate.close_and_wait().await;
    }
}
