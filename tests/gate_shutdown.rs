// Shutdown, join and failure containment of the gate.
#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

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

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_prevents_admission() {
        let gate = Gate::new(2);
        let errors = gate.errors();

        gate.close_and_wait().await;

        let err = gate
            .submit(
                &CancellationToken::new(),
                JobFn::new(|_| async { Ok(()) }),
            )
            .await
            .unwrap_err();
        assert_eq!(err, GateError::Shutdown);

        // The stream is closed: receiving yields "no more values" right away.
        let next = tokio::time::timeout(Duration::from_millis(100), errors.recv())
            .await
            .expect("closed stream must not block");
        assert!(next.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_errors_forwarded_before_close() {
        let gate = Gate::new(1);
        let errors = gate.errors();

        gate.submit(
            &CancellationToken::new(),
            JobFn::new(|_| async { Err(eyre::eyre!("boom")) }),
        )
        .await
        .unwrap();

        gate.close_and_wait().await;

        let err = tokio::time::timeout(Duration::from_millis(500), errors.recv())
            .await
            .expect("timed out waiting for error")
            .expect("error delivered before the stream closed");
        assert_eq!(err.to_string(), "boom");
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_does_not_leak_slot() {
        let gate = Gate::new(1);
        let errors = gate.errors();

        gate.submit(
            &CancellationToken::new(),
            JobFn::new(|_| async { panic!("kaboom") }),
        )
        .await
        .unwrap();

        // The slot comes back even though the job panicked.
        gate.submit_timeout(Duration::from_secs(1), JobFn::new(|_| async { Ok(()) }))
            .await
            .expect("submit after panicking job");

        gate.close_and_wait().await;
        // Panics never surface on the error stream.
        assert!(errors.collect_all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_and_wait_joins_running_jobs() {
        let gate = Gate::new(3);
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let flag = done.clone();
        gate.submit(
            &CancellationToken::new(),
            JobFn::new(move |_| {
                let flag = flag.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();
        assert_eq!(gate.in_use(), 1);
        assert_eq!(gate.available(), 2);

        gate.close_and_wait().await;
        assert!(done.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_and_wait_idempotent() {
        let gate = Arc::new(Gate::new(2));
        let errors = gate.errors();

        tokio::join!(gate.close_and_wait(), gate.close_and_wait());
        gate.close_and_wait().await;

        assert!(gate.is_closed());
        assert!(errors.collect_all().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_waiting_submitter_observes_shutdown() {
        let gate = Arc::new(Gate::new(1));
        let release = CancellationToken::new();

        let hold = release.clone();
        gate.submit(
            &CancellationToken::new(),
            JobFn::new(move |_| {
                let hold = hold.clone();
                async move {
                    hold.cancelled().await;
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.submit(&CancellationToken::new(), JobFn::new(|_| async { Ok(()) }))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let closer = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.close_and_wait().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        release.cancel();
        assert_eq!(waiting.await.unwrap(), Err(GateError::Shutdown));
        closer.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_sees_submitter_cancellation() {
        let gate = Gate::new(1);
        let errors = gate.errors();
        let cancel = CancellationToken::new();

        gate.submit(
            &cancel,
            JobFn::new(|token: CancellationToken| async move {
                token.cancelled().await;
                Err(eyre::eyre!("stopped by caller"))
            }),
        )
        .await
        .unwrap();

        cancel.cancel();
        gate.close_and_wait().await;
        assert_eq!(errors.recv().await.unwrap().to_string(), "stopped by caller");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_abandoned_close_still_closes_stream() {
        let gate = Gate::new(2);
        let errors = gate.errors();
        let release = CancellationToken::new();

        gate.submit(&CancellationToken::new(), Held(release.clone()))
            .await
            .unwrap();

        // Give up on the first close while the job still holds its slot.
        let first = tokio::time::timeout(Duration::from_millis(50), gate.close_and_wait()).await;
        assert!(first.is_err());
        assert!(gate.is_closed());

        release.cancel();
        tokio::time::timeout(Duration::from_millis(500), gate.close_and_wait())
            .await
            .expect("second close waits for the running drain");

        assert_eq!(gate.in_use(), gate.capacity());
        let next = tokio::time::timeout(Duration::from_millis(500), errors.recv())
            .await
            .expect("stream closed once the drain completed");
        assert!(next.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_abandoned_close_finishes_without_another_call() {
        let gate = Gate::new(1);
        let errors = gate.errors();
        let release = CancellationToken::new();

        gate.submit(&CancellationToken::new(), Held(release.clone()))
            .await
            .unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), gate.close_and_wait())
                .await
                .is_err()
        );

        release.cancel();
        let next = tokio::time::timeout(Duration::from_millis(500), errors.recv())
            .await
            .expect("drain keeps running after its caller went away");
        assert!(next.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_readers_split_errors_and_see_close() {
        let gate = Gate::new(4);
        let readers: Vec<_> = (0..2)
            .map(|_| tokio::spawn(gate.errors().collect_all()))
            .collect();

        for i in 0..4 {
            gate.submit(
                &CancellationToken::new(),
                JobFn::new(move |_| async move { Err(eyre::eyre!("job {i}")) }),
            )
            .await
            .unwrap();
        }
        gate.close_and_wait().await;

        let mut seen = Vec::new();
        for reader in readers {
            let got = tokio::time::timeout(Duration::from_secs(1), reader)
                .await
                .expect("every reader observes the close")
                .unwrap();
            seen.extend(got.into_iter().map(|err| err.to_string()));
        }
        seen.sort();
        assert_eq!(seen, vec!["job 0", "job 1", "job 2", "job 3"]);
    }
}
