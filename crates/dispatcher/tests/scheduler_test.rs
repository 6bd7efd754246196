#[cfg(test)]
mod scheduler_tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use jobhost_config::{CronConfig, CronJobSettings};
    use jobhost_core::{job_fn, CancellationToken, CronJob, JobLoopState};
    use jobhost_dispatcher::{CronScheduler, TokioClock};
    use jobhost_errors::JobHostError;
    use jobhost_infrastructure::MetricsCollector;

    #[derive(Clone, Default)]
    struct Probe {
        runs: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl Probe {
        fn job(&self, sleep: Duration) -> Arc<dyn CronJob> {
            let probe = self.clone();
            job_fn(move |_| {
                let probe = probe.clone();
                async move {
                    probe.runs.fetch_add(1, Ordering::SeqCst);
                    let active = probe.active.fetch_add(1, Ordering::SeqCst) + 1;
                    probe.max_active.fetch_max(active, Ordering::SeqCst);
                    tokio::time::sleep(sleep).await;
                    probe.active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    fn every_second(name: &str) -> CronJobSettings {
        CronJobSettings::new(name, "*/1 * * * * *").with_poll_interval_seconds(1)
    }

    fn scheduler(jobs: Vec<CronJobSettings>) -> CronScheduler {
        CronScheduler::with_clock(
            CronConfig { enabled: true, jobs },
            Arc::new(TokioClock::new()),
            Arc::new(MetricsCollector::new()),
        )
    }

    async fn advance(seconds: u64) {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_running_job_skips_missed_occurrences() {
        let scheduler = scheduler(vec![every_second("report")]);
        let probe = Probe::default();
        scheduler.register_job("report", probe.job(Duration::from_secs(3)));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(10).await;

        let runs = probe.runs();
        assert!(runs >= 2, "expected the job to run, got {runs}");
        assert!(runs <= 4, "expected skip-ahead rescheduling, got {runs}");
        assert_eq!(probe.max_active(), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_instance_lock_serializes_trigger() {
        let scheduler = scheduler(vec![every_second("sync")]);
        let probe = Probe::default();
        scheduler.register_job("sync", probe.job(Duration::from_secs(3)));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        // 第一次执行在1秒左右开始，持续3秒
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(scheduler.job_state("sync"), Some(JobLoopState::Running));

        scheduler.trigger("sync").await.unwrap();
        advance(5).await;

        assert!(probe.runs() >= 2);
        assert_eq!(probe.max_active(), 1);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlocked_job_may_overlap() {
        let scheduler = scheduler(vec![
            every_second("fanout").with_lock_single_instance(false)
        ]);
        let probe = Probe::default();
        scheduler.register_job("fanout", probe.job(Duration::from_secs(3)));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(scheduler.job_state("fanout"), Some(JobLoopState::Running));

        advance(8).await;
        assert!(probe.runs() >= 8, "got {}", probe.runs());
        assert!(probe.max_active() >= 2);
        scheduler.stop().await;
        assert_eq!(scheduler.job_state("fanout"), Some(JobLoopState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlocked_job_returns_to_idle_after_runs_finish() {
        // 从 00:00:30 开始，整分钟触发，执行2秒
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let scheduler = CronScheduler::with_clock(
            CronConfig {
                enabled: true,
                jobs: vec![CronJobSettings::new("minutely", "0 * * * * *")
                    .with_poll_interval_seconds(1)
                    .with_lock_single_instance(false)],
            },
            Arc::new(TokioClock::starting_at(base)),
            Arc::new(MetricsCollector::new()),
        );
        let probe = Probe::default();
        scheduler.register_job("minutely", probe.job(Duration::from_secs(2)));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(31).await;
        assert_eq!(probe.runs(), 1);
        assert_eq!(scheduler.job_state("minutely"), Some(JobLoopState::Running));

        advance(4).await;
        assert_eq!(probe.runs(), 1);
        assert_eq!(scheduler.job_state("minutely"), Some(JobLoopState::Idle));
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_expression_disables_only_that_job() {
        let scheduler = scheduler(vec![
            CronJobSettings::new("broken", "not a cron").with_poll_interval_seconds(1),
            every_second("healthy"),
        ]);
        let broken = Probe::default();
        let healthy = Probe::default();
        scheduler.register_job("broken", broken.job(Duration::ZERO));
        scheduler.register_job("healthy", healthy.job(Duration::ZERO));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(5).await;

        assert_eq!(broken.runs(), 0);
        assert!(healthy.runs() >= 3);
        assert!(matches!(
            scheduler.job_state("broken"),
            Some(JobLoopState::Faulted(_))
        ));
        assert!(!scheduler.is_healthy());

        scheduler.stop().await;
        assert_eq!(scheduler.job_state("healthy"), Some(JobLoopState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_expression_without_body_is_still_faulted() {
        let scheduler = scheduler(vec![
            CronJobSettings::new("orphan", "every tuesday").with_poll_interval_seconds(1),
            every_second("orphan_valid"),
        ]);

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();

        assert!(matches!(
            scheduler.job_state("orphan"),
            Some(JobLoopState::Faulted(_))
        ));
        assert_eq!(scheduler.job_state("orphan_valid"), None);
        assert!(!scheduler.is_healthy());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_failure_does_not_stop_loop() {
        let scheduler = scheduler(vec![every_second("flaky")]);
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = Arc::clone(&runs);
            scheduler.register_job(
                "flaky",
                job_fn(move |_| {
                    let runs = Arc::clone(&runs);
                    async move {
                        if runs.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                            return Err(JobHostError::job_failed("下游不可用"));
                        }
                        panic!("job body panicked");
                    }
                }),
            );
        }

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(6).await;

        assert!(runs.load(Ordering::SeqCst) >= 4);
        assert!(scheduler.is_healthy());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_bounds_detection() {
        // 每秒到期，但每600秒才检查一次
        let scheduler = scheduler(vec![CronJobSettings::new("slow_poll", "*/1 * * * * *")]);
        let probe = Probe::default();
        scheduler.register_job("slow_poll", probe.job(Duration::ZERO));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();

        advance(599).await;
        assert_eq!(probe.runs(), 0);
        advance(2).await;
        assert_eq!(probe.runs(), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_run_gets_a_fresh_correlation_id() {
        let scheduler = scheduler(vec![every_second("traced")]);
        let ids = Arc::new(Mutex::new(Vec::new()));
        {
            let ids = Arc::clone(&ids);
            scheduler.register_job(
                "traced",
                job_fn(move |context| {
                    let ids = Arc::clone(&ids);
                    async move {
                        assert_eq!(context.job_name, "traced");
                        ids.lock().unwrap().push(context.correlation_id);
                        Ok(())
                    }
                }),
            );
        }

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(5).await;
        scheduler.stop().await;

        let ids = ids.lock().unwrap();
        assert!(ids.len() >= 3);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_loops() {
        let scheduler = scheduler(vec![every_second("tick")]);
        let probe = Probe::default();
        scheduler.register_job("tick", probe.job(Duration::ZERO));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(3).await;

        shutdown.cancel();
        scheduler.stop().await;
        let runs = probe.runs();
        advance(5).await;

        assert_eq!(probe.runs(), runs);
        assert_eq!(scheduler.job_state("tick"), Some(JobLoopState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_jobs_are_ignored() {
        let mut disabled = every_second("disabled");
        disabled.enabled = false;
        let scheduler = scheduler(vec![every_second("configured_only"), disabled]);
        let probe = Probe::default();
        scheduler.register_job("registered_only", probe.job(Duration::ZERO));
        scheduler.register_job("disabled", probe.job(Duration::ZERO));

        let shutdown = CancellationToken::new();
        scheduler.start(&shutdown).unwrap();
        advance(3).await;

        assert_eq!(probe.runs(), 0);
        assert!(scheduler.job_states().is_empty());
        assert!(scheduler.is_healthy());
        assert!(matches!(
            scheduler.trigger("registered_only").await,
            Err(JobHostError::JobNotFound(_))
        ));
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let scheduler = scheduler(Vec::new());
        let shutdown = CancellationToken::new();

        scheduler.start(&shutdown).unwrap();
        assert!(scheduler.start(&shutdown).is_err());
        scheduler.stop().await;
    }
}
