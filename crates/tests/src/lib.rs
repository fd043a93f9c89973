//! # Integration Tests
//!
//! End-to-end tests across crates.
//!
//! Covers:
//! - Flush trigger scenarios (count, bytes, time)
//! - Partial-failure retry and retry exhaustion
//! - Oversized messages, backpressure and shutdown

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        assert_eq!(contracts::MAX_REQUEST_ENTRIES, 10);
        assert_eq!(contracts::MAX_REQUEST_BYTES, 256 * 1024);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::ConfigLoader;
    use contracts::{
        BatchSinkConfig, FailureReason, PutEntry, PutResponse, PutResultEntry, RecordCompletion,
        RetryPolicy, SourceRecord, MAX_REQUEST_BYTES,
    };
    use dispatcher::{BatchDispatcher, DispatcherError, MockTransport};

    const DATA: &str = r#"{"test-json": "test-value"}"#;

    /// Counts callbacks for every record sharing it
    #[derive(Default)]
    struct Recorder {
        acked: AtomicUsize,
        failures: Mutex<Vec<FailureReason>>,
    }

    impl Recorder {
        fn acked(&self) -> usize {
            self.acked.load(Ordering::SeqCst)
        }

        fn failures(&self) -> Vec<FailureReason> {
            self.failures.lock().unwrap().clone()
        }
    }

    impl RecordCompletion for Recorder {
        fn on_success(&self) {
            self.acked.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, reason: &FailureReason) {
            self.failures.lock().unwrap().push(reason.clone());
        }
    }

    /// Config with the three flush thresholds set, no retry delay
    fn config(batch_max_size: i64, batch_max_bytes_size: i64, batch_max_time_ms: i64) -> BatchSinkConfig {
        let raw = serde_json::json!({
            "eventBusName": "testEventBusName",
            "region": "test-region",
            "accessKeyId": "test-access-key",
            "secretAccessKey": "test-secret-key",
            "eventBusResourceName": "test-arn",
            "batchMaxSize": batch_max_size,
            "batchMaxBytesSize": batch_max_bytes_size,
            "batchMaxTimeMs": batch_max_time_ms,
            "maxRetryCount": 10,
            "intervalRetryTimeMs": 0
        });
        ConfigLoader::load(raw.as_object().unwrap()).unwrap()
    }

    fn record(recorder: &Arc<Recorder>) -> SourceRecord {
        SourceRecord::new("test-topic", recorder.clone())
    }

    /// Fails the first `failing(call)` entries of each call
    fn failing_prefix<F>(failing: F) -> MockTransport
    where
        F: Fn(usize) -> usize + Send + Sync + 'static,
    {
        MockTransport::new("mock", move |call, entries: &[PutEntry]| {
            let failed = failing(call).min(entries.len());
            let results = (0..entries.len())
                .map(|i| {
                    if i < failed {
                        PutResultEntry::failed("mock-failed", "mock failure")
                    } else {
                        PutResultEntry::ok(format!("{call}-{i}"))
                    }
                })
                .collect();
            Ok(PutResponse::from_entries(results))
        })
    }

    /// Byte threshold alone: every record exceeds it, so each is its own batch
    #[tokio::test]
    async fn test_byte_threshold_flushes_each_record() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher = BatchDispatcher::builder(&config(-1, 50, -1), transport.clone())
            .name("test-sink")
            .build();

        for i in 0..10 {
            dispatcher
                .append(format!("{DATA}{i}"), record(&recorder))
                .await
                .unwrap();
        }
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 10);
        assert!(transport.requests().iter().all(|r| r.len() == 1));
        assert_eq!(snapshot.batches_flushed, 10);
        assert_eq!(recorder.acked(), 10);
    }

    /// Count threshold: ten small records fill exactly one batch
    #[tokio::test]
    async fn test_count_threshold_single_flush() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher = BatchDispatcher::builder(&config(10, 640, -1), transport.clone())
            .name("test-sink")
            .build();

        for _ in 0..10 {
            dispatcher.append("x", record(&recorder)).await.unwrap();
        }
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.requests()[0].len(), 10);
        assert_eq!(snapshot.succeeded, 10);
        assert_eq!(recorder.acked(), 10);
    }

    /// Appends ten reference records at once and checks they wait for the age trigger
    async fn assert_single_time_flush(batch_max_bytes_size: i64) {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher =
            BatchDispatcher::builder(&config(-1, batch_max_bytes_size, 500), transport.clone())
                .name("test-sink")
                .build();

        for _ in 0..10 {
            dispatcher.append(DATA, record(&recorder)).await.unwrap();
        }

        // Neither count nor bytes sealed the batch
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(transport.call_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.requests()[0].len(), 10);
        assert_eq!(recorder.acked(), 10);

        let snapshot = dispatcher.shutdown().await;
        assert_eq!(snapshot.batches_flushed, 1);
        assert_eq!(transport.call_count(), 1);
    }

    /// Time threshold with a byte limit just above ten reference records
    #[tokio::test(start_paused = true)]
    async fn test_time_threshold_under_650_bytes() {
        assert_single_time_flush(650).await;
    }

    /// Time threshold with the default byte limit
    #[tokio::test(start_paused = true)]
    async fn test_time_threshold_under_default_bytes() {
        assert_single_time_flush(contracts::DEFAULT_MAX_BATCH_BYTES_SIZE).await;
    }

    /// Time threshold: two bursts further apart than the max age flush twice
    #[tokio::test(start_paused = true)]
    async fn test_time_threshold_flushes_each_burst() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher = BatchDispatcher::builder(&config(-1, 650, 500), transport.clone())
            .name("test-sink")
            .build();

        for _ in 0..2 {
            for _ in 0..5 {
                dispatcher.append(DATA, record(&recorder)).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(700)).await;
        }

        assert_eq!(transport.call_count(), 2);
        assert!(transport.requests().iter().all(|r| r.len() == 5));
        assert_eq!(recorder.acked(), 10);

        dispatcher.shutdown().await;
        assert_eq!(transport.call_count(), 2);
    }

    /// No threshold met and no timer: records wait for an explicit flush
    #[tokio::test(start_paused = true)]
    async fn test_records_wait_without_trigger() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher = BatchDispatcher::builder(&config(-1, 640, -1), transport.clone()).build();

        dispatcher.append("x", record(&recorder)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(transport.call_count(), 0);

        dispatcher.flush().await.unwrap();
        dispatcher.shutdown().await;
        assert_eq!(transport.call_count(), 1);
        assert_eq!(recorder.acked(), 1);
    }

    /// Failures shrink by one per call: 10 failures need 11 calls, all succeed
    #[tokio::test]
    async fn test_partial_failure_retries_until_success() {
        let recorder = Arc::new(Recorder::default());
        let transport = failing_prefix(|call| 10usize.saturating_sub(call));
        let dispatcher = BatchDispatcher::builder(&config(10, 640, -1), transport.clone())
            .name("test-sink")
            .build();

        for i in 0..10 {
            dispatcher
                .append(format!("{DATA}{i}"), record(&recorder))
                .await
                .unwrap();
        }
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 11);
        assert_eq!(recorder.acked(), 10);
        assert!(recorder.failures().is_empty());
        assert_eq!(snapshot.retries, 10);
    }

    /// The same five entries always fail: 11 calls, five delivered, five failed
    #[tokio::test]
    async fn test_retry_exhaustion_fails_remaining() {
        let recorder = Arc::new(Recorder::default());
        let transport = failing_prefix(|_| 5);
        let dispatcher = BatchDispatcher::builder(&config(10, 640, -1), transport.clone())
            .name("test-sink")
            .build();

        for i in 0..10 {
            dispatcher
                .append(format!("{DATA}{i}"), record(&recorder))
                .await
                .unwrap();
        }
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 11);
        assert_eq!(recorder.acked(), 5);

        let failures = recorder.failures();
        assert_eq!(failures.len(), 5);
        assert!(failures.iter().all(|f| matches!(
            f,
            FailureReason::RetryExhausted { attempts: 11, .. }
        )));
        assert_eq!(snapshot.failed, 5);
        assert_eq!(snapshot.unresolved(), 0);

        // Retries carry only the failing subset, in append order
        let requests = transport.requests();
        assert_eq!(requests[1].len(), 5);
        assert_eq!(&requests[1][0].detail[..], format!("{DATA}0").as_bytes());
    }

    /// A payload as large as the default batch size fails directly
    #[tokio::test]
    async fn test_single_message_at_default_batch_bytes_fails_directly() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let config = config(10, contracts::DEFAULT_MAX_BATCH_BYTES_SIZE, -1);
        let dispatcher = BatchDispatcher::builder(&config, transport.clone())
            .name("test-sink")
            .build();

        let payload = vec![0u8; contracts::DEFAULT_MAX_BATCH_BYTES_SIZE as usize];
        let result = dispatcher.append(payload, record(&recorder)).await;
        assert!(matches!(
            result,
            Err(DispatcherError::MessageTooLarge { max: 640, .. })
        ));

        let snapshot = dispatcher.shutdown().await;
        assert_eq!(transport.call_count(), 0);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.appended, 0);
        assert!(matches!(
            recorder.failures()[..],
            [FailureReason::MessageTooLarge { max: 640, .. }]
        ));
    }

    /// A message at the request ceiling fails directly even with a large byte limit
    #[tokio::test]
    async fn test_message_at_request_ceiling_fails_directly() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher =
            BatchDispatcher::builder(&config(10, MAX_REQUEST_BYTES as i64, -1), transport.clone())
                .build();

        let result = dispatcher
            .append(vec![b'a'; MAX_REQUEST_BYTES], record(&recorder))
            .await;
        assert!(matches!(
            result,
            Err(DispatcherError::MessageTooLarge { max: MAX_REQUEST_BYTES, .. })
        ));

        dispatcher.shutdown().await;
        assert_eq!(transport.call_count(), 0);
        assert!(matches!(
            recorder.failures()[..],
            [FailureReason::MessageTooLarge { .. }]
        ));
    }

    /// Larger than a small byte limit but within the message ceiling ships alone
    #[tokio::test]
    async fn test_entry_over_byte_limit_ships_alone() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock");
        let dispatcher = BatchDispatcher::builder(&config(-1, 50, -1), transport.clone()).build();

        dispatcher
            .append(vec![b'a'; 500], record(&recorder))
            .await
            .unwrap();
        dispatcher.append("x", record(&recorder)).await.unwrap();
        dispatcher.shutdown().await;

        // The large entry met the byte trigger by itself, the small one waited
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.len() == 1));
        assert!(requests.iter().any(|r| r[0].detail.len() == 500));
        assert_eq!(recorder.acked(), 2);
    }

    /// Appends wait once batchPendingQueueSize records are unacknowledged
    #[tokio::test(start_paused = true)]
    async fn test_backpressure_blocks_producer() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock").with_delay(Duration::from_secs(1));
        let mut config = config(1, 640, -1);
        config.batch_pending_queue_size = 2;
        let dispatcher = BatchDispatcher::builder(&config, transport.clone()).build();

        dispatcher.append("a", record(&recorder)).await.unwrap();
        dispatcher.append("b", record(&recorder)).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            dispatcher.append("c", record(&recorder)),
        )
        .await;
        assert!(blocked.is_err());
        // The timed-out append dropped its record unresolved
        assert_eq!(recorder.failures(), vec![FailureReason::Abandoned]);

        dispatcher.append("d", record(&recorder)).await.unwrap();
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(snapshot.appended, 3);
        assert_eq!(recorder.acked(), 3);
        assert_eq!(transport.call_count(), 3);
    }

    /// Shutdown force-flushes the open batch and waits for delivery
    #[tokio::test]
    async fn test_shutdown_flushes_open_batch() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock").with_delay(Duration::from_millis(20));
        let dispatcher = BatchDispatcher::builder(&config(10, 640, -1), transport.clone()).build();

        for _ in 0..3 {
            dispatcher.append("x", record(&recorder)).await.unwrap();
        }
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.requests()[0].len(), 3);
        assert_eq!(snapshot.succeeded, 3);
        assert_eq!(recorder.acked(), 3);
    }

    /// In-flight batches past the grace period fail with Shutdown
    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_aborts_in_flight() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::accept_all("mock").with_delay(Duration::from_secs(60));
        let dispatcher = BatchDispatcher::builder(&config(2, 640, -1), transport.clone())
            .shutdown_grace(Duration::from_millis(100))
            .build();

        dispatcher.append("a", record(&recorder)).await.unwrap();
        dispatcher.append("b", record(&recorder)).await.unwrap();
        let snapshot = dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(recorder.acked(), 0);
        assert_eq!(
            recorder.failures(),
            vec![FailureReason::Shutdown, FailureReason::Shutdown]
        );
        assert_eq!(snapshot.failed, 2);
    }

    /// Retry delay of an always-failing batch is cut short by the grace period
    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_interrupts_retry_delay() {
        let recorder = Arc::new(Recorder::default());
        let transport = failing_prefix(|_| usize::MAX);
        let dispatcher = BatchDispatcher::builder(&config(1, 640, -1), transport.clone())
            .retry_policy(RetryPolicy::new(100, Duration::from_secs(10)))
            .shutdown_grace(Duration::from_secs(1))
            .build();

        dispatcher.append("a", record(&recorder)).await.unwrap();
        dispatcher.shutdown().await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(recorder.failures(), vec![FailureReason::Shutdown]);
    }

    /// Concurrent producers: every record gets exactly one outcome
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_exactly_once() {
        let recorder = Arc::new(Recorder::default());
        let transport = MockTransport::fail_every("mock", 7);
        let dispatcher = BatchDispatcher::builder(&config(5, 640, 50), transport.clone())
            .retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
            .build();

        let mut producers = Vec::new();
        for p in 0..4 {
            let producer = dispatcher.producer();
            let recorder = recorder.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..25 {
                    producer
                        .append(format!("{p}-{i}"), record(&recorder))
                        .await
                        .unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let snapshot = dispatcher.shutdown().await;
        assert_eq!(snapshot.appended, 100);
        assert_eq!(recorder.acked() + recorder.failures().len(), 100);
        assert_eq!(snapshot.unresolved(), 0);
    }
}
