
    use super::*;
    use std::sync::atomic::AtomicU32;

    use serde_json::json;

    use crate::job::{JobStatus, Payload};
    use crate::store::{JobStore, MemoryJobStore};

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn handle(&self, job: &Job) -> Result<String, JobFailure> {
            let text = job.payload.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(format!("echo: {}", text))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn handle(&self, _job: &Job) -> Result<String, JobFailure> {
            Err(JobFailure::new("no input"))
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl JobHandler for PanickingHandler {
        async fn handle(&self, _job: &Job) -> Result<String, JobFailure> {
            panic!("handler blew up");
        }
    }

    /// Requests shutdown from inside the first job it handles.
    struct StopAfterFirst {
        signal: ShutdownSignal,
    }

    #[async_trait]
    impl JobHandler for StopAfterFirst {
        async fn handle(&self, job: &Job) -> Result<String, JobFailure> {
            self.signal.request_shutdown();
            Ok(format!("result-{}", job.id))
        }
    }

    /// Fails the first job out from under the worker, then stops the loop on the next.
    struct OperatorIntervenes {
        queue: JobQueue,
        signal: ShutdownSignal,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for OperatorIntervenes {
        async fn handle(&self, job: &Job) -> Result<String, JobFailure> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.queue
                    .fail(&job.id, "cancelled by operator")
                    .await
                    .map_err(|e| JobFailure::new(e.to_string()))?;
            } else {
                self.signal.request_shutdown();
            }
            Ok(format!("result-{}", job.id))
        }
    }

    /// Memory store whose first N claims and terminal writes fail.
    struct FlakyStore {
        inner: MemoryJobStore,
        claim_failures: AtomicU32,
        write_failures: AtomicU32,
    }

    impl FlakyStore {
        fn new(claim_failures: u32, write_failures: u32) -> Self {
            Self {
                inner: MemoryJobStore::new(),
                claim_failures: AtomicU32::new(claim_failures),
                write_failures: AtomicU32::new(write_failures),
            }
        }

        fn trip(counter: &AtomicU32) -> Result<(), QueueError> {
            let tripped = counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if tripped {
                Err(QueueError::Database("database is locked".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn insert(&self, payload: Payload) -> Result<Uuid, QueueError> {
            self.inner.insert(payload).await
        }

        async fn get(&self, id: &Uuid) -> Result<Option<Job>, QueueError> {
            self.inner.get(id).await
        }

        async fn claim_oldest_pending(&self) -> Result<Option<Job>, QueueError> {
            Self::trip(&self.claim_failures)?;
            self.inner.claim_oldest_pending().await
        }

        async fn mark_done(&self, id: &Uuid, result_location: &str) -> Result<(), QueueError> {
            Self::trip(&self.write_failures)?;
            self.inner.mark_done(id, result_location).await
        }

        async fn mark_failed(&self, id: &Uuid, error: &str) -> Result<(), QueueError> {
            Self::trip(&self.write_failures)?;
            self.inner.mark_failed(id, error).await
        }
    }

    fn text_payload(text: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("text".to_string(), json!(text));
        p
    }

    fn worker_with(queue: &JobQueue, handler: Arc<dyn JobHandler>) -> Worker {
        Worker::new(
            queue.clone(),
            handler,
            WorkerConfig::default(),
            ShutdownSignal::new(),
        )
    }

    #[test]
    fn test_worker_new() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let worker = worker_with(&queue, Arc::new(EchoHandler));

        assert_eq!(worker.id().len(), 8);
        assert!(worker.id().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(worker.jobs_completed(), 0);
        assert_eq!(worker.jobs_failed(), 0);
        assert!(!worker.shutdown_signal().is_shutdown_requested());
    }

    #[test]
    fn test_job_failure_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let failure = JobFailure::from(err);
        assert_eq!(failure.message(), "read-only");
        assert_eq!(failure.to_string(), "read-only");
    }

    #[tokio::test]
    async fn test_run_once_empty_queue() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let worker = worker_with(&queue, Arc::new(EchoHandler));
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_run_once_success_marks_done() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let id = queue.enqueue(text_payload("hello")).await.unwrap();
        let worker = worker_with(&queue, Arc::new(EchoHandler));

        assert!(worker.run_once().await.unwrap());

        let report = queue.status(&id).await.unwrap();
        assert_eq!(report.status, JobStatus::Done);
        assert_eq!(report.result_location.as_deref(), Some("echo: hello"));
        assert!(report.error.is_none());
        assert_eq!(worker.jobs_completed(), 1);
        assert_eq!(worker.jobs_failed(), 0);
    }

    #[tokio::test]
    async fn test_run_once_failure_marks_failed() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let id = queue.enqueue(Payload::new()).await.unwrap();
        let worker = worker_with(&queue, Arc::new(FailingHandler));

        assert!(worker.run_once().await.unwrap());

        let report = queue.status(&id).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("no input"));
        assert!(report.result_location.is_none());
        assert_eq!(worker.jobs_failed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_failure() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let first = queue.enqueue(Payload::new()).await.unwrap();
        let second = queue.enqueue(Payload::new()).await.unwrap();
        let worker = worker_with(&queue, Arc::new(PanickingHandler));

        assert!(worker.run_once().await.unwrap());
        assert!(worker.run_once().await.unwrap());

        for id in [first, second] {
            let report = queue.status(&id).await.unwrap();
            assert_eq!(report.status, JobStatus::Failed);
            assert!(report.error.unwrap().contains("handler blew up"));
        }
        assert_eq!(worker.jobs_failed(), 2);
    }

    #[tokio::test]
    async fn test_run_does_not_claim_after_shutdown() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let id = queue.enqueue(Payload::new()).await.unwrap();
        let worker = worker_with(&queue, Arc::new(EchoHandler));

        worker.shutdown_signal().request_shutdown();
        worker.run().await.unwrap();

        assert_eq!(queue.status(&id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_shutdown_inside_handler_finishes_current_job() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let a = queue.enqueue(text_payload("a")).await.unwrap();
        let b = queue.enqueue(text_payload("b")).await.unwrap();

        let signal = ShutdownSignal::new();
        let handler = Arc::new(StopAfterFirst {
            signal: signal.clone(),
        });
        let worker = Worker::new(queue.clone(), handler, WorkerConfig::default(), signal);

        worker.run().await.unwrap();

        let a = queue.status(&a).await.unwrap();
        assert_eq!(a.status, JobStatus::Done);
        assert_eq!(a.result_location, Some(format!("result-{}", a.id)));
        assert_eq!(queue.status(&b).await.unwrap().status, JobStatus::Pending);
        assert_eq!(worker.jobs_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_idles_until_shutdown() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let worker = Arc::new(worker_with(&queue, Arc::new(EchoHandler)));

        let running = worker.clone();
        let handle = tokio::spawn(async move { running.run().await });

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        let id = queue.enqueue(text_payload("late")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        worker.shutdown_signal().request_shutdown();
        handle.await.unwrap().unwrap();

        assert_eq!(queue.status(&id).await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_errors_back_off_and_recover() {
        let queue = JobQueue::new(Arc::new(FlakyStore::new(3, 0)));
        let id = queue.enqueue(text_payload("x")).await.unwrap();

        let signal = ShutdownSignal::new();
        let handler = Arc::new(StopAfterFirst {
            signal: signal.clone(),
        });
        let worker = Worker::new(queue.clone(), handler, WorkerConfig::default(), signal);

        worker.run().await.unwrap();

        assert_eq!(queue.status(&id).await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_retries_storage_errors() {
        let queue = JobQueue::new(Arc::new(FlakyStore::new(0, 2)));
        let id = queue.enqueue(text_payload("retry")).await.unwrap();
        let worker = worker_with(&queue, Arc::new(EchoHandler));

        assert!(worker.run_once().await.unwrap());

        assert_eq!(queue.status(&id).await.unwrap().status, JobStatus::Done);
        assert_eq!(worker.jobs_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_gives_up_after_attempts() {
        let queue = JobQueue::new(Arc::new(FlakyStore::new(0, 10)));
        let id = queue.enqueue(text_payload("stuck")).await.unwrap();
        let config = WorkerConfig {
            record_attempts: 3,
            ..WorkerConfig::default()
        };
        let worker = Worker::new(queue.clone(), Arc::new(EchoHandler), config, ShutdownSignal::new());

        let result = worker.run().await;

        assert!(matches!(result, Err(QueueError::Database(_))));
        assert_eq!(queue.status(&id).await.unwrap().status, JobStatus::Running);
        assert_eq!(worker.jobs_completed(), 0);
    }

    #[tokio::test]
    async fn test_outside_transition_does_not_stop_loop() {
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()));
        let first = queue.enqueue(text_payload("first")).await.unwrap();
        let second = queue.enqueue(text_payload("second")).await.unwrap();

        let signal = ShutdownSignal::new();
        let handler = Arc::new(OperatorIntervenes {
            queue: queue.clone(),
            signal: signal.clone(),
            calls: AtomicU32::new(0),
        });
        let worker = Worker::new(queue.clone(), handler, WorkerConfig::default(), signal);

        worker.run().await.unwrap();

        let first = queue.status(&first).await.unwrap();
        assert_eq!(first.status, JobStatus::Failed);
        assert_eq!(first.error.as_deref(), Some("cancelled by operator"));
        assert!(first.result_location.is_none());

        let second = queue.status(&second).await.unwrap();
        assert_eq!(second.status, JobStatus::Done);
        assert_eq!(worker.jobs_completed(), 1);
        assert_eq!(worker.jobs_failed(), 0);
    }
