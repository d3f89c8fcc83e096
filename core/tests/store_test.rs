use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crossbar_core::{
    with_retry, BusError, EntityStore, JobOptions, JobOutcome, JobTransport, Result, RetryAttempt,
    RetryLogger, RetryPolicy,
};
use mockall::mock;
use mockall::Sequence;
use serde_json::{json, Value};

mock! {
    pub Store {}

    #[async_trait]
    impl EntityStore for Store {
        async fn get(&self, entity: &str, id: &str) -> Result<Option<Value>>;
        async fn create(&self, entity: &str, record: Value) -> Result<Value>;
        async fn update(&self, entity: &str, id: &str, record: Value) -> Result<Value>;
        async fn delete(&self, entity: &str, id: &str) -> Result<()>;
    }
}

mock! {
    pub Transport {}

    #[async_trait]
    impl JobTransport for Transport {
        async fn submit(&self, payload: Value, options: JobOptions) -> Result<JobOutcome>;
    }
}

struct SilentLogger;

impl RetryLogger for SilentLogger {
    fn warn(&self, _message: &str, _attempt: &RetryAttempt) {}
}

#[tokio::test]
async fn retry_recovers_from_transient_store_failures() {
    let mut store = MockStore::new();
    let mut seq = Sequence::new();
    store
        .expect_create()
        .times(2)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(BusError::Store("connection reset".to_string())));
    store
        .expect_create()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, record| Ok(record));

    let policy = RetryPolicy::new(3, |_| Duration::from_millis(1));
    let created = with_retry(
        || store.create("audit", json!({"event": "e1"})),
        &policy,
        &SilentLogger,
    )
    .await
    .expect("third attempt succeeds");

    assert_eq!(created, json!({"event": "e1"}));
}

#[tokio::test]
async fn exhausted_store_retries_surface_the_last_error() {
    let mut store = MockStore::new();
    store
        .expect_update()
        .times(2)
        .returning(|_, _, _| Err(BusError::Store("write conflict".to_string())));

    let policy = RetryPolicy::new(2, |_| Duration::ZERO);
    let result = with_retry(
        || store.update("orders", "o-1", json!({"status": "paid"})),
        &policy,
        &SilentLogger,
    )
    .await;

    match result {
        Err(BusError::RetryExhausted { attempts, message }) => {
            assert_eq!(attempts, 2);
            assert!(message.contains("write conflict"), "message was: {message}");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn store_reads_pass_entity_and_id_through() {
    let mut store = MockStore::new();
    store
        .expect_get()
        .withf(|entity, id| entity == "orders" && id == "o-7")
        .times(1)
        .returning(|_, _| Ok(Some(json!({"id": "o-7", "status": "open"}))));
    store.expect_delete().times(1).returning(|_, _| Ok(()));

    let record = store.get("orders", "o-7").await.expect("get");
    assert_eq!(record, Some(json!({"id": "o-7", "status": "open"})));
    store.delete("orders", "o-7").await.expect("delete");
}

#[tokio::test]
async fn transport_receives_payload_and_options() {
    let mut transport = MockTransport::new();
    transport
        .expect_submit()
        .withf(|payload, options| {
            payload["job"] == json!("reindex") && options.delay_ms == Some(100)
        })
        .times(1)
        .returning(|_, _| Ok(JobOutcome { success: true }));

    let outcome = transport
        .submit(
            json!({"job": "reindex"}),
            JobOptions {
                delay_ms: Some(100),
                timeout_ms: None,
            },
        )
        .await
        .expect("submit");
    assert!(outcome.success);
}

#[tokio::test]
async fn unsuccessful_jobs_are_reported_not_raised() {
    // The transport distinguishes "ran and failed" from "could not run"
    let mut transport = MockTransport::new();
    let mut seq = Sequence::new();
    transport
        .expect_submit()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(JobOutcome { success: false }));
    transport
        .expect_submit()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(BusError::Transport("queue unavailable".to_string())));

    let outcome = transport
        .submit(json!({"job": "a"}), JobOptions::default())
        .await
        .expect("submitted");
    assert!(!outcome.success);

    let error = transport
        .submit(json!({"job": "b"}), JobOptions::default())
        .await
        .expect_err("transport down");
    assert!(matches!(error, BusError::Transport(_)));
}

#[tokio::test]
async fn retry_logger_observes_store_attempts() {
    struct CollectingLogger(Mutex<Vec<u64>>);

    impl RetryLogger for CollectingLogger {
        fn warn(&self, _message: &str, attempt: &RetryAttempt) {
            self.0.lock().expect("lock").push(attempt.delay_ms);
        }
    }

    let mut store = MockStore::new();
    let mut seq = Sequence::new();
    store
        .expect_get()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(BusError::Store("timeout".to_string())));
    store
        .expect_get()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(None));

    let logger = Arc::new(CollectingLogger(Mutex::new(Vec::new())));
    let policy = RetryPolicy::new(2, |_| Duration::from_millis(2));
    let record = with_retry(|| store.get("audit", "missing"), &policy, logger.as_ref())
        .await
        .expect("second attempt");
    assert_eq!(record, None);
    assert_eq!(logger.0.lock().expect("lock").as_slice(), &[2]);
}
