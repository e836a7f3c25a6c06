use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use text2typeql::batch::streams::{FAILED_FILE, FAILED_RETRIES_FILE, QUERIES_FILE};
use text2typeql::batch::{BatchConverter, CancellationFlag, ConversionError, FailureSource, OutputStore};
use text2typeql::drafting::DraftStrategy;
use text2typeql::validation::{
    ConvertedQuery, EngineError, NoRecovery, QueryOutcome, ValidationLoop, ValidationMode, Validator,
};

use super::{engine_with_lifecycle, items, MockEngine, RecordingDrafter, SCHEMA};

const DATABASE: &str = "movies";

fn converter(
    dir: &TempDir,
    engine: MockEngine,
    drafter: Arc<dyn DraftStrategy>,
    max_retries: usize,
    batch_size: usize,
) -> BatchConverter {
    let validator = Arc::new(Validator::new(
        Arc::new(engine),
        Arc::new(NoRecovery),
        SCHEMA,
        ValidationMode::Persistent {
            database: format!("text2typeql_{}", DATABASE),
        },
    ));
    let validation = ValidationLoop::new(drafter, validator, max_retries);
    BatchConverter::new(DATABASE, OutputStore::new(dir.path(), DATABASE), validation, batch_size)
}

fn rejecting_engine() -> MockEngine {
    let mut engine = engine_with_lifecycle();
    engine
        .expect_run_query()
        .returning(|_, _| Err(EngineError::Rejected("[QEX7] variable unbound".to_string())));
    engine
}

fn stale_row(index: usize, success: bool) -> ConvertedQuery {
    ConvertedQuery {
        index,
        question: format!("Question {}", index),
        source_query: "MATCH (m:Movie) RETURN m.title".to_string(),
        target_query: "match $m isa movie;".to_string(),
        success,
        error_message: (!success).then(|| "[QEX7] variable unbound".to_string()),
        attempts: 1,
    }
}

fn accepting_engine() -> MockEngine {
    let mut engine = engine_with_lifecycle();
    engine
        .expect_run_query()
        .returning(|_, _| Ok(QueryOutcome { answers_drawn: 1 }));
    engine
}

#[tokio::test]
async fn test_full_run_writes_streams_and_status() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with_lifecycle();
    // items 2 and 5 never validate
    engine.expect_run_query().returning(|_, query| {
        if query.contains("item 2 ") || query.contains("item 5 ") {
            Err(EngineError::Rejected("[TYR03] unknown type".to_string()))
        } else {
            Ok(QueryOutcome::default())
        }
    });
    let conv = converter(&dir, engine, Arc::new(RecordingDrafter::default()), 2, 4);

    let summary = conv.run(&items(8)).await.unwrap();
    assert_eq!(summary.successful, 6);
    assert_eq!(summary.failed, 2);

    let store = conv.store();
    assert_eq!(store.count_rows(QUERIES_FILE).unwrap(), 6);
    assert_eq!(store.count_rows(FAILED_FILE).unwrap(), 2);

    let failures = store.read_failures(FailureSource::Failed).unwrap();
    let indices: Vec<usize> = failures.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![2, 5]);
    assert!(failures.iter().all(|f| f.attempts == 2));

    let progress = store.load_progress().unwrap().unwrap();
    assert!(progress.is_complete());
    assert_eq!(progress.last_processed_index, Some(7));

    let status = store.load_status().unwrap().unwrap();
    let counts = status.queries.unwrap();
    assert_eq!(counts.successful, 6);
    assert_eq!(counts.failed, 2);
}

#[tokio::test]
async fn test_interrupt_then_resume_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let all = items(25);

    let cancel = CancellationFlag::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut engine = engine_with_lifecycle();
    {
        let cancel = cancel.clone();
        let calls = calls.clone();
        engine.expect_run_query().returning(move |_, _| {
            if calls.fetch_add(1, Ordering::SeqCst) + 1 == 10 {
                cancel.cancel();
            }
            Ok(QueryOutcome::default())
        });
    }
    let conv = converter(&dir, engine, Arc::new(RecordingDrafter::default()), 3, 10)
        .with_cancellation(cancel);

    let err = conv.run(&all).await.unwrap_err();
    assert!(matches!(err, ConversionError::Interrupted), "{:?}", err);
    assert!(err.is_resumable());

    let progress = conv.store().load_progress().unwrap().unwrap();
    assert_eq!(progress.next_index(), 10);
    assert_eq!(progress.successful_count, 10);
    assert_eq!(conv.store().count_rows(QUERIES_FILE).unwrap(), 10);

    let drafter = Arc::new(RecordingDrafter::default());
    let resumed = converter(&dir, accepting_engine(), drafter.clone(), 3, 10);
    let summary = resumed.run(&all).await.unwrap();

    assert_eq!(drafter.drafted(), (10..25).collect::<Vec<_>>());
    assert_eq!(summary.successful, 25);
    assert_eq!(summary.failed, 0);
    assert_eq!(resumed.store().count_rows(QUERIES_FILE).unwrap(), 25);
}

#[tokio::test]
async fn test_chat_failure_keeps_last_checkpoint() {
    let dir = TempDir::new().unwrap();
    let conv = converter(&dir, accepting_engine(), Arc::new(RecordingDrafter::failing_at(15)), 3, 10);

    let err = conv.run(&items(25)).await.unwrap_err();
    assert!(matches!(err, ConversionError::Chat(_)), "{:?}", err);

    let progress = conv.store().load_progress().unwrap().unwrap();
    assert_eq!(progress.next_index(), 10);
    assert_eq!(conv.store().count_rows(QUERIES_FILE).unwrap(), 10);
}

#[tokio::test]
async fn test_checkpoint_for_other_dataset_is_discarded() {
    let dir = TempDir::new().unwrap();
    let first = converter(&dir, accepting_engine(), Arc::new(RecordingDrafter::default()), 1, 5);
    first.run(&items(5)).await.unwrap();

    let drafter = Arc::new(RecordingDrafter::default());
    let second = converter(&dir, accepting_engine(), drafter.clone(), 1, 5);
    let summary = second.run(&items(7)).await.unwrap();

    assert_eq!(drafter.drafted(), (0..7).collect::<Vec<_>>());
    assert_eq!(summary.successful, 7);
    assert_eq!(second.store().count_rows(QUERIES_FILE).unwrap(), 7);
}

#[tokio::test]
async fn test_rejected_schema_stops_before_drafting() {
    let dir = TempDir::new().unwrap();
    let mut engine = MockEngine::new();
    engine.expect_delete_database().returning(|_| Ok(()));
    engine.expect_create_database().returning(|_| Ok(()));
    engine
        .expect_run_schema()
        .returning(|_, _| Err(EngineError::Rejected("[SVL1] owns unknown attribute".to_string())));
    engine.expect_run_query().times(0);

    let drafter = Arc::new(RecordingDrafter::default());
    let conv = converter(&dir, engine, drafter.clone(), 3, 10);

    let err = conv.run(&items(3)).await.unwrap_err();
    assert!(matches!(err, ConversionError::Schema { ref reason, .. } if reason.contains("SVL1")));
    assert!(drafter.drafted().is_empty());
}

#[tokio::test]
async fn test_retry_round_moves_fixed_items_to_success_stream() {
    let dir = TempDir::new().unwrap();
    let mut rejecting = engine_with_lifecycle();
    rejecting
        .expect_run_query()
        .returning(|_, _| Err(EngineError::Rejected("[QEX7] variable unbound".to_string())));
    let first = converter(&dir, rejecting, Arc::new(RecordingDrafter::default()), 1, 10);
    let summary = first.run(&items(4)).await.unwrap();
    assert_eq!(summary.failed, 4);

    let retry = converter(&dir, accepting_engine(), Arc::new(RecordingDrafter::default()), 2, 3);
    let outcome = retry.retry_failures(None, 2).await.unwrap();
    assert_eq!(outcome.newly_successful, 4);
    assert_eq!(outcome.still_failed, 0);
    assert_eq!(outcome.rounds, 1);

    let store = retry.store();
    assert!(!store.path(FAILED_FILE).exists());
    assert!(!store.path(FAILED_RETRIES_FILE).exists());
    assert_eq!(store.count_rows(QUERIES_FILE).unwrap(), 4);

    // the previous failure is in the history, so each redraft is attempt 2
    let written = std::fs::read_to_string(store.path(QUERIES_FILE)).unwrap();
    assert!(written.contains("attempt 2"), "{}", written);
    assert!(!written.contains("attempt 1"), "{}", written);

    let status = retry.refresh_status().unwrap();
    assert_eq!(status.queries.unwrap().failed, 0);
}

#[tokio::test]
async fn test_retry_rounds_leave_stubborn_items_in_retry_stream() {
    let dir = TempDir::new().unwrap();
    let mut rejecting = engine_with_lifecycle();
    rejecting
        .expect_run_query()
        .returning(|_, _| Err(EngineError::Rejected("[QEX7] variable unbound".to_string())));
    let first = converter(&dir, rejecting, Arc::new(RecordingDrafter::default()), 1, 10);
    first.run(&items(3)).await.unwrap();

    let mut still_rejecting = engine_with_lifecycle();
    still_rejecting
        .expect_run_query()
        .returning(|_, _| Err(EngineError::Rejected("[QEX7] variable unbound".to_string())));
    let retry = converter(&dir, still_rejecting, Arc::new(RecordingDrafter::default()), 1, 10);
    let outcome = retry.retry_failures(Some(FailureSource::Failed), 2).await.unwrap();

    assert_eq!(outcome.newly_successful, 0);
    assert_eq!(outcome.still_failed, 3);
    assert_eq!(outcome.rounds, 2);

    let store = retry.store();
    assert!(!store.path(FAILED_FILE).exists());
    let remaining = store.read_failures(FailureSource::FailedRetries).unwrap();
    assert_eq!(remaining.len(), 3);
    // one attempt in the batch run plus one per round
    assert!(remaining.iter().all(|q| q.attempts == 3), "{:?}", remaining);
}

#[tokio::test]
async fn test_retry_without_failures_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let mut engine = MockEngine::new();
    engine.expect_run_query().times(0);
    engine.expect_run_schema().times(0);
    let conv = converter(&dir, engine, Arc::new(RecordingDrafter::default()), 1, 10);

    let outcome = conv.retry_failures(None, 3).await.unwrap();
    assert_eq!(outcome.rounds, 0);
    assert_eq!(outcome.newly_successful, 0);
}

#[tokio::test]
async fn test_resume_drops_rows_written_after_checkpoint() {
    let dir = TempDir::new().unwrap();
    let all = items(25);

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let first = converter(&dir, accepting_engine(), Arc::new(RecordingDrafter::default()), 1, 10)
        .with_cancellation(cancel);
    assert!(matches!(first.run(&all).await, Err(ConversionError::Interrupted)));

    // rows of a batch whose checkpoint never landed
    let store = first.store();
    store.append_successes(&[stale_row(0, true), stale_row(1, true)]).unwrap();
    store.append_failures(FailureSource::Failed, &[stale_row(2, false)]).unwrap();

    let resumed = converter(&dir, accepting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    let summary = resumed.run(&all).await.unwrap();
    assert_eq!(summary.successful, 25);
    assert_eq!(resumed.store().count_rows(QUERIES_FILE).unwrap(), 25);
    assert_eq!(resumed.store().count_rows(FAILED_FILE).unwrap(), 0);
}

#[tokio::test]
async fn test_retry_from_failed_keeps_earlier_retry_failures() {
    let dir = TempDir::new().unwrap();
    let first = converter(&dir, rejecting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    first.run(&items(3)).await.unwrap();

    let round_a = converter(&dir, rejecting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    round_a.retry_failures(None, 1).await.unwrap();
    assert_eq!(round_a.store().count_rows(FAILED_RETRIES_FILE).unwrap(), 3);

    round_a
        .store()
        .append_failures(FailureSource::Failed, &[stale_row(9, false)])
        .unwrap();

    let round_b = converter(&dir, rejecting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    let outcome = round_b.retry_failures(None, 1).await.unwrap();
    assert_eq!(outcome.still_failed, 1);

    let mut indices: Vec<usize> = round_b
        .store()
        .read_failures(FailureSource::FailedRetries)
        .unwrap()
        .iter()
        .map(|q| q.index)
        .collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 9]);
    assert!(!round_b.store().path(FAILED_FILE).exists());

    let status = round_b.refresh_status().unwrap();
    assert_eq!(status.queries.unwrap().failed, 4);
}

#[tokio::test]
async fn test_fresh_run_clears_stale_retry_stream() {
    let dir = TempDir::new().unwrap();
    let first = converter(&dir, rejecting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    first.run(&items(3)).await.unwrap();
    let retry = converter(&dir, rejecting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    retry.retry_failures(None, 1).await.unwrap();
    assert!(retry.store().path(FAILED_RETRIES_FILE).exists());

    let fresh = converter(&dir, accepting_engine(), Arc::new(RecordingDrafter::default()), 1, 10);
    let summary = fresh.run(&items(5)).await.unwrap();
    assert_eq!(summary.failed, 0);

    assert!(!fresh.store().path(FAILED_RETRIES_FILE).exists());
    let status = fresh.store().load_status().unwrap().unwrap();
    assert_eq!(status.queries.unwrap().failed, 0);
}
