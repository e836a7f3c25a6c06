//! Batch orchestration: converts a dataset in fixed-size batches with a
//! checkpoint after every batch, and re-processes the failure stream in
//! bounded retry rounds.

pub mod errors;
pub mod progress;
pub mod status;
pub mod streams;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::drafting::{Attempt, AttemptHistory, DraftRequest};
use crate::validation::{ConvertedQuery, EngineError, ValidationLoop, WorkItem};

pub use errors::ConversionError;
pub use progress::ConversionProgress;
pub use status::{QueryCounts, StatusRecord};
pub use streams::{FailureSource, OutputStore};

/// Set from a signal handler; checked before each batch starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub newly_successful: usize,
    pub still_failed: usize,
    pub rounds: usize,
}

#[derive(Default)]
struct BatchOutcome {
    successful: Vec<ConvertedQuery>,
    failed: Vec<ConvertedQuery>,
}

pub struct BatchConverter {
    database: String,
    store: OutputStore,
    validation: ValidationLoop,
    batch_size: usize,
    cancel: CancellationFlag,
}

impl BatchConverter {
    pub fn new(database: &str, store: OutputStore, validation: ValidationLoop, batch_size: usize) -> Self {
        BatchConverter {
            database: database.to_string(),
            store,
            validation,
            batch_size: batch_size.max(1),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    async fn prepare(&self) -> Result<(), ConversionError> {
        match self.validation.validator().prepare().await {
            Ok(()) => Ok(()),
            Err(EngineError::Rejected(reason)) => Err(ConversionError::Schema {
                database: self.database.clone(),
                reason,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Draft a batch in one grouped request, then validate each item on its own.
    async fn process_batch(
        &self,
        items: &[WorkItem],
        histories: &[AttemptHistory],
    ) -> Result<BatchOutcome, ConversionError> {
        let requests: Vec<DraftRequest<'_>> = items
            .iter()
            .zip(histories)
            .map(|(item, history)| item.request(history))
            .collect();
        let drafts = self.validation.drafter().draft_batch(&requests).await?;

        let mut outcome = BatchOutcome::default();
        for ((item, history), draft) in items.iter().zip(histories).zip(drafts) {
            let converted = self.validation.run(item, history.clone(), Some(draft)).await?;
            if converted.success {
                outcome.successful.push(converted);
            } else {
                outcome.failed.push(converted);
            }
        }
        Ok(outcome)
    }

    /// Convert `items`, resuming from the checkpoint when it belongs to the
    /// same dataset.
    pub async fn run(&self, items: &[WorkItem]) -> Result<BatchSummary, ConversionError> {
        self.store.ensure_dir()?;
        let total = items.len();
        let mut progress = match self.store.load_progress()? {
            Some(p) if p.database == self.database && p.total_queries == total => {
                log::info!("Resuming {} from index {}", self.database, p.next_index());
                let dropped = self.store.discard_unrecorded(p.next_index())?;
                if dropped > 0 {
                    log::warn!("Dropped {} rows written after the last checkpoint", dropped);
                }
                p
            }
            _ => {
                self.store.reset_streams()?;
                ConversionProgress::new(&self.database, total)
            }
        };

        if progress.is_complete() {
            log::info!("All {} queries of {} already processed", total, self.database);
            return Ok(BatchSummary {
                successful: progress.successful_count,
                failed: progress.failed_count,
            });
        }

        self.prepare().await?;
        self.store.save_progress(&progress)?;

        let mut start = progress.next_index();
        while start < total {
            if self.cancel.is_cancelled() {
                log::warn!("Stopping before batch {}; progress has been saved; re-run to resume", start);
                return Err(ConversionError::Interrupted);
            }
            let end = (start + self.batch_size).min(total);
            log::info!("Converting batch {}-{} of {}", start, end, total);

            let batch = &items[start..end];
            let histories = vec![AttemptHistory::new(); batch.len()];
            let outcome = match self.process_batch(batch, &histories).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Batch {}-{} failed: {}; progress has been saved; re-run to resume", start, end, e);
                    return Err(e);
                }
            };

            self.store.append_successes(&outcome.successful)?;
            self.store.append_failures(FailureSource::Failed, &outcome.failed)?;
            progress.record_batch(end - 1, outcome.successful.len(), outcome.failed.len());
            self.store.save_progress(&progress)?;
            log::info!(
                "  Successful: {}, Failed: {}",
                outcome.successful.len(),
                outcome.failed.len()
            );
            start = end;
        }

        log::info!(
            "Conversion of {} complete: {} successful, {} failed",
            self.database,
            progress.successful_count,
            progress.failed_count
        );
        self.refresh_status()?;
        Ok(BatchSummary {
            successful: progress.successful_count,
            failed: progress.failed_count,
        })
    }

    fn pick_failure_source(&self, source: Option<FailureSource>) -> Option<FailureSource> {
        let failed = self.store.failure_path(FailureSource::Failed).exists();
        let retries = self.store.failure_path(FailureSource::FailedRetries).exists();
        match source {
            Some(source) => Some(source),
            None if failed => Some(FailureSource::Failed),
            None if retries => Some(FailureSource::FailedRetries),
            None => None,
        }
    }

    /// Re-run drafting and validation over a failure stream for up to
    /// `max_rounds` rounds. Fixed items move to the success stream; the rest
    /// end up in `failed_retries.csv`.
    pub async fn retry_failures(
        &self,
        source: Option<FailureSource>,
        max_rounds: usize,
    ) -> Result<RetrySummary, ConversionError> {
        let Some(source) = self.pick_failure_source(source) else {
            log::info!("No failed queries to retry for {}", self.database);
            return Ok(RetrySummary::default());
        };
        let mut current = self.store.read_failures(source)?;
        if current.is_empty() {
            log::info!("No failed queries to retry for {}", self.database);
            return Ok(RetrySummary::default());
        }

        self.prepare().await?;
        log::info!(
            "Retrying {} failed queries of {} (batch size {}, max rounds {})",
            current.len(),
            self.database,
            self.batch_size,
            max_rounds
        );

        let mut fixed = Vec::new();
        let mut rounds = 0;
        let mut stopped: Option<ConversionError> = None;

        'rounds: for round in 1..=max_rounds {
            if current.is_empty() {
                break;
            }
            rounds = round;
            log::info!("Round {}/{} ({} queries)", round, max_rounds, current.len());
            let mut remaining = Vec::new();
            let mut pending = current.into_iter();

            loop {
                let chunk: Vec<ConvertedQuery> = pending.by_ref().take(self.batch_size).collect();
                if chunk.is_empty() {
                    break;
                }
                if self.cancel.is_cancelled() {
                    stopped = Some(ConversionError::Interrupted);
                } else {
                    match self.retry_chunk(&chunk).await {
                        Ok(outcome) => {
                            fixed.extend(outcome.successful);
                            remaining.extend(outcome.failed);
                            continue;
                        }
                        Err(e) => stopped = Some(e),
                    }
                }
                // unprocessed items keep their previous failure record
                remaining.extend(chunk);
                remaining.extend(pending);
                current = remaining;
                break 'rounds;
            }
            log::info!("Round {} complete: {} fixed, {} remaining", round, fixed.len(), remaining.len());
            current = remaining;
        }

        // failures from earlier rounds stay in the retry stream when this
        // round drew from failed.csv
        let mut retained = Vec::new();
        if source == FailureSource::Failed {
            retained = self
                .store
                .read_failures(FailureSource::FailedRetries)?
                .into_iter()
                .filter(|old| {
                    !current.iter().chain(&fixed).any(|q| q.index == old.index)
                })
                .collect();
        }
        retained.extend(current.iter().cloned());

        self.store.append_successes(&fixed)?;
        if source == FailureSource::Failed {
            self.store.remove(&self.store.failure_path(FailureSource::Failed))?;
        }
        self.store.rewrite_failures(FailureSource::FailedRetries, &retained)?;
        self.refresh_status()?;

        if let Some(e) = stopped {
            log::warn!("Retry stopped early: {}; progress has been saved; re-run to resume", e);
            return Err(e);
        }
        log::info!(
            "Retry complete: {} newly successful, {} still failed",
            fixed.len(),
            current.len()
        );
        Ok(RetrySummary {
            newly_successful: fixed.len(),
            still_failed: current.len(),
            rounds,
        })
    }

    async fn retry_chunk(&self, chunk: &[ConvertedQuery]) -> Result<BatchOutcome, ConversionError> {
        let items: Vec<WorkItem> = chunk
            .iter()
            .map(|q| WorkItem::new(q.index, q.question.clone(), q.source_query.clone()))
            .collect();
        let histories: Vec<AttemptHistory> = chunk
            .iter()
            .map(|q| match q.error_message.as_deref() {
                Some(error) if !error.is_empty() => AttemptHistory::new().with_attempt(Attempt {
                    candidate: q.target_query.clone(),
                    error: error.to_string(),
                }),
                _ => AttemptHistory::new(),
            })
            .collect();

        let mut outcome = self.process_batch(&items, &histories).await?;
        for converted in outcome.successful.iter_mut().chain(outcome.failed.iter_mut()) {
            if let Some(previous) = chunk.iter().find(|q| q.index == converted.index) {
                converted.attempts += previous.attempts;
            }
        }
        Ok(outcome)
    }

    /// Recount the streams into `status.json`.
    pub fn refresh_status(&self) -> Result<StatusRecord, ConversionError> {
        let mut status = self
            .store
            .load_status()?
            .unwrap_or_else(|| StatusRecord::new(&self.database));
        let successful = self.store.count_rows(streams::QUERIES_FILE)?;
        let failed = self.store.count_rows(streams::FAILED_FILE)?
            + self.store.count_rows(streams::FAILED_RETRIES_FILE)?;
        status.set_query_counts(successful, failed);
        self.store.save_status(&status)?;
        Ok(status)
    }
}
