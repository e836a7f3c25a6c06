//! The draft → validate → retry state machine for one item.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::engine::EngineError;
use super::validator::{Validator, Verdict};
use crate::drafting::llm::ChatServiceError;
use crate::drafting::prompt::{truncate_chars, MAX_ERROR_CHARS};
use crate::drafting::{Attempt, AttemptHistory, DraftError, DraftRequest, DraftStrategy};

/// Engine restarts allowed while validating a single candidate.
pub const MAX_RECOVERIES: usize = 2;

/// One (question, source query) pair to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub question: String,
    pub source_query: String,
}

impl WorkItem {
    pub fn new(index: usize, question: impl Into<String>, source_query: impl Into<String>) -> Self {
        WorkItem {
            index,
            question: question.into(),
            source_query: source_query.into(),
        }
    }

    pub fn request<'a>(&'a self, history: &'a AttemptHistory) -> DraftRequest<'a> {
        DraftRequest {
            index: self.index,
            question: &self.question,
            source_query: &self.source_query,
            history,
        }
    }
}

/// The result of converting one item, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedQuery {
    pub index: usize,
    pub question: String,
    pub source_query: String,
    /// The accepted query, or the last rejected candidate.
    pub target_query: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub attempts: usize,
}

impl ConvertedQuery {
    fn accepted(item: &WorkItem, target_query: String, attempts: usize) -> Self {
        ConvertedQuery {
            index: item.index,
            question: item.question.clone(),
            source_query: item.source_query.clone(),
            target_query,
            success: true,
            error_message: None,
            attempts,
        }
    }

    fn failed(item: &WorkItem, target_query: String, error: String, attempts: usize) -> Self {
        ConvertedQuery {
            index: item.index,
            question: item.question.clone(),
            source_query: item.source_query.clone(),
            target_query,
            success: false,
            error_message: Some(error),
            attempts,
        }
    }
}

/// Failures that stop the run rather than a single item.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Engine(EngineError),

    #[error(transparent)]
    Chat(ChatServiceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Drafting,
    Validating,
    Retrying,
    Accepted,
    Exhausted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Drafting => "drafting",
            LoopState::Validating => "validating",
            LoopState::Retrying => "retrying",
            LoopState::Accepted => "accepted",
            LoopState::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

pub struct ValidationLoop {
    drafter: Arc<dyn DraftStrategy>,
    validator: Arc<Validator>,
    max_retries: usize,
    error_truncate_chars: usize,
}

impl ValidationLoop {
    pub fn new(drafter: Arc<dyn DraftStrategy>, validator: Arc<Validator>, max_retries: usize) -> Self {
        ValidationLoop {
            drafter,
            validator,
            max_retries: max_retries.max(1),
            error_truncate_chars: MAX_ERROR_CHARS,
        }
    }

    pub fn with_error_truncation(mut self, chars: usize) -> Self {
        self.error_truncate_chars = chars;
        self
    }

    pub fn drafter(&self) -> &dyn DraftStrategy {
        self.drafter.as_ref()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Convert one item. `first_draft` is used in place of the first drafting
    /// call when the caller already drafted the item as part of a batch.
    pub async fn run(
        &self,
        item: &WorkItem,
        history: AttemptHistory,
        first_draft: Option<Result<String, DraftError>>,
    ) -> Result<ConvertedQuery, LoopError> {
        let mut history = history;
        let mut pending = first_draft;
        let mut last = Attempt {
            candidate: String::new(),
            error: String::new(),
        };

        for attempt in 1..=self.max_retries {
            self.trace(item, attempt, LoopState::Drafting);
            let draft = match pending.take() {
                Some(draft) => draft,
                None => self.drafter.draft(&item.request(&history)).await,
            };

            let candidate = match draft {
                Ok(candidate) => candidate,
                Err(DraftError::Chat(e)) => return Err(LoopError::Chat(e)),
                Err(e) if e.is_unmapped_construct() => {
                    log::info!("Item {}: {}", item.index, e);
                    return Ok(ConvertedQuery::failed(item, String::new(), e.to_string(), attempt));
                }
                Err(e) => {
                    last = Attempt {
                        candidate: String::new(),
                        error: truncate_chars(&e.to_string(), self.error_truncate_chars),
                    };
                    history = history.with_attempt(last.clone());
                    self.trace(item, attempt, LoopState::Retrying);
                    continue;
                }
            };

            self.trace(item, attempt, LoopState::Validating);
            match self.validate(&candidate).await? {
                Verdict::Accepted => {
                    self.trace(item, attempt, LoopState::Accepted);
                    return Ok(ConvertedQuery::accepted(item, candidate, attempt));
                }
                Verdict::Rejected(message) => {
                    log::info!(
                        "Item {} attempt {} rejected: {}",
                        item.index,
                        attempt,
                        truncate_chars(&message, 120)
                    );
                    last = Attempt {
                        candidate,
                        error: truncate_chars(&message, self.error_truncate_chars),
                    };
                    history = history.with_attempt(last.clone());
                    self.trace(item, attempt, LoopState::Retrying);
                }
            }
        }

        self.trace(item, self.max_retries, LoopState::Exhausted);
        Ok(ConvertedQuery::failed(
            item,
            last.candidate,
            last.error,
            self.max_retries,
        ))
    }

    /// Validate, restarting the engine on connectivity loss. Recoveries do not
    /// count as attempts.
    async fn validate(&self, candidate: &str) -> Result<Verdict, LoopError> {
        let mut recoveries = 0;
        loop {
            match self.validator.validate_query(candidate).await {
                Ok(verdict) => return Ok(verdict),
                Err(e) if e.is_connectivity() && recoveries < MAX_RECOVERIES => {
                    recoveries += 1;
                    log::warn!("Engine connection lost ({}); recovering ({}/{})", e, recoveries, MAX_RECOVERIES);
                    self.validator.recover().await.map_err(LoopError::Engine)?;
                }
                Err(e) => return Err(LoopError::Engine(e)),
            }
        }
    }

    fn trace(&self, item: &WorkItem, attempt: usize, state: LoopState) {
        log::debug!(
            "Item {} attempt {}/{}: {}",
            item.index,
            attempt,
            self.max_retries,
            state
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeql_translator::errors::TranslationError;
    use crate::validation::engine::{EngineRecovery, QueryOutcome, ValidationEngine};
    use crate::validation::validator::ValidationMode;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers run_query from a script; everything else succeeds.
    struct ScriptedEngine {
        answers: Mutex<VecDeque<Result<QueryOutcome, EngineError>>>,
        queries: Mutex<usize>,
    }

    impl ScriptedEngine {
        fn new(answers: Vec<Result<QueryOutcome, EngineError>>) -> Self {
            ScriptedEngine {
                answers: Mutex::new(answers.into()),
                queries: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ValidationEngine for ScriptedEngine {
        async fn create_database(&self, _name: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn delete_database(&self, _name: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn run_schema(&self, _db: &str, _schema: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn run_query(&self, _db: &str, _query: &str) -> Result<QueryOutcome, EngineError> {
            *self.queries.lock().unwrap() += 1;
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(QueryOutcome::default()))
        }
    }

    struct CountingRecovery(Mutex<usize>);

    #[async_trait]
    impl EngineRecovery for CountingRecovery {
        async fn restart(&self) -> Result<(), EngineError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Drafts "attempt N" and records the error each retry was given.
    #[derive(Default)]
    struct EchoDrafter {
        seen_errors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl DraftStrategy for EchoDrafter {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn draft(&self, request: &DraftRequest<'_>) -> Result<String, DraftError> {
            self.seen_errors
                .lock()
                .unwrap()
                .push(request.history.last().map(|a| a.error.clone()));
            Ok(format!("attempt {}", request.history.len() + 1))
        }
    }

    fn build(
        engine: ScriptedEngine,
        drafter: Arc<dyn DraftStrategy>,
    ) -> (ValidationLoop, Arc<ScriptedEngine>, Arc<CountingRecovery>) {
        let engine = Arc::new(engine);
        let recovery = Arc::new(CountingRecovery(Mutex::new(0)));
        let validator = Validator::new(
            engine.clone(),
            recovery.clone(),
            "define entity movie;",
            ValidationMode::Persistent {
                database: "db".to_string(),
            },
        );
        (
            ValidationLoop::new(drafter, Arc::new(validator), 3),
            engine,
            recovery,
        )
    }

    fn item() -> WorkItem {
        WorkItem::new(0, "Which movies?", "MATCH (m:Movie) RETURN m.title")
    }

    #[tokio::test]
    async fn test_error_feeds_next_attempt() {
        let drafter = Arc::new(EchoDrafter::default());
        let (lp, _, _) = build(
            ScriptedEngine::new(vec![Err(EngineError::Rejected("type mismatch".to_string()))]),
            drafter.clone(),
        );
        let result = lp.run(&item(), AttemptHistory::new(), None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.target_query, "attempt 2");
        assert_eq!(
            *drafter.seen_errors.lock().unwrap(),
            vec![None, Some("type mismatch".to_string())]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_reports_max_attempts() {
        let rejected = || Err(EngineError::Rejected("x".repeat(900)));
        let (lp, engine, _) = build(
            ScriptedEngine::new(vec![rejected(), rejected(), rejected()]),
            Arc::new(EchoDrafter::default()),
        );
        let result = lp.run(&item(), AttemptHistory::new(), None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.target_query, "attempt 3");
        assert_eq!(result.error_message.unwrap().chars().count(), MAX_ERROR_CHARS);
        assert_eq!(*engine.queries.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unmapped_construct_skips_engine() {
        let (lp, engine, _) = build(ScriptedEngine::new(vec![]), Arc::new(EchoDrafter::default()));
        let draft = Err(DraftError::Translation(TranslationError::UnmappedRelation {
            rel_type: "FOLLOWS".to_string(),
        }));
        let result = lp.run(&item(), AttemptHistory::new(), Some(draft)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert!(result.error_message.unwrap().contains("FOLLOWS"));
        assert_eq!(*engine.queries.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connectivity_recovers_without_spending_attempts() {
        let (lp, engine, recovery) = build(
            ScriptedEngine::new(vec![Err(EngineError::Connectivity("connection closed".to_string()))]),
            Arc::new(EchoDrafter::default()),
        );
        let result = lp.run(&item(), AttemptHistory::new(), None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(*recovery.0.lock().unwrap(), 1);
        assert_eq!(*engine.queries.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persistent_connectivity_loss_escapes() {
        let down = || Err(EngineError::Connectivity("refused".to_string()));
        let (lp, _, recovery) = build(
            ScriptedEngine::new(vec![down(), down(), down()]),
            Arc::new(EchoDrafter::default()),
        );
        let err = lp.run(&item(), AttemptHistory::new(), None).await.unwrap_err();
        assert!(matches!(err, LoopError::Engine(ref e) if e.is_connectivity()));
        assert_eq!(*recovery.0.lock().unwrap(), MAX_RECOVERIES);
    }

    #[tokio::test]
    async fn test_chat_failure_escapes() {
        let (lp, _, _) = build(ScriptedEngine::new(vec![]), Arc::new(EchoDrafter::default()));
        let draft = Err(DraftError::Chat(ChatServiceError::EmptyResponse("OpenAI")));
        let err = lp.run(&item(), AttemptHistory::new(), Some(draft)).await.unwrap_err();
        assert!(matches!(err, LoopError::Chat(_)));
    }
}
