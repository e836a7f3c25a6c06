//! Drafting: producing one candidate TypeQL query for a source query.
//!
//! Drafting is a pluggable strategy so the validation loop can run against
//! the deterministic translator, an LLM, or both.

pub mod hybrid;
pub mod llm;
pub mod llm_drafter;
pub mod prompt;
pub mod rule_based;

use async_trait::async_trait;
use thiserror::Error;

use crate::typeql_translator::errors::TranslationError;
use llm::ChatServiceError;

pub use hybrid::HybridDrafter;
pub use llm_drafter::LlmDrafter;
pub use rule_based::RuleBasedDrafter;

/// A rejected candidate and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub candidate: String,
    pub error: String,
}

/// Prior attempts for one item, oldest first. Never mutated in place: each
/// failed attempt produces a new history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptHistory {
    attempts: Vec<Attempt>,
}

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempt(&self, attempt: Attempt) -> Self {
        let mut attempts = self.attempts.clone();
        attempts.push(attempt);
        AttemptHistory { attempts }
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter()
    }
}

/// Everything a strategy needs to draft one item.
#[derive(Debug, Clone, Copy)]
pub struct DraftRequest<'a> {
    /// Position of the item in the source dataset.
    pub index: usize,
    pub question: &'a str,
    pub source_query: &'a str,
    pub history: &'a AttemptHistory,
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Chat(#[from] ChatServiceError),

    #[error("malformed draft: {0}")]
    Malformed(String),
}

impl DraftError {
    /// Drafting failures that re-drafting cannot fix.
    pub fn is_unmapped_construct(&self) -> bool {
        matches!(self, DraftError::Translation(e) if e.is_unmapped_construct())
    }
}

#[async_trait]
pub trait DraftStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn draft(&self, request: &DraftRequest<'_>) -> Result<String, DraftError>;

    /// Draft several items at once, one result per request in the same order.
    /// A chat service failure aborts the whole batch.
    async fn draft_batch(
        &self,
        requests: &[DraftRequest<'_>],
    ) -> Result<Vec<Result<String, DraftError>>, ChatServiceError> {
        let mut drafts = Vec::with_capacity(requests.len());
        for request in requests {
            match self.draft(request).await {
                Err(DraftError::Chat(e)) => return Err(e),
                other => drafts.push(other),
            }
        }
        Ok(drafts)
    }
}
