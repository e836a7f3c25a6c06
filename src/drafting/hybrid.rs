use async_trait::async_trait;

use super::llm::ChatServiceError;
use super::{DraftError, DraftRequest, DraftStrategy, LlmDrafter, RuleBasedDrafter};

/// Rules for the first attempt, the LLM for retries and for rule failures
/// that a rewrite could still fix. Unmapped constructs are returned as is so
/// they go straight to the failure stream.
pub struct HybridDrafter {
    rules: RuleBasedDrafter,
    llm: LlmDrafter,
}

impl HybridDrafter {
    pub fn new(rules: RuleBasedDrafter, llm: LlmDrafter) -> Self {
        HybridDrafter { rules, llm }
    }

    /// `Some` when the rules settle the item: a draft, or a fatal error.
    fn rule_outcome(&self, request: &DraftRequest<'_>) -> Option<Result<String, DraftError>> {
        if !request.history.is_empty() {
            return None;
        }
        match self.rules.translate(request.source_query) {
            Ok(query) => Some(Ok(query)),
            Err(e) if e.is_unmapped_construct() => Some(Err(e)),
            Err(e) => {
                log::debug!(
                    "Rule translation of item {} failed ({}), asking the LLM",
                    request.index,
                    e
                );
                None
            }
        }
    }
}

#[async_trait]
impl DraftStrategy for HybridDrafter {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn draft(&self, request: &DraftRequest<'_>) -> Result<String, DraftError> {
        match self.rule_outcome(request) {
            Some(outcome) => outcome,
            None => self.llm.draft(request).await,
        }
    }

    async fn draft_batch(
        &self,
        requests: &[DraftRequest<'_>],
    ) -> Result<Vec<Result<String, DraftError>>, ChatServiceError> {
        let mut drafts: Vec<Option<Result<String, DraftError>>> = Vec::with_capacity(requests.len());
        let mut pending = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            let outcome = self.rule_outcome(request);
            if outcome.is_none() {
                pending.push(i);
            }
            drafts.push(outcome);
        }

        if !pending.is_empty() {
            let llm_requests: Vec<DraftRequest<'_>> = pending.iter().map(|&i| requests[i]).collect();
            let llm_drafts = self.llm.draft_batch(&llm_requests).await?;
            for (i, draft) in pending.into_iter().zip(llm_drafts) {
                drafts[i] = Some(draft);
            }
        }

        Ok(drafts
            .into_iter()
            .map(|d| d.unwrap_or_else(|| Err(DraftError::Malformed("no draft produced".to_string()))))
            .collect())
    }
}
