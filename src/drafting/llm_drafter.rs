use std::sync::Arc;

use async_trait::async_trait;

use super::llm::{ChatService, ChatServiceError};
use super::prompt::{batch_prompt, extract_typeql, parse_batch_response, query_prompt, PromptContext, SYSTEM_PROMPT};
use super::{DraftError, DraftRequest, DraftStrategy};

/// Drafts by prompting a text-completion service. Batches are sent as one
/// grouped prompt and demultiplexed by item index.
#[derive(Clone)]
pub struct LlmDrafter {
    chat: Arc<dyn ChatService>,
    context: PromptContext,
}

impl LlmDrafter {
    pub fn new(chat: Arc<dyn ChatService>, context: PromptContext) -> Self {
        LlmDrafter { chat, context }
    }
}

#[async_trait]
impl DraftStrategy for LlmDrafter {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn draft(&self, request: &DraftRequest<'_>) -> Result<String, DraftError> {
        let prompt = query_prompt(&self.context, request);
        let response = self.chat.complete(SYSTEM_PROMPT, &prompt).await?;
        let query = extract_typeql(&response);
        if query.is_empty() {
            return Err(DraftError::Malformed("empty completion".to_string()));
        }
        Ok(query)
    }

    async fn draft_batch(
        &self,
        requests: &[DraftRequest<'_>],
    ) -> Result<Vec<Result<String, DraftError>>, ChatServiceError> {
        if requests.len() <= 1 {
            let mut drafts = Vec::with_capacity(requests.len());
            for request in requests {
                match self.draft(request).await {
                    Err(DraftError::Chat(e)) => return Err(e),
                    other => drafts.push(other),
                }
            }
            return Ok(drafts);
        }

        let prompt = batch_prompt(&self.context, requests);
        log::debug!("Drafting {} queries in one grouped prompt", requests.len());
        let response = self.chat.complete(SYSTEM_PROMPT, &prompt).await?;
        let indices: Vec<usize> = requests.iter().map(|r| r.index).collect();
        Ok(parse_batch_response(&response, &indices))
    }
}
