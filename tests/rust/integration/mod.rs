//! Integration tests - validation loop and batch orchestration against a
//! mocked engine.
//!
//! No test here talks to a real TypeDB server or text-completion service.

mod batch_tests;
mod validation_loop_tests;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mockall::mock;
use text2typeql::drafting::llm::ChatServiceError;
use text2typeql::drafting::{DraftError, DraftRequest, DraftStrategy};
use text2typeql::mapping::MappingConfig;
use text2typeql::validation::{EngineError, EngineRecovery, QueryOutcome, ValidationEngine, WorkItem};

mock! {
    pub Engine {}

    #[async_trait]
    impl ValidationEngine for Engine {
        async fn create_database(&self, name: &str) -> Result<(), EngineError>;
        async fn delete_database(&self, name: &str) -> Result<(), EngineError>;
        async fn run_schema(&self, database: &str, schema: &str) -> Result<(), EngineError>;
        async fn run_query(&self, database: &str, query: &str) -> Result<QueryOutcome, EngineError>;
    }
}

mock! {
    pub Recovery {}

    #[async_trait]
    impl EngineRecovery for Recovery {
        async fn restart(&self) -> Result<(), EngineError>;
    }
}

pub const SCHEMA: &str = "define\n  entity person, owns name;\n  attribute name, value string;";

/// An engine whose database lifecycle calls always succeed; `run_query`
/// expectations are left to the test.
pub fn engine_with_lifecycle() -> MockEngine {
    let mut engine = MockEngine::new();
    engine.expect_delete_database().returning(|_| Ok(()));
    engine.expect_create_database().returning(|_| Ok(()));
    engine.expect_run_schema().returning(|_, _| Ok(()));
    engine
}

pub fn movies_mapping() -> Arc<MappingConfig> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("mappings");
    Arc::new(MappingConfig::load_for_database(dir, "movies").expect("sample mapping should load"))
}

pub fn items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| {
            WorkItem::new(
                i,
                format!("Question {}", i),
                format!("MATCH (m:Movie) WHERE m.released = {} RETURN m.title", 1990 + i),
            )
        })
        .collect()
}

/// Drafts `match $m isa movie; # <index>` and records every index it drafts.
/// A grouped request containing `fail_at` fails as a chat service outage.
#[derive(Default)]
pub struct RecordingDrafter {
    pub drafted: Mutex<Vec<usize>>,
    pub fail_at: Option<usize>,
}

impl RecordingDrafter {
    pub fn failing_at(index: usize) -> Self {
        RecordingDrafter {
            drafted: Mutex::new(Vec::new()),
            fail_at: Some(index),
        }
    }

    pub fn drafted(&self) -> Vec<usize> {
        self.drafted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DraftStrategy for RecordingDrafter {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn draft(&self, request: &DraftRequest<'_>) -> Result<String, DraftError> {
        self.drafted.lock().unwrap().push(request.index);
        Ok(format!(
            "match $m isa movie; # item {} attempt {}",
            request.index,
            request.history.len() + 1
        ))
    }

    async fn draft_batch(
        &self,
        requests: &[DraftRequest<'_>],
    ) -> Result<Vec<Result<String, DraftError>>, ChatServiceError> {
        if requests.iter().any(|r| Some(r.index) == self.fail_at) {
            return Err(ChatServiceError::Status {
                provider: "Anthropic",
                status: 529,
                body: "overloaded".to_string(),
            });
        }
        let mut drafts = Vec::with_capacity(requests.len());
        for request in requests {
            drafts.push(self.draft(request).await);
        }
        Ok(drafts)
    }
}
