use std::sync::Arc;

use async_trait::async_trait;
use mockall::Sequence;
use text2typeql::drafting::llm::{ChatService, ChatServiceError};
use text2typeql::drafting::prompt::PromptContext;
use text2typeql::drafting::rule_based::RuleBasedDrafter;
use text2typeql::drafting::{AttemptHistory, HybridDrafter, LlmDrafter};
use text2typeql::validation::{
    EngineError, LoopError, NoRecovery, QueryOutcome, ValidationLoop, ValidationMode, Validator, WorkItem,
};

use super::{engine_with_lifecycle, movies_mapping, MockEngine, MockRecovery, RecordingDrafter, SCHEMA};

fn persistent(engine: MockEngine) -> Arc<Validator> {
    Arc::new(Validator::new(
        Arc::new(engine),
        Arc::new(NoRecovery),
        SCHEMA,
        ValidationMode::Persistent {
            database: "text2typeql_movies".to_string(),
        },
    ))
}

#[tokio::test]
async fn test_unmapped_relation_fails_without_engine_call() {
    let mut engine = MockEngine::new();
    engine.expect_run_query().times(0);

    let drafter = Arc::new(RuleBasedDrafter::new(movies_mapping()));
    let validation = ValidationLoop::new(drafter, persistent(engine), 3);
    let item = WorkItem::new(
        7,
        "Which movies did Tom rate?",
        "MATCH (p:Person {name: 'Tom'})-[:RATED]->(m:Movie) RETURN m.title",
    );

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(!converted.success);
    assert_eq!(converted.attempts, 1);
    assert_eq!(converted.index, 7);
    assert!(converted.error_message.unwrap().contains("RATED"));
}

/// Answers every prompt with a query the engine would reject.
struct GuessingChat;

#[async_trait]
impl ChatService for GuessingChat {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ChatServiceError> {
        Ok("match $m isa movie, has rating $r;".to_string())
    }
}

#[tokio::test]
async fn test_hybrid_unmapped_relation_fails_without_llm_or_engine() {
    let mut engine = MockEngine::new();
    engine.expect_run_query().times(0);

    let context = PromptContext {
        typeql_schema: SCHEMA.to_string(),
        neo4j_schema_json: "{}".to_string(),
    };
    let drafter = Arc::new(HybridDrafter::new(
        RuleBasedDrafter::new(movies_mapping()),
        LlmDrafter::new(Arc::new(GuessingChat), context),
    ));
    let validation = ValidationLoop::new(drafter, persistent(engine), 3);
    let item = WorkItem::new(
        4,
        "Which movies did Tom rate?",
        "MATCH (p:Person {name:'Tom'})-[:RATED]->(m:Movie) RETURN m.title",
    );

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(!converted.success);
    assert_eq!(converted.attempts, 1);
    assert!(converted.error_message.unwrap().contains("RATED"));
}

#[tokio::test]
async fn test_rule_based_draft_accepted_first_time() {
    let mut engine = MockEngine::new();
    engine
        .expect_run_query()
        .withf(|db, query| db.ends_with("_movies") && query.contains("isa directed;"))
        .times(1)
        .returning(|_, _| Ok(QueryOutcome { answers_drawn: 0 }));

    let drafter = Arc::new(RuleBasedDrafter::new(movies_mapping()));
    let validation = ValidationLoop::new(drafter, persistent(engine), 3);
    let item = WorkItem::new(
        0,
        "Who directed The Matrix?",
        "MATCH (p:Person)-[:DIRECTED]->(m:Movie {title: 'The Matrix'}) RETURN p.name",
    );

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(converted.success);
    assert_eq!(converted.attempts, 1);
    assert_eq!(converted.error_message, None);
    assert!(converted.target_query.starts_with("match"));
}

#[tokio::test]
async fn test_rejection_is_retried_and_accepted() {
    let mut seq = Sequence::new();
    let mut engine = MockEngine::new();
    engine
        .expect_run_query()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(EngineError::Rejected("[INF2] Type 'moive' not found.".to_string())));
    engine
        .expect_run_query()
        .withf(|_, query| query.contains("attempt 2"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(QueryOutcome { answers_drawn: 4 }));

    let drafter = Arc::new(RecordingDrafter::default());
    let validation = ValidationLoop::new(drafter.clone(), persistent(engine), 3);
    let item = WorkItem::new(3, "q", "MATCH (m:Movie) RETURN m.title");

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(converted.success);
    assert_eq!(converted.attempts, 2);
    assert_eq!(drafter.drafted(), vec![3, 3]);
}

#[tokio::test]
async fn test_exhaustion_keeps_last_candidate_and_error() {
    let mut engine = MockEngine::new();
    engine
        .expect_run_query()
        .times(2)
        .returning(|_, _| Err(EngineError::Rejected("[REP1] invalid pattern".to_string())));

    let drafter = Arc::new(RecordingDrafter::default());
    let validation = ValidationLoop::new(drafter, persistent(engine), 2);
    let item = WorkItem::new(1, "q", "MATCH (m:Movie) RETURN m.title");

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(!converted.success);
    assert_eq!(converted.attempts, 2);
    assert!(converted.target_query.contains("attempt 2"));
    assert_eq!(converted.error_message.as_deref(), Some("[REP1] invalid pattern"));
}

#[tokio::test]
async fn test_connectivity_loss_restarts_engine_and_revalidates() {
    let mut seq = Sequence::new();
    let mut engine = engine_with_lifecycle();
    engine
        .expect_run_query()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(EngineError::Connectivity("connection reset".to_string())));
    engine
        .expect_run_query()
        .withf(|_, query| query.contains("attempt 1"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(QueryOutcome::default()));

    let mut recovery = MockRecovery::new();
    recovery.expect_restart().times(1).returning(|| Ok(()));

    let validator = Arc::new(Validator::new(
        Arc::new(engine),
        Arc::new(recovery),
        SCHEMA,
        ValidationMode::Persistent {
            database: "text2typeql_movies".to_string(),
        },
    ));
    let drafter = Arc::new(RecordingDrafter::default());
    let validation = ValidationLoop::new(drafter.clone(), validator, 3);
    let item = WorkItem::new(0, "q", "MATCH (m:Movie) RETURN m.title");

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(converted.success);
    assert_eq!(converted.attempts, 1);
    assert_eq!(drafter.drafted(), vec![0]);
}

#[tokio::test]
async fn test_failed_restart_escapes_as_engine_error() {
    let mut engine = MockEngine::new();
    engine
        .expect_run_query()
        .returning(|_, _| Err(EngineError::Connectivity("refused".to_string())));
    let mut recovery = MockRecovery::new();
    recovery
        .expect_restart()
        .returning(|| Err(EngineError::Connectivity("server binary exited".to_string())));

    let validator = Arc::new(Validator::new(
        Arc::new(engine),
        Arc::new(recovery),
        SCHEMA,
        ValidationMode::Persistent {
            database: "db".to_string(),
        },
    ));
    let validation = ValidationLoop::new(Arc::new(RecordingDrafter::default()), validator, 3);
    let item = WorkItem::new(0, "q", "MATCH (m:Movie) RETURN m.title");

    let err = validation.run(&item, AttemptHistory::new(), None).await.unwrap_err();
    assert!(matches!(err, LoopError::Engine(ref e) if e.is_connectivity()), "{:?}", err);
}

#[tokio::test]
async fn test_schema_only_mode_uses_scratch_database() {
    let mut engine = MockEngine::new();
    engine
        .expect_create_database()
        .withf(|name| name.starts_with("t2t_scratch_"))
        .times(1)
        .returning(|_| Ok(()));
    engine
        .expect_run_schema()
        .withf(|db, schema| db.starts_with("t2t_scratch_") && schema.contains("entity person"))
        .times(1)
        .returning(|_, _| Ok(()));
    engine
        .expect_run_query()
        .times(1)
        .returning(|_, _| Ok(QueryOutcome::default()));
    engine
        .expect_delete_database()
        .withf(|name| name.starts_with("t2t_scratch_"))
        .times(1)
        .returning(|_| Ok(()));

    let validator = Arc::new(Validator::new(
        Arc::new(engine),
        Arc::new(NoRecovery),
        SCHEMA,
        ValidationMode::SchemaOnly {
            scratch_prefix: "t2t_scratch".to_string(),
        },
    ));
    let validation = ValidationLoop::new(Arc::new(RecordingDrafter::default()), validator, 3);
    let item = WorkItem::new(0, "q", "MATCH (m:Movie) RETURN m.title");

    let converted = validation.run(&item, AttemptHistory::new(), None).await.unwrap();
    assert!(converted.success);
}
