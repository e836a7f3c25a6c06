use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine is unreachable or the connection dropped; not the query's fault.
    #[error("engine connectivity error: {0}")]
    Connectivity(String),

    /// The engine rejected the schema or query. The text is fed back to drafting.
    #[error("{0}")]
    Rejected(String),

    /// The engine answered with something this client does not understand.
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, EngineError::Connectivity(_))
    }
}

/// What running a read query produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Rows or documents drawn from the answer stream (zero is a success).
    pub answers_drawn: usize,
}

/// The narrow capability the validator needs from a database engine.
#[async_trait]
pub trait ValidationEngine: Send + Sync {
    async fn create_database(&self, name: &str) -> Result<(), EngineError>;

    /// Deleting a database that does not exist is not an error.
    async fn delete_database(&self, name: &str) -> Result<(), EngineError>;

    /// Run schema text in a schema transaction and commit it.
    async fn run_schema(&self, database: &str, schema: &str) -> Result<(), EngineError>;

    /// Run a query in a read transaction, drawing at least the first answer.
    async fn run_query(&self, database: &str, query: &str) -> Result<QueryOutcome, EngineError>;
}

/// Bringing a crashed engine back.
#[async_trait]
pub trait EngineRecovery: Send + Sync {
    async fn restart(&self) -> Result<(), EngineError>;
}

/// Recovery for an engine this process does not manage; restarting always fails.
pub struct NoRecovery;

#[async_trait]
impl EngineRecovery for NoRecovery {
    async fn restart(&self) -> Result<(), EngineError> {
        Err(EngineError::Connectivity(
            "engine is unreachable and no server binary is configured to restart it".to_string(),
        ))
    }
}
