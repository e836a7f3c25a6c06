use std::sync::Arc;

use uuid::Uuid;

use super::engine::{EngineError, EngineRecovery, ValidationEngine};

/// Where candidate queries are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationMode {
    /// A throwaway database per check: create, load schema, query, delete.
    SchemaOnly { scratch_prefix: String },
    /// One long-lived database loaded with the schema once per run.
    Persistent { database: String },
}

/// Outcome of running one candidate against the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

fn scratch_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Load `schema` into a throwaway database and report whether the engine accepts it.
pub async fn validate_schema_text(
    engine: &dyn ValidationEngine,
    scratch_prefix: &str,
    schema: &str,
) -> Result<Verdict, EngineError> {
    let database = scratch_name(scratch_prefix);
    engine.create_database(&database).await?;
    let result = engine.run_schema(&database, schema).await;
    if let Err(e) = engine.delete_database(&database).await {
        log::warn!("Could not delete scratch database {}: {}", database, e);
    }
    match result {
        Ok(()) => Ok(Verdict::Accepted),
        Err(EngineError::Rejected(message)) => Ok(Verdict::Rejected(message)),
        Err(e) => Err(e),
    }
}

pub struct Validator {
    engine: Arc<dyn ValidationEngine>,
    recovery: Arc<dyn EngineRecovery>,
    schema: String,
    mode: ValidationMode,
}

impl Validator {
    pub fn new(
        engine: Arc<dyn ValidationEngine>,
        recovery: Arc<dyn EngineRecovery>,
        schema: impl Into<String>,
        mode: ValidationMode,
    ) -> Self {
        Validator {
            engine,
            recovery,
            schema: schema.into(),
            mode,
        }
    }

    pub fn mode(&self) -> &ValidationMode {
        &self.mode
    }

    /// Recreate the persistent database and load the schema. A schema the
    /// engine rejects is returned as [`EngineError::Rejected`].
    pub async fn prepare(&self) -> Result<(), EngineError> {
        let ValidationMode::Persistent { database } = &self.mode else {
            return Ok(());
        };
        log::info!("Preparing validation database {}", database);
        self.engine.delete_database(database).await?;
        self.engine.create_database(database).await?;
        self.engine.run_schema(database, &self.schema).await
    }

    /// Execute `query`. Engine rejections become a [`Verdict`]; connectivity
    /// and protocol failures are returned as errors.
    pub async fn validate_query(&self, query: &str) -> Result<Verdict, EngineError> {
        let outcome = match &self.mode {
            ValidationMode::Persistent { database } => self.engine.run_query(database, query).await,
            ValidationMode::SchemaOnly { scratch_prefix } => {
                let database = scratch_name(scratch_prefix);
                self.engine.create_database(&database).await?;
                let outcome = match self.engine.run_schema(&database, &self.schema).await {
                    Ok(()) => self.engine.run_query(&database, query).await,
                    Err(EngineError::Rejected(message)) => {
                        Err(EngineError::Rejected(format!("schema: {}", message)))
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = self.engine.delete_database(&database).await {
                    log::warn!("Could not delete scratch database {}: {}", database, e);
                }
                outcome
            }
        };
        match outcome {
            Ok(outcome) => {
                log::debug!("Query accepted, {} answer(s) drawn", outcome.answers_drawn);
                Ok(Verdict::Accepted)
            }
            Err(EngineError::Rejected(message)) => Ok(Verdict::Rejected(message)),
            Err(e) => Err(e),
        }
    }

    /// Restart the engine and rebuild the validation database.
    pub async fn recover(&self) -> Result<(), EngineError> {
        self.recovery.restart().await?;
        self.prepare().await
    }
}
