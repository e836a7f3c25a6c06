//! Neo4j schema → TypeQL schema through the text-completion service, with
//! the same validate-and-retry shape as query conversion.

use std::sync::Arc;

use crate::batch::{ConversionError, OutputStore, StatusRecord};
use crate::drafting::llm::ChatService;
use crate::drafting::prompt::{extract_schema, schema_prompt, truncate_chars, MAX_ERROR_CHARS, SYSTEM_PROMPT};
use crate::drafting::{Attempt, AttemptHistory};
use crate::validation::{validate_schema_text, ValidationEngine, Verdict};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConversion {
    /// The accepted schema, or the last rejected candidate.
    pub schema: Option<String>,
    pub success: bool,
    pub attempts: usize,
    pub errors: Vec<String>,
}

pub struct SchemaConverter {
    chat: Arc<dyn ChatService>,
    engine: Arc<dyn ValidationEngine>,
    scratch_prefix: String,
    max_retries: usize,
}

impl SchemaConverter {
    pub fn new(
        chat: Arc<dyn ChatService>,
        engine: Arc<dyn ValidationEngine>,
        scratch_prefix: &str,
        max_retries: usize,
    ) -> Self {
        SchemaConverter {
            chat,
            engine,
            scratch_prefix: scratch_prefix.to_string(),
            max_retries: max_retries.max(1),
        }
    }

    pub async fn convert(&self, neo4j_schema_json: &str) -> Result<SchemaConversion, ConversionError> {
        let mut history = AttemptHistory::new();
        let mut errors = Vec::new();
        let mut candidate = None;

        for attempt in 1..=self.max_retries {
            log::info!("Schema conversion attempt {}/{}", attempt, self.max_retries);
            let prompt = schema_prompt(neo4j_schema_json, &history);
            let response = self.chat.complete(SYSTEM_PROMPT, &prompt).await?;

            let Some(schema) = extract_schema(&response) else {
                let error = "completion contained no define block".to_string();
                log::info!("Schema attempt {} rejected: {}", attempt, error);
                history = history.with_attempt(Attempt {
                    candidate: response,
                    error: error.clone(),
                });
                errors.push(error);
                continue;
            };

            match validate_schema_text(self.engine.as_ref(), &self.scratch_prefix, &schema).await? {
                Verdict::Accepted => {
                    return Ok(SchemaConversion {
                        schema: Some(schema),
                        success: true,
                        attempts: attempt,
                        errors,
                    });
                }
                Verdict::Rejected(message) => {
                    let error = truncate_chars(&message, MAX_ERROR_CHARS);
                    log::info!("Schema attempt {} rejected: {}", attempt, error);
                    history = history.with_attempt(Attempt {
                        candidate: schema.clone(),
                        error: error.clone(),
                    });
                    errors.push(error);
                    candidate = Some(schema);
                }
            }
        }

        Ok(SchemaConversion {
            schema: candidate,
            success: false,
            attempts: self.max_retries,
            errors,
        })
    }
}

/// Write `schema.tql`, `neo4j_schema.json` and a fresh unapproved status record.
pub fn persist_schema(
    store: &OutputStore,
    database: &str,
    neo4j_schema_json: &str,
    result: &SchemaConversion,
) -> Result<(), ConversionError> {
    if let Some(schema) = &result.schema {
        store.write_schema(schema, neo4j_schema_json)?;
    }
    let mut status = StatusRecord::new(database);
    status.success = result.success;
    status.attempts = result.attempts;
    status.errors = result.errors.clone();
    status.touch();
    store.save_status(&status)
}

/// Mark the converted schema as reviewed. False when nothing was converted yet.
pub fn approve_schema(store: &OutputStore) -> Result<bool, ConversionError> {
    let Some(mut status) = store.load_status()? else {
        return Ok(false);
    };
    status.approved = true;
    status.touch();
    store.save_status(&status)?;
    Ok(true)
}

pub fn is_schema_approved(store: &OutputStore) -> Result<bool, ConversionError> {
    Ok(store.load_status()?.is_some_and(|s| s.approved))
}
