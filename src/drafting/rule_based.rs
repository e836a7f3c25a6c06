use std::sync::Arc;

use async_trait::async_trait;

use super::{DraftError, DraftRequest, DraftStrategy};
use crate::mapping::MappingConfig;
use crate::source_schema::SourceSchema;
use crate::typeql_translator::CypherTranslator;

/// Drafts with the deterministic translator. Every attempt for the same
/// item yields the same text.
#[derive(Debug, Clone)]
pub struct RuleBasedDrafter {
    mapping: Arc<MappingConfig>,
    schema: Option<Arc<SourceSchema>>,
}

impl RuleBasedDrafter {
    pub fn new(mapping: Arc<MappingConfig>) -> Self {
        RuleBasedDrafter {
            mapping,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Arc<SourceSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn translate(&self, cypher: &str) -> Result<String, DraftError> {
        let mut translator = CypherTranslator::new(&self.mapping);
        if let Some(schema) = &self.schema {
            translator = translator.with_schema(schema);
        }
        Ok(translator.translate_to_string(cypher)?)
    }
}

#[async_trait]
impl DraftStrategy for RuleBasedDrafter {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn draft(&self, request: &DraftRequest<'_>) -> Result<String, DraftError> {
        self.translate(request.source_query)
    }
}
