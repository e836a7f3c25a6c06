use thiserror::Error;

use crate::cypher_parser::errors::CypherParseError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("unmapped relation type `{rel_type}`")]
    UnmappedRelation { rel_type: String },

    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String },

    #[error("variable `{variable}` is not bound by any pattern")]
    UnboundVariable { variable: String },

    #[error("variable `{variable}` is not in scope after aggregation")]
    OutOfScope { variable: String },

    #[error("empty or unparseable query: {0}")]
    Parse(#[from] CypherParseError),
}

impl TranslationError {
    pub fn unsupported(construct: impl Into<String>) -> Self {
        TranslationError::Unsupported {
            construct: construct.into(),
        }
    }

    pub fn unbound(variable: &str) -> Self {
        TranslationError::UnboundVariable {
            variable: variable.to_string(),
        }
    }

    pub fn out_of_scope(variable: &str) -> Self {
        TranslationError::OutOfScope {
            variable: variable.to_string(),
        }
    }

    /// Errors no amount of re-drafting can fix: the source query uses
    /// something the mapping tables or translation rules do not cover.
    pub fn is_unmapped_construct(&self) -> bool {
        matches!(
            self,
            TranslationError::UnmappedRelation { .. }
                | TranslationError::Unsupported { .. }
                | TranslationError::Parse(_)
        )
    }
}
