use thiserror::Error;

/// Failures raised while splitting or parsing the Cypher text itself.
///
/// Everything here is about the *shape* of the input; whether a well-formed
/// construct can be expressed in TypeQL is decided later by the translator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CypherParseError {
    #[error("Empty query: no clauses found")]
    EmptyQuery,

    #[error("Unsupported clause: {0}")]
    UnsupportedClause(String),

    #[error("Unexpected text before first clause: '{0}'")]
    LeadingText(String),

    #[error("Unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),

    #[error("Unbalanced brackets in '{0}'")]
    UnbalancedBrackets(String),

    #[error("Unable to parse {context}: '{input}'")]
    Unparseable {
        context: &'static str,
        input: String,
    },
}

impl CypherParseError {
    pub(crate) fn unparseable(context: &'static str, input: &str) -> Self {
        CypherParseError::Unparseable {
            context,
            input: input.trim().to_string(),
        }
    }
}
