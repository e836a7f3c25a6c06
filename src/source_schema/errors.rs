use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceSchemaError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("Invalid schema for database `{database}`: {source}")]
    Json {
        database: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unterminated string in schema literal at byte {0}")]
    UnterminatedLiteral(usize),
    #[error("No schema found for database `{0}`")]
    UnknownDatabase(String),
}
