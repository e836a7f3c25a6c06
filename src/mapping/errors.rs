//! # Mapping Error Types
//!
//! Failures while loading the per-database mapping tables. A *missing entry*
//! inside a loaded table is never a mapping error: entity and attribute
//! lookups fall back to derived names, and unmapped relationship types are
//! reported by the translator where the query context is known.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("No mapping file for database `{database}` at {path}")]
    NotFound { database: String, path: String },
    #[error("Failed to read mapping file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse mapping file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid mapping for relationship `{rel_type}`: {message}")]
    InvalidRelation { rel_type: String, message: String },
}
