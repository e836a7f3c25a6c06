//! text2typeql - Cypher to TypeQL dataset conversion
//!
//! This crate turns a text2cypher benchmark (natural-language question paired
//! with a Cypher query, per Neo4j database) into the equivalent TypeQL dataset:
//! - Neo4j source schema model and dataset loading
//! - Per-database entity / relation / attribute mapping tables
//! - Cypher clause splitting and pattern / condition parsing
//! - Rule-based Cypher -> TypeQL translation
//! - Pluggable drafting (rules or LLM) with validate -> diagnose -> retry
//! - Resumable batch conversion with success / failure output streams

pub mod batch;
pub mod config;
pub mod cypher_parser;
pub mod drafting;
pub mod mapping;
pub mod schema_conversion;
pub mod source_schema;
pub mod typeql_translator;
pub mod validation;
