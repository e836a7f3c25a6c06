//! Loading the text2cypher benchmark CSV files.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::errors::SourceSchemaError;
use super::SourceSchema;

/// One (question, Cypher) pair from the queries CSV.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryRecord {
    pub question: String,
    pub cypher: String,
    #[serde(default)]
    pub database: String,
    #[serde(rename = "type", default)]
    pub query_type: String,
    #[serde(default, deserialize_with = "flag")]
    pub syntax_error: bool,
    #[serde(default, deserialize_with = "flag")]
    pub timeout: bool,
    #[serde(default = "default_true", deserialize_with = "flag_default_true")]
    pub returns_results: bool,
    /// Non-empty text in the source column means the query disagrees with the schema.
    #[serde(default, deserialize_with = "flag")]
    pub false_schema: bool,
}

fn default_true() -> bool {
    true
}

fn parse_flag(raw: Option<String>, empty: bool) -> bool {
    match raw.as_deref().map(str::trim) {
        None | Some("") => empty,
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v.eq_ignore_ascii_case("nan") => {
            false
        }
        Some(_) => true,
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(parse_flag(Option::<String>::deserialize(deserializer)?, false))
}

fn flag_default_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(parse_flag(Option::<String>::deserialize(deserializer)?, true))
}

impl QueryRecord {
    /// Rows marked as syntax errors or schema mismatches are not worth converting.
    pub fn is_valid(&self) -> bool {
        !self.syntax_error && !self.false_schema
    }
}

fn csv_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<std::fs::File>, SourceSchemaError> {
    let path = path.as_ref();
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| SourceSchemaError::Csv {
            path: path.display().to_string(),
            source,
        })
}

/// Read the queries CSV, optionally keeping only one database's rows.
pub fn load_queries<P: AsRef<Path>>(
    path: P,
    database: Option<&str>,
) -> Result<Vec<QueryRecord>, SourceSchemaError> {
    let path = path.as_ref();
    let mut reader = csv_reader(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<QueryRecord>() {
        let record = row.map_err(|source| SourceSchemaError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        if database.is_none_or(|db| record.database == db) {
            records.push(record);
        }
    }
    log::debug!("Loaded {} queries from {}", records.len(), path.display());
    Ok(records)
}

pub fn filter_valid(records: Vec<QueryRecord>) -> Vec<QueryRecord> {
    records.into_iter().filter(QueryRecord::is_valid).collect()
}

#[derive(Debug, Deserialize)]
struct SchemaRow {
    database: String,
    structured_schema: String,
}

/// Read the schemas CSV into one [`SourceSchema`] per database.
pub fn load_schemas<P: AsRef<Path>>(
    path: P,
) -> Result<BTreeMap<String, SourceSchema>, SourceSchemaError> {
    let path = path.as_ref();
    let mut reader = csv_reader(path)?;
    let mut schemas = BTreeMap::new();
    for row in reader.deserialize::<SchemaRow>() {
        let row = row.map_err(|source| SourceSchemaError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        let schema = SourceSchema::from_python_literal(&row.database, &row.structured_schema)?;
        schemas.insert(row.database, schema);
    }
    Ok(schemas)
}

pub fn load_schema<P: AsRef<Path>>(path: P, database: &str) -> Result<SourceSchema, SourceSchemaError> {
    load_schemas(path)?
        .remove(database)
        .ok_or_else(|| SourceSchemaError::UnknownDatabase(database.to_string()))
}
