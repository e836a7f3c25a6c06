//! Neo4j source schema model.
//!
//! One [`SourceSchema`] per source database: node labels with their
//! properties, relationship types with their properties, and the
//! `(start, type, end)` triples that say which labels a relationship joins.
//! It is parsed once and only ever read afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod dataset;
pub mod errors;
mod python_literal;

pub use errors::SourceSchemaError;
pub use python_literal::python_literal_to_json;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub property: String,
    #[serde(rename = "type", default)]
    pub property_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTriple {
    #[serde(rename = "start")]
    pub start_label: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(rename = "end")]
    pub end_label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSchema {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,
    #[serde(rename = "node_props", default)]
    pub node_properties: BTreeMap<String, Vec<PropertyDef>>,
    #[serde(rename = "rel_props", default)]
    pub relationship_properties: BTreeMap<String, Vec<PropertyDef>>,
    #[serde(default)]
    pub relationships: Vec<RelationshipTriple>,
}

impl SourceSchema {
    pub fn from_json_str(database: &str, json: &str) -> Result<Self, SourceSchemaError> {
        let mut schema: SourceSchema =
            serde_json::from_str(json).map_err(|source| SourceSchemaError::Json {
                database: database.to_string(),
                source,
            })?;
        schema.database = database.to_string();
        Ok(schema)
    }

    /// Parse the Python-dict form used by the text2cypher schemas export.
    pub fn from_python_literal(database: &str, literal: &str) -> Result<Self, SourceSchemaError> {
        let json = python_literal_to_json(literal)?;
        Self::from_json_str(database, &json)
    }

    /// Pretty JSON of the schema body (without the database name), as handed to prompts.
    pub fn to_json_pretty(&self) -> String {
        let body = SourceSchema {
            database: String::new(),
            ..self.clone()
        };
        serde_json::to_string_pretty(&body).unwrap_or_default()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.node_properties.keys().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.node_properties.contains_key(label)
            || self
                .relationships
                .iter()
                .any(|r| r.start_label == label || r.end_label == label)
    }

    pub fn properties_of(&self, label: &str) -> &[PropertyDef] {
        self.node_properties
            .get(label)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Labels that can sit at the far end of `rel_type` when `known` is the
    /// start label (`outgoing == true`) or the end label.
    pub fn neighbour_labels(&self, known: &str, rel_type: &str, outgoing: bool) -> Vec<&str> {
        let mut labels: Vec<&str> = self
            .relationships
            .iter()
            .filter(|r| r.rel_type == rel_type)
            .filter_map(|r| {
                if outgoing && r.start_label == known {
                    Some(r.end_label.as_str())
                } else if !outgoing && r.end_label == known {
                    Some(r.start_label.as_str())
                } else {
                    None
                }
            })
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}
