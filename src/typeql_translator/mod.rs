//! Cypher → TypeQL translation.
//!
//! The translator walks the clauses produced by
//! [`split_clauses`](crate::cypher_parser::split_clauses) in order, feeding a
//! per-query [`TranslationState`](state::TranslationState):
//!
//! - MATCH patterns become `isa` / relation statements ([`pattern`]),
//! - WHERE conditions become constraints in the current block ([`condition`]),
//! - aggregating WITH / RETURN items become a `reduce` stage ([`aggregation`]),
//! - RETURN and ORDER BY become `fetch` / `sort` ([`projection`]),
//!
//! and [`assembler`] renders the result in TypeQL's fixed stage order.
//! Translation is a pure function of the query text and the two lookup
//! tables, so the same input always produces the same output.

mod aggregation;
pub mod assembler;
mod condition;
pub mod errors;
mod pattern;
mod projection;
pub mod state;

use crate::cypher_parser::ast::OrderItem;
use crate::cypher_parser::lexer::words;
use crate::cypher_parser::{
    parse_condition, parse_order_items, parse_patterns, parse_projection_items, split_clauses,
    Clause, ClauseKind,
};
use crate::mapping::MappingConfig;
use crate::source_schema::SourceSchema;

use aggregation::{translate_with, LaterRefs};
use assembler::{ToTypeQl, TypeQlQuery};
use condition::translate_condition;
use errors::TranslationError;
use pattern::translate_patterns;
use projection::translate_return;
use state::{Stage, TranslationState};

/// Read-only lookup tables shared by every translation step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TranslationContext<'a> {
    pub mapping: &'a MappingConfig,
    pub schema: Option<&'a SourceSchema>,
}

impl TranslationContext<'_> {
    /// Attribute name for `var.prop`, scoped by the variable's entity type.
    pub fn attribute_for(&self, state: &TranslationState, var: &str, property: &str) -> String {
        self.mapping.attribute(state.owner_type(var), property)
    }
}

/// Deterministic Cypher → TypeQL translator for one database.
#[derive(Debug, Clone, Copy)]
pub struct CypherTranslator<'a> {
    mapping: &'a MappingConfig,
    schema: Option<&'a SourceSchema>,
}

fn parse_count(clause: &Clause) -> Result<u64, TranslationError> {
    clause.text.trim().parse::<u64>().map_err(|_| {
        TranslationError::unsupported(format!("{} {}", clause.kind, clause.text.trim()))
    })
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: ClauseKind) -> Result<(), TranslationError> {
    if slot.is_some() {
        return Err(TranslationError::unsupported(format!("repeated {}", kind)));
    }
    *slot = Some(value);
    Ok(())
}

impl<'a> CypherTranslator<'a> {
    pub fn new(mapping: &'a MappingConfig) -> Self {
        CypherTranslator {
            mapping,
            schema: None,
        }
    }

    /// Use the source schema to type unlabelled pattern nodes.
    pub fn with_schema(mut self, schema: &'a SourceSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn translate(&self, cypher: &str) -> Result<TypeQlQuery, TranslationError> {
        let clauses = split_clauses(cypher)?;
        let mut reserved = Vec::new();
        for clause in &clauses {
            reserved.extend(words(&clause.text)?.into_iter().map(|w| w.text.to_string()));
        }

        let ctx = TranslationContext {
            mapping: self.mapping,
            schema: self.schema,
        };
        let mut state = TranslationState::new(reserved);
        let mut reduce = None;
        let mut order: Option<Vec<OrderItem>> = None;
        let mut offset: Option<u64> = None;
        let mut limit: Option<u64> = None;
        let mut tail_before_return = false;
        let mut projection = None;

        for (i, clause) in clauses.iter().enumerate() {
            if projection.is_some()
                && !matches!(
                    clause.kind,
                    ClauseKind::OrderBy | ClauseKind::Skip | ClauseKind::Limit
                )
            {
                return Err(TranslationError::unsupported(format!(
                    "{} after RETURN",
                    clause.kind
                )));
            }
            let tail_seen = order.is_some() || offset.is_some() || limit.is_some();

            match clause.kind {
                ClauseKind::Match => {
                    if state.stage() == Stage::PostReduce {
                        return Err(TranslationError::unsupported("MATCH after aggregation"));
                    }
                    if tail_seen {
                        return Err(TranslationError::unsupported(
                            "MATCH after ORDER BY / SKIP / LIMIT",
                        ));
                    }
                    translate_patterns(&parse_patterns(&clause.text)?, &mut state, &ctx)?;
                }
                ClauseKind::Where | ClauseKind::PostAggregationWhere => {
                    if tail_seen {
                        return Err(TranslationError::unsupported(
                            "WHERE after ORDER BY / SKIP / LIMIT",
                        ));
                    }
                    translate_condition(&parse_condition(&clause.text)?, &mut state, &ctx)?;
                }
                ClauseKind::With => {
                    if tail_seen {
                        return Err(TranslationError::unsupported(
                            "WITH after ORDER BY / SKIP / LIMIT",
                        ));
                    }
                    let list = parse_projection_items(&clause.text)?;
                    let later = LaterRefs::collect(&clauses[i + 1..])?;
                    if let Some(stage) = translate_with(&list, &later, &mut state, &ctx)? {
                        reduce = Some(stage);
                    }
                }
                ClauseKind::Return => {
                    tail_before_return = tail_seen;
                    let list = parse_projection_items(&clause.text)?;
                    projection = Some((i, list));
                }
                ClauseKind::OrderBy => {
                    set_once(&mut order, parse_order_items(&clause.text)?, clause.kind)?;
                }
                ClauseKind::Skip => set_once(&mut offset, parse_count(clause)?, clause.kind)?,
                ClauseKind::Limit => set_once(&mut limit, parse_count(clause)?, clause.kind)?,
            }
        }

        let Some((return_index, list)) = projection else {
            return Err(TranslationError::unsupported("query without RETURN"));
        };
        if tail_before_return && list.items.iter().any(|item| item.expr.is_aggregate()) {
            return Err(TranslationError::unsupported(
                "ORDER BY / SKIP / LIMIT before an aggregating RETURN",
            ));
        }

        let later = LaterRefs::collect(&clauses[return_index..])?;
        let order = order.unwrap_or_default();
        let projected = translate_return(&list, &order, &later, &mut state, &ctx)?;

        if state.match_statements.is_empty() {
            return Err(TranslationError::unsupported("query without MATCH patterns"));
        }
        let reduce = match (reduce, projected.reduce) {
            (Some(_), Some(_)) => {
                return Err(TranslationError::unsupported("second aggregation stage"))
            }
            (a, b) => a.or(b),
        };

        Ok(TypeQlQuery {
            match_statements: state.match_statements,
            reduce,
            post_reduce_match: state.post_reduce_statements,
            select_distinct: projected.select_distinct,
            sort: projected.sort,
            offset,
            limit,
            output: projected.output,
        })
    }

    pub fn translate_to_string(&self, cypher: &str) -> Result<String, TranslationError> {
        let query = self.translate(cypher)?.to_typeql();
        log::debug!("Translated Cypher query into TypeQL:\n{}", query);
        Ok(query)
    }
}
