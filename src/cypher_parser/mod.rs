//! Cypher front end.
//!
//! Queries in the text2cypher corpus are narrow and stylised, so instead of a
//! full grammar the input is first segmented into typed clauses by a keyword
//! scan ([`split_clauses`]); each clause body is then handed to a small nom
//! sub-parser (`pattern`, `condition`, `items`).

use std::fmt;

use errors::CypherParseError;
use lexer::{strip_comments, top_level_words};

pub mod ast;
mod common;
pub mod condition;
pub mod errors;
pub mod items;
pub(crate) mod lexer;
pub mod pattern;

pub use condition::parse_condition;
pub use items::{parse_order_items, parse_projection_items};
pub use pattern::parse_patterns;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Match,
    /// WHERE before any WITH: filters the matched rows.
    Where,
    /// WHERE after a WITH: HAVING-style filter over the carried/aggregated values.
    PostAggregationWhere,
    With,
    Return,
    OrderBy,
    Skip,
    Limit,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClauseKind::Match => "MATCH",
            ClauseKind::Where => "WHERE",
            ClauseKind::PostAggregationWhere => "WHERE (after WITH)",
            ClauseKind::With => "WITH",
            ClauseKind::Return => "RETURN",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Skip => "SKIP",
            ClauseKind::Limit => "LIMIT",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub kind: ClauseKind,
    /// Clause body with the leading keyword removed and surrounding whitespace trimmed.
    pub text: String,
}

/// Keywords that start a clause this crate has no translation for.
const UNSUPPORTED_CLAUSES: &[&str] = &[
    "UNWIND", "CALL", "UNION", "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "FOREACH",
    "LOAD", "USE",
];

/// Segment a Cypher query into its ordered clauses.
///
/// Keywords are recognised only at bracket depth zero and outside string
/// literals, so single-line queries and patterns containing keyword-like
/// text split correctly. `WITH` immediately preceded by `STARTS`/`ENDS` is the
/// string predicate, not a clause.
pub fn split_clauses(query: &str) -> Result<Vec<Clause>, CypherParseError> {
    let cleaned = strip_comments(query)?;
    let cleaned = cleaned.trim().trim_end_matches(';').trim_end();
    if cleaned.is_empty() {
        return Err(CypherParseError::EmptyQuery);
    }

    let words = top_level_words(cleaned)?;
    // (kind, keyword start, body start)
    let mut markers: Vec<(ClauseKind, usize, usize)> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| &words[p]);
        let next = words.get(i + 1);

        if word.is_keyword("OPTIONAL") && next.is_some_and(|n| n.is_keyword("MATCH")) {
            return Err(CypherParseError::UnsupportedClause("OPTIONAL MATCH".to_string()));
        }
        if let Some(unsupported) = UNSUPPORTED_CLAUSES.iter().find(|k| word.is_keyword(k)) {
            return Err(CypherParseError::UnsupportedClause(unsupported.to_string()));
        }

        let kind = if word.is_keyword("MATCH") {
            Some((ClauseKind::Match, word.end))
        } else if word.is_keyword("WHERE") {
            Some((ClauseKind::Where, word.end))
        } else if word.is_keyword("WITH")
            && !prev.is_some_and(|p| p.is_keyword("STARTS") || p.is_keyword("ENDS"))
        {
            Some((ClauseKind::With, word.end))
        } else if word.is_keyword("RETURN") {
            Some((ClauseKind::Return, word.end))
        } else if word.is_keyword("ORDER") && next.is_some_and(|n| n.is_keyword("BY")) {
            next.map(|n| (ClauseKind::OrderBy, n.end))
        } else if word.is_keyword("SKIP") {
            Some((ClauseKind::Skip, word.end))
        } else if word.is_keyword("LIMIT") {
            Some((ClauseKind::Limit, word.end))
        } else {
            None
        };

        if let Some((kind, body_start)) = kind {
            markers.push((kind, word.start, body_start));
        }
    }

    let Some(&(_, first_start, _)) = markers.first() else {
        return Err(CypherParseError::EmptyQuery);
    };
    let leading = cleaned[..first_start].trim();
    if !leading.is_empty() {
        return Err(CypherParseError::LeadingText(leading.to_string()));
    }

    let mut clauses = Vec::with_capacity(markers.len());
    let mut seen_with = false;
    for (idx, &(kind, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers
            .get(idx + 1)
            .map(|&(_, start, _)| start)
            .unwrap_or(cleaned.len());
        let text = cleaned[body_start..body_end].trim().to_string();

        let kind = match kind {
            ClauseKind::With => {
                seen_with = true;
                ClauseKind::With
            }
            ClauseKind::Where if seen_with => ClauseKind::PostAggregationWhere,
            other => other,
        };
        clauses.push(Clause { kind, text });
    }

    Ok(clauses)
}
