use nom::{
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{all_consuming, opt, recognize},
    error::{Error, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

use super::ast::{Direction, Literal, NodePattern, PathPattern, RelationshipPattern};
use super::common::{identifier, property_map, ws};
use super::errors::CypherParseError;
use super::lexer::split_top_level;

fn node_pattern(input: &str) -> IResult<&str, NodePattern> {
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, variable) = opt(ws(identifier)).parse(input)?;
    let (input, labels) = many0(preceded(ws(char(':')), ws(identifier))).parse(input)?;
    let (input, properties) = opt(property_map).parse(input)?;
    let (input, _) = ws(char(')')).parse(input)?;

    Ok((
        input,
        NodePattern {
            variable,
            labels,
            properties: properties.unwrap_or_default(),
        },
    ))
}

type RelationshipDetail = (Option<String>, Vec<String>, bool, Vec<(String, Literal)>);

/// Body of `[...]`: `r:TYPE|OTHER*1..3 {prop: value}`
fn relationship_detail(input: &str) -> IResult<&str, RelationshipDetail> {
    let (input, variable) = opt(ws(identifier)).parse(input)?;
    let (input, rel_types) = opt(preceded(
        ws(char(':')),
        separated_list1(ws(char('|')), preceded(opt(char(':')), ws(identifier))),
    ))
    .parse(input)?;
    let (input, length) = opt(ws(recognize((
        char('*'),
        opt(digit1),
        opt(pair(tag(".."), opt(digit1))),
    ))))
    .parse(input)?;
    let (input, properties) = opt(property_map).parse(input)?;

    Ok((
        input,
        (
            variable,
            rel_types.unwrap_or_default(),
            length.is_some(),
            properties.unwrap_or_default(),
        ),
    ))
}

fn relationship_pattern(input: &str) -> IResult<&str, RelationshipPattern> {
    let (input, left_arrow) = opt(ws(char('<'))).parse(input)?;
    let (input, _) = ws(char('-')).parse(input)?;
    let (input, detail) =
        opt(delimited(ws(char('[')), relationship_detail, ws(char(']')))).parse(input)?;
    let (input, _) = ws(char('-')).parse(input)?;
    let (rest, right_arrow) = opt(ws(char('>'))).parse(input)?;

    let direction = match (left_arrow.is_some(), right_arrow.is_some()) {
        (false, true) => Direction::Outgoing,
        (true, false) => Direction::Incoming,
        (false, false) => Direction::Either,
        (true, true) => return Err(nom::Err::Failure(Error::new(input, ErrorKind::Verify))),
    };
    let (variable, rel_types, variable_length, properties) =
        detail.unwrap_or((None, Vec::new(), false, Vec::new()));

    Ok((
        rest,
        RelationshipPattern {
            variable,
            rel_types,
            properties,
            direction,
            variable_length,
        },
    ))
}

fn path_pattern(input: &str) -> IResult<&str, PathPattern> {
    let (input, start) = node_pattern(input)?;
    let (input, hops) = many0(pair(relationship_pattern, node_pattern)).parse(input)?;
    Ok((input, PathPattern { start, hops }))
}

/// Reject pattern forms that parse structurally but have no translation:
/// named paths (`p = (...)`) and path functions (`shortestPath(...)`).
fn check_pattern_prefix(part: &str) -> Result<(), CypherParseError> {
    if let Ok((rest, name)) = ws(identifier).parse(part) {
        if rest.starts_with('=') {
            return Err(CypherParseError::UnsupportedClause(format!(
                "named path '{}'",
                name
            )));
        }
        if rest.starts_with('(') {
            return Err(CypherParseError::UnsupportedClause(format!(
                "path function '{}'",
                name
            )));
        }
    }
    Ok(())
}

/// Parse the comma-separated pattern list of a MATCH clause.
pub fn parse_patterns(text: &str) -> Result<Vec<PathPattern>, CypherParseError> {
    let mut paths = Vec::new();
    for part in split_top_level(text, ',')? {
        let part = part.trim();
        if part.is_empty() {
            return Err(CypherParseError::unparseable("pattern", text));
        }
        check_pattern_prefix(part)?;
        let (_, path) = all_consuming(ws(path_pattern))
            .parse(part)
            .map_err(|_| CypherParseError::unparseable("pattern", part))?;
        paths.push(path);
    }
    if paths.is_empty() {
        return Err(CypherParseError::unparseable("pattern", text));
    }
    Ok(paths)
}

/// A single path with at least one hop, as used in `WHERE (a)-[:R]->(b)`.
pub fn parse_pattern_predicate(text: &str) -> Option<PathPattern> {
    all_consuming(ws(path_pattern))
        .parse(text)
        .ok()
        .map(|(_, path)| path)
        .filter(|path| !path.hops.is_empty())
}
