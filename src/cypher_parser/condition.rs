use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace1},
    combinator::{all_consuming, map, opt, value},
    sequence::separated_pair,
    IResult, Parser,
};

use super::ast::{CaseFold, CompareOp, Condition, Operand, StringMatchKind};
use super::common::{identifier, keyword, list_literal, literal, ws};
use super::errors::CypherParseError;
use super::lexer::{is_fully_wrapped, split_on_keyword};
use super::pattern::parse_pattern_predicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomOp {
    Compare(CompareOp),
    Regex,
}

pub(crate) fn property_ref(input: &str) -> IResult<&str, (String, String)> {
    separated_pair(identifier, char('.'), identifier).parse(input)
}

fn case_fold(input: &str) -> IResult<&str, CaseFold> {
    alt((
        value(CaseFold::Lower, alt((keyword("toLower"), keyword("lower")))),
        value(CaseFold::Upper, alt((keyword("toUpper"), keyword("upper")))),
    ))
    .parse(input)
}

fn folded_property(input: &str) -> IResult<&str, Operand> {
    let (input, fold) = case_fold(input)?;
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, (variable, property)) = ws(property_ref).parse(input)?;
    let (input, _) = char(')').parse(input)?;
    Ok((
        input,
        Operand::Property {
            variable,
            property,
            case_fold: Some(fold),
        },
    ))
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((
        folded_property,
        map(literal, Operand::Literal),
        map(property_ref, |(variable, property)| Operand::Property {
            variable,
            property,
            case_fold: None,
        }),
        map(identifier, Operand::Variable),
    ))
    .parse(input)
}

fn atom_op(input: &str) -> IResult<&str, AtomOp> {
    alt((
        value(AtomOp::Compare(CompareOp::NotEq), alt((tag("<>"), tag("!=")))),
        value(AtomOp::Compare(CompareOp::LtEq), tag("<=")),
        value(AtomOp::Compare(CompareOp::GtEq), tag(">=")),
        value(AtomOp::Regex, tag("=~")),
        value(AtomOp::Compare(CompareOp::Eq), tag("=")),
        value(AtomOp::Compare(CompareOp::Lt), tag("<")),
        value(AtomOp::Compare(CompareOp::Gt), tag(">")),
    ))
    .parse(input)
}

fn string_match_kind(input: &str) -> IResult<&str, StringMatchKind> {
    alt((
        value(StringMatchKind::Contains, keyword("CONTAINS")),
        value(
            StringMatchKind::StartsWith,
            (keyword("STARTS"), multispace1, keyword("WITH")),
        ),
        value(
            StringMatchKind::EndsWith,
            (keyword("ENDS"), multispace1, keyword("WITH")),
        ),
    ))
    .parse(input)
}

/// One predicate: `lhs OP rhs`, `lhs CONTAINS s`, `lhs IS [NOT] NULL`, `lhs IN [..]`.
fn atom(input: &str) -> IResult<&str, Condition> {
    let (input, left) = ws(operand).parse(input)?;

    if let Ok((rest, (_, negation, _))) = (
        ws(keyword("IS")),
        opt(ws(keyword("NOT"))),
        ws(keyword("NULL")),
    )
        .parse(input)
    {
        return Ok((
            rest,
            Condition::IsNull {
                operand: left,
                negated: negation.is_some(),
            },
        ));
    }

    if let Ok((rest, kind)) = ws(string_match_kind).parse(input) {
        let (rest, pattern) = ws(operand).parse(rest)?;
        return Ok((
            rest,
            Condition::StringMatch {
                subject: left,
                kind,
                pattern,
            },
        ));
    }

    if let Ok((rest, _)) = ws(keyword("IN")).parse(input) {
        let (rest, values) = list_literal(rest)?;
        return Ok((
            rest,
            Condition::In {
                operand: left,
                values,
            },
        ));
    }

    let (rest, op) = ws(atom_op).parse(input)?;
    let (rest, right) = ws(operand).parse(rest)?;
    let condition = match op {
        AtomOp::Regex => Condition::StringMatch {
            subject: left,
            kind: StringMatchKind::Regex,
            pattern: right,
        },
        AtomOp::Compare(op) => Condition::Comparison { left, op, right },
    };
    Ok((rest, condition))
}

/// `exists(n.prop)` (legacy IS NOT NULL) or `exists((a)-[:R]->(b))`.
fn parse_exists(text: &str) -> Option<Result<Condition, CypherParseError>> {
    let (rest, _) = ws(keyword("exists")).parse(text).ok()?;
    if !is_fully_wrapped(rest, '(', ')') {
        return None;
    }
    let inner = rest.trim();
    let inner = &inner[1..inner.len() - 1];

    if let Ok((_, (variable, property))) = all_consuming(ws(property_ref)).parse(inner) {
        return Some(Ok(Condition::IsNull {
            operand: Operand::Property {
                variable,
                property,
                case_fold: None,
            },
            negated: true,
        }));
    }
    Some(
        parse_pattern_predicate(inner)
            .map(Condition::Pattern)
            .ok_or_else(|| CypherParseError::unparseable("exists() argument", inner)),
    )
}

/// Parse a WHERE body into a boolean tree. Precedence is the usual
/// `OR` < `AND` < `NOT`; parentheses group.
pub fn parse_condition(text: &str) -> Result<Condition, CypherParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CypherParseError::unparseable("condition", text));
    }

    let disjuncts = split_on_keyword(text, "OR")?;
    if disjuncts.len() > 1 {
        return disjuncts
            .into_iter()
            .map(parse_condition)
            .collect::<Result<Vec<_>, _>>()
            .map(Condition::Or);
    }

    let conjuncts = split_on_keyword(text, "AND")?;
    if conjuncts.len() > 1 {
        return conjuncts
            .into_iter()
            .map(parse_condition)
            .collect::<Result<Vec<_>, _>>()
            .map(Condition::And);
    }

    if let Ok((rest, _)) = ws(keyword("NOT")).parse(text) {
        return Ok(Condition::Not(Box::new(parse_condition(rest)?)));
    }

    if let Some(path) = parse_pattern_predicate(text) {
        return Ok(Condition::Pattern(path));
    }

    if is_fully_wrapped(text, '(', ')') {
        return parse_condition(&text[1..text.len() - 1]);
    }

    if let Some(result) = parse_exists(text) {
        return result;
    }

    if ws(keyword("EXISTS")).parse(text).is_ok() {
        return Err(CypherParseError::UnsupportedClause(
            "EXISTS subquery".to_string(),
        ));
    }

    all_consuming(ws(atom))
        .parse(text)
        .map(|(_, condition)| condition)
        .map_err(|_| CypherParseError::unparseable("condition", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_parser::ast::Literal;

    fn prop(variable: &str, property: &str) -> Operand {
        Operand::Property {
            variable: variable.to_string(),
            property: property.to_string(),
            case_fold: None,
        }
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            parse_condition("m.year >= 2000").unwrap(),
            Condition::Comparison {
                left: prop("m", "year"),
                op: CompareOp::GtEq,
                right: Operand::Literal(Literal::Number("2000".to_string())),
            }
        );
        assert_eq!(
            parse_condition("c > 3").unwrap(),
            Condition::Comparison {
                left: Operand::Variable("c".to_string()),
                op: CompareOp::Gt,
                right: Operand::Literal(Literal::Number("3".to_string())),
            }
        );
    }

    #[test]
    fn test_not_equal_spellings() {
        for text in ["a <> b", "a != b"] {
            assert!(matches!(
                parse_condition(text).unwrap(),
                Condition::Comparison {
                    op: CompareOp::NotEq,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_string_predicates() {
        assert_eq!(
            parse_condition("n.name STARTS WITH 'A'").unwrap(),
            Condition::StringMatch {
                subject: prop("n", "name"),
                kind: StringMatchKind::StartsWith,
                pattern: Operand::Literal(Literal::String("A".to_string())),
            }
        );
        assert!(matches!(
            parse_condition("n.name =~ '.*son'").unwrap(),
            Condition::StringMatch {
                kind: StringMatchKind::Regex,
                ..
            }
        ));
        assert!(matches!(
            parse_condition("toLower(n.name) CONTAINS 'acme'").unwrap(),
            Condition::StringMatch {
                subject: Operand::Property {
                    case_fold: Some(CaseFold::Lower),
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn test_null_checks() {
        assert_eq!(
            parse_condition("n.born IS NOT NULL").unwrap(),
            Condition::IsNull {
                operand: prop("n", "born"),
                negated: true
            }
        );
        assert_eq!(
            parse_condition("n.born IS NULL").unwrap(),
            Condition::IsNull {
                operand: prop("n", "born"),
                negated: false
            }
        );
        assert_eq!(
            parse_condition("exists(n.born)").unwrap(),
            Condition::IsNull {
                operand: prop("n", "born"),
                negated: true
            }
        );
    }

    #[test]
    fn test_in_list() {
        let condition = parse_condition("g.name IN ['Drama', 'Comedy']").unwrap();
        match condition {
            Condition::In { values, .. } => assert_eq!(values.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_boolean_structure() {
        let condition =
            parse_condition("a.x = 1 AND (b.y = 2 OR b.y = 3) AND NOT c.z CONTAINS 'q'").unwrap();
        match condition {
            Condition::And(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[1], Condition::Or(branches) if branches.len() == 2));
                assert!(matches!(&parts[2], Condition::Not(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pattern_predicate() {
        assert!(matches!(
            parse_condition("NOT (p)-[:DIRECTED]->(:Movie)").unwrap(),
            Condition::Not(inner) if matches!(*inner, Condition::Pattern(_))
        ));
    }

    #[test]
    fn test_unparseable_condition() {
        assert!(matches!(
            parse_condition("size(n.tags) > 2"),
            Err(CypherParseError::Unparseable { .. })
        ));
        assert!(matches!(
            parse_condition("EXISTS { MATCH (n)-->(m) }"),
            Err(CypherParseError::UnsupportedClause(_))
        ));
    }
}
