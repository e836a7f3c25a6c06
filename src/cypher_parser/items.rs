use nom::{
    branch::alt,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, opt, value},
    multi::many1,
    IResult, Parser,
};

use super::ast::{
    AggregateArg, AggregateFn, ArithToken, ItemExpr, OrderItem, ProjectionItem, ProjectionList,
};
use super::common::{identifier, keyword, literal, numeric_literal, ws};
use super::condition::property_ref;
use super::errors::CypherParseError;
use super::lexer::{split_top_level, top_level_words};

fn aggregate_fn(input: &str) -> IResult<&str, AggregateFn> {
    alt((
        value(AggregateFn::Count, keyword("count")),
        value(AggregateFn::Sum, keyword("sum")),
        value(AggregateFn::Avg, keyword("avg")),
        value(AggregateFn::Min, keyword("min")),
        value(AggregateFn::Max, keyword("max")),
    ))
    .parse(input)
}

fn aggregate(input: &str) -> IResult<&str, ItemExpr> {
    let (input, function) = aggregate_fn(input)?;
    let (input, _) = ws(char('(')).parse(input)?;
    let (input, distinct) = opt(ws(keyword("DISTINCT"))).parse(input)?;
    let (input, argument) = alt((
        value(AggregateArg::Star, ws(char('*'))),
        map(ws(property_ref), |(variable, property)| {
            AggregateArg::Property { variable, property }
        }),
        map(ws(identifier), AggregateArg::Variable),
    ))
    .parse(input)?;
    let (input, _) = ws(char(')')).parse(input)?;

    Ok((
        input,
        ItemExpr::Aggregate {
            function,
            distinct: distinct.is_some(),
            argument,
        },
    ))
}

fn arith_token(input: &str) -> IResult<&str, ArithToken> {
    alt((
        map(property_ref, |(variable, property)| ArithToken::Property {
            variable,
            property,
        }),
        map(identifier, ArithToken::Variable),
        map(one_of("+-*/%"), ArithToken::Operator),
        map(numeric_literal, |n: &str| ArithToken::Number(n.to_string())),
        value(ArithToken::Open, char('(')),
        value(ArithToken::Close, char(')')),
    ))
    .parse(input)
}

/// Classify one RETURN / WITH / ORDER BY expression.
pub fn parse_item_expr(text: &str) -> ItemExpr {
    let text = text.trim();

    if let Ok((_, expr)) = all_consuming(ws(aggregate)).parse(text) {
        return expr;
    }
    if let Ok((_, (variable, property))) = all_consuming(ws(property_ref)).parse(text) {
        return ItemExpr::Property { variable, property };
    }
    if all_consuming(ws(literal)).parse(text).is_ok() {
        return ItemExpr::Other(text.to_string());
    }
    if let Ok((_, variable)) = all_consuming(ws(identifier)).parse(text) {
        return ItemExpr::Variable(variable);
    }
    if let Ok((_, tokens)) = all_consuming(many1(ws(arith_token))).parse(text) {
        let has_operator = tokens
            .iter()
            .any(|t| matches!(t, ArithToken::Operator(_)));
        // `name(` is a function call, which arithmetic does not cover
        let has_call = tokens
            .windows(2)
            .any(|w| matches!((&w[0], &w[1]), (ArithToken::Variable(_), ArithToken::Open)));
        if has_operator && !has_call {
            return ItemExpr::Arithmetic(tokens);
        }
    }
    ItemExpr::Other(text.to_string())
}

/// Split `expr AS alias` on the last top-level `AS`.
fn split_alias(item: &str) -> Result<(&str, Option<String>), CypherParseError> {
    let words = top_level_words(item)?;
    let Some(as_word) = words.iter().rev().find(|w| w.is_keyword("AS")) else {
        return Ok((item.trim(), None));
    };
    let alias_text = &item[as_word.end..];
    let (_, alias) = all_consuming(ws(identifier))
        .parse(alias_text)
        .map_err(|_| CypherParseError::unparseable("alias", item))?;
    Ok((item[..as_word.start].trim(), Some(alias)))
}

/// Strip a leading `DISTINCT`.
fn strip_distinct(text: &str) -> (bool, &str) {
    match ws(keyword("DISTINCT")).parse(text) {
        Ok((rest, _)) => (true, rest),
        Err(_) => (false, text),
    }
}

/// Parse the item list of a RETURN or WITH clause.
pub fn parse_projection_items(text: &str) -> Result<ProjectionList, CypherParseError> {
    let (distinct, body) = strip_distinct(text.trim());
    if body.trim() == "*" {
        return Err(CypherParseError::UnsupportedClause(
            "wildcard projection '*'".to_string(),
        ));
    }

    let mut items = Vec::new();
    for part in split_top_level(body, ',')? {
        if part.trim().is_empty() {
            return Err(CypherParseError::unparseable("projection list", text));
        }
        let (expr_text, alias) = split_alias(part)?;
        items.push(ProjectionItem {
            expr: parse_item_expr(expr_text),
            alias,
            text: expr_text.to_string(),
        });
    }
    Ok(ProjectionList { distinct, items })
}

/// Parse an ORDER BY list: `expr [ASC|DESC], ...`.
pub fn parse_order_items(text: &str) -> Result<Vec<OrderItem>, CypherParseError> {
    let mut items = Vec::new();
    for part in split_top_level(text, ',')? {
        let part = part.trim();
        if part.is_empty() {
            return Err(CypherParseError::unparseable("ORDER BY list", text));
        }
        let words = top_level_words(part)?;
        let (expr_text, descending) = match words.last() {
            Some(w) if w.end == part.len() && (w.is_keyword("DESC") || w.is_keyword("DESCENDING")) => {
                (&part[..w.start], true)
            }
            Some(w) if w.end == part.len() && (w.is_keyword("ASC") || w.is_keyword("ASCENDING")) => {
                (&part[..w.start], false)
            }
            _ => (part, false),
        };
        let expr_text = expr_text.trim();
        items.push(OrderItem {
            expr: parse_item_expr(expr_text),
            text: expr_text.to_string(),
            descending,
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_with_alias_and_aggregate() {
        let list = parse_projection_items("p, count(m) AS c").unwrap();
        assert!(!list.distinct);
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].expr, ItemExpr::Variable("p".to_string()));
        assert_eq!(
            list.items[1].expr,
            ItemExpr::Aggregate {
                function: AggregateFn::Count,
                distinct: false,
                argument: AggregateArg::Variable("m".to_string()),
            }
        );
        assert_eq!(list.items[1].alias.as_deref(), Some("c"));
    }

    #[test]
    fn test_distinct_and_count_star() {
        let list = parse_projection_items("DISTINCT m.title AS title, count(*)").unwrap();
        assert!(list.distinct);
        assert_eq!(
            list.items[0].expr,
            ItemExpr::Property {
                variable: "m".to_string(),
                property: "title".to_string()
            }
        );
        assert!(matches!(
            list.items[1].expr,
            ItemExpr::Aggregate {
                argument: AggregateArg::Star,
                ..
            }
        ));
    }

    #[test]
    fn test_count_distinct() {
        let list = parse_projection_items("count(DISTINCT p.name) AS n").unwrap();
        assert!(matches!(
            list.items[0].expr,
            ItemExpr::Aggregate { distinct: true, .. }
        ));
    }

    #[test]
    fn test_arithmetic_and_other() {
        let list = parse_projection_items("m.revenue - m.budget AS profit, collect(m.title)").unwrap();
        assert!(matches!(list.items[0].expr, ItemExpr::Arithmetic(_)));
        assert_eq!(list.items[0].alias.as_deref(), Some("profit"));
        assert_eq!(
            list.items[1].expr,
            ItemExpr::Other("collect(m.title)".to_string())
        );
    }

    #[test]
    fn test_wildcard_rejected() {
        assert!(matches!(
            parse_projection_items("*"),
            Err(CypherParseError::UnsupportedClause(_))
        ));
    }

    #[test]
    fn test_order_items() {
        let items = parse_order_items("c DESC, p.name").unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].descending);
        assert_eq!(items[0].expr, ItemExpr::Variable("c".to_string()));
        assert!(!items[1].descending);
        assert_eq!(items[1].text, "p.name");
    }

    #[test]
    fn test_order_by_aggregate() {
        let items = parse_order_items("count(m) DESC").unwrap();
        assert!(items[0].expr.is_aggregate());
        assert_eq!(items[0].text, "count(m)");
    }
}
