use test_case::test_case;
use text2typeql::cypher_parser::errors::CypherParseError;
use text2typeql::cypher_parser::{split_clauses, ClauseKind};

fn kinds(query: &str) -> Vec<ClauseKind> {
    split_clauses(query)
        .expect("query should split")
        .into_iter()
        .map(|c| c.kind)
        .collect()
}

#[test]
fn test_multiline_query_keeps_clause_order() {
    let clauses = split_clauses(
        "MATCH (p:Person)-[:DIRECTED]->(m:Movie)\n\
         WHERE m.released > 2000\n\
         RETURN p.name, m.title\n\
         ORDER BY m.title\n\
         LIMIT 10",
    )
    .unwrap();
    let kinds: Vec<ClauseKind> = clauses.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ClauseKind::Match,
            ClauseKind::Where,
            ClauseKind::Return,
            ClauseKind::OrderBy,
            ClauseKind::Limit,
        ]
    );
    assert_eq!(clauses[1].text, "m.released > 2000");
    assert_eq!(clauses[4].text, "10");
}

#[test_case("MATCH (n) WITH n, count(*) AS c WHERE c > 1 RETURN n" ; "after with")]
#[test_case("match (n)\nwith n, count(*) as c\nwhere c > 1\nreturn n" ; "lower case")]
fn test_where_after_with_is_post_aggregation(query: &str) {
    assert_eq!(
        kinds(query),
        vec![
            ClauseKind::Match,
            ClauseKind::With,
            ClauseKind::PostAggregationWhere,
            ClauseKind::Return,
        ]
    );
}

#[test]
fn test_without_with_no_post_aggregation_where() {
    let kinds = kinds("MATCH (n:Movie) WHERE n.title CONTAINS 'WHERE' RETURN n.title");
    assert!(!kinds.contains(&ClauseKind::PostAggregationWhere));
    assert_eq!(kinds, vec![ClauseKind::Match, ClauseKind::Where, ClauseKind::Return]);
}

#[test]
fn test_keywords_inside_strings_do_not_split() {
    let clauses = split_clauses("MATCH (m:Movie {title: 'Return to Oz'}) RETURN m.title").unwrap();
    assert_eq!(clauses.len(), 2);
    assert!(clauses[0].text.contains("Return to Oz"));
}

#[test_case("" ; "empty")]
#[test_case("   \n  " ; "whitespace")]
#[test_case("// just a comment" ; "comment only")]
fn test_empty_query(query: &str) {
    assert!(matches!(split_clauses(query), Err(CypherParseError::EmptyQuery)));
}
