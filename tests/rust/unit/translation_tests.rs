use std::path::PathBuf;

use test_case::test_case;
use text2typeql::mapping::MappingConfig;
use text2typeql::typeql_translator::errors::TranslationError;
use text2typeql::typeql_translator::CypherTranslator;

fn load_mapping(database: &str) -> MappingConfig {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("mappings");
    MappingConfig::load_for_database(dir, database).expect("sample mapping should load")
}

fn translate(database: &str, cypher: &str) -> Result<String, TranslationError> {
    let mapping = load_mapping(database);
    CypherTranslator::new(&mapping).translate_to_string(cypher)
}

/// Position of `needle` in `haystack`, failing the test when absent.
fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("`{}` not found in:\n{}", needle, haystack))
}

#[test]
fn test_inline_property_node() {
    let out = translate(
        "companies",
        "MATCH (o:Organization {name:'Acme'}) RETURN o.nbrEmployees",
    )
    .unwrap();
    assert!(out.contains(r#"$o isa organization, has name "Acme";"#), "{}", out);
    assert!(out.contains("$o has nbr_employees $onbr_employees;"), "{}", out);
    assert!(out.ends_with(r#"fetch { "nbrEmployees": $onbr_employees };"#), "{}", out);
}

#[test_case("MATCH (a:Organization)-[:HAS_CEO]->(b:Person) RETURN b.name", "(organization: $a, ceo: $b) isa ceo_of;" ; "forward")]
#[test_case("MATCH (b:Person)<-[:HAS_CEO]-(a:Organization) RETURN b.name", "(organization: $a, ceo: $b) isa ceo_of;" ; "backward")]
#[test_case("MATCH (s:Organization)-[:SUBSIDIARY_OF]->(p:Organization) RETURN s.name", "(subsidiary: $s, parent: $p) isa subsidiary_of;" ; "inverse rel type")]
fn test_relation_roles(cypher: &str, expected: &str) {
    let out = translate("companies", cypher).unwrap();
    assert!(out.contains(expected), "{}", out);
}

#[test]
fn test_symmetric_relation_same_shape_both_directions() {
    let forward = translate(
        "companies",
        "MATCH (a:Organization)-[:HAS_COMPETITOR]->(b:Organization) RETURN a.name, b.name",
    )
    .unwrap();
    let backward = translate(
        "companies",
        "MATCH (a:Organization)<-[:HAS_COMPETITOR]-(b:Organization) RETURN a.name, b.name",
    )
    .unwrap();
    assert_eq!(forward, backward);
    assert!(forward.contains("(competitor: $a, competitor: $b) isa competes_with;"));
}

#[test]
fn test_entity_scoped_attribute_names() {
    let out = translate(
        "companies",
        "MATCH (o:Organization)-[:IN_CITY]->(c:City) WHERE c.name = 'Seattle' RETURN o.name",
    )
    .unwrap();
    assert!(out.contains("$c has city_name $ccity_name;"), "{}", out);
    assert!(out.contains(r#"$ccity_name == "Seattle";"#), "{}", out);
    assert!(out.contains("$o has name $oname;"), "{}", out);
}

#[test]
fn test_directors_with_more_than_three_films() {
    let out = translate(
        "movies",
        "MATCH (p:Person)-[:DIRECTED]->(m:Movie) WITH p, count(m) AS c WHERE c > 3 RETURN p.name, c",
    )
    .unwrap();
    assert_eq!(
        out,
        "match\n\
         \x20 $p isa person;\n\
         \x20 $m isa movie;\n\
         \x20 (director: $p, film: $m) isa directed;\n\
         \x20 $p has name $pname;\n\
         reduce $c = count($m) groupby $pname;\n\
         match $c > 3;\n\
         fetch { \"name\": $pname, \"c\": $c };"
    );
}

#[test]
fn test_groupby_key_bound_before_reduce() {
    let out = translate(
        "movies",
        "MATCH (p:Person)-[:ACTED_IN]->(m:Movie) WITH p, count(m) AS films WHERE films >= 2 RETURN p.name, films ORDER BY films DESC",
    )
    .unwrap();
    let binding = position(&out, "$p has name $pname;");
    let reduce = position(&out, "reduce $films = count($m) groupby $pname;");
    assert!(binding < reduce);

    let after = &out[reduce..];
    assert!(after.contains("match $films >= 2;"), "{}", out);
    assert!(!after.contains("$p "), "entity variable used after reduce:\n{}", out);
}

#[test]
fn test_implicit_grouping_in_return() {
    let out = translate(
        "movies",
        "MATCH (p:Person)-[:ACTED_IN]->(m:Movie) RETURN p.name AS actor, count(m) AS films ORDER BY films DESC LIMIT 3",
    )
    .unwrap();
    let reduce = position(&out, "reduce $films = count($m) groupby $pname;");
    let sort = position(&out, "sort $films desc;");
    let limit = position(&out, "limit 3;");
    let fetch = position(&out, "fetch {");
    assert!(reduce < sort && sort < limit && limit < fetch, "{}", out);
    assert!(out.contains(r#""actor": $pname"#), "{}", out);
    assert!(out.contains(r#""films": $films"#), "{}", out);
}

#[test]
fn test_count_only_return_is_reduce_query() {
    let out = translate("movies", "MATCH (m:Movie) WHERE m.released < 1990 RETURN count(m)").unwrap();
    assert!(out.contains("reduce "), "{}", out);
    assert!(!out.contains("fetch"), "{}", out);
}

#[test]
fn test_attribute_bound_once() {
    let out = translate(
        "movies",
        "MATCH (m:Movie) WHERE m.title STARTS WITH 'The' RETURN m.title ORDER BY m.title LIMIT 5",
    )
    .unwrap();
    assert_eq!(out.matches("has title").count(), 1, "{}", out);
    assert!(out.contains("sort $mtitle asc;"), "{}", out);
}

#[test]
fn test_bare_entity_uses_display_attributes() {
    let out = translate("movies", "MATCH (m:Movie) RETURN m LIMIT 1").unwrap();
    assert!(out.contains("$m has title $mtitle;"), "{}", out);
    assert!(out.contains(r#""m": $mtitle"#), "{}", out);
}

#[test]
fn test_translation_is_deterministic() {
    let cypher = "MATCH (p:Person)-[:WROTE]->(m:Movie)<-[:DIRECTED]-(p) \
                  WHERE m.released > 1995 RETURN DISTINCT p.name ORDER BY p.name";
    let first = translate("movies", cypher).unwrap();
    for _ in 0..3 {
        assert_eq!(translate("movies", cypher).unwrap(), first);
    }
}

#[test]
fn test_unmapped_relation_named_in_error() {
    let err = translate("movies", "MATCH (p:Person)-[:RATED]->(m:Movie) RETURN m.title").unwrap_err();
    assert_eq!(
        err,
        TranslationError::UnmappedRelation {
            rel_type: "RATED".to_string()
        }
    );
    assert!(err.is_unmapped_construct());
    assert!(err.to_string().contains("RATED"));
}

#[test_case("OPTIONAL MATCH (m:Movie) RETURN m.title" ; "optional match")]
#[test_case("UNWIND [1, 2] AS x RETURN x" ; "unwind")]
#[test_case("" ; "empty")]
fn test_untranslatable_queries_are_not_retried(cypher: &str) {
    let err = translate("movies", cypher).unwrap_err();
    assert!(err.is_unmapped_construct(), "{:?}", err);
}
