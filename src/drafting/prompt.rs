//! Prompt templates and completion post-processing.
//!
//! Templates use named placeholders (`{TYPEQL_SCHEMA}`, `{NEO4J_SCHEMA}`,
//! `{QUESTION}`, `{CYPHER_QUERY}`) substituted before submission.

use serde::Deserialize;

use super::{AttemptHistory, DraftError, DraftRequest};

/// Longest error text carried into a retry prompt.
pub const MAX_ERROR_CHARS: usize = 500;

pub const SYSTEM_PROMPT: &str =
    "You are an expert at converting Neo4j Cypher queries and schemas to TypeDB 3.x TypeQL.";

pub const QUERY_TEMPLATE: &str = r#"Convert the following Cypher query to a TypeDB 3.x TypeQL query.

## TypeQL Schema
```typeql
{TYPEQL_SCHEMA}
```

## Neo4j Schema (for reference)
```json
{NEO4J_SCHEMA}
```

## Question
{QUESTION}

## Cypher
```cypher
{CYPHER_QUERY}
```

## TypeQL Syntax Rules
1. Stage order: match -> reduce -> match -> sort -> offset -> limit -> fetch
2. Relations use roles: (role1: $a, role2: $b) isa relation_name;
3. Bind attributes before use: $p has name $n; sort $n desc;
4. Do NOT use $var.* in fetch - list attributes explicitly
5. Use double quotes for strings
6. Filter aggregation results in a separate match after reduce

Return ONLY the TypeQL query."#;

pub const SCHEMA_TEMPLATE: &str = r#"Convert the following Neo4j schema to a TypeDB 3.x TypeQL schema.

## Neo4j Schema
```json
{NEO4J_SCHEMA}
```

## Rules
1. Start with `define`
2. Declare every attribute type with its value type (string, integer, double, boolean, datetime)
3. Node labels become entity types in snake_case
4. Relationship types become relation types with two named roles; entity types declare `plays`
5. Relationship properties become attributes owned by the relation type

Return ONLY the TypeQL schema."#;

/// Schema texts shared by every query prompt of a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub typeql_schema: String,
    pub neo4j_schema_json: String,
}

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn previous_attempt_section(history: &AttemptHistory) -> String {
    let Some(last) = history.last() else {
        return String::new();
    };
    format!(
        "\n\n## Previous Attempt Failed\nThe previous TypeQL query was:\n```typeql\n{}\n```\n\nError: {}\n\nPlease fix the issue and provide a corrected TypeQL query.\n",
        last.candidate,
        truncate_chars(&last.error, MAX_ERROR_CHARS)
    )
}

pub fn query_prompt(context: &PromptContext, request: &DraftRequest<'_>) -> String {
    let mut prompt = QUERY_TEMPLATE
        .replace("{TYPEQL_SCHEMA}", &context.typeql_schema)
        .replace("{NEO4J_SCHEMA}", &context.neo4j_schema_json)
        .replace("{QUESTION}", request.question)
        .replace("{CYPHER_QUERY}", request.source_query);
    prompt.push_str(&previous_attempt_section(request.history));
    prompt
}

/// One prompt for a whole batch. Items with prior attempts carry their last
/// failed query and its error.
pub fn batch_prompt(context: &PromptContext, requests: &[DraftRequest<'_>]) -> String {
    let retrying = requests.iter().any(|r| !r.history.is_empty());
    let mut prompt = format!(
        "You are an expert at converting Cypher queries to TypeDB 3.x TypeQL queries.\n\n\
         ## TypeQL Schema\n```typeql\n{}\n```\n\n\
         ## Neo4j Schema (for reference)\n```json\n{}\n```\n\n\
         ## Task\n{}\
         Return your answers in JSON format as an array of objects with \"index\" and \"typeql\" fields.\n\n\
         ## Queries\n",
        context.typeql_schema,
        context.neo4j_schema_json,
        if retrying {
            "Fix the following failed TypeQL query conversions. Each failed query includes the original Cypher, the failed TypeQL attempt, and the error message.\n"
        } else {
            "Convert each of the following Cypher queries to valid TypeQL.\n"
        }
    );

    for request in requests {
        prompt.push_str(&format!(
            "\n### Query {}\nQuestion: {}\nCypher:\n```cypher\n{}\n```\n",
            request.index, request.question, request.source_query
        ));
        if let Some(last) = request.history.last() {
            prompt.push_str(&format!(
                "\nFailed TypeQL attempt:\n```typeql\n{}\n```\n\nError: {}\n\n---\n",
                last.candidate,
                truncate_chars(&last.error, MAX_ERROR_CHARS)
            ));
        }
    }

    prompt.push_str(
        "\n## Output Format\nReturn ONLY a valid JSON array, no markdown. Example:\n[\n  \
         {\"index\": 0, \"typeql\": \"match $p isa person, has name $n; fetch { \\\"name\\\": $n };\"},\n  \
         {\"index\": 1, \"typeql\": \"match $m isa movie, has title $t; fetch { \\\"title\\\": $t };\"}\n]\n\n\
         Important:\n- Each TypeQL query must be syntactically valid\n\
         - Use double quotes for strings in TypeQL\n- Escape quotes in JSON output\n",
    );
    prompt
}

pub fn schema_prompt(neo4j_schema_json: &str, history: &AttemptHistory) -> String {
    let mut prompt = SCHEMA_TEMPLATE.replace("{NEO4J_SCHEMA}", neo4j_schema_json);
    if let Some(last) = history.last() {
        prompt.push_str(&format!(
            "\n\n## Previous Attempt Failed\nThe previous schema was:\n```typeql\n{}\n```\n\nError: {}\n\nPlease fix the issue and provide a corrected schema.\n",
            last.candidate,
            truncate_chars(&last.error, MAX_ERROR_CHARS)
        ));
    }
    prompt
}

/// Strip a surrounding markdown code fence, if any.
pub fn extract_typeql(response: &str) -> String {
    let text = response.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text.to_string();
    };
    // drop the info string (```typeql)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// The `define` block of a schema completion, fenced or not.
pub fn extract_schema(response: &str) -> Option<String> {
    let text = match response.find("```") {
        Some(start) => extract_typeql(&response[start..]),
        None => response.trim().to_string(),
    };
    let start = text.find("define")?;
    Some(text[start..].trim().to_string())
}

#[derive(Debug, Deserialize)]
struct BatchAnswer {
    index: usize,
    typeql: String,
}

/// Demultiplex a grouped response into one draft per requested index.
pub fn parse_batch_response(
    response: &str,
    indices: &[usize],
) -> Vec<Result<String, DraftError>> {
    let parsed = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<Vec<BatchAnswer>>(&response[start..=end])
                .map_err(|e| format!("JSON parse error: {}", e))
        }
        _ => Err("could not parse batch response".to_string()),
    };

    match parsed {
        Ok(answers) => indices
            .iter()
            .map(|index| {
                answers
                    .iter()
                    .find(|a| a.index == *index)
                    .map(|a| extract_typeql(&a.typeql))
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| {
                        DraftError::Malformed("missing from batch response".to_string())
                    })
            })
            .collect(),
        Err(message) => indices
            .iter()
            .map(|_| Err(DraftError::Malformed(message.clone())))
            .collect(),
    }
}
