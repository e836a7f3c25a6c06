use crate::cypher_parser::ast::{Direction, Literal, NodePattern, PathPattern, RelationshipPattern};

use super::errors::TranslationError;
use super::state::TranslationState;
use super::TranslationContext;

/// Double-quoted TypeQL string literal.
pub(crate) fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

pub(crate) fn render_literal(literal: &Literal) -> Result<String, TranslationError> {
    match literal {
        Literal::String(s) => Ok(quote_string(s)),
        Literal::Number(n) => Ok(n.clone()),
        Literal::Boolean(b) => Ok(b.to_string()),
        Literal::Null => Err(TranslationError::unsupported("null literal")),
        Literal::Parameter(name) => Err(TranslationError::unsupported(format!(
            "query parameter ${}",
            name
        ))),
    }
}

fn has_clauses(
    owner: Option<&str>,
    properties: &[(String, Literal)],
    ctx: &TranslationContext<'_>,
) -> Result<Vec<String>, TranslationError> {
    properties
        .iter()
        .map(|(property, value)| {
            Ok(format!(
                "has {} {}",
                ctx.mapping.attribute(owner, property),
                render_literal(value)?
            ))
        })
        .collect()
}

/// Assign the TypeQL variable for a node and record its label / type.
fn resolve_node(
    node: &NodePattern,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<String, TranslationError> {
    let var = match &node.variable {
        Some(v) => state.bind_pattern_var(v)?,
        None => state.anonymous_var(),
    };
    match node.labels.as_slice() {
        [] => {}
        [label] => {
            state
                .variable_labels
                .entry(var.clone())
                .or_insert_with(|| label.clone());
            state
                .variable_types
                .entry(var.clone())
                .or_insert_with(|| ctx.mapping.entity_type(label));
        }
        _ => {
            return Err(TranslationError::unsupported(format!(
                "multiple labels on ({})",
                var
            )))
        }
    }
    Ok(var)
}

/// `$v isa type, has a 1;` the first time a labelled variable is seen;
/// afterwards (or without a label) only `$v has a 1;` constraints.
fn emit_node(
    node: &NodePattern,
    var: &str,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    let clauses = has_clauses(state.owner_type(var), &node.properties, ctx)?;

    if !node.labels.is_empty() && !state.is_isa_declared(var) {
        let entity_type = state
            .owner_type(var)
            .map(str::to_string)
            .unwrap_or_else(|| ctx.mapping.entity_type(&node.labels[0]));
        let mut statement = format!("${} isa {}", var, entity_type);
        for clause in &clauses {
            statement.push_str(", ");
            statement.push_str(clause);
        }
        statement.push(';');
        state.push_statement(statement);
        state.declare_isa(var);
    } else {
        for clause in clauses {
            state.push_statement(format!("${} {};", var, clause));
        }
    }
    Ok(())
}

fn single_rel_type(rel: &RelationshipPattern) -> Result<&str, TranslationError> {
    if rel.variable_length {
        return Err(TranslationError::unsupported("variable-length relationship"));
    }
    match rel.rel_types.as_slice() {
        [one] => Ok(one),
        [] => Err(TranslationError::unsupported("relationship without a type")),
        _ => Err(TranslationError::unsupported(format!(
            "relationship type alternation {}",
            rel.rel_types.join("|")
        ))),
    }
}

/// Fill in the label of an unlabelled endpoint when the source schema
/// allows exactly one label on that side of the relationship. The result is
/// only used to scope attribute lookups; no `isa` is emitted for it.
fn infer_untyped(
    path: &PathPattern,
    vars: &[String],
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) {
    let Some(schema) = ctx.schema else {
        return;
    };
    let hop_count = path.hops.len();
    // forward then backward so labels propagate along the chain both ways
    let order = (0..hop_count).chain((0..hop_count).rev());
    for i in order {
        let rel = &path.hops[i].0;
        let [rel_type] = rel.rel_types.as_slice() else {
            continue;
        };
        let (start, end) = match rel.direction {
            Direction::Outgoing => (&vars[i], &vars[i + 1]),
            Direction::Incoming => (&vars[i + 1], &vars[i]),
            Direction::Either => continue,
        };
        for (known, unknown, outgoing) in [(start, end, true), (end, start, false)] {
            if state.variable_labels.contains_key(unknown) {
                continue;
            }
            let Some(label) = state.variable_labels.get(known).cloned() else {
                continue;
            };
            if let [only] = schema.neighbour_labels(&label, rel_type, outgoing).as_slice() {
                log::trace!("Inferred label {} for ({})", only, unknown);
                state
                    .variable_labels
                    .insert(unknown.clone(), only.to_string());
                state
                    .variable_types
                    .entry(unknown.clone())
                    .or_insert_with(|| ctx.mapping.entity_type(only));
            }
        }
    }
}

fn emit_relationship(
    rel: &RelationshipPattern,
    left: &str,
    right: &str,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    let rel_type = single_rel_type(rel)?;
    let mapping = ctx
        .mapping
        .relation(rel_type)
        .ok_or_else(|| TranslationError::UnmappedRelation {
            rel_type: rel_type.to_string(),
        })?;

    // an undirected pattern over a directed relation matches either role assignment
    let orientations: Vec<(&str, &str)> = if mapping.is_symmetric() {
        vec![(left, right)]
    } else {
        match rel.direction {
            Direction::Outgoing => vec![(left, right)],
            Direction::Incoming => vec![(right, left)],
            Direction::Either => vec![(left, right), (right, left)],
        }
    };
    let roles = |(tail, head): (&str, &str)| {
        format!(
            "({}: ${}, {}: ${})",
            mapping.source_role, tail, mapping.target_role, head
        )
    };

    if rel.variable.is_none() && rel.properties.is_empty() {
        let statements: Vec<String> = orientations
            .iter()
            .map(|&o| format!("{} isa {};", roles(o), mapping.relation))
            .collect();
        state.push_statement(either(statements));
        return Ok(());
    }

    let var = match &rel.variable {
        Some(v) => {
            let var = state.bind_pattern_var(v)?;
            if state.is_isa_declared(&var) {
                return Err(TranslationError::unsupported(format!(
                    "relationship variable `{}` used twice",
                    var
                )));
            }
            var
        }
        None => state.anonymous_var(),
    };
    state
        .variable_types
        .insert(var.clone(), mapping.relation.clone());

    let has = has_clauses(Some(&mapping.relation), &rel.properties, ctx)?;
    let statements: Vec<String> = orientations
        .iter()
        .map(|&o| {
            let mut statement = format!("${} isa {} {}", var, mapping.relation, roles(o));
            for clause in &has {
                statement.push_str(", ");
                statement.push_str(clause);
            }
            statement.push(';');
            statement
        })
        .collect();
    state.push_statement(either(statements));
    state.declare_isa(&var);
    Ok(())
}

/// One statement as is, several as a disjunction of blocks.
fn either(mut statements: Vec<String>) -> String {
    if statements.len() == 1 {
        return statements.remove(0);
    }
    let blocks: Vec<String> = statements.iter().map(|s| format!("{{ {} }}", s)).collect();
    format!("{};", blocks.join(" or "))
}

/// Translate one path: every node statement first, then the relations.
pub(crate) fn translate_path(
    path: &PathPattern,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    let mut vars = Vec::with_capacity(path.hops.len() + 1);
    vars.push(resolve_node(&path.start, state, ctx)?);
    for (_, node) in &path.hops {
        vars.push(resolve_node(node, state, ctx)?);
    }
    infer_untyped(path, &vars, state, ctx);

    emit_node(&path.start, &vars[0], state, ctx)?;
    for (i, (_, node)) in path.hops.iter().enumerate() {
        emit_node(node, &vars[i + 1], state, ctx)?;
    }
    for (i, (rel, _)) in path.hops.iter().enumerate() {
        emit_relationship(rel, &vars[i], &vars[i + 1], state, ctx)?;
    }
    Ok(())
}

pub(crate) fn translate_patterns(
    paths: &[PathPattern],
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    for path in paths {
        translate_path(path, state, ctx)?;
    }
    Ok(())
}
