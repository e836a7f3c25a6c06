use crate::cypher_parser::ast::{ItemExpr, OrderItem, ProjectionItem, ProjectionList};

use super::aggregation::{build_reduction, translate_let, LaterRefs};
use super::assembler::{FetchEntry, FetchValue, QueryOutput, ReduceStage, SortKey};
use super::errors::TranslationError;
use super::state::{Stage, TranslationState};
use super::TranslationContext;

/// Everything a RETURN (plus its ORDER BY) contributes to the query.
#[derive(Debug)]
pub(crate) struct Projection {
    /// Reduce introduced by implicit grouping in the RETURN itself.
    pub reduce: Option<ReduceStage>,
    pub output: QueryOutput,
    pub select_distinct: Option<Vec<String>>,
    pub sort: Vec<SortKey>,
}

/// Attribute variables standing in for a whole entity.
fn entity_fields(
    name: &str,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<Vec<(String, String)>, TranslationError> {
    let var = state.canonical_var(name);
    if let Some(keys) = state.entity_group_keys(&var) {
        return Ok(keys.to_vec());
    }
    if state.stage() == Stage::PostReduce {
        return Err(TranslationError::out_of_scope(&var));
    }
    let attributes = ctx.mapping.display_attributes(state.owner_type(&var)).to_vec();
    let mut fields = Vec::with_capacity(attributes.len());
    for attr in attributes {
        let bound = state.attribute_var(&var, &attr)?;
        fields.push((attr, bound));
    }
    Ok(fields)
}

/// Variable and default fetch key for one RETURN item.
fn item_value(
    item: &ProjectionItem,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(String, FetchValue), TranslationError> {
    if !matches!(item.expr, ItemExpr::Variable(_)) {
        if let Some(target) = state.resolve_expression(&item.text).map(str::to_string) {
            state.require_in_scope(&target)?;
            let key = match &item.expr {
                ItemExpr::Property { property, .. } => property.clone(),
                _ => item.text.clone(),
            };
            return Ok((key, FetchValue::Var(target)));
        }
    }

    match &item.expr {
        ItemExpr::Property { variable, property } => {
            let var = state.canonical_var(variable);
            let attribute = ctx.attribute_for(state, &var, property);
            let bound = state.attribute_var(&var, &attribute)?;
            Ok((property.clone(), FetchValue::Var(bound)))
        }
        ItemExpr::Variable(name) => {
            if let Some(target) = state.resolve_alias(name).map(str::to_string) {
                state.require_in_scope(&target)?;
                return Ok((name.clone(), FetchValue::Var(target)));
            }
            if !state.is_pattern_var(name) {
                return Err(TranslationError::unbound(name));
            }
            let mut fields = entity_fields(name, state, ctx)?;
            let value = if fields.len() == 1 {
                FetchValue::Var(fields.remove(0).1)
            } else {
                FetchValue::Object(fields)
            };
            Ok((name.clone(), value))
        }
        ItemExpr::Arithmetic(tokens) => {
            let out = translate_let(tokens, item.alias.as_deref(), state, ctx)?;
            Ok((item.text.clone(), FetchValue::Var(out)))
        }
        ItemExpr::Aggregate { .. } => Err(TranslationError::unsupported(format!(
            "aggregate `{}` outside a reduce",
            item.text
        ))),
        ItemExpr::Other(text) => Err(TranslationError::unsupported(format!(
            "expression `{}`",
            text
        ))),
    }
}

fn unique_key(taken: &[FetchEntry], preferred: String, item: &ProjectionItem) -> String {
    let is_taken = |key: &str| taken.iter().any(|e| e.key == key);
    if !is_taken(&preferred) {
        return preferred;
    }
    let base = match &item.expr {
        ItemExpr::Property { variable, property } => format!("{}_{}", variable, property),
        _ => preferred,
    };
    if !is_taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn sort_key(
    item: &OrderItem,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<String, TranslationError> {
    if let Some(target) = state.resolve_expression(&item.text).map(str::to_string) {
        state.require_in_scope(&target)?;
        return Ok(target);
    }
    match &item.expr {
        ItemExpr::Variable(name) => {
            if let Some(target) = state.resolve_alias(name).map(str::to_string) {
                state.require_in_scope(&target)?;
                return Ok(target);
            }
            if !state.is_pattern_var(name) {
                return Err(TranslationError::unbound(name));
            }
            entity_fields(name, state, ctx)?
                .into_iter()
                .next()
                .map(|(_, var)| var)
                .ok_or_else(|| {
                    TranslationError::unsupported(format!("ORDER BY entity `{}` without display attributes", name))
                })
        }
        ItemExpr::Property { variable, property } => {
            let var = state.canonical_var(variable);
            let attribute = ctx.attribute_for(state, &var, property);
            state.attribute_var(&var, &attribute)
        }
        ItemExpr::Arithmetic(tokens) => translate_let(tokens, None, state, ctx),
        ItemExpr::Aggregate { .. } => Err(TranslationError::unsupported(format!(
            "ORDER BY aggregate `{}` not returned",
            item.text
        ))),
        ItemExpr::Other(text) => Err(TranslationError::unsupported(format!(
            "ORDER BY expression `{}`",
            text
        ))),
    }
}

/// Translate RETURN and its ORDER BY list.
pub(crate) fn translate_return(
    list: &ProjectionList,
    order: &[OrderItem],
    later: &LaterRefs,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<Projection, TranslationError> {
    let aggregating = list.items.iter().any(|item| item.expr.is_aggregate());
    let only_aggregates = list.items.iter().all(|item| item.expr.is_aggregate());

    let mut reduce = None;
    if aggregating {
        let stage = build_reduction(&list.items, later, state, ctx)?;
        if only_aggregates {
            let sort = order
                .iter()
                .map(|item| {
                    Ok(SortKey {
                        var: sort_key(item, state, ctx)?,
                        descending: item.descending,
                    })
                })
                .collect::<Result<Vec<_>, TranslationError>>()?;
            return Ok(Projection {
                reduce: None,
                output: QueryOutput::Reduce(stage),
                select_distinct: None,
                sort,
            });
        }
        reduce = Some(stage);
    }

    let mut entries: Vec<FetchEntry> = Vec::with_capacity(list.items.len());
    for item in &list.items {
        let (default_key, value) = item_value(item, state, ctx)?;
        let preferred = item.alias.clone().unwrap_or(default_key);
        let key = unique_key(&entries, preferred, item);
        if let (Some(alias), FetchValue::Var(var)) = (&item.alias, &value) {
            state.register_alias(alias, var);
        }
        entries.push(FetchEntry { key, value });
    }

    let mut sort = Vec::with_capacity(order.len());
    for item in order {
        sort.push(SortKey {
            var: sort_key(item, state, ctx)?,
            descending: item.descending,
        });
    }

    // a reduce already yields one row per group
    let select_distinct = if list.distinct && reduce.is_none() {
        let mut vars: Vec<String> = Vec::new();
        let fetched = entries.iter().flat_map(|entry| match &entry.value {
            FetchValue::Var(var) => vec![var.clone()],
            FetchValue::Object(fields) => fields.iter().map(|(_, v)| v.clone()).collect(),
        });
        for var in fetched.chain(sort.iter().map(|k| k.var.clone())) {
            if !vars.contains(&var) {
                vars.push(var);
            }
        }
        Some(vars)
    } else {
        None
    };

    Ok(Projection {
        reduce,
        output: QueryOutput::Fetch(entries),
        select_distinct,
        sort,
    })
}
