//! WITH / implicit-grouping aggregation into a TypeQL `reduce` stage.
//!
//! A `reduce` narrows the visible variables to the groupby keys and the
//! reducer outputs. Entity groupby keys therefore never appear directly:
//! every attribute of the entity that later clauses read (or its display
//! attributes when the entity itself is returned) is bound *before* the
//! reduce and grouped on instead.

use std::collections::HashSet;

use crate::cypher_parser::ast::{
    AggregateArg, AggregateFn, ArithToken, ItemExpr, Operand, ProjectionItem, ProjectionList,
};
use crate::cypher_parser::errors::CypherParseError;
use crate::cypher_parser::lexer::{mentions_bare_variable, property_refs};
use crate::cypher_parser::Clause;

use super::assembler::{ReduceStage, Reducer};
use super::condition::operand_expr;
use super::errors::TranslationError;
use super::state::{Stage, TranslationState};
use super::TranslationContext;

/// What the clauses after an aggregation read, used to decide which
/// attributes of an entity groupby key must survive the reduce.
#[derive(Debug, Clone, Default)]
pub(crate) struct LaterRefs {
    text: String,
    refs: Vec<(String, String)>,
}

impl LaterRefs {
    pub fn collect(clauses: &[Clause]) -> Result<Self, CypherParseError> {
        let text = clauses
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self::from_text(text)
    }

    pub fn from_text(text: String) -> Result<Self, CypherParseError> {
        let refs = property_refs(&text)?;
        Ok(LaterRefs { text, refs })
    }

    pub fn properties_of(&self, var: &str) -> Vec<&str> {
        let mut seen = Vec::new();
        for (owner, prop) in &self.refs {
            if owner == var && !seen.contains(&prop.as_str()) {
                seen.push(prop.as_str());
            }
        }
        seen
    }

    pub fn mentions_bare(&self, var: &str) -> bool {
        // the text was already scanned successfully in `from_text`
        mentions_bare_variable(&self.text, var).unwrap_or(false)
    }
}

fn function_label(function: AggregateFn) -> &'static str {
    match function {
        AggregateFn::Count => "count",
        AggregateFn::Sum => "sum",
        AggregateFn::Avg => "avg",
        AggregateFn::Min => "min",
        AggregateFn::Max => "max",
    }
}

/// `let $alias = <expr>;` for an arithmetic item. Returns the new variable.
pub(crate) fn translate_let(
    tokens: &[ArithToken],
    alias: Option<&str>,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<String, TranslationError> {
    let mut expr = String::new();
    for token in tokens {
        let piece = match token {
            ArithToken::Property { variable, property } => operand_expr(
                &Operand::Property {
                    variable: variable.clone(),
                    property: property.clone(),
                    case_fold: None,
                },
                state,
                ctx,
            )?,
            ArithToken::Variable(name) => {
                operand_expr(&Operand::Variable(name.clone()), state, ctx)?
            }
            ArithToken::Number(n) => n.clone(),
            ArithToken::Operator(op) => format!(" {} ", op),
            ArithToken::Open => "(".to_string(),
            ArithToken::Close => ")".to_string(),
        };
        expr.push_str(&piece);
    }

    let out = match alias {
        Some(alias) => state.claim_name(alias),
        None => state.fresh_name("expr"),
    };
    state.push_statement(format!("let ${} = {};", out, expr.trim()));
    if let Some(alias) = alias {
        state.register_alias(alias, &out);
    }
    state.add_to_scope(&out);
    Ok(out)
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Bind the attributes an entity groupby key must carry through the reduce.
fn entity_group_key(
    name: &str,
    visible_name: &str,
    later: &LaterRefs,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<Vec<String>, TranslationError> {
    let var = state.canonical_var(name);
    let owner = state.owner_type(&var).map(str::to_string);

    let mut attributes: Vec<String> = Vec::new();
    for prop in later.properties_of(visible_name) {
        push_unique(&mut attributes, ctx.mapping.attribute(owner.as_deref(), prop));
    }
    if visible_name != name {
        for prop in later.properties_of(name) {
            push_unique(&mut attributes, ctx.mapping.attribute(owner.as_deref(), prop));
        }
    }
    if attributes.is_empty() || later.mentions_bare(visible_name) {
        for attr in ctx.mapping.display_attributes(owner.as_deref()) {
            push_unique(&mut attributes, attr.clone());
        }
    }

    let mut keys = Vec::with_capacity(attributes.len());
    for attr in attributes {
        let bound = state.attribute_var(&var, &attr)?;
        keys.push((attr, bound));
    }
    let vars = keys.iter().map(|(_, v)| v.clone()).collect();
    log::trace!("Entity groupby key ({}) carried as {:?}", var, keys);
    state.set_entity_group_keys(&var, keys);
    Ok(vars)
}

fn group_key(
    item: &ProjectionItem,
    later: &LaterRefs,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<Vec<String>, TranslationError> {
    match &item.expr {
        ItemExpr::Variable(name) => {
            if let Some(target) = state.resolve_alias(name).map(str::to_string) {
                if let Some(alias) = &item.alias {
                    state.register_alias(alias, &target);
                }
                return Ok(vec![target]);
            }
            if !state.is_pattern_var(name) {
                return Err(TranslationError::unbound(name));
            }
            let visible = item.alias.clone().unwrap_or_else(|| name.clone());
            if visible != *name {
                let var = state.canonical_var(name);
                state.rename(&visible, &var);
            }
            entity_group_key(name, &visible, later, state, ctx)
        }
        ItemExpr::Property { variable, property } => {
            let var = state.canonical_var(variable);
            let attribute = ctx.attribute_for(state, &var, property);
            let bound = state.attribute_var(&var, &attribute)?;
            if let Some(alias) = &item.alias {
                state.register_alias(alias, &bound);
            }
            state.register_expression(&item.text, &bound);
            Ok(vec![bound])
        }
        ItemExpr::Arithmetic(tokens) => {
            let out = translate_let(tokens, item.alias.as_deref(), state, ctx)?;
            state.register_expression(&item.text, &out);
            Ok(vec![out])
        }
        ItemExpr::Aggregate { .. } => Err(TranslationError::unsupported(format!(
            "nested aggregate `{}`",
            item.text
        ))),
        ItemExpr::Other(text) => Err(TranslationError::unsupported(format!(
            "expression `{}`",
            text
        ))),
    }
}

fn reducer_argument(
    argument: &AggregateArg,
    function: AggregateFn,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<Option<String>, TranslationError> {
    match argument {
        AggregateArg::Star if function == AggregateFn::Count => Ok(None),
        AggregateArg::Star => Err(TranslationError::unsupported(format!(
            "{}(*)",
            function_label(function)
        ))),
        AggregateArg::Variable(name) => {
            if let Some(target) = state.resolve_alias(name) {
                return Ok(Some(target.to_string()));
            }
            if state.is_pattern_var(name) {
                return Ok(Some(state.canonical_var(name)));
            }
            Err(TranslationError::unbound(name))
        }
        AggregateArg::Property { variable, property } => {
            let var = state.canonical_var(variable);
            let attribute = ctx.attribute_for(state, &var, property);
            Ok(Some(state.attribute_var(&var, &attribute)?))
        }
    }
}

/// Build the reduce stage for a list of projection items containing at least
/// one aggregate, then switch the state to the post-reduce block.
pub(crate) fn build_reduction(
    items: &[ProjectionItem],
    later: &LaterRefs,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<ReduceStage, TranslationError> {
    if state.stage() == Stage::PostReduce {
        return Err(TranslationError::unsupported("second aggregation stage"));
    }

    let (aggregates, groups): (Vec<&ProjectionItem>, Vec<&ProjectionItem>) =
        items.iter().partition(|item| item.expr.is_aggregate());

    let mut group_by: Vec<String> = Vec::new();
    for item in groups {
        for key in group_key(item, later, state, ctx)? {
            if !group_by.contains(&key) {
                group_by.push(key);
            }
        }
    }

    let has_distinct = aggregates
        .iter()
        .any(|item| matches!(item.expr, ItemExpr::Aggregate { distinct: true, .. }));
    if has_distinct && aggregates.len() > 1 {
        return Err(TranslationError::unsupported(
            "DISTINCT aggregate alongside other aggregates",
        ));
    }

    let mut reducers = Vec::with_capacity(aggregates.len());
    let mut distinct_select = None;
    for item in aggregates {
        let ItemExpr::Aggregate {
            function,
            distinct,
            argument,
        } = &item.expr
        else {
            continue;
        };
        if *distinct && *function != AggregateFn::Count {
            return Err(TranslationError::unsupported(format!(
                "{}(DISTINCT ...)",
                function_label(*function)
            )));
        }
        let argument = reducer_argument(argument, *function, state, ctx)?;
        let var = match &item.alias {
            Some(alias) => state.claim_name(alias),
            None => state.fresh_name(&format!(
                "{}_{}",
                function_label(*function),
                argument.as_deref().unwrap_or("all")
            )),
        };
        if let Some(alias) = &item.alias {
            state.register_alias(alias, &var);
        }
        state.register_expression(&item.text, &var);

        if *distinct {
            let Some(arg) = &argument else {
                return Err(TranslationError::unsupported("count(DISTINCT *)"));
            };
            let mut selected = group_by.clone();
            selected.push(arg.clone());
            distinct_select = Some(selected);
        }
        reducers.push(Reducer {
            var,
            function: *function,
            argument,
        });
    }

    state.aggregation_alias = reducers.first().map(|r| r.var.clone());
    state.group_by_vars = group_by.clone();

    let visible: HashSet<String> = group_by
        .iter()
        .cloned()
        .chain(reducers.iter().map(|r| r.var.clone()))
        .collect();
    state.enter_reduce(visible);

    Ok(ReduceStage {
        reducers,
        group_by,
        distinct_select,
    })
}

/// Translate a WITH clause. Returns the reduce stage when it aggregates.
pub(crate) fn translate_with(
    list: &ProjectionList,
    later: &LaterRefs,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<Option<ReduceStage>, TranslationError> {
    if list.distinct {
        return Err(TranslationError::unsupported("WITH DISTINCT"));
    }
    if list.items.iter().any(|item| item.expr.is_aggregate()) {
        return build_reduction(&list.items, later, state, ctx).map(Some);
    }

    // pass-through WITH: only renames and computed values matter
    for item in &list.items {
        match &item.expr {
            ItemExpr::Variable(name) => {
                let Some(alias) = item.alias.as_deref().filter(|a| *a != name.as_str()) else {
                    if state.resolve_alias(name).is_none() && !state.is_pattern_var(name) {
                        return Err(TranslationError::unbound(name));
                    }
                    continue;
                };
                if let Some(target) = state.resolve_alias(name).map(str::to_string) {
                    state.register_alias(alias, &target);
                } else if state.is_pattern_var(name) {
                    let var = state.canonical_var(name);
                    state.rename(alias, &var);
                } else {
                    return Err(TranslationError::unbound(name));
                }
            }
            ItemExpr::Property { variable, property } => {
                let var = state.canonical_var(variable);
                let attribute = ctx.attribute_for(state, &var, property);
                let bound = state.attribute_var(&var, &attribute)?;
                if let Some(alias) = &item.alias {
                    state.register_alias(alias, &bound);
                }
                state.register_expression(&item.text, &bound);
            }
            ItemExpr::Arithmetic(tokens) => {
                let out = translate_let(tokens, item.alias.as_deref(), state, ctx)?;
                state.register_expression(&item.text, &out);
            }
            ItemExpr::Aggregate { .. } => {}
            ItemExpr::Other(text) => {
                return Err(TranslationError::unsupported(format!(
                    "expression `{}`",
                    text
                )))
            }
        }
    }
    Ok(None)
}
