use crate::cypher_parser::ast::{CompareOp, Condition, Literal, Operand, StringMatchKind};

use super::errors::TranslationError;
use super::pattern::{quote_string, render_literal, translate_path};
use super::state::{Stage, TranslationState};
use super::TranslationContext;

fn compare_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "==",
        CompareOp::NotEq => "!=",
        CompareOp::Lt => "<",
        CompareOp::Gt => ">",
        CompareOp::LtEq => "<=",
        CompareOp::GtEq => ">=",
    }
}

/// TypeQL expression for an operand, binding attribute variables as needed.
pub(crate) fn operand_expr(
    operand: &Operand,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<String, TranslationError> {
    match operand {
        Operand::Property {
            variable, property, ..
        } => {
            let var = state.canonical_var(variable);
            let attribute = ctx.attribute_for(state, &var, property);
            Ok(format!("${}", state.attribute_var(&var, &attribute)?))
        }
        Operand::Variable(name) => {
            if let Some(target) = state.resolve_alias(name) {
                let target = target.to_string();
                state.require_in_scope(&target)?;
                return Ok(format!("${}", target));
            }
            if state.is_pattern_var(name) {
                let var = state.canonical_var(name);
                if state.stage() == Stage::PostReduce {
                    return Err(TranslationError::out_of_scope(&var));
                }
                return Ok(format!("${}", var));
            }
            Err(TranslationError::unbound(name))
        }
        Operand::Literal(literal) => render_literal(literal),
    }
}

fn is_entity_operand(operand: &Operand, state: &TranslationState) -> bool {
    matches!(operand, Operand::Variable(name)
        if state.resolve_alias(name).is_none() && state.is_pattern_var(name))
}

fn string_pattern(pattern: &Operand) -> Result<&str, TranslationError> {
    match pattern {
        Operand::Literal(Literal::String(s)) => Ok(s),
        Operand::Literal(Literal::Parameter(name)) => Err(TranslationError::unsupported(format!(
            "query parameter ${}",
            name
        ))),
        _ => Err(TranslationError::unsupported(
            "string predicate with a non-literal pattern",
        )),
    }
}

fn case_folded(operand: &Operand) -> bool {
    matches!(
        operand,
        Operand::Property {
            case_fold: Some(_),
            ..
        }
    )
}

fn translate_string_match(
    subject: &Operand,
    kind: StringMatchKind,
    pattern: &Operand,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    let text = string_pattern(pattern)?;
    let fold = if case_folded(subject) { "(?i)" } else { "" };
    let subject = operand_expr(subject, state, ctx)?;
    let escaped = regex::escape(text);

    let statement = match kind {
        StringMatchKind::Contains if fold.is_empty() => {
            format!("{} contains {};", subject, quote_string(text))
        }
        StringMatchKind::Contains => {
            format!("{} like {};", subject, quote_string(&format!("{}.*{}.*", fold, escaped)))
        }
        StringMatchKind::StartsWith => {
            format!("{} like {};", subject, quote_string(&format!("{}^{}.*", fold, escaped)))
        }
        StringMatchKind::EndsWith => {
            format!("{} like {};", subject, quote_string(&format!("{}.*{}$", fold, escaped)))
        }
        StringMatchKind::Regex => {
            // `=~` matches the whole string; `like` finds a match anywhere
            let (fold, body) = match text.strip_prefix("(?i)") {
                Some(rest) => ("(?i)", rest),
                None => (fold, text),
            };
            format!("{} like {};", subject, quote_string(&format!("{}^(?:{})$", fold, body)))
        }
    };
    state.push_statement(statement);
    Ok(())
}

fn translate_comparison(
    left: &Operand,
    op: CompareOp,
    right: &Operand,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    // `a <> b` between two matched things is about identity, not values
    if is_entity_operand(left, state) && is_entity_operand(right, state) {
        let l = operand_expr(left, state, ctx)?;
        let r = operand_expr(right, state, ctx)?;
        let statement = match op {
            CompareOp::Eq => format!("{} is {};", l, r),
            CompareOp::NotEq => format!("not {{ {} is {}; }};", l, r),
            _ => {
                return Err(TranslationError::unsupported(
                    "ordering comparison between entities",
                ))
            }
        };
        state.push_statement(statement);
        return Ok(());
    }

    if case_folded(left) || case_folded(right) {
        // toLower(x.p) = 'abc' is a case-insensitive full match
        return match (op, right) {
            (CompareOp::Eq, Operand::Literal(Literal::String(s))) if case_folded(left) => {
                let subject = operand_expr(left, state, ctx)?;
                state.push_statement(format!(
                    "{} like {};",
                    subject,
                    quote_string(&format!("(?i)^{}$", regex::escape(s)))
                ));
                Ok(())
            }
            _ => Err(TranslationError::unsupported(
                "case-folded comparison other than equality with a string",
            )),
        };
    }

    let l = operand_expr(left, state, ctx)?;
    let r = operand_expr(right, state, ctx)?;
    state.push_statement(format!("{} {} {};", l, compare_op(op), r));
    Ok(())
}

/// Translate a nested condition inside its own `{ ... }` block.
fn translate_block(
    condition: &Condition,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<String, TranslationError> {
    let mut child = state.branch();
    translate_condition(condition, &mut child, ctx)?;
    state.absorb_names(&child);
    let statements = child.stage_statements();
    if statements.is_empty() {
        return Err(TranslationError::unsupported(
            "condition block with no constraints",
        ));
    }
    Ok(format!("{{ {} }}", statements.join(" ")))
}

/// Translate a WHERE condition into statements of the current stage.
pub(crate) fn translate_condition(
    condition: &Condition,
    state: &mut TranslationState,
    ctx: &TranslationContext<'_>,
) -> Result<(), TranslationError> {
    match condition {
        Condition::And(parts) => {
            for part in parts {
                translate_condition(part, state, ctx)?;
            }
            Ok(())
        }
        Condition::Or(branches) => {
            let blocks = branches
                .iter()
                .map(|branch| translate_block(branch, state, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            state.push_statement(format!("{};", blocks.join(" or ")));
            Ok(())
        }
        Condition::Not(inner) => {
            let block = translate_block(inner, state, ctx)?;
            state.push_statement(format!("not {};", block));
            Ok(())
        }
        Condition::Comparison { left, op, right } => {
            translate_comparison(left, *op, right, state, ctx)
        }
        Condition::StringMatch {
            subject,
            kind,
            pattern,
        } => translate_string_match(subject, *kind, pattern, state, ctx),
        Condition::IsNull { operand, negated } => {
            let Operand::Property {
                variable, property, ..
            } = operand
            else {
                return Err(TranslationError::unsupported(
                    "IS NULL on something other than a property",
                ));
            };
            let var = state.canonical_var(variable);
            let attribute = ctx.attribute_for(state, &var, property);
            if *negated {
                // a successful binding already implies the attribute exists
                state.attribute_var(&var, &attribute)?;
                return Ok(());
            }
            if state.stage() == Stage::PostReduce {
                return Err(TranslationError::out_of_scope(&var));
            }
            if !state.is_pattern_var(&var) {
                return Err(TranslationError::unbound(&var));
            }
            let absent = state.fresh_name(&format!("{}{}", var, attribute));
            state.push_statement(format!(
                "not {{ ${} has {} ${}; }};",
                var, attribute, absent
            ));
            Ok(())
        }
        Condition::In { operand, values } => {
            if case_folded(operand) {
                return Err(TranslationError::unsupported("case-folded IN list"));
            }
            let subject = operand_expr(operand, state, ctx)?;
            let rendered = values
                .iter()
                .map(render_literal)
                .collect::<Result<Vec<_>, _>>()?;
            match rendered.as_slice() {
                [] => Err(TranslationError::unsupported("empty IN list")),
                [single] => {
                    state.push_statement(format!("{} == {};", subject, single));
                    Ok(())
                }
                many => {
                    let blocks: Vec<String> = many
                        .iter()
                        .map(|value| format!("{{ {} == {}; }}", subject, value))
                        .collect();
                    state.push_statement(format!("{};", blocks.join(" or ")));
                    Ok(())
                }
            }
        }
        Condition::Pattern(path) => {
            if state.stage() == Stage::PostReduce {
                return Err(TranslationError::unsupported(
                    "pattern predicate after aggregation",
                ));
            }
            translate_path(path, state, ctx)
        }
    }
}
