//! Expression evaluation for gateway conditions and `${...}` identity expressions.

use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, DefaultNumericTypes, EvalexprError, HashMapContext,
};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{VariableMap, VariableValue};

/// Strip a `${...}` wrapper; plain expressions are returned trimmed.
fn strip_wrapper(expression: &str) -> &str {
    let trimmed = expression.trim();
    trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .map_or(trimmed, str::trim)
}

fn to_eval_value(value: &VariableValue) -> Option<evalexpr::Value<DefaultNumericTypes>> {
    match value {
        VariableValue::Boolean(b) => Some(evalexpr::Value::Boolean(*b)),
        VariableValue::Integer(i) => Some(evalexpr::Value::Int(*i)),
        VariableValue::Double(d) => Some(evalexpr::Value::Float(*d)),
        VariableValue::String(s) => Some(evalexpr::Value::String(s.clone())),
        VariableValue::Date(d) => Some(evalexpr::Value::String(d.to_rfc3339())),
        VariableValue::Null | VariableValue::Json(_) => None,
    }
}

/// Evaluate a boolean condition against the visible variables.
///
/// A malformed expression is an error. An expression that parses but cannot
/// be evaluated (unknown variable, type mismatch) counts as `false`.
pub fn evaluate_condition(expression: &str, variables: &VariableMap) -> DomainResult<bool> {
    let source = strip_wrapper(expression);
    let expression_error = |e: EvalexprError| DomainError::ExpressionError {
        expression: expression.to_string(),
        reason: e.to_string(),
    };
    let tree = build_operator_tree::<DefaultNumericTypes>(source).map_err(expression_error)?;

    let mut context = HashMapContext::<DefaultNumericTypes>::new();
    for (name, value) in variables {
        if let Some(eval_value) = to_eval_value(value) {
            context.set_value(name.clone(), eval_value).map_err(expression_error)?;
        }
    }

    match tree.eval_boolean_with_context(&context) {
        Ok(result) => Ok(result),
        Err(e) if evaluates_to_false(&e) => {
            tracing::debug!(expression, error = %e, "condition not satisfiable, treating as false");
            Ok(false)
        }
        Err(e) => Err(expression_error(e)),
    }
}

/// Unknown variables and type mismatches make a condition false; anything else is malformed.
fn evaluates_to_false(error: &EvalexprError) -> bool {
    matches!(
        error,
        EvalexprError::VariableIdentifierNotFound(_)
            | EvalexprError::TypeError { .. }
            | EvalexprError::WrongTypeCombination { .. }
            | EvalexprError::ExpectedBoolean { .. }
            | EvalexprError::ExpectedNumber { .. }
            | EvalexprError::ExpectedNumberOrString { .. }
            | EvalexprError::ExpectedString { .. }
            | EvalexprError::ExpectedInt { .. }
            | EvalexprError::ExpectedFloat { .. }
    )
}

/// Resolve an identity reference: `${name}` reads a variable, anything else is a literal.
pub fn resolve_identity(reference: &str, variables: &VariableMap) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.starts_with("${") {
        variables
            .get(strip_wrapper(trimmed))
            .and_then(VariableValue::to_plain_string)
            .filter(|s| !s.is_empty())
    } else if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve a list of identity references; `${name}` holding a list expands to its elements.
pub fn resolve_identities(references: &[String], variables: &VariableMap) -> Vec<String> {
    let mut out = Vec::new();
    for reference in references {
        let trimmed = reference.trim();
        if trimmed.starts_with("${") {
            if let Some(value) = variables.get(strip_wrapper(trimmed)) {
                out.extend(value.elements().iter().filter_map(VariableValue::to_plain_string));
            }
        } else if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}
