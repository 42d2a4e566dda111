//! Rule evaluation for one item pair

use super::model::{Item, Rule, RuleOutcome};
use crate::expr::{EvalContext, Interpreter, Value};
use crate::security::SecurityValidator;
use crate::utils::sanitize_identifier;
use std::collections::BTreeMap;

/// Map view of an item as seen by expressions.
///
/// Each property is reachable under its sanitized identifier and its
/// verbatim key, and properties shadow the fixed fields.
pub fn item_value(item: &Item) -> Value {
    let mut fields: BTreeMap<String, Value> = BTreeMap::new();
    fields.insert("id".into(), Value::Int(item.id));
    fields.insert("name".into(), Value::Str(item.name.clone()));
    fields.insert("category".into(), Value::Str(item.category.clone()));
    fields.insert(
        "description".into(),
        Value::Str(item.description.clone().unwrap_or_default()),
    );

    for (key, scalar) in &item.properties {
        let value = Value::from(scalar);
        fields.insert(sanitize_identifier(key), value.clone());
        fields.insert(key.clone(), value);
    }

    Value::Dict(
        fields
            .into_iter()
            .map(|(k, v)| (Value::Str(k), v))
            .collect(),
    )
}

/// Bindings for a pair: `a`/`part_a` for the first item, `b`/`part_b` for the second
pub fn pair_context(x: &Item, y: &Item) -> EvalContext {
    let a = item_value(x);
    let b = item_value(y);
    EvalContext::new()
        .with("a", a.clone())
        .with("part_a", a)
        .with("b", b.clone())
        .with("part_b", b)
}

/// Order (x, y) so the first item is the one in the rule's `category_a`
fn oriented<'i>(rule: &Rule, x: &'i Item, y: &'i Item) -> (&'i Item, &'i Item) {
    if rule.category_a != x.category && rule.category_a == y.category {
        (y, x)
    } else {
        (x, y)
    }
}

/// Run `rule` against (x, y). Failures of any kind mark the rule failed.
///
/// `a` is always bound to the item in the rule's `category_a`, whichever
/// order the pair arrives in.
pub fn evaluate_rule(validator: &SecurityValidator, rule: &Rule, x: &Item, y: &Item) -> RuleOutcome {
    let weight = rule.weight.get();
    let (first, second) = oriented(rule, x, y);
    let result = match validator.approve(&rule.expression) {
        Ok(program) => Interpreter::new()
            .evaluate(&program, &pair_context(first, second))
            .map_err(|e| e.to_string()),
        Err(verdict) => Err(format!("SecurityError: {}", verdict.summary())),
    };

    let (passed, error) = match result {
        Ok(value) => (value.truthy(), None),
        Err(message) => {
            tracing::warn!(
                "[Rules] Rule '{}' ({}) failed for items {} and {}: {}",
                rule.name,
                rule.id,
                x.id,
                y.id,
                message
            );
            (false, Some(message))
        }
    };
    tracing::debug!(
        "[Rules] Rule '{}' on ({}, {}): {}",
        rule.name,
        x.id,
        y.id,
        if passed { "passed" } else { "failed" }
    );

    RuleOutcome {
        rule_id: rule.id,
        rule_name: rule.name.clone(),
        passed,
        score_contribution: if passed { weight } else { 0 },
        weight,
        is_blocking: rule.is_blocking,
        error,
    }
}
