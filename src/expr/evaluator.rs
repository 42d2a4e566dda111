//! Tree-walking interpreter for parsed rule expressions.
//!
//! The interpreter re-applies the attribute and call restrictions the
//! validator checks statically, so a tree that somehow skipped validation
//! still cannot reach a forbidden name.

use super::ast::{BoolOp, Constant, Expr, UnaryOp};
use super::builtins::{self, is_forbidden_attribute, is_forbidden_function};
use super::ops;
use super::parser::{ParseError, Program};
use super::value::{dict_get, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Typed evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum EvalError {
    #[error("NameError: {0}")]
    Name(String),

    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("SecurityError: {0}")]
    Security(String),

    #[error("ExpressionError: {0}")]
    Expression(String),

    #[error("SyntaxError: {0}")]
    Syntax(String),
}

impl EvalError {
    /// Taxonomy name of this failure
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::Name(_) => "NameError",
            EvalError::Attribute(_) => "AttributeError",
            EvalError::Security(_) => "SecurityError",
            EvalError::Expression(_) => "ExpressionError",
            EvalError::Syntax(_) => "SyntaxError",
        }
    }
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Forbidden { construct, .. } => {
                EvalError::Security(format!("forbidden construct '{}'", construct))
            }
            other => EvalError::Syntax(other.to_string()),
        }
    }
}

/// Variable bindings for one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalContext {
    bindings: BTreeMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`. Dunder and forbidden names are refused.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> bool {
        let name = name.into();
        if name.starts_with("__") || is_forbidden_function(&name) {
            tracing::debug!("[Interpreter] Refusing to bind reserved name '{}'", name);
            return false;
        }
        self.bindings.insert(name, value);
        true
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Bind every top-level key of a JSON object
    pub fn from_json(bindings: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut ctx = Self::new();
        for (name, value) in bindings {
            ctx.bind(name.clone(), Value::from(value));
        }
        ctx
    }
}

/// Stateless evaluator for [`Program`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `program` against `ctx`
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext) -> Result<Value, EvalError> {
        self.eval(program.root(), ctx)
    }

    fn eval(&self, expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
        match expr {
            Expr::Constant { value } => Ok(match value {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::Str(s.clone()),
            }),

            Expr::Name { id } => {
                if let Some(value) = ctx.get(id) {
                    return Ok(value.clone());
                }
                match builtins::lookup(id) {
                    Some(builtin) => Ok(Value::Builtin(builtin.name)),
                    None => Err(EvalError::Name(format!("name '{}' is not defined", id))),
                }
            }

            Expr::Attribute { value, attr } => {
                check_attribute(attr)?;
                let target = self.eval(value, ctx)?;
                attribute(&target, attr)
            }

            Expr::Subscript { value, index } => {
                let target = self.eval(value, ctx)?;
                let index = self.eval(index, ctx)?;
                subscript(&target, &index)
            }

            Expr::Call { func, args } => self.call(func, args, ctx),

            Expr::Unary { op, operand } => {
                let operand = self.eval(operand, ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
                    _ => ops::unary(*op, &operand),
                }
            }

            Expr::Binary { op, left, right } => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                ops::binary(*op, &left, &right)
            }

            // The chain yields a bool, never the deciding operand
            Expr::BoolOp { op, values } => {
                for value in values {
                    let truthy = self.eval(value, ctx)?.truthy();
                    match op {
                        BoolOp::And if !truthy => return Ok(Value::Bool(false)),
                        BoolOp::Or if truthy => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                }
                Ok(Value::Bool(matches!(op, BoolOp::And)))
            }

            Expr::Compare {
                left,
                ops: operators,
                comparators,
            } => {
                let mut current = self.eval(left, ctx)?;
                for (op, comparator) in operators.iter().zip(comparators) {
                    let next = self.eval(comparator, ctx)?;
                    if !ops::compare(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }

            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, ctx)?.truthy() {
                    self.eval(body, ctx)
                } else {
                    self.eval(orelse, ctx)
                }
            }

            Expr::List { elts } => bounded(Value::List(self.eval_all(elts, ctx)?)),
            Expr::Tuple { elts } => bounded(Value::Tuple(self.eval_all(elts, ctx)?)),

            Expr::Set { elts } => {
                let mut out: Vec<Value> = Vec::with_capacity(elts.len());
                for value in self.eval_all(elts, ctx)? {
                    require_hashable(&value)?;
                    if !out.iter().any(|existing| existing.loose_eq(&value)) {
                        out.push(value);
                    }
                }
                bounded(Value::Set(out))
            }

            Expr::Dict { entries } => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key, ctx)?;
                    require_hashable(&key)?;
                    let value = self.eval(value, ctx)?;
                    match out.iter_mut().find(|(k, _)| k.loose_eq(&key)) {
                        Some(slot) => slot.1 = value,
                        None => out.push((key, value)),
                    }
                }
                bounded(Value::Dict(out))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr], ctx: &EvalContext) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|e| self.eval(e, ctx)).collect()
    }

    fn call(&self, func: &Expr, args: &[Expr], ctx: &EvalContext) -> Result<Value, EvalError> {
        let name = match func {
            Expr::Name { id } => id.as_str(),
            Expr::Attribute { attr, .. } => {
                check_attribute(attr)?;
                return Err(EvalError::Security(format!(
                    "method call '{}' is not allowed",
                    attr
                )));
            }
            other => {
                return Err(EvalError::Security(format!(
                    "only named builtin functions may be called, not {}",
                    other.kind()
                )))
            }
        };

        if is_forbidden_function(name) {
            return Err(EvalError::Security(format!(
                "function '{}' is forbidden",
                name
            )));
        }
        if ctx.get(name).is_some() {
            return Err(EvalError::Expression(format!("'{}' is not callable", name)));
        }
        let Some(builtin) = builtins::lookup(name) else {
            return Err(EvalError::Security(format!(
                "function '{}' is not in the allowed list",
                name
            )));
        };

        let args = self.eval_all(args, ctx)?;
        builtin.call(&args)
    }
}

fn check_attribute(attr: &str) -> Result<(), EvalError> {
    if attr.starts_with("__") || is_forbidden_attribute(attr) {
        return Err(EvalError::Security(format!(
            "access to attribute '{}' is forbidden",
            attr
        )));
    }
    Ok(())
}

fn attribute(target: &Value, attr: &str) -> Result<Value, EvalError> {
    match target {
        Value::Dict(entries) => match dict_get(entries, &Value::Str(attr.to_string())) {
            Some(value) => Ok(value.clone()),
            None => {
                let available: Vec<String> = entries
                    .iter()
                    .filter_map(|(k, _)| match k {
                        Value::Str(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect();
                Err(EvalError::Attribute(format!(
                    "attribute '{}' does not exist (available: {})",
                    attr,
                    available.join(", ")
                )))
            }
        },
        other => Err(EvalError::Attribute(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            attr
        ))),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn subscript(target: &Value, index: &Value) -> Result<Value, EvalError> {
    match target {
        Value::Dict(entries) => {
            if let Value::Str(key) = index {
                check_attribute(key)?;
            }
            dict_get(entries, index)
                .cloned()
                .ok_or_else(|| EvalError::Attribute(format!("key {} does not exist", index.repr())))
        }
        Value::List(items) | Value::Tuple(items) => {
            let i = index.as_int().ok_or_else(|| {
                EvalError::Expression(format!(
                    "{} indices must be integers, not {}",
                    target.type_name(),
                    index.type_name()
                ))
            })?;
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| {
                    EvalError::Expression(format!("{} index out of range", target.type_name()))
                })
        }
        Value::Str(s) => {
            let i = index.as_int().ok_or_else(|| {
                EvalError::Expression(format!(
                    "string indices must be integers, not {}",
                    index.type_name()
                ))
            })?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(i, chars.len())
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(|| EvalError::Expression("string index out of range".to_string()))
        }
        other => Err(EvalError::Expression(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Collection literals are held to the same total size as computed results
fn bounded(value: Value) -> Result<Value, EvalError> {
    ops::check_len(value.size())?;
    Ok(value)
}

fn require_hashable(value: &Value) -> Result<(), EvalError> {
    if value.is_hashable() {
        Ok(())
    } else {
        Err(EvalError::Expression(format!(
            "unhashable type: '{}'",
            value.type_name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::{parse, ExpressionLimits};

    fn item(pairs: &[(&str, Value)]) -> Value {
        Value::Dict(
            pairs
                .iter()
                .map(|(k, v)| (Value::Str(k.to_string()), v.clone()))
                .collect(),
        )
    }

    fn eval_with(source: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
        let program = parse(source, &ExpressionLimits::default())?;
        Interpreter::new().evaluate(&program, ctx)
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        eval_with(source, &EvalContext::new())
    }

    fn pair_context() -> EvalContext {
        EvalContext::new()
            .with(
                "a",
                item(&[("voltage", Value::Int(12)), ("name", Value::Str("PSU".into()))]),
            )
            .with("b", item(&[("voltage", Value::Float(12.0))]))
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval("-2 ** 2").unwrap(), Value::Int(-4));
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), Value::Int(512));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("-7 // 2").unwrap(), Value::Int(-4));
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(eval("1 < 2 < 3").unwrap(), Value::Bool(true));
        assert_eq!(eval("3 < 2 < 10").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_chained_comparison_short_circuits() {
        // The right comparand would raise NameError if it were evaluated
        assert_eq!(eval("3 < 2 < undefined_name").unwrap(), Value::Bool(false));
        assert!(matches!(
            eval("1 < 2 < undefined_name"),
            Err(EvalError::Name(_))
        ));
    }

    #[test]
    fn test_boolean_ops_return_bool() {
        assert_eq!(eval("1 and 'x'").unwrap(), Value::Bool(true));
        assert_eq!(eval("0 or ''").unwrap(), Value::Bool(false));
        assert_eq!(eval("0 or 5").unwrap(), Value::Bool(true));
        // short-circuit: the undefined name is never reached
        assert_eq!(eval("False and missing").unwrap(), Value::Bool(false));
        assert_eq!(eval("True or missing").unwrap(), Value::Bool(true));
        assert_eq!(eval("not 0").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_ternary_is_lazy() {
        assert_eq!(eval("1 if True else missing").unwrap(), Value::Int(1));
        assert_eq!(eval("missing if False else 2").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_attribute_lookup_on_items() {
        let ctx = pair_context();
        assert_eq!(
            eval_with("a.voltage == b.voltage", &ctx).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_with("a['name']", &ctx).unwrap(),
            Value::Str("PSU".into())
        );
        match eval_with("a.wattage", &ctx) {
            Err(EvalError::Attribute(msg)) => assert!(msg.contains("wattage")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            eval_with("a.voltage.x", &ctx),
            Err(EvalError::Attribute(_))
        ));
    }

    #[test]
    fn test_runtime_attribute_guard() {
        let ctx = pair_context();
        for source in ["a.__class__", "a.globals", "a['__dict__']"] {
            assert!(
                matches!(eval_with(source, &ctx), Err(EvalError::Security(_))),
                "{} should be refused",
                source
            );
        }
    }

    #[test]
    fn test_call_guard() {
        assert!(matches!(eval("eval('1')"), Err(EvalError::Security(_))));
        assert!(matches!(eval("print(1)"), Err(EvalError::Security(_))));
        assert!(matches!(eval("'a'.upper()"), Err(EvalError::Security(_))));
        assert!(matches!(eval("(len)('ab')"), Ok(Value::Int(2))));
        assert!(matches!(eval("[len][0]('ab')"), Err(EvalError::Security(_))));
    }

    #[test]
    fn test_builtin_calls() {
        assert_eq!(eval("len('abc')").unwrap(), Value::Int(3));
        assert_eq!(eval("max(1, 5, 3)").unwrap(), Value::Int(5));
        assert_eq!(eval("sum([1, 2, 3]) / len([1, 2, 3])").unwrap(), Value::Float(2.0));
        assert_eq!(eval("safe_match('DDR5', 'ddr*')").unwrap(), Value::Bool(true));
        assert!(matches!(eval("len(1, 2)"), Err(EvalError::Expression(_))));
    }

    #[test]
    fn test_names_resolve_context_first() {
        let ctx = EvalContext::new().with("x", Value::Int(3));
        assert_eq!(eval_with("x * 2", &ctx).unwrap(), Value::Int(6));
        assert!(matches!(eval("x"), Err(EvalError::Name(_))));
        assert_eq!(eval("len").unwrap(), Value::Builtin("len"));
    }

    #[test]
    fn test_reserved_bindings_refused() {
        let mut ctx = EvalContext::new();
        assert!(!ctx.bind("__builtins__", Value::None));
        assert!(!ctx.bind("eval", Value::None));
        assert!(ctx.bind("voltage", Value::Int(5)));
        assert_eq!(ctx.names().collect::<Vec<_>>(), vec!["voltage"]);
    }

    #[test]
    fn test_collections() {
        assert_eq!(eval("2 in [1, 2, 3]").unwrap(), Value::Bool(true));
        assert_eq!(eval("len({1, 1, 2})").unwrap(), Value::Int(2));
        assert_eq!(eval("{'a': 1}['a']").unwrap(), Value::Int(1));
        assert_eq!(eval("(1, 2)[-1]").unwrap(), Value::Int(2));
        assert!(matches!(eval("[1][5]"), Err(EvalError::Expression(_))));
        assert!(matches!(eval("{[1]: 2}"), Err(EvalError::Expression(_))));
    }

    #[test]
    fn test_identity() {
        assert_eq!(eval("None is None").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 is not None").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_nested_growth_is_bounded() {
        for source in [
            "[[0] * 1000] * 10000",
            "[[[0] * 100] * 100] * 100",
        ] {
            assert!(eval(source).is_err(), "{}", source);
        }
        let big = "[0] * 60000";
        assert!(eval(&format!("zip({0}, {0})", big)).is_err());
        assert!(eval(&format!("enumerate({})", big)).is_err());
        assert!(eval(&format!("[{0}, {0}]", big)).is_err());
        assert!(eval(&format!("{{1: {0}, 2: {0}}}", big)).is_err());
        assert_eq!(eval("len([[0] * 10] * 100)").unwrap(), Value::Int(100));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(EvalError::Name("x".into()).kind(), "NameError");
        assert_eq!(EvalError::Security("x".into()).kind(), "SecurityError");
        let err: EvalError = parse("x = 1", &ExpressionLimits::default())
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "SecurityError");
        let err: EvalError = parse("1 +", &ExpressionLimits::default())
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "SyntaxError");
    }

    #[test]
    fn test_json_bindings() {
        let json = serde_json::json!({"a": {"voltage": 12}, "__class__": 1});
        let ctx = EvalContext::from_json(json.as_object().unwrap());
        assert_eq!(ctx.names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(eval_with("a.voltage + 1", &ctx).unwrap(), Value::Int(13));
    }
}
