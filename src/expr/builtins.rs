//! Fixed builtin function table.
//!
//! Every callable reachable from an expression is listed in [`BUILTINS`] with
//! its arity and help text. Nothing can be added at runtime.

use super::ast::BinaryOp;
use super::evaluator::EvalError;
use super::ops::{self, MAX_SEQUENCE_LEN};
use super::value::{dict_get, Value};
use crate::utils::glob_match;
use std::cmp::Ordering;

/// Largest sequence `range()` may produce
pub const MAX_RANGE_LEN: usize = 10_000;

/// Names that may never be called
pub const FORBIDDEN_FUNCTIONS: &[&str] = &[
    "eval", "exec", "compile", "__import__", "reload", "open", "file", "input", "raw_input",
    "exit", "quit", "help", "license", "credits", "getattr", "setattr", "delattr", "hasattr",
    "globals", "locals", "vars", "dir", "breakpoint",
];

/// Reflective attribute names that may never be read
pub const FORBIDDEN_ATTRIBUTES: &[&str] = &[
    "__class__", "__bases__", "__subclasses__", "__mro__", "__globals__", "__code__",
    "__func__", "__self__", "__builtins__", "__import__", "__file__", "__name__", "__dict__",
    "__getattribute__",
];

/// Whether `name` is wrapped in double underscores
pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

pub fn is_forbidden_function(name: &str) -> bool {
    let lower = name.to_lowercase();
    FORBIDDEN_FUNCTIONS.contains(&lower.as_str())
}

/// Forbidden attributes include every forbidden function name
pub fn is_forbidden_attribute(name: &str) -> bool {
    let lower = name.to_lowercase();
    FORBIDDEN_ATTRIBUTES.contains(&lower.as_str()) || FORBIDDEN_FUNCTIONS.contains(&lower.as_str())
}

pub fn is_allowed_function(name: &str) -> bool {
    lookup(name).is_some()
}

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    const fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }

    fn describe(&self) -> String {
        match self.max {
            Some(max) if max == self.min => format!("exactly {}", max),
            Some(max) => format!("{} to {}", self.min, max),
            None => format!("at least {}", self.min),
        }
    }
}

pub type BuiltinFn = fn(&[Value]) -> Result<Value, EvalError>;

pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub help: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    /// Check arity, then invoke
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        if !self.arity.accepts(args.len()) {
            return Err(EvalError::Expression(format!(
                "{}() takes {} argument(s) ({} given)",
                self.name,
                self.arity.describe(),
                args.len()
            )));
        }
        (self.func)(args)
    }
}

pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "abs",
        arity: Arity::exactly(1),
        help: "abs(x): absolute value of a number",
        func: builtin_abs,
    },
    Builtin {
        name: "all",
        arity: Arity::exactly(1),
        help: "all(iterable): True when every element is truthy",
        func: builtin_all,
    },
    Builtin {
        name: "any",
        arity: Arity::exactly(1),
        help: "any(iterable): True when at least one element is truthy",
        func: builtin_any,
    },
    Builtin {
        name: "bool",
        arity: Arity::between(0, 1),
        help: "bool(x): truthiness of a value",
        func: builtin_bool,
    },
    Builtin {
        name: "enumerate",
        arity: Arity::between(1, 2),
        help: "enumerate(iterable, start=0): list of (index, element) pairs",
        func: builtin_enumerate,
    },
    Builtin {
        name: "float",
        arity: Arity::between(0, 1),
        help: "float(x): convert a number or numeric string to float",
        func: builtin_float,
    },
    Builtin {
        name: "int",
        arity: Arity::between(0, 1),
        help: "int(x): convert a number or numeric string to integer, truncating",
        func: builtin_int,
    },
    Builtin {
        name: "len",
        arity: Arity::exactly(1),
        help: "len(x): number of elements in a string or collection",
        func: builtin_len,
    },
    Builtin {
        name: "max",
        arity: Arity::at_least(1),
        help: "max(iterable) or max(a, b, ...): largest value",
        func: builtin_max,
    },
    Builtin {
        name: "min",
        arity: Arity::at_least(1),
        help: "min(iterable) or min(a, b, ...): smallest value",
        func: builtin_min,
    },
    Builtin {
        name: "range",
        arity: Arity::between(1, 3),
        help: "range(stop) or range(start, stop, step): list of integers",
        func: builtin_range,
    },
    Builtin {
        name: "round",
        arity: Arity::between(1, 2),
        help: "round(x, ndigits=None): round half to even",
        func: builtin_round,
    },
    Builtin {
        name: "safe_contains",
        arity: Arity::exactly(2),
        help: "safe_contains(container, item): membership test, False instead of a type error",
        func: builtin_safe_contains,
    },
    Builtin {
        name: "safe_get",
        arity: Arity::between(2, 3),
        help: "safe_get(map, 'key', default=0): map value or the default when absent",
        func: builtin_safe_get,
    },
    Builtin {
        name: "safe_match",
        arity: Arity::exactly(2),
        help: "safe_match('text', 'pattern'): case-insensitive wildcard match (* ? [seq])",
        func: builtin_safe_match,
    },
    Builtin {
        name: "str",
        arity: Arity::between(0, 1),
        help: "str(x): string form of a value",
        func: builtin_str,
    },
    Builtin {
        name: "sum",
        arity: Arity::between(1, 2),
        help: "sum(iterable, start=0): total of numeric elements",
        func: builtin_sum,
    },
    Builtin {
        name: "zip",
        arity: Arity::at_least(0),
        help: "zip(a, b, ...): list of tuples, truncated to the shortest input",
        func: builtin_zip,
    },
];

/// Find a builtin by exact name
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Sorted names of every callable builtin
pub fn allowed_functions() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTINS.iter().map(|b| b.name).collect();
    names.sort_unstable();
    names
}

pub fn function_help(name: &str) -> Option<&'static str> {
    lookup(name).map(|b| b.help)
}

// ============================================================================
// Helpers
// ============================================================================

fn type_error(func: &str, value: &Value) -> EvalError {
    EvalError::Expression(format!(
        "{}() does not accept an argument of type '{}'",
        func,
        value.type_name()
    ))
}

/// Materialize an iterable value
pub(crate) fn iterate(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
        other => Err(EvalError::Expression(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn int_arg(func: &str, value: &Value) -> Result<i64, EvalError> {
    value.as_int().ok_or_else(|| type_error(func, value))
}

fn extreme(name: &str, args: &[Value], keep: Ordering) -> Result<Value, EvalError> {
    let candidates = if args.len() == 1 {
        iterate(&args[0])?
    } else {
        args.to_vec()
    };
    let mut iter = candidates.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| EvalError::Expression(format!("{}() arg is an empty sequence", name)))?;
    for candidate in iter {
        if ops::order(&candidate, &best, if keep == Ordering::Less { "<" } else { ">" })?
            == Some(keep)
        {
            best = candidate;
        }
    }
    Ok(best)
}

// ============================================================================
// Builtin implementations
// ============================================================================

fn builtin_abs(args: &[Value]) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Expression("integer overflow".to_string())),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(type_error("abs", other)),
    }
}

fn builtin_all(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(iterate(&args[0])?.iter().all(Value::truthy)))
}

fn builtin_any(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(iterate(&args[0])?.iter().any(Value::truthy)))
}

fn builtin_bool(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
}

fn builtin_enumerate(args: &[Value]) -> Result<Value, EvalError> {
    let start = match args.get(1) {
        Some(v) => int_arg("enumerate", v)?,
        None => 0,
    };
    let items = iterate(&args[0])?;
    ops::check_len(args[0].size().saturating_add(items.len()))?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let index = start
            .checked_add(i as i64)
            .ok_or_else(|| EvalError::Expression("integer overflow".to_string()))?;
        out.push(Value::Tuple(vec![Value::Int(index), item]));
    }
    Ok(Value::List(out))
}

fn builtin_float(args: &[Value]) -> Result<Value, EvalError> {
    let Some(value) = args.first() else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(_) | Value::Bool(_) => Ok(Value::Float(value.as_int().unwrap_or(0) as f64)),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            EvalError::Expression(format!("could not convert string to float: '{}'", s))
        }),
        other => Err(type_error("float", other)),
    }
}

fn builtin_int(args: &[Value]) -> Result<Value, EvalError> {
    let Some(value) = args.first() else {
        return Ok(Value::Int(0));
    };
    match value {
        Value::Int(_) | Value::Bool(_) => Ok(Value::Int(value.as_int().unwrap_or(0))),
        Value::Float(f) => {
            if !f.is_finite() || f.abs() >= 9.2e18 {
                return Err(EvalError::Expression(format!(
                    "cannot convert float {} to integer",
                    value
                )));
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
            EvalError::Expression(format!("invalid literal for int() with base 10: '{}'", s))
        }),
        other => Err(type_error("int", other)),
    }
}

fn builtin_len(args: &[Value]) -> Result<Value, EvalError> {
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => items.len(),
        Value::Dict(entries) => entries.len(),
        other => {
            return Err(EvalError::Expression(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

fn builtin_max(args: &[Value]) -> Result<Value, EvalError> {
    extreme("max", args, Ordering::Greater)
}

fn builtin_min(args: &[Value]) -> Result<Value, EvalError> {
    extreme("min", args, Ordering::Less)
}

fn builtin_range(args: &[Value]) -> Result<Value, EvalError> {
    let ints = args
        .iter()
        .map(|v| int_arg("range", v))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(EvalError::Expression(format!(
                "range() expected 1 to 3 arguments, got {}",
                ints.len()
            )))
        }
    };
    if step == 0 {
        return Err(EvalError::Expression(
            "range() arg 3 must not be zero".to_string(),
        ));
    }

    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let len = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    if len > MAX_RANGE_LEN as i128 {
        return Err(EvalError::Expression(format!(
            "range() too large ({} > {} elements)",
            len, MAX_RANGE_LEN
        )));
    }
    Ok(Value::List(
        (0..len)
            .map(|i| Value::Int((start + i * step) as i64))
            .collect(),
    ))
}

fn builtin_round(args: &[Value]) -> Result<Value, EvalError> {
    let ndigits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(v) => Some(int_arg("round", v)?),
    };
    match (&args[0], ndigits) {
        (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(args[0].as_int().unwrap_or(0))),
        (Value::Float(f), None) => {
            let rounded = f.round_ties_even();
            if !rounded.is_finite() || rounded.abs() >= 9.2e18 {
                return Err(EvalError::Expression(format!(
                    "cannot round {} to an integer",
                    f
                )));
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(n)) => {
            let factor = 10f64.powi(n.clamp(-308, 308) as i32);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (other, _) => Err(type_error("round", other)),
    }
}

fn builtin_safe_contains(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Bool(ops::contains(&args[0], &args[1]).unwrap_or(false)))
}

fn builtin_safe_get(args: &[Value]) -> Result<Value, EvalError> {
    let default = args.get(2).cloned().unwrap_or(Value::Int(0));
    match &args[0] {
        Value::Dict(entries) => Ok(dict_get(entries, &args[1]).cloned().unwrap_or(default)),
        _ => Ok(default),
    }
}

fn builtin_safe_match(args: &[Value]) -> Result<Value, EvalError> {
    match (&args[0], &args[1]) {
        (Value::Str(text), Value::Str(pattern)) => Ok(Value::Bool(glob_match(text, pattern))),
        _ => Ok(Value::Bool(false)),
    }
}

fn builtin_str(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Str(
        args.first().map(|v| v.to_string()).unwrap_or_default(),
    ))
}

fn builtin_sum(args: &[Value]) -> Result<Value, EvalError> {
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return Err(EvalError::Expression(
            "sum() can't sum strings".to_string(),
        ));
    }
    for item in iterate(&args[0])? {
        total = ops::binary(BinaryOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn builtin_zip(args: &[Value]) -> Result<Value, EvalError> {
    let columns = args.iter().map(iterate).collect::<Result<Vec<_>, _>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let total = args
        .iter()
        .fold(len, |acc, arg| acc.saturating_add(arg.size()));
    if len > MAX_SEQUENCE_LEN || total > MAX_SEQUENCE_LEN {
        return Err(EvalError::Expression("zip() result too large".to_string()));
    }
    Ok(Value::List(
        (0..len)
            .map(|i| Value::Tuple(columns.iter().map(|col| col[i].clone()).collect()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        lookup(name).expect("builtin exists").call(&args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().map(|i| Value::Int(*i)).collect())
    }

    #[test]
    fn test_allowed_functions_sorted() {
        let names = allowed_functions();
        assert_eq!(names.len(), 18);
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(names.contains(&"safe_match"));
        assert!(!names.contains(&"eval"));
        assert!(function_help("safe_get").is_some());
        assert!(function_help("open").is_none());
    }

    #[test]
    fn test_forbidden_name_sets() {
        assert!(is_forbidden_function("eval"));
        assert!(is_forbidden_function("EVAL"));
        assert!(is_forbidden_attribute("__class__"));
        assert!(is_forbidden_attribute("globals"));
        assert!(!is_forbidden_attribute("voltage"));
        assert!(is_dunder("__dict__"));
        assert!(!is_dunder("__"));
        assert!(!is_dunder("_private"));
    }

    #[test]
    fn test_arity_checked() {
        let err = call("len", vec![]).unwrap_err();
        assert!(err.to_string().contains("len() takes exactly 1"));
        assert!(call("abs", vec![Value::Int(1), Value::Int(2)]).is_err());
    }

    #[test]
    fn test_min_max_sum() {
        assert_eq!(call("max", vec![ints(&[3, 9, 2])]).unwrap(), Value::Int(9));
        assert_eq!(
            call("min", vec![Value::Int(4), Value::Float(1.5)]).unwrap(),
            Value::Float(1.5)
        );
        assert!(call("max", vec![ints(&[])]).is_err());
        assert_eq!(call("sum", vec![ints(&[1, 2, 3])]).unwrap(), Value::Int(6));
        assert_eq!(
            call("sum", vec![ints(&[1]), Value::Float(0.5)]).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(
            call("round", vec![Value::Float(1.25), Value::Int(1)]).unwrap(),
            Value::Float(1.2)
        );
        assert_eq!(call("round", vec![Value::Int(7)]).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::Str(" 42 ".into())]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert!(call("int", vec![Value::Str("1.5".into())]).is_err());
        assert_eq!(
            call("float", vec![Value::Str("1.5".into())]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            call("str", vec![Value::Float(3.0)]).unwrap(),
            Value::Str("3.0".into())
        );
        assert_eq!(call("bool", vec![ints(&[])]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_range_bounds() {
        assert_eq!(call("range", vec![Value::Int(3)]).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            ints(&[5, 3, 1])
        );
        assert!(call("range", vec![Value::Int(1_000_000)]).is_err());
        assert!(call("range", vec![Value::Int(0), Value::Int(5), Value::Int(0)]).is_err());
    }

    #[test]
    fn test_sequence_helpers() {
        assert_eq!(
            call("enumerate", vec![Value::Str("ab".into())]).unwrap(),
            Value::List(vec![
                Value::Tuple(vec![Value::Int(0), Value::Str("a".into())]),
                Value::Tuple(vec![Value::Int(1), Value::Str("b".into())]),
            ])
        );
        assert_eq!(
            call("zip", vec![ints(&[1, 2, 3]), ints(&[4, 5])]).unwrap(),
            Value::List(vec![
                Value::Tuple(vec![Value::Int(1), Value::Int(4)]),
                Value::Tuple(vec![Value::Int(2), Value::Int(5)]),
            ])
        );
        assert_eq!(call("all", vec![ints(&[1, 2])]).unwrap(), Value::Bool(true));
        assert_eq!(call("any", vec![ints(&[0, 0])]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_safe_helpers() {
        let map = Value::Dict(vec![(Value::Str("tdp".into()), Value::Int(65))]);
        assert_eq!(
            call("safe_get", vec![map.clone(), Value::Str("tdp".into())]).unwrap(),
            Value::Int(65)
        );
        assert_eq!(
            call("safe_get", vec![map.clone(), Value::Str("missing".into())]).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            call("safe_get", vec![Value::Int(3), Value::Str("x".into()), Value::None]).unwrap(),
            Value::None
        );
        assert_eq!(
            call("safe_contains", vec![Value::Int(3), Value::Int(1)]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            call("safe_contains", vec![map, Value::Str("tdp".into())]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(
                "safe_match",
                vec![Value::Str("DDR5-6000".into()), Value::Str("ddr5*".into())]
            )
            .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("safe_match", vec![Value::Int(5), Value::Str("*".into())]).unwrap(),
            Value::Bool(false)
        );
    }
}
