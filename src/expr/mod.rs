//! Rule expression language
//!
//! A small, side-effect-free expression subset evaluated against item
//! property maps:
//! - `lexer` / `parser`: source text to a bounded [`Program`]
//! - `evaluator`: tree-walking [`Interpreter`] over immutable [`Value`]s
//! - `builtins` / `ops`: the fixed function and operator tables

pub mod ast;
pub mod builtins;
pub mod evaluator;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod value;

pub use ast::{BinaryOp, BoolOp, CompareOp, Constant, Expr, UnaryOp};
pub use builtins::{allowed_functions, function_help};
pub use evaluator::{EvalContext, EvalError, Interpreter};
pub use parser::{check_syntax, parse, ExpressionLimits, ParseError, Program};
pub use value::{Scalar, Value};
