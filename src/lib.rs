//! Sandboxed rule expressions and compatibility scoring for catalog items.
//!
//! Operators write rules such as `a.voltage == b.voltage` between item
//! categories. Each rule is validated by [`security::SecurityValidator`],
//! parsed into a bounded AST and run by the tree-walking
//! [`expr::Interpreter`]. [`compat`] turns rule outcomes into pair, set and
//! candidate scores, and [`engine::CompatibilityEngine`] ties it together with
//! caching and parallel pair evaluation.

pub mod cache;
pub mod compat;
pub mod config;
pub mod engine;
pub mod expr;
pub mod logging;
pub mod security;
pub mod utils;

pub use config::EngineConfig;
pub use engine::{CompatibilityEngine, EngineError, EngineStats, ExpressionTest};
