//! Engine configuration
//!
//! Defaults, overridable from the environment (and a `.env` file) through
//! `COMPAT_*` variables.

use crate::expr::ExpressionLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Longest accepted cache lifetime, one year
pub const MAX_CACHE_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Lifetime of cached security verdicts, applied on read and by the sweep
    pub security_cache_ttl_hours: i64,
    pub result_cache_ttl_hours: i64,
    /// Largest item set accepted by a check (at least 2)
    pub max_items_per_check: usize,
    /// Candidates scanned per search
    pub max_candidates: usize,
    pub max_parallel_pairs: usize,
    /// When set, both caches persist to SQLite in this directory
    pub cache_dir: Option<PathBuf>,
    pub limits: ExpressionLimits,
    pub use_result_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            security_cache_ttl_hours: 24,
            result_cache_ttl_hours: 24,
            max_items_per_check: 10,
            max_candidates: 1000,
            max_parallel_pairs: num_cpus::get().max(1),
            cache_dir: None,
            limits: ExpressionLimits::default(),
            use_result_cache: true,
        }
    }
}

impl EngineConfig {
    pub fn security_cache_ttl(&self) -> chrono::Duration {
        cache_ttl(self.security_cache_ttl_hours)
    }

    pub fn result_cache_ttl(&self) -> chrono::Duration {
        cache_ttl(self.result_cache_ttl_hours)
    }

    /// Load `.env` if present, then read `COMPAT_*` variables
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("[Config] Loaded {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from defaults overridden by `lookup(name)` for each variable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let config = Self {
            security_cache_ttl_hours: parse_var(
                &lookup,
                "COMPAT_SECURITY_CACHE_TTL_HOURS",
                defaults.security_cache_ttl_hours,
            )
            .clamp(0, MAX_CACHE_TTL_HOURS),
            result_cache_ttl_hours: parse_var(
                &lookup,
                "COMPAT_RESULT_CACHE_TTL_HOURS",
                defaults.result_cache_ttl_hours,
            )
            .clamp(0, MAX_CACHE_TTL_HOURS),
            max_items_per_check: parse_var(&lookup, "COMPAT_MAX_ITEMS", defaults.max_items_per_check)
                .max(2),
            max_candidates: parse_var(&lookup, "COMPAT_MAX_CANDIDATES", defaults.max_candidates),
            max_parallel_pairs: parse_var(
                &lookup,
                "COMPAT_MAX_PARALLEL_PAIRS",
                defaults.max_parallel_pairs,
            )
            .max(1),
            cache_dir: lookup("COMPAT_CACHE_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            limits: ExpressionLimits {
                max_source_len: parse_var(
                    &lookup,
                    "COMPAT_MAX_SOURCE_LEN",
                    defaults.limits.max_source_len,
                ),
                max_depth: parse_var(&lookup, "COMPAT_MAX_DEPTH", defaults.limits.max_depth),
                max_nodes: parse_var(&lookup, "COMPAT_MAX_NODES", defaults.limits.max_nodes),
            },
            use_result_cache: parse_var(
                &lookup,
                "COMPAT_USE_RESULT_CACHE",
                defaults.use_result_cache,
            ),
        };
        tracing::debug!("[Config] {:?}", config);
        config
    }
}

fn cache_ttl(hours: i64) -> chrono::Duration {
    chrono::Duration::hours(hours.clamp(0, MAX_CACHE_TTL_HOURS))
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("[Config] Ignoring unparsable {}={:?}", name, raw);
            default
        }
    }
}
