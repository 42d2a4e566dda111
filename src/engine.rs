//! Compatibility engine service
//!
//! Owns the security validator and both content-addressed caches, reads
//! items, rules and experiences through the source traits, and fans pair
//! evaluations out onto tokio's blocking pool. Pair results are joined in
//! the order they were spawned, so output does not depend on scheduling.

use crate::cache::{
    content_hash, item_set_key, CacheError, CacheStats, CacheStore, ContentCache, MemoryStore,
    SqliteStore,
};
use crate::compat::matcher::{match_candidate, rank, search_recommendations};
use crate::compat::overall::{aggregate, pair_indices};
use crate::compat::{
    check_pair, CandidateMatch, ExperienceSource, Item, ItemId, ItemSource, OverallVerdict,
    PairVerdict, RuleSource, SearchOutcome, SearchRequest,
};
use crate::config::EngineConfig;
use crate::expr::{EvalContext, EvalError, Interpreter, Value};
use crate::security::{
    AuditAction, AuditRecord, AuditSink, SecurityValidator, SecurityVerdict, TracingAuditSink,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum EngineError {
    #[error("At least {min} distinct items are required, got {got}")]
    TooFewItems { min: usize, got: usize },

    #[error("At most {max} items can be checked at once, got {got}")]
    TooManyItems { max: usize, got: usize },

    #[error("Unknown item ids: {0:?}")]
    UnknownItems(Vec<ItemId>),

    #[error("Cache setup failed: {0}")]
    Cache(String),

    #[error("Evaluation task failed: {0}")]
    Task(String),
}

impl From<CacheError> for EngineError {
    fn from(err: CacheError) -> Self {
        EngineError::Cache(err.to_string())
    }
}

/// Result of trying an expression against ad-hoc bindings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionTest {
    pub verdict: SecurityVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvalError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub security: CacheStats,
    pub results: CacheStats,
}

/// Shared read-only state handed to blocking tasks
#[derive(Clone)]
struct Sources {
    validator: Arc<SecurityValidator>,
    rules: Arc<dyn RuleSource>,
    experiences: Arc<dyn ExperienceSource>,
}

impl Sources {
    fn pair(&self, x: &Item, y: &Item) -> PairVerdict {
        let rules = self.rules.rules_for(&x.category, &y.category);
        let experience = self.experiences.experience_for(x.id, y.id);
        check_pair(&self.validator, x, y, &rules, experience.as_ref())
    }
}

pub struct CompatibilityEngine {
    config: EngineConfig,
    sources: Sources,
    items: Arc<dyn ItemSource>,
    checks: ContentCache<OverallVerdict>,
    searches: ContentCache<SearchOutcome>,
    audit: Arc<dyn AuditSink>,
    permits: Arc<Semaphore>,
}

impl CompatibilityEngine {
    /// Engine over a single catalog providing items, rules and experiences
    pub fn new<C>(config: EngineConfig, catalog: Arc<C>) -> Result<Self, EngineError>
    where
        C: RuleSource + ExperienceSource + ItemSource + 'static,
    {
        Self::with_sources(config, catalog.clone(), catalog.clone(), catalog)
    }

    pub fn with_sources(
        config: EngineConfig,
        rules: Arc<dyn RuleSource>,
        experiences: Arc<dyn ExperienceSource>,
        items: Arc<dyn ItemSource>,
    ) -> Result<Self, EngineError> {
        let (security_store, result_store) = open_stores(&config)?;

        let validator = SecurityValidator::with_cache(
            config.limits,
            ContentCache::new(
                "security",
                security_store,
                Some(config.security_cache_ttl()),
            ),
        );
        let result_ttl = Some(config.result_cache_ttl());
        let checks = ContentCache::new("checks", result_store.clone(), result_ttl);
        let searches = ContentCache::new("searches", result_store, result_ttl);

        tracing::info!(
            "[Engine] Ready: {} parallel pairs, {} cache",
            config.max_parallel_pairs,
            if config.cache_dir.is_some() { "sqlite" } else { "memory" }
        );

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_parallel_pairs.max(1))),
            config,
            sources: Sources {
                validator: Arc::new(validator),
                rules,
                experiences,
            },
            items,
            checks,
            searches,
            audit: Arc::new(TracingAuditSink),
        })
    }

    /// Replace the audit sink
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validator(&self) -> &SecurityValidator {
        &self.sources.validator
    }

    /// Validate an expression and audit the request
    pub fn validate(&self, expression: &str) -> SecurityVerdict {
        let verdict = self.sources.validator.validate(expression);
        self.audit.record(&AuditRecord::new(
            AuditAction::Validate,
            None,
            None,
            Some(expression.to_string()),
            Some(verdict.clone()),
        ));
        verdict
    }

    /// Validate then evaluate `expression` against JSON bindings
    pub fn test_expression(
        &self,
        expression: &str,
        bindings: &serde_json::Map<String, serde_json::Value>,
    ) -> ExpressionTest {
        let outcome = match self.sources.validator.approve(expression) {
            Ok(program) => {
                let verdict = self.sources.validator.validate(expression);
                match Interpreter::new().evaluate(&program, &EvalContext::from_json(bindings)) {
                    Ok(value) => ExpressionTest {
                        verdict,
                        result: Some(value),
                        error: None,
                    },
                    Err(err) => ExpressionTest {
                        verdict,
                        result: None,
                        error: Some(err),
                    },
                }
            }
            Err(verdict) => {
                let error = EvalError::Security(verdict.summary());
                ExpressionTest {
                    verdict,
                    result: None,
                    error: Some(error),
                }
            }
        };

        self.audit.record(&AuditRecord::new(
            AuditAction::Test,
            None,
            None,
            Some(expression.to_string()),
            Some(outcome.verdict.clone()),
        ));
        outcome
    }

    /// Classify and audit a rule change made by an external rule manager
    pub fn record_rule_change(
        &self,
        action: AuditAction,
        rule_id: Option<i64>,
        old_expression: Option<&str>,
        new_expression: Option<&str>,
    ) -> AuditRecord {
        let verdict = new_expression.map(|expr| self.sources.validator.validate(expr));
        let record = AuditRecord::new(
            action,
            rule_id,
            old_expression.map(str::to_string),
            new_expression.map(str::to_string),
            verdict,
        );
        self.audit.record(&record);
        record
    }

    /// Check one pair using the configured rule and experience sources
    pub fn check_pair(&self, x: &Item, y: &Item) -> PairVerdict {
        self.sources.pair(x, y)
    }

    /// Check a set of catalog items by id
    pub async fn check_set(&self, ids: &[ItemId]) -> Result<OverallVerdict, EngineError> {
        let ids = normalize_ids(ids);
        if ids.len() < 2 {
            return Err(EngineError::TooFewItems {
                min: 2,
                got: ids.len(),
            });
        }
        if ids.len() > self.config.max_items_per_check {
            return Err(EngineError::TooManyItems {
                max: self.config.max_items_per_check,
                got: ids.len(),
            });
        }

        let key = item_set_key(&ids);
        if self.config.use_result_cache {
            if let Some(mut verdict) = self.checks.get(&key) {
                tracing::info!("[Engine] Returning cached check for {:?}", ids);
                verdict.cached = true;
                return Ok(verdict);
            }
        }

        let items = self.fetch(&ids)?;
        let verdict = self.check_items(items).await?;

        if self.config.use_result_cache {
            self.checks.put(&key, &verdict);
        }
        tracing::info!(
            "[Engine] Checked {:?}: score {}, {}",
            ids,
            verdict.score,
            verdict.grade
        );
        Ok(verdict)
    }

    /// Check every pair of `items` as given, without caching
    pub async fn check_items(&self, items: Vec<Item>) -> Result<OverallVerdict, EngineError> {
        let items = Arc::new(items);
        let mut tasks: Vec<JoinHandle<PairVerdict>> = Vec::new();

        for (i, j) in pair_indices(items.len()) {
            let permit = self.acquire().await?;
            let sources = self.sources.clone();
            let items = Arc::clone(&items);
            tasks.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                sources.pair(&items[i], &items[j])
            }));
        }

        let mut pairs = Vec::with_capacity(tasks.len());
        for task in tasks {
            pairs.push(task.await.map_err(|e| EngineError::Task(e.to_string()))?);
        }
        Ok(aggregate(pairs, &items))
    }

    /// Rank `pool` against `selected`. Candidates already selected are skipped.
    pub async fn search_candidates(
        &self,
        selected: Vec<Item>,
        pool: Vec<Item>,
        min_score: u32,
        limit: usize,
    ) -> Result<Vec<CandidateMatch>, EngineError> {
        if selected.is_empty() {
            return Err(EngineError::TooFewItems { min: 1, got: 0 });
        }
        let selected_ids: Vec<ItemId> = selected.iter().map(|i| i.id).collect();
        let selected = Arc::new(selected);
        let mut tasks: Vec<JoinHandle<Option<CandidateMatch>>> = Vec::new();

        for candidate in pool.into_iter().filter(|c| !selected_ids.contains(&c.id)) {
            let permit = self.acquire().await?;
            let sources = self.sources.clone();
            let selected = Arc::clone(&selected);
            tasks.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                match_candidate(
                    &sources.validator,
                    &candidate,
                    &selected,
                    sources.rules.as_ref(),
                    sources.experiences.as_ref(),
                )
            }));
        }

        let mut matches = Vec::new();
        for task in tasks {
            if let Some(found) = task.await.map_err(|e| EngineError::Task(e.to_string()))? {
                matches.push(found);
            }
        }
        Ok(rank(matches, min_score, limit))
    }

    /// Search the catalog for items compatible with `request.selected`
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, EngineError> {
        let ids = normalize_ids(&request.selected);
        let selected = self.fetch(&ids)?;

        let mut categories = request.categories.clone();
        categories.sort();
        categories.dedup();

        let key = search_key(&ids, &categories, request.min_score, request.limit);
        if self.config.use_result_cache {
            if let Some(mut outcome) = self.searches.get(&key) {
                tracing::info!("[Engine] Returning cached search for {:?}", ids);
                outcome.cached = true;
                return Ok(outcome);
            }
        }

        let pool = self
            .items
            .candidates(&ids, &categories, self.config.max_candidates);
        let scanned = pool.len();
        let matches = self
            .search_candidates(selected, pool, request.min_score, request.limit)
            .await?;

        let outcome = SearchOutcome {
            total_found: matches.len(),
            recommendations: search_recommendations(&matches),
            matches,
            cached: false,
        };
        if self.config.use_result_cache {
            self.searches.put(&key, &outcome);
        }
        tracing::info!(
            "[Engine] Search for {:?} scanned {} candidates, found {}",
            ids,
            scanned,
            outcome.total_found
        );
        Ok(outcome)
    }

    /// Sweep expired entries from both caches
    pub fn purge_expired(&self) -> usize {
        let security = self
            .sources
            .validator
            .cache()
            .map_or(0, |cache| cache.purge_expired());
        // checks and searches share one store
        security + self.checks.purge_expired()
    }

    pub fn cache_stats(&self) -> EngineStats {
        let security = self
            .sources
            .validator
            .cache()
            .map(|cache| cache.stats())
            .unwrap_or_default();
        let checks = self.checks.stats();
        let searches = self.searches.stats();
        EngineStats {
            security,
            results: CacheStats {
                entries: checks.entries,
                hits: checks.hits + searches.hits,
                misses: checks.misses + searches.misses,
            },
        }
    }

    async fn acquire(&self) -> Result<tokio::sync::OwnedSemaphorePermit, EngineError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Task(e.to_string()))
    }

    fn fetch(&self, ids: &[ItemId]) -> Result<Vec<Item>, EngineError> {
        let mut items = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.items.item(*id) {
                Some(item) => items.push(item),
                None => missing.push(*id),
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::UnknownItems(missing));
        }
        if items.is_empty() {
            return Err(EngineError::TooFewItems { min: 1, got: 0 });
        }
        Ok(items)
    }
}

fn open_stores(
    config: &EngineConfig,
) -> Result<(Arc<dyn CacheStore>, Arc<dyn CacheStore>), EngineError> {
    match &config.cache_dir {
        Some(dir) => Ok((
            Arc::new(SqliteStore::open(dir, "security")?),
            Arc::new(SqliteStore::open(dir, "results")?),
        )),
        None => Ok((Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))),
    }
}

fn normalize_ids(ids: &[ItemId]) -> Vec<ItemId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn search_key(ids: &[ItemId], categories: &[String], min_score: u32, limit: usize) -> String {
    let params = serde_json::json!({
        "search": ids,
        "categories": categories,
        "minScore": min_score,
        "limit": limit,
    });
    content_hash(params.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::{Grade, InMemoryCatalog};
    use crate::security::RiskLevel;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const CATALOG: &str = r#"{
        "items": [
            {"id": 1, "name": "Ryzen 7", "category": "CPU", "properties": {"socket": "AM5", "voltage": 12, "ddr": 5}},
            {"id": 2, "name": "B650", "category": "Motherboard", "properties": {"socket": "AM5", "voltage": 12}},
            {"id": 3, "name": "Z790", "category": "Motherboard", "properties": {"socket": "LGA1700", "voltage": 12}},
            {"id": 4, "name": "DDR5 kit", "category": "Memory", "properties": {"ddr": 5}},
            {"id": 5, "name": "DDR4 kit", "category": "Memory", "properties": {"ddr": 4}},
            {"id": 6, "name": "Case", "category": "Case"}
        ],
        "rules": [
            {"id": 1, "name": "socket", "expression": "a.socket == b.socket",
             "categoryA": "CPU", "categoryB": "Motherboard", "weight": 100, "isBlocking": true},
            {"id": 2, "name": "voltage", "expression": "a.voltage == b.voltage",
             "categoryA": "Motherboard", "categoryB": "CPU", "weight": 50},
            {"id": 3, "name": "memory generation", "expression": "part_a.ddr == part_b.ddr",
             "categoryA": "CPU", "categoryB": "Memory", "weight": 100, "isBlocking": true}
        ],
        "experiences": []
    }"#;

    fn engine(config: EngineConfig) -> CompatibilityEngine {
        let catalog = Arc::new(InMemoryCatalog::from_json(CATALOG).unwrap());
        CompatibilityEngine::new(config, catalog).unwrap()
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<AuditRecord>>);

    impl AuditSink for CollectingSink {
        fn record(&self, record: &AuditRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    #[tokio::test]
    async fn test_check_set_compatible() {
        let engine = engine(EngineConfig::default());
        let verdict = engine.check_set(&[4, 2, 1]).await.unwrap();

        assert!(verdict.compatible);
        assert_eq!(verdict.pairs.len(), 3);
        let order: Vec<(i64, i64)> = verdict.pairs.iter().map(|p| (p.item_a_id, p.item_b_id)).collect();
        assert_eq!(order, vec![(1, 2), (1, 4), (2, 4)]);
        // board/memory has no rules and is theoretical
        assert_eq!(verdict.grade, Grade::Theoretical);
        assert_eq!(verdict.score, 60);
        assert!(!verdict.cached);
    }

    #[tokio::test]
    async fn test_check_set_incompatible() {
        let engine = engine(EngineConfig::default());
        let verdict = engine.check_set(&[1, 3, 5]).await.unwrap();
        assert!(!verdict.compatible);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.grade, Grade::Incompatible);
        assert!(verdict.warnings.contains(&"Blocking rule failed: socket".to_string()));
        assert!(verdict
            .warnings
            .contains(&"Blocking rule failed: memory generation".to_string()));
        assert!(verdict.recommendations[0].starts_with("Found 2 incompatible"));
    }

    #[tokio::test]
    async fn test_check_set_cache_is_transparent() {
        let engine = engine(EngineConfig::default());
        let fresh = engine.check_set(&[1, 2, 6]).await.unwrap();
        let cached = engine.check_set(&[6, 2, 1, 2]).await.unwrap();

        assert!(!fresh.cached);
        assert!(cached.cached);
        let mut expected = fresh.clone();
        expected.cached = true;
        assert_eq!(
            serde_json::to_string(&expected).unwrap(),
            serde_json::to_string(&cached).unwrap()
        );
        assert_eq!(engine.cache_stats().results.hits, 1);
    }

    #[tokio::test]
    async fn test_check_set_errors() {
        let engine = engine(EngineConfig {
            max_items_per_check: 3,
            ..EngineConfig::default()
        });
        assert_eq!(
            engine.check_set(&[1, 1]).await,
            Err(EngineError::TooFewItems { min: 2, got: 1 })
        );
        assert_eq!(
            engine.check_set(&[1, 2, 3, 4]).await,
            Err(EngineError::TooManyItems { max: 3, got: 4 })
        );
        assert_eq!(
            engine.check_set(&[1, 99, 98]).await,
            Err(EngineError::UnknownItems(vec![98, 99]))
        );
    }

    #[tokio::test]
    async fn test_search_ranks_and_caches() {
        let engine = engine(EngineConfig::default());
        let request = SearchRequest::new(vec![1]);

        let fresh = engine.search(&request).await.unwrap();
        let ids: Vec<i64> = fresh.matches.iter().map(|m| m.item_id).collect();
        // 3 fails the socket rule and 5 the memory rule; 6 has no rules
        assert_eq!(ids, vec![2, 4, 6]);
        assert_eq!(fresh.total_found, 3);
        assert_eq!(fresh.matches[0].score, 100);
        assert_eq!(fresh.matches[2].score, 60);
        assert!(!fresh.cached);

        let cached = engine.search(&request).await.unwrap();
        assert!(cached.cached);
        assert_eq!(cached.matches, fresh.matches);
        assert_eq!(cached.recommendations, fresh.recommendations);

        let filtered = engine
            .search(&SearchRequest {
                categories: vec!["Memory".into()],
                ..SearchRequest::new(vec![1])
            })
            .await
            .unwrap();
        assert!(!filtered.cached);
        assert_eq!(filtered.matches.len(), 1);
        assert_eq!(filtered.matches[0].item_id, 4);
    }

    #[tokio::test]
    async fn test_cached_search_matches_fresh_json() {
        let catalog = r#"{
            "items": [
                {"id": 1, "name": "Tower", "category": "Case", "properties": {"slots": 4}},
                {"id": 2, "name": "Fan A", "category": "Fan", "properties": {"size": 120}},
                {"id": 3, "name": "Fan B", "category": "Fan", "properties": {"size": 120}},
                {"id": 4, "name": "Fan C", "category": "Fan", "properties": {"size": 140}},
                {"id": 5, "name": "Fan D", "category": "Fan", "properties": {"size": 140}}
            ],
            "rules": [
                {"id": 1, "name": "mount", "expression": "a.slots > 0",
                 "categoryA": "Case", "categoryB": "Fan", "weight": 10},
                {"id": 2, "name": "size", "expression": "b.size in [120, 140]",
                 "categoryA": "Case", "categoryB": "Fan", "weight": 10}
            ]
        }"#;
        let catalog = Arc::new(InMemoryCatalog::from_json(catalog).unwrap());
        let engine = CompatibilityEngine::new(EngineConfig::default(), catalog).unwrap();
        let request = SearchRequest::new(vec![2, 3, 4, 5]);

        let mut fresh = engine.search(&request).await.unwrap();
        assert_eq!(fresh.matches.len(), 1);
        // eight passed rules and four selected items
        assert_eq!(fresh.matches[0].confidence, 0.95);

        let cached = engine.search(&request).await.unwrap();
        assert!(cached.cached);
        fresh.cached = true;
        assert_eq!(
            serde_json::to_string(&fresh).unwrap(),
            serde_json::to_string(&cached).unwrap()
        );
        assert_eq!(fresh, cached);
    }

    #[tokio::test]
    async fn test_search_candidates_with_explicit_pool() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        let engine = engine(EngineConfig::default());
        let selected = vec![catalog.item(1).unwrap()];
        let pool: Vec<Item> = [1, 2, 3].iter().filter_map(|id| catalog.item(*id)).collect();

        let matches = engine.search_candidates(selected, pool, 50, 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item_id, 2);
        assert!(engine.search_candidates(Vec::new(), Vec::new(), 50, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_sqlite_backed_engine() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        let first = engine(config.clone()).check_set(&[1, 2]).await.unwrap();

        // a new engine on the same directory sees the stored result
        let second = engine(config).check_set(&[1, 2]).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.score, second.score);
        assert!(dir.path().join("compat_cache.db").exists());
    }

    #[test]
    fn test_expression_testing_and_audit() {
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(EngineConfig::default()).with_audit_sink(sink.clone());

        let bindings = serde_json::json!({"a": {"v": 2}, "b": {"v": 3}});
        let bindings = bindings.as_object().cloned().unwrap_or_default();

        let ok = engine.test_expression("a.v * b.v", &bindings);
        assert!(ok.verdict.is_safe);
        assert_eq!(ok.result, Some(Value::Int(6)));

        let missing = engine.test_expression("a.w", &bindings);
        assert!(matches!(missing.error, Some(EvalError::Attribute(_))));

        let blocked = engine.test_expression("__import__('os')", &bindings);
        assert!(!blocked.verdict.is_safe);
        assert!(matches!(blocked.error, Some(EvalError::Security(_))));

        let record = engine.record_rule_change(AuditAction::Update, Some(3), Some("a.v"), Some("a.w"));
        assert_eq!(record.risk_level, RiskLevel::Medium);
        let verdict = engine.validate("eval(1)");
        assert!(!verdict.is_safe);

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[2].risk_level, RiskLevel::High);
        assert_eq!(records[4].action, AuditAction::Validate);
        assert_eq!(records[4].risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_purge_and_stats() {
        let engine = engine(EngineConfig {
            security_cache_ttl_hours: 0,
            result_cache_ttl_hours: 0,
            ..EngineConfig::default()
        });
        engine.check_set(&[1, 2]).await.unwrap();
        let again = engine.check_set(&[1, 2]).await.unwrap();
        // a zero lifetime never serves a hit
        assert!(!again.cached);

        let stats = engine.cache_stats();
        assert_eq!(stats.results.hits, 0);
        assert!(stats.security.misses >= 1);
        engine.purge_expired();
        assert_eq!(engine.cache_stats().results.entries, 0);
        assert_eq!(engine.cache_stats().security.entries, 0);
    }
}
