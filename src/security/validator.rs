//! Static security validation of rule expressions
//!
//! Two independent passes run over every expression:
//! 1. a case-insensitive text scan for dangerous patterns, applied to the raw
//!    source whether or not it parses
//! 2. a walk over the parsed tree checking every call and attribute access
//!
//! Verdicts are cached by case-folded expression text. Each entry keeps the
//! exact normalized source it was computed for, since parsing is
//! case-sensitive, and any other spelling is rescanned.

use crate::cache::{expression_key, normalize_expression, ContentCache};
use crate::expr::builtins::{is_allowed_function, is_dunder, is_forbidden_attribute, is_forbidden_function};
use crate::expr::{parse, ExpressionLimits, Expr, ParseError, Program};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Text patterns that are rejected wherever they appear
const DANGEROUS_PATTERNS: &[&str] = &[
    r"__.*__",       // double-underscore names
    r"eval\s*\(",    // eval call
    r"exec\s*\(",    // exec call
    r"import\s+",    // import statement
    r"subprocess",   // subprocess module
    r"os\.system",   // os.system call
    r"open\s*\(",    // file open
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ForbiddenNode,
    ForbiddenFunction,
    UnauthorizedFunction,
    DangerousAttribute,
    DunderAttribute,
    DangerousPattern,
    SyntaxError,
    ResourceLimit,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::ForbiddenNode => "forbidden_node",
            IssueKind::ForbiddenFunction => "forbidden_function",
            IssueKind::UnauthorizedFunction => "unauthorized_function",
            IssueKind::DangerousAttribute => "dangerous_attribute",
            IssueKind::DunderAttribute => "dunder_attribute",
            IssueKind::DangerousPattern => "dangerous_pattern",
            IssueKind::SyntaxError => "syntax_error",
            IssueKind::ResourceLimit => "resource_limit",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// One finding from validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityIssue {
    pub kind: IssueKind,
    pub message: String,
    pub severity: Severity,
    /// Offending name, pattern or construct
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Byte offset into the source, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl SecurityIssue {
    fn high(kind: IssueKind, message: String, detail: Option<String>, offset: Option<usize>) -> Self {
        Self {
            kind,
            message,
            severity: Severity::High,
            detail,
            offset,
        }
    }
}

/// Outcome of validating one expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityVerdict {
    pub is_safe: bool,
    pub issues: Vec<SecurityIssue>,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

impl SecurityVerdict {
    fn from_issues(issues: Vec<SecurityIssue>) -> Self {
        let risk_level = classify_risk(&issues);
        let recommendations = recommendations_for(&issues);
        Self {
            is_safe: !issues.iter().any(|i| i.severity == Severity::High),
            issues,
            risk_level,
            recommendations,
        }
    }

    pub fn high_severity_issues(&self) -> impl Iterator<Item = &SecurityIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::High)
    }

    /// One-line summary of the blocking issues
    pub fn summary(&self) -> String {
        let messages: Vec<&str> = self
            .high_severity_issues()
            .map(|i| i.message.as_str())
            .collect();
        if messages.is_empty() {
            format!("risk {}", self.risk_level)
        } else {
            messages.join("; ")
        }
    }
}

fn classify_risk(issues: &[SecurityIssue]) -> RiskLevel {
    let high = issues.iter().filter(|i| i.severity == Severity::High).count();
    let medium = issues.iter().filter(|i| i.severity == Severity::Medium).count();

    if high > 0 {
        RiskLevel::High
    } else if medium > 2 || !issues.is_empty() {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn recommendations_for(issues: &[SecurityIssue]) -> Vec<String> {
    let kinds: HashSet<IssueKind> = issues.iter().map(|i| i.kind).collect();
    let mut out = Vec::new();

    if kinds.contains(&IssueKind::ForbiddenFunction) {
        out.push("Remove forbidden function calls and use the allowed safe functions".to_string());
    }
    if kinds.contains(&IssueKind::DangerousPattern) {
        out.push("Avoid dangerous text patterns such as double-underscore names, eval, exec, import and open".to_string());
    }
    if kinds.contains(&IssueKind::ForbiddenNode) {
        out.push("Simplify the expression to comparisons, arithmetic and boolean logic".to_string());
    }
    if kinds.contains(&IssueKind::UnauthorizedFunction) {
        out.push("Only call predefined safe functions".to_string());
    }
    if kinds.contains(&IssueKind::DangerousAttribute) || kinds.contains(&IssueKind::DunderAttribute) {
        out.push("Read item properties only; reflective attributes are blocked".to_string());
    }
    if kinds.contains(&IssueKind::SyntaxError) {
        out.push("Fix the expression syntax".to_string());
    }
    if kinds.contains(&IssueKind::ResourceLimit) {
        out.push("Shorten or flatten the expression to stay within size limits".to_string());
    }
    if out.is_empty() {
        out.push("Expression looks safe".to_string());
    }
    out
}

/// Cached verdict together with the normalized source it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedVerdict {
    pub source: String,
    pub verdict: SecurityVerdict,
}

/// Validates expressions against the sandbox rules
pub struct SecurityValidator {
    limits: ExpressionLimits,
    patterns: Vec<(&'static str, Regex)>,
    cache: Option<ContentCache<CachedVerdict>>,
}

impl SecurityValidator {
    pub fn new(limits: ExpressionLimits) -> Self {
        let patterns = DANGEROUS_PATTERNS
            .iter()
            .filter_map(|pattern| {
                if let Ok(regex) = Regex::new(&format!("(?i){}", pattern)) {
                    Some((*pattern, regex))
                } else {
                    tracing::warn!("[Validator] Skipping invalid pattern '{}'", pattern);
                    None
                }
            })
            .collect();

        Self {
            limits,
            patterns,
            cache: None,
        }
    }

    /// Validator whose verdicts are memoized in `cache`
    pub fn with_cache(limits: ExpressionLimits, cache: ContentCache<CachedVerdict>) -> Self {
        Self {
            cache: Some(cache),
            ..Self::new(limits)
        }
    }

    pub fn limits(&self) -> &ExpressionLimits {
        &self.limits
    }

    pub fn cache(&self) -> Option<&ContentCache<CachedVerdict>> {
        self.cache.as_ref()
    }

    /// Validate `expression`, consulting the verdict cache first
    pub fn validate(&self, expression: &str) -> SecurityVerdict {
        let Some(cache) = &self.cache else {
            return self.scan(expression);
        };

        let key = expression_key(expression);
        let source = normalize_expression(expression);
        if let Some(cached) = cache.get(&key) {
            if cached.source == source {
                return cached.verdict;
            }
            tracing::debug!("[Validator] Cached verdict is for another spelling, rescanning");
        }
        let verdict = self.scan(expression);
        cache.put(
            &key,
            &CachedVerdict {
                source,
                verdict: verdict.clone(),
            },
        );
        verdict
    }

    /// Validate `expression` without touching the cache
    pub fn scan(&self, expression: &str) -> SecurityVerdict {
        let mut issues = self.pattern_issues(expression);

        match parse(expression, &self.limits) {
            Ok(program) => issues.extend(tree_issues(program.root())),
            Err(err) => issues.push(parse_issue(err)),
        }

        let verdict = SecurityVerdict::from_issues(issues);
        if !verdict.is_safe {
            tracing::info!(
                "[Validator] Rejected expression ({} issues, risk {})",
                verdict.issues.len(),
                verdict.risk_level
            );
        } else {
            tracing::debug!("[Validator] Accepted expression, risk {}", verdict.risk_level);
        }
        verdict
    }

    /// Validate and parse in one step. A safe verdict yields the parsed program.
    pub fn approve(&self, expression: &str) -> Result<Program, SecurityVerdict> {
        let verdict = self.validate(expression);
        if !verdict.is_safe {
            return Err(verdict);
        }
        parse(expression, &self.limits).map_err(|_| self.scan(expression))
    }

    pub fn check_syntax(&self, expression: &str) -> Result<(), ParseError> {
        crate::expr::check_syntax(expression, &self.limits)
    }

    /// Sorted root names referenced by `expression`, builtins excluded
    pub fn expression_dependencies(&self, expression: &str) -> Result<Vec<String>, ParseError> {
        let program = parse(expression, &self.limits)?;
        let mut names = BTreeSet::new();
        program.root().walk(&mut |node| {
            if let Expr::Name { id } = node {
                if !is_allowed_function(id) {
                    names.insert(id.clone());
                }
            }
        });
        Ok(names.into_iter().collect())
    }

    fn pattern_issues(&self, expression: &str) -> Vec<SecurityIssue> {
        let mut issues = Vec::new();
        for (pattern, regex) in &self.patterns {
            for found in regex.find_iter(expression) {
                let text = found.as_str().to_lowercase();
                issues.push(SecurityIssue::high(
                    IssueKind::DangerousPattern,
                    format!("Dangerous pattern found: {}", text.trim_end()),
                    Some((*pattern).to_string()),
                    Some(found.start()),
                ));
            }
        }
        issues
    }
}

fn parse_issue(err: ParseError) -> SecurityIssue {
    match err {
        ParseError::Syntax { offset, message } => SecurityIssue::high(
            IssueKind::SyntaxError,
            format!("Syntax error: {}", message),
            None,
            Some(offset),
        ),
        ParseError::Forbidden { offset, construct } => SecurityIssue::high(
            IssueKind::ForbiddenNode,
            format!("Forbidden syntax: {}", construct),
            Some(construct),
            Some(offset),
        ),
        ParseError::LimitExceeded { limit, actual, max } => SecurityIssue::high(
            IssueKind::ResourceLimit,
            format!("Expression exceeds {} limit ({} > {})", limit, actual, max),
            Some(limit),
            None,
        ),
    }
}

fn tree_issues(root: &Expr) -> Vec<SecurityIssue> {
    let mut issues = Vec::new();
    root.walk(&mut |node| match node {
        Expr::Call { func, .. } => issues.extend(call_issue(func)),
        Expr::Attribute { attr, .. } => issues.extend(attribute_issues(attr)),
        Expr::Constant { .. }
        | Expr::Name { .. }
        | Expr::Subscript { .. }
        | Expr::Unary { .. }
        | Expr::Binary { .. }
        | Expr::BoolOp { .. }
        | Expr::Compare { .. }
        | Expr::IfExp { .. }
        | Expr::List { .. }
        | Expr::Tuple { .. }
        | Expr::Set { .. }
        | Expr::Dict { .. } => {}
    });
    issues
}

fn call_issue(func: &Expr) -> Option<SecurityIssue> {
    let Some(name) = func.callee_name() else {
        return Some(SecurityIssue {
            kind: IssueKind::UnauthorizedFunction,
            message: format!("Unauthorized dynamic call through {}", func.kind()),
            severity: Severity::Medium,
            detail: None,
            offset: None,
        });
    };
    let name = name.to_lowercase();

    if is_forbidden_function(&name) {
        Some(SecurityIssue::high(
            IssueKind::ForbiddenFunction,
            format!("Forbidden function call: {}", name),
            Some(name),
            None,
        ))
    } else if !is_allowed_function(&name) || matches!(func, Expr::Attribute { .. }) {
        Some(SecurityIssue {
            kind: IssueKind::UnauthorizedFunction,
            message: format!("Unauthorized function call: {}", name),
            severity: Severity::Medium,
            detail: Some(name),
            offset: None,
        })
    } else {
        None
    }
}

fn attribute_issues(attr: &str) -> Vec<SecurityIssue> {
    let name = attr.to_lowercase();
    let mut issues = Vec::new();
    if is_forbidden_attribute(&name) {
        issues.push(SecurityIssue::high(
            IssueKind::DangerousAttribute,
            format!("Forbidden attribute access: {}", name),
            Some(name.clone()),
            None,
        ));
    }
    if is_dunder(&name) {
        issues.push(SecurityIssue::high(
            IssueKind::DunderAttribute,
            format!("Special attribute access: {}", name),
            Some(name),
            None,
        ));
    }
    issues
}
