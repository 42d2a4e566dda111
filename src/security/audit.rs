//! Audit records for rule operations
//!
//! The engine classifies each rule operation and hands an [`AuditRecord`] to
//! an [`AuditSink`]. Storage and querying of audit history belong to the sink.

use super::validator::{RiskLevel, SecurityVerdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Test,
    Validate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Test => "test",
            AuditAction::Validate => "validate",
        }
    }
}

/// Risk of a rule operation, given the expression change and its verdict
pub fn operation_risk(
    action: AuditAction,
    old_expression: Option<&str>,
    new_expression: Option<&str>,
    verdict: Option<&SecurityVerdict>,
) -> RiskLevel {
    if action == AuditAction::Delete {
        return RiskLevel::High;
    }
    if verdict.is_some_and(|v| !v.is_safe) {
        return RiskLevel::High;
    }
    match action {
        AuditAction::Update if old_expression != new_expression => RiskLevel::Medium,
        AuditAction::Create => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub action: AuditAction,
    pub rule_id: Option<i64>,
    pub old_expression: Option<String>,
    pub new_expression: Option<String>,
    pub verdict: Option<SecurityVerdict>,
    pub risk_level: RiskLevel,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        action: AuditAction,
        rule_id: Option<i64>,
        old_expression: Option<String>,
        new_expression: Option<String>,
        verdict: Option<SecurityVerdict>,
    ) -> Self {
        let risk_level = operation_risk(
            action,
            old_expression.as_deref(),
            new_expression.as_deref(),
            verdict.as_ref(),
        );
        Self {
            action,
            rule_id,
            old_expression,
            new_expression,
            verdict,
            risk_level,
            recorded_at: Utc::now(),
        }
    }
}

/// Receives audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Emits each record as a structured tracing event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let issues = record.verdict.as_ref().map_or(0, |v| v.issues.len());
        if record.risk_level == RiskLevel::High {
            tracing::warn!(
                action = record.action.as_str(),
                rule_id = record.rule_id,
                risk = %record.risk_level,
                issues,
                "[Audit] High-risk rule operation"
            );
        } else {
            tracing::info!(
                action = record.action.as_str(),
                rule_id = record.rule_id,
                risk = %record.risk_level,
                issues,
                "[Audit] Rule operation"
            );
        }
    }
}
