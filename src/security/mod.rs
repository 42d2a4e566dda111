//! Expression security: static validation and audit classification

pub mod audit;
pub mod validator;

pub use audit::{operation_risk, AuditAction, AuditRecord, AuditSink, TracingAuditSink};
pub use validator::{
    CachedVerdict, IssueKind, RiskLevel, SecurityIssue, SecurityValidator, SecurityVerdict, Severity,
};
