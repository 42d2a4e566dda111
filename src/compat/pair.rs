//! Pair aggregation: rules and experience for one item pair into one verdict

use super::model::{
    Experience, ExperienceStatus, Grade, Item, PairVerdict, RecordSource, Rule, RuleOutcome,
    VerificationStatus,
};
use super::rules::evaluate_rule;
use crate::security::SecurityValidator;

/// Score when no rule or experience says anything about a pair
pub const DEFAULT_SCORE: u32 = 60;

/// Ceiling for pairs recorded as incompatible
pub const INCOMPATIBLE_SCORE_CAP: u32 = 30;

/// Check one pair.
///
/// Rules whose categories do not match the pair in either order, or that are
/// inactive, are skipped. An experience for the pair decides the score; the
/// rules are still evaluated and reported alongside it.
pub fn check_pair(
    validator: &SecurityValidator,
    x: &Item,
    y: &Item,
    rules: &[Rule],
    experience: Option<&Experience>,
) -> PairVerdict {
    let outcomes: Vec<RuleOutcome> = rules
        .iter()
        .filter(|rule| rule.is_active && rule.applies_to(&x.category, &y.category))
        .map(|rule| evaluate_rule(validator, rule, x, y))
        .collect();

    let (score, grade, compatible) = match experience {
        Some(exp) => experience_score(exp),
        None => rule_score(&outcomes),
    };
    let warnings = pair_warnings(&outcomes, experience);

    tracing::debug!(
        "[Pair] ({}, {}) -> {} ({}), {} rules",
        x.id,
        y.id,
        score,
        grade,
        outcomes.len()
    );

    PairVerdict {
        item_a_id: x.id,
        item_b_id: y.id,
        item_a_name: x.name.clone(),
        item_b_name: y.name.clone(),
        grade,
        score,
        compatible,
        rule_outcomes: outcomes,
        experience: experience.cloned(),
        warnings,
    }
}

fn experience_score(exp: &Experience) -> (u32, Grade, bool) {
    match exp.status {
        ExperienceStatus::Compatible => {
            let grade = if exp.source == RecordSource::Official {
                Grade::OfficialSupport
            } else {
                Grade::UnofficialSupport
            };
            (exp.score.unwrap_or(grade.nominal_score()).min(100), grade, true)
        }
        ExperienceStatus::Conditional => {
            let grade = Grade::Theoretical;
            (exp.score.unwrap_or(grade.nominal_score()).min(100), grade, true)
        }
        ExperienceStatus::Incompatible => (
            exp.score.unwrap_or(0).min(INCOMPATIBLE_SCORE_CAP),
            Grade::Incompatible,
            false,
        ),
    }
}

fn rule_score(outcomes: &[RuleOutcome]) -> (u32, Grade, bool) {
    if outcomes.is_empty() {
        return (DEFAULT_SCORE, Grade::Theoretical, true);
    }
    if outcomes.iter().any(|o| o.is_blocking && !o.passed) {
        return (0, Grade::Incompatible, false);
    }

    let total_weight: u64 = outcomes.iter().map(|o| u64::from(o.weight)).sum();
    if total_weight == 0 {
        return (DEFAULT_SCORE, Grade::Theoretical, true);
    }
    let earned: u64 = outcomes.iter().map(|o| u64::from(o.score_contribution)).sum();
    let score = (100.0 * earned as f64 / total_weight as f64).round().clamp(0.0, 100.0) as u32;

    (score, Grade::from_score(score), score >= 50)
}

fn pair_warnings(outcomes: &[RuleOutcome], experience: Option<&Experience>) -> Vec<String> {
    let mut warnings: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.passed)
        .map(|o| {
            if o.is_blocking {
                format!("Blocking rule failed: {}", o.rule_name)
            } else {
                format!("Advisory rule failed: {}", o.rule_name)
            }
        })
        .collect();

    if experience.is_some_and(|e| e.verification_status == VerificationStatus::Disputed) {
        warnings.push("This compatibility record is disputed; use with caution".to_string());
    }
    warnings
}
