//! Candidate matching: rank a pool of items against an already-selected set

use super::model::{CandidateMatch, Grade, Item};
use super::pair::check_pair;
use super::source::{ExperienceSource, RuleSource};
use crate::security::SecurityValidator;
use std::cmp::Ordering;

/// Pairs scoring below this reject the candidate outright
pub const MIN_PAIR_SCORE: u32 = 50;

/// Confidence in a match: base 0.5, plus experience, rule and set-size bonuses.
///
/// Rounded to two decimals so stored and fresh results serialize the same.
pub fn confidence(experience_based: bool, passed_rules: usize, selected_count: usize) -> f64 {
    let mut confidence = 0.5;
    if experience_based {
        confidence += 0.3;
    }
    confidence += (0.05 * passed_rules as f64).min(0.3);
    confidence += (0.05 * selected_count.saturating_sub(1) as f64).min(0.2);
    (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// Score `candidate` against every selected item.
///
/// Returns None when any pair scores below [`MIN_PAIR_SCORE`].
pub fn match_candidate(
    validator: &SecurityValidator,
    candidate: &Item,
    selected: &[Item],
    rules: &dyn RuleSource,
    experiences: &dyn ExperienceSource,
) -> Option<CandidateMatch> {
    if selected.is_empty() {
        return None;
    }

    let mut scores = Vec::with_capacity(selected.len());
    let mut passed_rules = 0;
    let mut experience_based = false;

    for item in selected {
        let applicable = rules.rules_for(&candidate.category, &item.category);
        let experience = experiences.experience_for(candidate.id, item.id);
        let verdict = check_pair(validator, candidate, item, &applicable, experience.as_ref());

        scores.push(verdict.score);
        passed_rules += verdict.passed_rules();
        experience_based |= verdict.experience.is_some();
    }

    if scores.iter().any(|s| *s < MIN_PAIR_SCORE) {
        tracing::debug!("[Matcher] Rejected candidate {}", candidate.id);
        return None;
    }

    let score = scores.iter().map(|s| u64::from(*s)).sum::<u64>() / scores.len() as u64;
    let score = score as u32;

    let mut reasons = Vec::new();
    if experience_based {
        reasons.push("Backed by recorded compatibility experience".to_string());
    }
    if passed_rules > 0 {
        reasons.push(format!("Passed {} compatibility rule(s)", passed_rules));
    }
    if reasons.is_empty() {
        reasons.push("Theoretically compatible; verify before use".to_string());
    }

    Some(CandidateMatch {
        item_id: candidate.id,
        item_name: candidate.name.clone(),
        category: candidate.category.clone(),
        score,
        grade: Grade::from_score(score),
        matching_rules: passed_rules,
        experience_based,
        confidence: confidence(experience_based, passed_rules, selected.len()),
        reasons,
    })
}

/// Keep matches at or above `min_score`, best first, at most `limit`.
///
/// Order: score descending, confidence descending, id ascending.
pub fn rank(mut matches: Vec<CandidateMatch>, min_score: u32, limit: usize) -> Vec<CandidateMatch> {
    matches.retain(|m| m.score >= min_score);
    matches.sort_by(|x, y| {
        y.score
            .cmp(&x.score)
            .then_with(|| y.confidence.partial_cmp(&x.confidence).unwrap_or(Ordering::Equal))
            .then_with(|| x.item_id.cmp(&y.item_id))
    });
    matches.truncate(limit);
    matches
}

pub fn search_recommendations(matches: &[CandidateMatch]) -> Vec<String> {
    let mut out = Vec::new();
    if matches.is_empty() {
        out.push("No compatible items found. Consider:".to_string());
        out.push("1. Lowering the minimum compatibility score".to_string());
        out.push("2. Completing the properties of the selected items".to_string());
        out.push("3. Replacing some of the selected items".to_string());
    } else if matches.len() < 5 {
        out.push("Few compatible items found; widen the search or relax the filters".to_string());
    }

    let top = matches.iter().filter(|m| m.score >= 90).count();
    if top > 0 {
        out.push(format!("The top {} match(es) are highly compatible", top));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::source::InMemoryCatalog;
    use crate::compat::ItemSource;
    use crate::expr::ExpressionLimits;

    const CATALOG: &str = r#"{
        "items": [
            {"id": 1, "name": "Ryzen", "category": "CPU", "properties": {"socket": "AM5", "ddr": 5}},
            {"id": 2, "name": "B650", "category": "Motherboard", "properties": {"socket": "AM5"}},
            {"id": 3, "name": "Z790", "category": "Motherboard", "properties": {"socket": "LGA1700"}},
            {"id": 4, "name": "X670", "category": "Motherboard", "properties": {"socket": "AM5"}},
            {"id": 5, "name": "DDR5 kit", "category": "Memory", "properties": {"ddr": 5}}
        ],
        "rules": [
            {"id": 1, "name": "socket", "expression": "a.socket == b.socket",
             "categoryA": "CPU", "categoryB": "Motherboard", "weight": 100, "isBlocking": true},
            {"id": 2, "name": "ddr", "expression": "a.ddr == b.ddr",
             "categoryA": "Memory", "categoryB": "CPU", "weight": 100}
        ],
        "experiences": [
            {"itemAId": 4, "itemBId": 1, "status": "compatible", "score": 100, "source": "official"}
        ]
    }"#;

    fn find(catalog: &InMemoryCatalog, id: i64) -> Item {
        catalog.item(id).unwrap()
    }

    #[test]
    fn test_confidence_formula() {
        assert!((confidence(false, 0, 1) - 0.5).abs() < 1e-9);
        assert!((confidence(true, 2, 1) - 0.9).abs() < 1e-9);
        assert!((confidence(false, 100, 100) - 1.0).abs() < 1e-9);
        assert!((confidence(false, 1, 3) - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_survives_json() {
        for experience_based in [false, true] {
            for passed in 0..10 {
                for selected in 1..8 {
                    let value = confidence(experience_based, passed, selected);
                    let json = serde_json::to_string(&value).unwrap();
                    let back: f64 = serde_json::from_str(&json).unwrap();
                    assert_eq!(value.to_bits(), back.to_bits(), "{}", json);
                }
            }
        }
        assert_eq!(serde_json::to_string(&confidence(false, 6, 4)).unwrap(), "0.95");
    }

    #[test]
    fn test_match_and_reject() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        let v = SecurityValidator::new(ExpressionLimits::default());
        let selected = [find(&catalog, 1)];

        let good = match_candidate(&v, &find(&catalog, 2), &selected, &catalog, &catalog).unwrap();
        assert_eq!(good.score, 100);
        assert_eq!(good.matching_rules, 1);
        assert!(!good.experience_based);
        assert_eq!(good.reasons, vec!["Passed 1 compatibility rule(s)"]);

        assert!(match_candidate(&v, &find(&catalog, 3), &selected, &catalog, &catalog).is_none());

        let backed = match_candidate(&v, &find(&catalog, 4), &selected, &catalog, &catalog).unwrap();
        assert!(backed.experience_based);
        assert_eq!(backed.grade, Grade::OfficialSupport);
        assert!(backed.confidence > good.confidence);

        let memory = match_candidate(&v, &find(&catalog, 5), &selected, &catalog, &catalog).unwrap();
        assert_eq!(memory.score, 100);
    }

    #[test]
    fn test_rank_order_and_limit() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        let v = SecurityValidator::new(ExpressionLimits::default());
        let selected = [find(&catalog, 1)];
        let matches: Vec<_> = catalog
            .candidates(&[1], &[], 100)
            .iter()
            .filter_map(|c| match_candidate(&v, c, &selected, &catalog, &catalog))
            .collect();

        let ranked = rank(matches.clone(), 50, 10);
        let ids: Vec<i64> = ranked.iter().map(|m| m.item_id).collect();
        // 4 has experience-backed confidence; 2 and 5 tie and fall back to id
        assert_eq!(ids, vec![4, 2, 5]);

        assert_eq!(rank(matches.clone(), 50, 1).len(), 1);
        assert!(rank(matches, 101, 10).is_empty());
    }

    #[test]
    fn test_search_recommendations() {
        let none = search_recommendations(&[]);
        assert_eq!(none.len(), 4);

        let m = CandidateMatch {
            item_id: 1,
            item_name: "x".into(),
            category: "c".into(),
            score: 95,
            grade: Grade::OfficialSupport,
            matching_rules: 0,
            experience_based: false,
            confidence: 0.5,
            reasons: Vec::new(),
        };
        let recs = search_recommendations(&[m]);
        assert_eq!(recs.len(), 2);
        assert!(recs[1].contains("top 1"));
    }
}
