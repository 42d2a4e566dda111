//! Overall aggregation across every pair of a requested item set

use super::model::{Grade, Item, OverallVerdict, PairVerdict};
use std::collections::HashSet;

/// Index pairs (i, j) with i < j, in lexicographic order
pub fn pair_indices(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect()
}

/// Combine pair verdicts into one result. `pairs` keeps its given order.
pub fn aggregate(pairs: Vec<PairVerdict>, items: &[Item]) -> OverallVerdict {
    let (score, grade, compatible) = overall_score(&pairs);
    let warnings = dedup_warnings(&pairs);
    let recommendations = recommendations(&pairs, items);

    OverallVerdict {
        grade,
        score,
        compatible,
        pairs,
        warnings,
        recommendations,
        cached: false,
    }
}

fn overall_score(pairs: &[PairVerdict]) -> (u32, Grade, bool) {
    if pairs.is_empty() {
        return (100, Grade::OfficialSupport, true);
    }

    if let Some(min) = pairs.iter().filter(|p| !p.compatible).map(|p| p.score).min() {
        return (min, Grade::Incompatible, false);
    }

    let mean = pairs.iter().map(|p| u64::from(p.score)).sum::<u64>() / pairs.len() as u64;
    let worst = pairs
        .iter()
        .map(|p| p.grade)
        .min()
        .unwrap_or(Grade::Incompatible);
    let score = (mean as u32).min(worst.nominal_score());
    (score, worst, true)
}

fn dedup_warnings(pairs: &[PairVerdict]) -> Vec<String> {
    let mut seen = HashSet::new();
    pairs
        .iter()
        .flat_map(|p| p.warnings.iter())
        .filter(|w| seen.insert(w.as_str()))
        .cloned()
        .collect()
}

fn recommendations(pairs: &[PairVerdict], items: &[Item]) -> Vec<String> {
    let mut out = Vec::new();

    let incompatible = pairs.iter().filter(|p| !p.compatible).count();
    if incompatible > 0 {
        out.push(format!(
            "Found {} incompatible pair(s); consider replacing the affected items",
            incompatible
        ));
    }

    if pairs
        .iter()
        .any(|p| p.compatible && (50..70).contains(&p.score))
    {
        out.push("Some pairs are compatible but suboptimal; a better-matched configuration may perform better".to_string());
    }

    if items.iter().any(|i| i.properties.is_empty()) {
        out.push("Some items have no properties, which reduces the confidence of this result".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Scalar;

    fn pair(a: i64, b: i64, score: u32, compatible: bool, warnings: &[&str]) -> PairVerdict {
        PairVerdict {
            item_a_id: a,
            item_b_id: b,
            item_a_name: format!("item {}", a),
            item_b_name: format!("item {}", b),
            grade: if compatible { Grade::from_score(score) } else { Grade::Incompatible },
            score,
            compatible,
            rule_outcomes: Vec::new(),
            experience: None,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn items(n: i64) -> Vec<Item> {
        (1..=n)
            .map(|id| Item::new(id, format!("item {}", id), "X").with_property("p", Scalar::Int(id)))
            .collect()
    }

    #[test]
    fn test_pair_indices() {
        assert_eq!(pair_indices(3), vec![(0, 1), (0, 2), (1, 2)]);
        assert!(pair_indices(1).is_empty());
        assert_eq!(pair_indices(5).len(), 10);
    }

    #[test]
    fn test_incompatible_pair_decides() {
        let pairs = vec![
            pair(1, 2, 95, true, &[]),
            pair(1, 3, 20, false, &["Blocking rule failed: x"]),
            pair(2, 3, 0, false, &["Blocking rule failed: x"]),
        ];
        let verdict = aggregate(pairs, &items(3));
        assert!(!verdict.compatible);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.grade, Grade::Incompatible);
        assert_eq!(verdict.warnings, vec!["Blocking rule failed: x"]);
        assert_eq!(
            verdict.recommendations,
            vec!["Found 2 incompatible pair(s); consider replacing the affected items"]
        );
    }

    #[test]
    fn test_mean_clamped_to_worst_grade() {
        let pairs = vec![pair(1, 2, 100, true, &[]), pair(1, 3, 100, true, &[]), pair(2, 3, 75, true, &[])];
        let verdict = aggregate(pairs, &items(3));
        assert!(verdict.compatible);
        assert_eq!(verdict.grade, Grade::UnofficialSupport);
        // mean 91 exceeds the unofficial ceiling of 80
        assert_eq!(verdict.score, 80);

        let pairs = vec![pair(1, 2, 91, true, &[]), pair(1, 3, 90, true, &[]), pair(2, 3, 90, true, &[])];
        let verdict = aggregate(pairs, &items(3));
        assert_eq!(verdict.score, 90);
        assert_eq!(verdict.grade, Grade::OfficialSupport);
    }

    #[test]
    fn test_recommendations() {
        let mut set = items(2);
        set.push(Item::new(3, "bare", "X"));
        let pairs = vec![pair(1, 2, 60, true, &["b", "a"]), pair(1, 3, 90, true, &["a", "c"])];
        let verdict = aggregate(pairs, &set);
        assert_eq!(verdict.warnings, vec!["b", "a", "c"]);
        assert_eq!(verdict.recommendations.len(), 2);
        assert!(verdict.recommendations[0].contains("suboptimal"));
        assert!(verdict.recommendations[1].contains("no properties"));
    }
}
