//! Compatibility domain types
//!
//! Items, rules and experiences are read-only inputs; verdicts are outputs.
//! All of them serialize with camelCase fields so catalogs and results share
//! one JSON shape.

use crate::expr::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type ItemId = i64;
pub type RuleId = i64;

/// Largest weight a rule may carry
pub const MAX_RULE_WEIGHT: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "details")]
pub enum ModelError {
    #[error("Rule weight {0} is outside 0..={MAX_RULE_WEIGHT}")]
    WeightOutOfRange(u32),

    #[error("Experience score {0} is outside 0..=100")]
    ScoreOutOfRange(u32),

    #[error("Experience must reference two different items (got {0} twice)")]
    SameItem(ItemId),
}

/// A catalog item and its scalar properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Scalar>,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            category: category.into(),
            description: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Scalar) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Rule weight, always within `0..=MAX_RULE_WEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Weight(u32);

impl Weight {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Weight {
    type Error = ModelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > MAX_RULE_WEIGHT {
            return Err(ModelError::WeightOutOfRange(value));
        }
        Ok(Self(value))
    }
}

impl From<Weight> for u32 {
    fn from(weight: Weight) -> Self {
        weight.0
    }
}

fn default_true() -> bool {
    true
}

/// A compatibility rule between two categories (unordered)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub expression: String,
    pub category_a: String,
    pub category_b: String,
    pub weight: Weight,
    #[serde(default)]
    pub is_blocking: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Rule {
    /// Whether this rule covers the category pair, in either order
    pub fn applies_to(&self, x: &str, y: &str) -> bool {
        (self.category_a == x && self.category_b == y)
            || (self.category_a == y && self.category_b == x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceStatus {
    Compatible,
    Incompatible,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Admin,
    Official,
    #[default]
    UserContribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    #[default]
    Pending,
    Disputed,
}

/// A manually recorded judgment for one item pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub item_a_id: ItemId,
    pub item_b_id: ItemId,
    pub status: ExperienceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default)]
    pub source: RecordSource,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Experience {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.item_a_id == self.item_b_id {
            return Err(ModelError::SameItem(self.item_a_id));
        }
        match self.score {
            Some(score) if score > 100 => Err(ModelError::ScoreOutOfRange(score)),
            _ => Ok(()),
        }
    }

    /// The pair as (smaller id, larger id)
    pub fn pair_key(&self) -> (ItemId, ItemId) {
        pair_key(self.item_a_id, self.item_b_id)
    }
}

/// Canonical key for an unordered item pair
pub fn pair_key(x: ItemId, y: ItemId) -> (ItemId, ItemId) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

/// Ordinal compatibility tier, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Incompatible,
    Theoretical,
    UnofficialSupport,
    OfficialSupport,
}

impl Grade {
    /// Grade for a 0..=100 score
    pub fn from_score(score: u32) -> Self {
        if score >= 90 {
            Grade::OfficialSupport
        } else if score >= 70 {
            Grade::UnofficialSupport
        } else if score >= 50 {
            Grade::Theoretical
        } else {
            Grade::Incompatible
        }
    }

    /// Representative score for the grade, also its ceiling in overall results
    pub fn nominal_score(self) -> u32 {
        match self {
            Grade::OfficialSupport => 95,
            Grade::UnofficialSupport => 80,
            Grade::Theoretical => 60,
            Grade::Incompatible => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::OfficialSupport => "official_support",
            Grade::UnofficialSupport => "unofficial_support",
            Grade::Theoretical => "theoretical",
            Grade::Incompatible => "incompatible",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one rule against one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub passed: bool,
    /// Either 0 or the full rule weight
    pub score_contribution: u32,
    pub weight: u32,
    pub is_blocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairVerdict {
    pub item_a_id: ItemId,
    pub item_b_id: ItemId,
    pub item_a_name: String,
    pub item_b_name: String,
    pub grade: Grade,
    pub score: u32,
    pub compatible: bool,
    pub rule_outcomes: Vec<RuleOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Experience>,
    pub warnings: Vec<String>,
}

impl PairVerdict {
    pub fn passed_rules(&self) -> usize {
        self.rule_outcomes.iter().filter(|r| r.passed).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallVerdict {
    pub grade: Grade,
    pub score: u32,
    pub compatible: bool,
    pub pairs: Vec<PairVerdict>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub cached: bool,
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMatch {
    pub item_id: ItemId,
    pub item_name: String,
    pub category: String,
    pub score: u32,
    pub grade: Grade,
    pub matching_rules: usize,
    pub experience_based: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Parameters of a candidate search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub selected: Vec<ItemId>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_min_score() -> u32 {
    50
}

fn default_limit() -> usize {
    20
}

impl SearchRequest {
    pub fn new(selected: Vec<ItemId>) -> Self {
        Self {
            selected,
            categories: Vec::new(),
            min_score: default_min_score(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub matches: Vec<CandidateMatch>,
    pub total_found: usize,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_thresholds_are_monotonic() {
        assert_eq!(Grade::from_score(100), Grade::OfficialSupport);
        assert_eq!(Grade::from_score(90), Grade::OfficialSupport);
        assert_eq!(Grade::from_score(89), Grade::UnofficialSupport);
        assert_eq!(Grade::from_score(70), Grade::UnofficialSupport);
        assert_eq!(Grade::from_score(69), Grade::Theoretical);
        assert_eq!(Grade::from_score(50), Grade::Theoretical);
        assert_eq!(Grade::from_score(49), Grade::Incompatible);
        assert_eq!(Grade::from_score(0), Grade::Incompatible);

        let mut last = Grade::Incompatible;
        for score in 0..=100 {
            let grade = Grade::from_score(score);
            assert!(grade >= last);
            last = grade;
        }
        assert!(Grade::Incompatible < Grade::OfficialSupport);
    }

    #[test]
    fn test_weight_bounds() {
        assert!(Weight::try_from(1000).is_ok());
        assert_eq!(
            Weight::try_from(1001),
            Err(ModelError::WeightOutOfRange(1001))
        );

        let json = r#"{"id":1,"name":"r","expression":"True","categoryA":"CPU","categoryB":"Board","weight":2000}"#;
        assert!(serde_json::from_str::<Rule>(json).is_err());
    }

    #[test]
    fn test_rule_defaults_and_symmetry() {
        let json = r#"{"id":1,"name":"socket","expression":"a.socket == b.socket","categoryA":"CPU","categoryB":"Motherboard","weight":100}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert!(rule.is_active);
        assert!(!rule.is_blocking);
        assert_eq!(rule.weight.get(), 100);
        assert!(rule.applies_to("CPU", "Motherboard"));
        assert!(rule.applies_to("Motherboard", "CPU"));
        assert!(!rule.applies_to("CPU", "CPU"));
    }

    #[test]
    fn test_experience_validation() {
        let exp = Experience {
            item_a_id: 3,
            item_b_id: 1,
            status: ExperienceStatus::Compatible,
            score: Some(90),
            source: RecordSource::Official,
            verification_status: VerificationStatus::Verified,
            notes: None,
        };
        assert!(exp.validate().is_ok());
        assert_eq!(exp.pair_key(), (1, 3));

        let same = Experience {
            item_b_id: 3,
            ..exp.clone()
        };
        assert_eq!(same.validate(), Err(ModelError::SameItem(3)));

        let high = Experience {
            score: Some(101),
            ..exp
        };
        assert_eq!(high.validate(), Err(ModelError::ScoreOutOfRange(101)));
    }

    #[test]
    fn test_item_properties_deserialize() {
        let json = r#"{"id":7,"name":"PSU","category":"Power","properties":{"watts":750,"rail":12.5,"modular":true,"电压":"220V"}}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.properties["watts"], Scalar::Int(750));
        assert_eq!(item.properties["rail"], Scalar::Float(12.5));
        assert_eq!(item.properties["modular"], Scalar::Bool(true));
        assert_eq!(item.properties["电压"], Scalar::Str("220V".into()));
    }
}
