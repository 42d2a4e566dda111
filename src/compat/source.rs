//! Lookups the compatibility core consumes
//!
//! Rules, experiences and items are owned by external collaborators. The
//! traits here are the only way the core reads them; [`InMemoryCatalog`]
//! implements all three over a JSON catalog.

use super::model::{pair_key, Experience, Item, ItemId, ModelError, Rule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub trait RuleSource: Send + Sync {
    /// Active rules for the category pair in either order, by weight
    /// descending then id
    fn rules_for(&self, category_x: &str, category_y: &str) -> Vec<Rule>;
}

pub trait ExperienceSource: Send + Sync {
    /// Experience recorded for the unordered pair, if any
    fn experience_for(&self, x: ItemId, y: ItemId) -> Option<Experience>;
}

pub trait ItemSource: Send + Sync {
    fn item(&self, id: ItemId) -> Option<Item>;

    /// Items not in `exclude`, limited to `categories` when non-empty, in id
    /// order, at most `limit` of them
    fn candidates(&self, exclude: &[ItemId], categories: &[String], limit: usize) -> Vec<Item>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid catalog entry: {0}")]
    Model(#[from] ModelError),

    #[error("Duplicate item id {0}")]
    DuplicateItem(ItemId),
}

/// On-disk catalog layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFile {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
}

/// Items, rules and experiences held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: BTreeMap<ItemId, Item>,
    rules: Vec<Rule>,
    experiences: HashMap<(ItemId, ItemId), Experience>,
}

impl InMemoryCatalog {
    pub fn new(
        items: Vec<Item>,
        rules: Vec<Rule>,
        experiences: Vec<Experience>,
    ) -> Result<Self, CatalogError> {
        let mut by_id = BTreeMap::new();
        for item in items {
            let id = item.id;
            if by_id.insert(id, item).is_some() {
                return Err(CatalogError::DuplicateItem(id));
            }
        }

        let mut by_pair = HashMap::new();
        for experience in experiences {
            experience.validate()?;
            // later records for the same pair replace earlier ones
            by_pair.insert(experience.pair_key(), experience);
        }

        Ok(Self {
            items: by_id,
            rules,
            experiences: by_pair,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.items, file.rules, file.experiences)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn experience_count(&self) -> usize {
        self.experiences.len()
    }
}

impl RuleSource for InMemoryCatalog {
    fn rules_for(&self, category_x: &str, category_y: &str) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.is_active && r.applies_to(category_x, category_y))
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.id.cmp(&b.id)));
        rules
    }
}

impl ExperienceSource for InMemoryCatalog {
    fn experience_for(&self, x: ItemId, y: ItemId) -> Option<Experience> {
        self.experiences.get(&pair_key(x, y)).cloned()
    }
}

impl ItemSource for InMemoryCatalog {
    fn item(&self, id: ItemId) -> Option<Item> {
        self.items.get(&id).cloned()
    }

    fn candidates(&self, exclude: &[ItemId], categories: &[String], limit: usize) -> Vec<Item> {
        self.items
            .values()
            .filter(|item| !exclude.contains(&item.id))
            .filter(|item| categories.is_empty() || categories.contains(&item.category))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::model::ExperienceStatus;

    const CATALOG: &str = r#"{
        "items": [
            {"id": 1, "name": "Ryzen", "category": "CPU", "properties": {"socket": "AM5"}},
            {"id": 2, "name": "B650", "category": "Motherboard", "properties": {"socket": "AM5"}},
            {"id": 3, "name": "Z790", "category": "Motherboard", "properties": {"socket": "LGA1700"}},
            {"id": 4, "name": "RTX", "category": "GPU"}
        ],
        "rules": [
            {"id": 10, "name": "socket", "expression": "a.socket == b.socket",
             "categoryA": "CPU", "categoryB": "Motherboard", "weight": 100, "isBlocking": true},
            {"id": 11, "name": "inactive", "expression": "True",
             "categoryA": "Motherboard", "categoryB": "CPU", "weight": 500, "isActive": false},
            {"id": 12, "name": "light", "expression": "True",
             "categoryA": "Motherboard", "categoryB": "CPU", "weight": 100},
            {"id": 9, "name": "heavy", "expression": "True",
             "categoryA": "CPU", "categoryB": "Motherboard", "weight": 300}
        ],
        "experiences": [
            {"itemAId": 2, "itemBId": 1, "status": "compatible", "score": 98, "source": "official"}
        ]
    }"#;

    #[test]
    fn test_rules_symmetric_and_ordered() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        let forward: Vec<i64> = catalog.rules_for("CPU", "Motherboard").iter().map(|r| r.id).collect();
        let backward: Vec<i64> = catalog.rules_for("Motherboard", "CPU").iter().map(|r| r.id).collect();
        assert_eq!(forward, vec![9, 10, 12]);
        assert_eq!(forward, backward);
        assert!(catalog.rules_for("GPU", "CPU").is_empty());
    }

    #[test]
    fn test_experience_lookup_is_unordered() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        let exp = catalog.experience_for(1, 2).unwrap();
        assert_eq!(exp.status, ExperienceStatus::Compatible);
        assert_eq!(catalog.experience_for(2, 1), Some(exp));
        assert!(catalog.experience_for(1, 3).is_none());
    }

    #[test]
    fn test_candidates() {
        let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
        let ids: Vec<i64> = catalog.candidates(&[1], &[], 10).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);

        let boards = catalog.candidates(&[1], &["Motherboard".to_string()], 10);
        assert_eq!(boards.len(), 2);
        assert_eq!(catalog.candidates(&[], &[], 2).len(), 2);
    }

    #[test]
    fn test_invalid_catalogs() {
        let dup = r#"{"items": [{"id": 1, "name": "a"}, {"id": 1, "name": "b"}]}"#;
        assert!(matches!(
            InMemoryCatalog::from_json(dup),
            Err(CatalogError::DuplicateItem(1))
        ));

        let same = r#"{"experiences": [{"itemAId": 5, "itemBId": 5, "status": "compatible"}]}"#;
        assert!(matches!(
            InMemoryCatalog::from_json(same),
            Err(CatalogError::Model(ModelError::SameItem(5)))
        ));

        assert!(matches!(
            InMemoryCatalog::from_json("{"),
            Err(CatalogError::Json(_))
        ));
    }
}
