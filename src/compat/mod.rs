//! Rule-based compatibility scoring
//!
//! - `rules`: one rule against one item pair
//! - `pair`: every applicable rule (or an experience record) for one pair
//! - `overall`: every pair of a requested set
//! - `matcher`: ranking candidates against a selected set

pub mod matcher;
pub mod model;
pub mod overall;
pub mod pair;
pub mod rules;
pub mod source;

pub use model::{
    CandidateMatch, Experience, ExperienceStatus, Grade, Item, ItemId, ModelError, OverallVerdict,
    PairVerdict, RecordSource, Rule, RuleId, RuleOutcome, SearchOutcome, SearchRequest,
    VerificationStatus, Weight,
};
pub use pair::check_pair;
pub use source::{
    CatalogError, CatalogFile, ExperienceSource, InMemoryCatalog, ItemSource, RuleSource,
};
