//! Property normalizer: maps the attribute-key spellings found in the wild
//! onto a canonical hierarchical key set, keeping the originals intact.
//!
//! The synonym tables are part of the stable contract: adding a synonym
//! must not change resolution for inputs already using a listed one.

use serde_json::Value;

use crate::models::feature::PropertyBag;

/// The fixed administrative levels resolved from varying source field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchicalKey {
    State,
    District,
    Taluk,
    Village,
    SurveyNumber,
}

impl HierarchicalKey {
    pub const ALL: [HierarchicalKey; 5] = [
        HierarchicalKey::State,
        HierarchicalKey::District,
        HierarchicalKey::Taluk,
        HierarchicalKey::Village,
        HierarchicalKey::SurveyNumber,
    ];

    /// Canonical key inserted into the property bag.
    pub fn canonical(&self) -> &'static str {
        match self {
            HierarchicalKey::State => "state",
            HierarchicalKey::District => "district",
            HierarchicalKey::Taluk => "taluk",
            HierarchicalKey::Village => "village",
            HierarchicalKey::SurveyNumber => "survey_number",
        }
    }

    /// Recognized source spellings, in resolution order: the first synonym
    /// present in a bag supplies the canonical value.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            HierarchicalKey::State => &["State_Name", "state", "STATE", "State", "state_name"],
            HierarchicalKey::District => {
                &["District_Name", "district", "DISTRICT", "District", "district_name"]
            }
            HierarchicalKey::Taluk => {
                &["Taluk_Name", "taluk", "TALUK", "Taluk", "Block_Name", "block", "taluk_name"]
            }
            HierarchicalKey::Village => {
                &["Village_Name", "village", "VILLAGE", "Village", "village_name"]
            }
            HierarchicalKey::SurveyNumber => {
                &["Survey_Number", "survey_number", "SURVEY_NUMBER", "Survey_No", "survey_no"]
            }
        }
    }
}

/// Fold a key for comparison: case-insensitive, underscores and spaces
/// equivalent.
fn fold(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace(' ', "_")
}

/// Look up the first synonym of `key` present in the bag and return its value.
fn resolve(bag: &PropertyBag, key: HierarchicalKey) -> Option<Value> {
    for synonym in key.synonyms() {
        let folded = fold(synonym);
        if let Some((_, value)) = bag.iter().find(|(k, _)| fold(k) == folded) {
            if !value.is_null() {
                return Some(value.clone());
            }
        }
    }
    None
}

/// Add canonical hierarchical keys to a property bag.
///
/// Pure function: originals are never mutated or removed, and a canonical
/// key is only inserted when (a) a synonym resolved a value and (b) the
/// canonical key is not already present. Absent synonyms leave the
/// canonical key omitted rather than empty.
pub fn normalize(bag: &PropertyBag) -> PropertyBag {
    let mut normalized = bag.clone();
    for key in HierarchicalKey::ALL {
        if normalized.contains_key(key.canonical()) {
            continue;
        }
        if let Some(value) = resolve(bag, key) {
            normalized.insert(key.canonical().to_string(), value);
        }
    }
    normalized
}
