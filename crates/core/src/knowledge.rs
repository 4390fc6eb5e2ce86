//! Knowledge base trait: lookups over the medication catalog.
//!
//! The engine does not own the catalog schema. It consumes [`DrugRecord`]
//! values through the [`KnowledgeBase`] trait:
//! - exact lookup by key or base name
//! - fuzzy name search with similarity scores (0..=100)
//! - symptom-to-medication lookup
//! - catalog statistics

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::KnowledgeError;

/// One medication entry.
///
/// `key` is the catalog key (e.g. "Doliprane 1000mg"); `name` is the display
/// name, which by convention carries the active ingredient in parentheses
/// ("Doliprane 1000mg (Paracétamol)").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugRecord {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub side_effects: String,
    #[serde(default)]
    pub warnings: String,
    #[serde(default)]
    pub interactions: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub manufacturer: String,
}

impl DrugRecord {
    /// Lower-cased brand name without the strength, keeping a trailing
    /// "fort"/"forte" ("inflamyl fort 100mg" → "inflamyl fort").
    pub fn base_name(&self) -> String {
        base_name_of(&self.key)
    }

    /// Active ingredient, taken from the parenthesised part of the name.
    pub fn active_ingredient(&self) -> Option<String> {
        let open = self.name.find('(')?;
        let close = self.name[open..].find(')')? + open;
        let ingredient = self.name[open + 1..close].trim().to_lowercase();
        (!ingredient.is_empty()).then_some(ingredient)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }
}

/// Base name of a catalog key or free-text drug name.
pub fn base_name_of(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut parts = lowered.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(first), Some(second)) if second == "fort" || second == "forte" => {
            format!("{first} {second}")
        }
        (Some(first), _) => first.to_string(),
        (None, _) => String::new(),
    }
}

/// A fuzzy search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugMatch {
    pub record: DrugRecord,
    /// Similarity score in 0..=100
    pub score: u8,
}

/// Aggregate statistics about a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_drugs: usize,
    pub manufacturers: BTreeMap<String, usize>,
    pub drug_names: Vec<String>,
}

/// The core KnowledgeBase trait.
///
/// Implementations: in-memory catalog (bundled seed data or a JSON file).
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Exact lookup by catalog key or base name (case-insensitive).
    async fn get(&self, name: &str) -> std::result::Result<Option<DrugRecord>, KnowledgeError>;

    /// Fuzzy search, best matches first.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<DrugMatch>, KnowledgeError>;

    /// Medications commonly used for a symptom keyword.
    async fn by_symptom(
        &self,
        symptom: &str,
    ) -> std::result::Result<Vec<DrugRecord>, KnowledgeError>;

    /// Every record in the catalog.
    async fn all(&self) -> std::result::Result<Vec<DrugRecord>, KnowledgeError>;

    async fn stats(&self) -> std::result::Result<KnowledgeStats, KnowledgeError>;

    /// Base names of every record, used for entity extraction.
    async fn known_names(&self) -> std::result::Result<Vec<String>, KnowledgeError> {
        let mut names: Vec<String> = self.all().await?.iter().map(DrugRecord::base_name).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, name: &str) -> DrugRecord {
        DrugRecord {
            key: key.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn base_name_drops_strength() {
        assert_eq!(record("Doliprane 1000mg", "").base_name(), "doliprane");
        assert_eq!(record("Inflamyl Fort 100mg", "").base_name(), "inflamyl fort");
        assert_eq!(record("Kardegic", "").base_name(), "kardegic");
        assert_eq!(base_name_of("   "), "");
    }

    #[test]
    fn active_ingredient_from_parentheses() {
        let doliprane = record("Doliprane 1000mg", "Doliprane 1000mg (Paracétamol)");
        assert_eq!(doliprane.active_ingredient().as_deref(), Some("paracétamol"));

        let plain = record("Aspegic", "Aspegic 500mg");
        assert_eq!(plain.active_ingredient(), None);

        let empty = record("X", "X ()");
        assert_eq!(empty.active_ingredient(), None);
    }

    #[test]
    fn display_name_falls_back_to_key() {
        assert_eq!(record("Advil 400mg", "").display_name(), "Advil 400mg");
        assert_eq!(
            record("Advil 400mg", "Advil 400mg (Ibuprofène)").display_name(),
            "Advil 400mg (Ibuprofène)"
        );
    }

    #[test]
    fn record_deserializes_with_missing_fields() {
        let rec: DrugRecord = serde_json::from_value(serde_json::json!({
            "name": "Voltarène 50mg (Diclofénac)",
            "usage": "Inflammation"
        }))
        .unwrap();
        assert!(rec.key.is_empty());
        assert!(rec.side_effects.is_empty());
        assert_eq!(rec.usage, "Inflammation");
    }
}
