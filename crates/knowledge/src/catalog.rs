//! In-memory medication catalog.
//!
//! Records are loaded once (from the bundled seed catalog or a JSON file in
//! the `name → record` shape) and never mutated, so lookups need no locking.

use async_trait::async_trait;
use medquery_core::error::KnowledgeError;
use medquery_core::knowledge::{DrugMatch, DrugRecord, KnowledgeBase, KnowledgeStats};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::similarity::{fold, score};
use crate::symptoms::{usage_keywords, usage_matches};

const SEED_CATALOG: &str = include_str!("../data/drugs.json");

/// A knowledge base held entirely in memory, ordered by catalog key.
pub struct InMemoryKnowledgeBase {
    records: Vec<DrugRecord>,
}

impl InMemoryKnowledgeBase {
    pub fn from_records(mut records: Vec<DrugRecord>) -> Self {
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Self { records }
    }

    /// The catalog bundled with this crate.
    pub fn seed() -> Result<Self, KnowledgeError> {
        Self::from_json_str(SEED_CATALOG)
    }

    /// Parse a `{ "<key>": { name, dosage, ... } }` document.
    pub fn from_json_str(json: &str) -> Result<Self, KnowledgeError> {
        let map: BTreeMap<String, DrugRecord> =
            serde_json::from_str(json).map_err(|e| KnowledgeError::Parse(e.to_string()))?;

        let records = map
            .into_iter()
            .map(|(key, mut record)| {
                record.key = key;
                if record.name.is_empty() {
                    record.name = record.key.clone();
                }
                record
            })
            .collect();

        Ok(Self::from_records(records))
    }

    /// Load a catalog file from disk.
    pub async fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| KnowledgeError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
        let kb = Self::from_json_str(&content)?;
        info!(path = %path.display(), drugs = kb.len(), "Knowledge base loaded");
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn find_exact(&self, name: &str) -> Option<&DrugRecord> {
        let wanted = fold(name);
        if wanted.is_empty() {
            return None;
        }
        self.records
            .iter()
            .find(|r| fold(&r.key) == wanted)
            .or_else(|| self.records.iter().find(|r| fold(&r.base_name()) == wanted))
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, name: &str) -> Result<Option<DrugRecord>, KnowledgeError> {
        Ok(self.find_exact(name).cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DrugMatch>, KnowledgeError> {
        let mut matches: Vec<DrugMatch> = self
            .records
            .iter()
            .filter_map(|record| {
                let s = score(query, record);
                (s > 0).then(|| DrugMatch {
                    record: record.clone(),
                    score: s,
                })
            })
            .collect();

        // Stable sort keeps key order among equal scores
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);

        debug!(query, hits = matches.len(), "Fuzzy search");
        Ok(matches)
    }

    async fn by_symptom(&self, symptom: &str) -> Result<Vec<DrugRecord>, KnowledgeError> {
        let keywords = usage_keywords(symptom);
        Ok(self
            .records
            .iter()
            .filter(|r| usage_matches(&r.usage, &keywords))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<DrugRecord>, KnowledgeError> {
        Ok(self.records.clone())
    }

    async fn stats(&self) -> Result<KnowledgeStats, KnowledgeError> {
        let mut manufacturers = BTreeMap::new();
        for record in &self.records {
            let name = if record.manufacturer.is_empty() {
                "Unknown".to_string()
            } else {
                record.manufacturer.clone()
            };
            *manufacturers.entry(name).or_insert(0) += 1;
        }

        Ok(KnowledgeStats {
            total_drugs: self.records.len(),
            manufacturers,
            drug_names: self.records.iter().map(|r| r.key.clone()).collect(),
        })
    }
}
