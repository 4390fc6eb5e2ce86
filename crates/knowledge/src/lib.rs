//! Medication knowledge base for MedQuery.
//!
//! Implements `medquery_core::KnowledgeBase` over an in-memory catalog with
//! accent-insensitive fuzzy name matching and a symptom keyword map.

pub mod catalog;
pub mod similarity;
pub mod symptoms;

pub use catalog::InMemoryKnowledgeBase;
pub use similarity::{fold, ratio, score};
pub use symptoms::{find_symptom, symptom_terms};
