//! Medication tools for the MedQuery agent.
//!
//! Each tool wraps the knowledge base (or an upstream label API) behind the
//! `medquery_core::Tool` trait so the agent can call it by wire name:
//! drug details, name search, symptom search, interaction checks,
//! alternatives, comparisons, external labels and catalog statistics.

pub mod alternatives;
pub mod compare;
pub mod database_stats;
pub mod drug_details;
pub mod external_source;
pub mod interactions;
pub mod lookup;
pub mod search_medication;
pub mod symptom_search;

use medquery_core::knowledge::KnowledgeBase;
use medquery_core::tool::ToolRegistry;
use std::sync::Arc;

pub use external_source::ExternalSourceTool;

/// Create a registry with every knowledge-backed tool.
///
/// The external label tool needs network settings and is registered
/// separately with [`ExternalSourceTool::new`].
pub fn default_registry(kb: Arc<dyn KnowledgeBase>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(drug_details::DrugDetailsTool::new(kb.clone())));
    registry.register(Box::new(search_medication::SearchMedicationTool::new(kb.clone())));
    registry.register(Box::new(symptom_search::SymptomSearchTool::new(kb.clone())));
    registry.register(Box::new(interactions::InteractionCheckTool::new(kb.clone())));
    registry.register(Box::new(alternatives::FindAlternativesTool::new(kb.clone())));
    registry.register(Box::new(compare::CompareMedicationsTool::new(kb.clone())));
    registry.register(Box::new(database_stats::DatabaseStatsTool::new(kb)));
    registry
}
