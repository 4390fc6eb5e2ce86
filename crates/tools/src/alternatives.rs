//! Alternatives sharing a medication's active ingredient.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::{DrugRecord, KnowledgeBase};
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use medquery_knowledge::fold;
use std::sync::Arc;

use crate::lookup::{knowledge_error, require, required_str, with_confirmed};

pub struct FindAlternativesTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl FindAlternativesTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

/// Records containing `ingredient` in their name, excluding any brand that
/// shares `original`'s base name.
pub fn same_ingredient<'a>(
    original: &DrugRecord,
    ingredient: &str,
    catalog: &'a [DrugRecord],
) -> Vec<&'a DrugRecord> {
    let base = original.base_name();
    let ingredient = fold(ingredient);
    catalog
        .iter()
        .filter(|r| r.base_name() != base)
        .filter(|r| fold(&r.name).contains(&ingredient))
        .collect()
}

#[async_trait]
impl Tool for FindAlternativesTool {
    fn kind(&self) -> ToolKind {
        ToolKind::FindAlternatives
    }

    fn description(&self) -> &str {
        "Find other brands or generics with the same active ingredient as a medication."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "drug_name": {
                    "type": "string",
                    "description": "The medication to find alternatives for"
                }
            },
            "required": ["drug_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let name = required_str(&arguments, "drug_name")?;
        let found = require(self.kb.as_ref(), self.kind(), name).await?;
        let record = found.record;

        let ingredient = record
            .active_ingredient()
            .unwrap_or_else(|| record.name.to_lowercase());

        let catalog = self
            .kb
            .all()
            .await
            .map_err(|e| knowledge_error(self.kind(), e))?;
        let alternatives = same_ingredient(&record, &ingredient, &catalog);

        let listed: Vec<serde_json::Value> = alternatives
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.key,
                    "dosage": r.dosage,
                    "manufacturer": r.manufacturer,
                    "reason": "Même principe actif",
                })
            })
            .collect();

        let data = serde_json::json!({
            "original_drug": record.key,
            "active_ingredient": ingredient,
            "alternatives": listed,
            "count": listed.len(),
        });
        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolOutput::ok(output).with_data(with_confirmed(data, &[&record])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medquery_knowledge::InMemoryKnowledgeBase;

    fn tool() -> FindAlternativesTool {
        FindAlternativesTool::new(Arc::new(InMemoryKnowledgeBase::seed().unwrap()))
    }

    #[tokio::test]
    async fn paracetamol_brands_are_alternatives() {
        let result = tool()
            .execute(serde_json::json!({"drug_name": "Doliprane"}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["active_ingredient"], "paracétamol");

        let names: Vec<&str> = data["alternatives"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"Efferalgan 1g"));
        assert!(names.contains(&"Dafalgan 500mg"));
        // Other strengths of the same brand are not alternatives
        assert!(!names.iter().any(|n| n.starts_with("Doliprane")));
        assert_eq!(data["count"], names.len());
    }

    #[tokio::test]
    async fn single_source_ingredient_has_no_alternatives() {
        let result = tool()
            .execute(serde_json::json!({"drug_name": "Glucophage"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["count"], 0);
    }

    #[tokio::test]
    async fn unknown_drug_is_not_found() {
        let err = tool()
            .execute(serde_json::json!({"drug_name": "unknownium"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
