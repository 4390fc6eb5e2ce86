//! Full catalog record for one medication.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::KnowledgeBase;
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use std::sync::Arc;

use crate::lookup::{require, required_str, with_confirmed};

pub struct DrugDetailsTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl DrugDetailsTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for DrugDetailsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::DrugDetails
    }

    fn description(&self) -> &str {
        "Get complete information about one medication: dosage, usage, side effects, \
         warnings, interactions, instructions and manufacturer. Misspelled names are \
         matched to the closest known medication."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "drug_name": {
                    "type": "string",
                    "description": "Medication name, e.g. 'Doliprane' or 'Advil 400mg'"
                }
            },
            "required": ["drug_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let name = required_str(&arguments, "drug_name")?;
        let found = require(self.kb.as_ref(), self.kind(), name).await?;

        let mut details = serde_json::json!({
            "found": true,
            "match_score": found.score,
            "name": found.record.display_name(),
            "dosage": found.record.dosage,
            "usage": found.record.usage,
            "side_effects": found.record.side_effects,
            "warnings": found.record.warnings,
            "interactions": found.record.interactions,
            "instructions": found.record.instructions,
            "manufacturer": found.record.manufacturer,
        });
        if found.score < 100 {
            details["matched_from"] = serde_json::json!(name);
        }

        let output = serde_json::to_string_pretty(&details).unwrap_or_default();
        Ok(ToolOutput::ok(output).with_data(with_confirmed(details, &[&found.record])))
    }
}
