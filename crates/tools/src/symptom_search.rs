//! Medications whose usage matches a symptom.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::KnowledgeBase;
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use std::sync::Arc;

use crate::lookup::{knowledge_error, required_str, truncate, with_confirmed};

const MAX_RESULTS: usize = 8;

pub struct SymptomSearchTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl SymptomSearchTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for SymptomSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SymptomSearch
    }

    fn description(&self) -> &str {
        "Find medications commonly used for a symptom (fièvre, douleur, mal de tête, \
         rhume, inflammation, coeur, estomac, or their English equivalents)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "symptom": {
                    "type": "string",
                    "description": "The symptom, e.g. 'fièvre' or 'headache'"
                }
            },
            "required": ["symptom"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let symptom = required_str(&arguments, "symptom")?;
        let records = self
            .kb
            .by_symptom(symptom)
            .await
            .map_err(|e| knowledge_error(self.kind(), e))?;

        if records.is_empty() {
            return Err(ToolError::NotFound(format!("no medication listed for '{symptom}'")));
        }

        let total = records.len();
        let shown: Vec<_> = records.iter().take(MAX_RESULTS).collect();
        let medications: Vec<serde_json::Value> = shown
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.display_name(),
                    "dosage": r.dosage,
                    "usage": truncate(&r.usage, 100),
                })
            })
            .collect();

        let data = serde_json::json!({
            "symptom": symptom,
            "count": total,
            "medications": medications,
        });
        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolOutput::ok(output).with_data(with_confirmed(data, &shown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medquery_knowledge::InMemoryKnowledgeBase;

    fn tool() -> SymptomSearchTool {
        SymptomSearchTool::new(Arc::new(InMemoryKnowledgeBase::seed().unwrap()))
    }

    #[tokio::test]
    async fn fever_lists_antipyretics() {
        let result = tool()
            .execute(serde_json::json!({"symptom": "fièvre"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("Doliprane"));
        assert!(!result.output.contains("Glucophage"));
        let data = result.data.unwrap();
        assert!(data["medications"].as_array().unwrap().len() <= MAX_RESULTS);
    }

    #[tokio::test]
    async fn english_symptom_terms_work() {
        let result = tool()
            .execute(serde_json::json!({"symptom": "stomach"}))
            .await
            .unwrap();
        assert!(result.output.contains("Gaviscon"));
    }

    #[tokio::test]
    async fn unmatched_symptom_is_not_found() {
        let err = tool()
            .execute(serde_json::json!({"symptom": "xyzzy"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
