//! Fuzzy medication name search.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::KnowledgeBase;
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use std::sync::Arc;

use crate::lookup::{MATCH_THRESHOLD, knowledge_error, required_str, truncate, with_confirmed};

const DEFAULT_LIMIT: u64 = 5;
const MAX_LIMIT: u64 = 10;

pub struct SearchMedicationTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl SearchMedicationTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for SearchMedicationTool {
    fn kind(&self) -> ToolKind {
        ToolKind::SearchMedication
    }

    fn description(&self) -> &str {
        "Search medications by (possibly misspelled) name. Returns the closest matches \
         with a similarity score from 0 to 100."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Name or partial name to search for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)",
                    "default": DEFAULT_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(&arguments, "query")?;
        let limit = arguments["limit"]
            .as_u64()
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT) as usize;

        let matches = self
            .kb
            .search(query, limit)
            .await
            .map_err(|e| knowledge_error(self.kind(), e))?;

        if matches.is_empty() {
            return Err(ToolError::NotFound(format!("no medication matches '{query}'")));
        }

        let results: Vec<serde_json::Value> = matches
            .iter()
            .map(|m| {
                serde_json::json!({
                    "name": m.record.display_name(),
                    "score": m.score,
                    "dosage": m.record.dosage,
                    "usage": truncate(&m.record.usage, 100),
                })
            })
            .collect();

        // Only strong matches count as confirming a drug
        let strong: Vec<_> = matches
            .iter()
            .filter(|m| m.score >= MATCH_THRESHOLD)
            .map(|m| &m.record)
            .collect();

        let data = serde_json::json!({ "query": query, "results": results });
        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolOutput::ok(output).with_data(with_confirmed(data, &strong)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medquery_knowledge::InMemoryKnowledgeBase;

    fn tool() -> SearchMedicationTool {
        SearchMedicationTool::new(Arc::new(InMemoryKnowledgeBase::seed().unwrap()))
    }

    #[tokio::test]
    async fn search_returns_scored_results() {
        let result = tool()
            .execute(serde_json::json!({"query": "dolip"}))
            .await
            .unwrap();
        let data = result.data.as_ref().unwrap();
        let results = data["results"].as_array().unwrap();
        assert!(!results.is_empty() && results.len() <= 5);
        assert!(results[0]["name"].as_str().unwrap().starts_with("Doliprane"));
        assert_eq!(result.confirmed_drugs(), vec!["doliprane"]);
    }

    #[tokio::test]
    async fn limit_is_respected() {
        let result = tool()
            .execute(serde_json::json!({"query": "paracetamol", "limit": 2}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let err = tool()
            .execute(serde_json::json!({"query": "qqqqqqqq"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
