//! Knowledge base statistics.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::KnowledgeBase;
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use std::sync::Arc;

use crate::lookup::knowledge_error;

pub struct DatabaseStatsTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl DatabaseStatsTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for DatabaseStatsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::DatabaseStats
    }

    fn description(&self) -> &str {
        "Get statistics about the medication database: number of drugs, \
         manufacturers and the list of known medication names."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let stats = self
            .kb
            .stats()
            .await
            .map_err(|e| knowledge_error(self.kind(), e))?;

        let data = serde_json::to_value(&stats).unwrap_or_default();
        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolOutput::ok(output).with_data(data))
    }
}
