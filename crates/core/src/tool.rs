//! Tool trait and registry, the agent's closed set of capabilities.
//!
//! Every tool the agent may call is a [`ToolKind`] variant bound to one
//! [`Tool`] implementation. The registry iterates in `ToolKind` order so the
//! schemas sent to the model and the decisions recorded in traces are
//! deterministic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The closed set of tools known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    DrugDetails,
    SearchMedication,
    SymptomSearch,
    InteractionCheck,
    FindAlternatives,
    CompareMedications,
    ExternalSource,
    DatabaseStats,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::DrugDetails,
        ToolKind::SearchMedication,
        ToolKind::SymptomSearch,
        ToolKind::InteractionCheck,
        ToolKind::FindAlternatives,
        ToolKind::CompareMedications,
        ToolKind::ExternalSource,
        ToolKind::DatabaseStats,
    ];

    /// Wire name used in model tool calls.
    pub fn name(self) -> &'static str {
        match self {
            Self::DrugDetails => "get_drug_details",
            Self::SearchMedication => "search_medication",
            Self::SymptomSearch => "search_by_symptom",
            Self::InteractionCheck => "check_drug_interactions",
            Self::FindAlternatives => "find_alternatives",
            Self::CompareMedications => "compare_medications",
            Self::ExternalSource => "search_external_source",
            Self::DatabaseStats => "get_database_stats",
        }
    }

    /// Label shown in traces.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::DrugDetails => "Drug details",
            Self::SearchMedication => "Medication search",
            Self::SymptomSearch => "Symptom search",
            Self::InteractionCheck => "Interaction check",
            Self::FindAlternatives => "Alternatives finder",
            Self::CompareMedications => "Medication comparison",
            Self::ExternalSource => "External label source",
            Self::DatabaseStats => "Database statistics",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool found what it was asked for
    pub success: bool,

    /// Text observation fed back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Base names of catalog drugs this output resolved, as listed by the
    /// tool under [`CONFIRMED_DRUGS_KEY`] in its data.
    pub fn confirmed_drugs(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get(CONFIRMED_DRUGS_KEY))
            .and_then(|v| v.as_array())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Data field listing the drugs a tool resolved in the catalog.
pub const CONFIRMED_DRUGS_KEY: &str = "confirmed_drugs";

/// The core Tool trait.
///
/// Each tool declares which [`ToolKind`] it implements; its wire name comes
/// from the kind.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolError>;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed and ordered by [`ToolKind`].
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool of the same kind.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn Tool> {
        self.tools.get(&kind).map(|t| t.as_ref())
    }

    /// Look a tool up by its wire name.
    pub fn get_by_name(&self, name: &str) -> Option<&dyn Tool> {
        ToolKind::from_name(name).and_then(|kind| self.get(kind))
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call. Unknown or unregistered names are an error.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolOutput, ToolError> {
        let tool = self
            .get_by_name(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        tool.execute(call.arguments.clone()).await
    }

    /// Registered kinds, in `ToolKind` order.
    pub fn kinds(&self) -> Vec<ToolKind> {
        self.tools.keys().copied().collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().map(|k| k.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
