//! Incremental construction of explainability traces.

use chrono::Utc;
use medquery_core::response::ToolCallRecord;
use medquery_core::tool::ToolKind;
use medquery_core::trace::{Entities, EntityKind, Intent, ReasoningStep, ToolDecision, Trace};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::confidence::Confidence;

/// Upper bound on recorded steps per trace.
pub const MAX_STEPS: usize = 64;
/// Upper bound on recorded tool calls per trace.
pub const MAX_TOOL_CALLS: usize = 64;

/// Accumulates the explanation of one resolution.
///
/// Recording never fails: once a cap is reached further records are dropped.
pub struct TraceBuilder {
    trace_id: String,
    started: Instant,
    intent: Intent,
    entities: Entities,
    steps: Vec<ReasoningStep>,
    tool_decisions: Vec<ToolDecision>,
    tool_calls: Vec<ToolCallRecord>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            intent: Intent::General,
            entities: Entities::new(),
            steps: Vec::new(),
            tool_decisions: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn set_intent(&mut self, intent: Intent) {
        self.intent = intent;
    }

    pub fn set_entities(&mut self, entities: Entities) {
        self.entities = entities;
    }

    /// Record a reasoning step. Indices start at 1.
    pub fn step(&mut self, action: impl Into<String>, reasoning: impl Into<String>, confidence: f64) {
        if self.steps.len() >= MAX_STEPS {
            debug!(trace_id = %self.trace_id, "Step cap reached, dropping step");
            return;
        }
        let index = self.steps.len() as u32 + 1;
        self.steps.push(ReasoningStep {
            index,
            action: action.into(),
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
            elapsed_ms: self.elapsed_ms(),
        });
    }

    pub fn record_tool_call(&mut self, record: ToolCallRecord) {
        if self.tool_calls.len() >= MAX_TOOL_CALLS {
            debug!(trace_id = %self.trace_id, tool = %record.tool, "Tool call cap reached, dropping record");
            return;
        }
        self.tool_calls.push(record);
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    /// Record a decision for every available tool.
    ///
    /// Tools in `requested` are selected with the model's stated rationale;
    /// the rest are recorded as not requested.
    pub fn decide_tools(&mut self, available: &[ToolKind], requested: &BTreeMap<ToolKind, String>) {
        self.tool_decisions = available
            .iter()
            .map(|kind| match requested.get(kind) {
                Some(rationale) => ToolDecision {
                    tool: kind.name().to_string(),
                    display_name: kind.display_name().to_string(),
                    selected: true,
                    confidence: 0.8,
                    rationale: rationale.clone(),
                },
                None => ToolDecision {
                    tool: kind.name().to_string(),
                    display_name: kind.display_name().to_string(),
                    selected: false,
                    confidence: 0.0,
                    rationale: "Not requested by the model for this query".into(),
                },
            })
            .collect();
    }

    /// Build the immutable trace.
    pub fn finalize(self, confidence: Confidence, success: bool) -> Trace {
        let summary = self.summary(confidence, success);
        Trace {
            duration_ms: self.elapsed_ms(),
            trace_id: self.trace_id,
            intent: self.intent,
            entities: self.entities,
            steps: self.steps,
            tool_decisions: self.tool_decisions,
            tool_calls: self.tool_calls,
            summary,
            confidence: confidence.score,
            confidence_level: confidence.level,
            created_at: Utc::now(),
        }
    }

    fn summary(&self, confidence: Confidence, success: bool) -> String {
        let mut tools: Vec<&str> = self.tool_calls.iter().map(|c| c.tool.as_str()).collect();
        tools.dedup();
        let drugs = self
            .entities
            .get(&EntityKind::Drug)
            .filter(|d| !d.is_empty())
            .map(|d| d.join(", "));

        let mut summary = if success {
            format!("Answered a {} question", self.intent)
        } else {
            format!("Could not fully answer a {} question", self.intent)
        };
        if let Some(drugs) = drugs {
            summary.push_str(&format!(" about {drugs}"));
        }
        if tools.is_empty() {
            summary.push_str(" without calling tools");
        } else {
            summary.push_str(&format!(" using {}", tools.join(", ")));
        }
        summary.push_str(&format!(
            "; confidence {} ({:.2}).",
            confidence.level, confidence.score
        ));
        summary
    }
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
