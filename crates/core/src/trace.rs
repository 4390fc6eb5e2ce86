//! Explainability trace: how an answer was produced.
//!
//! A [`Trace`] is built incrementally during one resolution (see the agent
//! crate's `TraceBuilder`) and is immutable once attached to a response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::response::{RoutePath, ToolCallRecord};

/// Scores at or above this are `high`.
pub const HIGH_CONFIDENCE: f64 = 0.85;

/// Scores at or above this (and below `HIGH_CONFIDENCE`) are `medium`.
pub const MEDIUM_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_CONFIDENCE {
            Self::High
        } else if score >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user is trying to find out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DrugInfo,
    SymptomSearch,
    InteractionCheck,
    Alternatives,
    Comparison,
    Pregnancy,
    General,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DrugInfo => "drug_info",
            Self::SymptomSearch => "symptom_search",
            Self::InteractionCheck => "interaction_check",
            Self::Alternatives => "alternatives",
            Self::Comparison => "comparison",
            Self::Pregnancy => "pregnancy",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Drug,
    Symptom,
    Dosage,
}

/// Entities mentioned in a query, grouped by kind.
pub type Entities = BTreeMap<EntityKind, Vec<String>>;

/// One step of reasoning. Indices start at 1 and strictly increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub index: u32,
    pub action: String,
    pub reasoning: String,
    pub confidence: f64,
    pub elapsed_ms: u64,
}

/// Whether a tool was selected for this query, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDecision {
    pub tool: String,
    pub display_name: String,
    pub selected: bool,
    pub confidence: f64,
    pub rationale: String,
}

/// Structured explanation attached to every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub intent: Intent,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub steps: Vec<ReasoningStep>,
    #[serde(default)]
    pub tool_decisions: Vec<ToolDecision>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub summary: String,
    pub duration_ms: u64,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub created_at: DateTime<Utc>,
}

impl Trace {
    /// Drug entities, if any.
    pub fn drugs(&self) -> &[String] {
        self.entities
            .get(&EntityKind::Drug)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn digest(&self, query: &str, path: RoutePath) -> TraceDigest {
        TraceDigest {
            trace_id: self.trace_id.clone(),
            query: query.to_string(),
            path,
            intent: self.intent,
            confidence: self.confidence,
            confidence_level: self.confidence_level,
            steps: self.steps.len(),
            tools_used: self.tool_calls.iter().map(|c| c.tool.clone()).collect(),
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        }
    }
}

/// Compact view of a trace kept in the recent-trace history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDigest {
    pub trace_id: String,
    pub query: String,
    pub path: RoutePath,
    pub intent: Intent,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub steps: usize,
    pub tools_used: Vec<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.49), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.5), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.84), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(1.0), ConfidenceLevel::High);
    }

    #[test]
    fn entities_serialize_with_lowercase_keys() {
        let mut entities = Entities::new();
        entities.insert(EntityKind::Drug, vec!["doliprane".into()]);
        entities.insert(EntityKind::Dosage, vec!["500 mg".into()]);
        let json = serde_json::to_value(&entities).unwrap();
        assert_eq!(json["drug"][0], "doliprane");
        assert_eq!(json["dosage"][0], "500 mg");
    }

    #[test]
    fn intent_wire_names() {
        assert_eq!(
            serde_json::to_value(Intent::InteractionCheck).unwrap(),
            "interaction_check"
        );
        assert_eq!(Intent::Comparison.to_string(), "comparison");
    }

    #[test]
    fn digest_copies_headline_fields() {
        let trace = Trace {
            trace_id: "t-1".into(),
            intent: Intent::DrugInfo,
            entities: Entities::new(),
            steps: vec![ReasoningStep {
                index: 1,
                action: "fast_path".into(),
                reasoning: "exact match".into(),
                confidence: 0.95,
                elapsed_ms: 1,
            }],
            tool_decisions: vec![],
            tool_calls: vec![],
            summary: "s".into(),
            duration_ms: 3,
            confidence: 0.95,
            confidence_level: ConfidenceLevel::High,
            created_at: Utc::now(),
        };
        let digest = trace.digest("doliprane", RoutePath::FastPath);
        assert_eq!(digest.trace_id, "t-1");
        assert_eq!(digest.steps, 1);
        assert_eq!(digest.path, RoutePath::FastPath);
        assert!(trace.drugs().is_empty());
    }
}
