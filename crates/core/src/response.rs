//! Response value: the answer plus everything needed to explain it.

use serde::{Deserialize, Serialize};

use crate::trace::{ConfidenceLevel, Trace};

/// Which path produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    FastPath,
    Agent,
}

impl RoutePath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The routing decision for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub path: RoutePath,

    /// Matched fast-path pattern (e.g. `side_effects`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl RouteDecision {
    pub fn fast_path(pattern: impl Into<String>) -> Self {
        Self {
            path: RoutePath::FastPath,
            pattern: Some(pattern.into()),
        }
    }

    pub fn agent() -> Self {
        Self {
            path: RoutePath::Agent,
            pattern: None,
        }
    }
}

/// One executed tool call, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub result: String,
    pub success: bool,
    pub rationale: String,
    pub confidence: f64,
}

/// A candidate offered for disambiguation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub score: u8,
}

/// Extra information attached to an answer (ambiguity, degradation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Candidate>,
}

impl Note {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }
}

/// A fully resolved answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub answer: String,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub route: RouteDecision,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
    /// Set when the agent hit a limit or the model failed
    #[serde(default)]
    pub degraded: bool,
    /// Set when served from the response cache
    #[serde(default)]
    pub cached: bool,
    pub trace: Trace,
}

impl Response {
    pub fn trace_id(&self) -> &str {
        &self.trace.trace_id
    }

    /// Whether this response may be written to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.success && !self.degraded
    }
}
