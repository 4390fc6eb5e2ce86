//! Shared drug resolution for the knowledge-backed tools.

use medquery_core::error::{KnowledgeError, ToolError};
use medquery_core::knowledge::{DrugRecord, KnowledgeBase};
use medquery_core::tool::{CONFIRMED_DRUGS_KEY, ToolKind};

/// Minimum fuzzy score for a name to resolve to a catalog record.
pub const MATCH_THRESHOLD: u8 = 60;

/// A catalog record found for a free-text name.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub record: DrugRecord,
    pub score: u8,
}

/// Exact lookup first, then the best fuzzy match at or above the threshold.
pub async fn resolve(
    kb: &dyn KnowledgeBase,
    tool: ToolKind,
    name: &str,
) -> Result<Option<Resolved>, ToolError> {
    if let Some(record) = kb.get(name).await.map_err(|e| knowledge_error(tool, e))? {
        return Ok(Some(Resolved { record, score: 100 }));
    }

    let best = kb
        .search(name, 1)
        .await
        .map_err(|e| knowledge_error(tool, e))?
        .into_iter()
        .next()
        .filter(|m| m.score >= MATCH_THRESHOLD);

    Ok(best.map(|m| Resolved {
        record: m.record,
        score: m.score,
    }))
}

/// Like [`resolve`], but a missing drug is a `NotFound` error.
pub async fn require(
    kb: &dyn KnowledgeBase,
    tool: ToolKind,
    name: &str,
) -> Result<Resolved, ToolError> {
    resolve(kb, tool, name)
        .await?
        .ok_or_else(|| ToolError::NotFound(format!("medication '{name}'")))
}

pub fn knowledge_error(tool: ToolKind, e: KnowledgeError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.name().to_string(),
        reason: e.to_string(),
    }
}

/// Read a required, non-blank string argument.
pub fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Insert the confirmed-drug list into a tool's structured data.
pub fn with_confirmed(mut data: serde_json::Value, records: &[&DrugRecord]) -> serde_json::Value {
    let mut names: Vec<String> = records.iter().map(|r| r.base_name()).collect();
    names.sort();
    names.dedup();
    if let Some(obj) = data.as_object_mut() {
        obj.insert(CONFIRMED_DRUGS_KEY.to_string(), serde_json::json!(names));
    }
    data
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}
