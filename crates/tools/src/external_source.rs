//! Upstream label lookup against the openFDA drug label endpoint.
//!
//! French brand names are mapped to US generic names first, since openFDA
//! only knows US labels. Network failures and 5xx answers surface as
//! `ToolError::UpstreamUnavailable` so the agent can carry on without them.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use medquery_knowledge::fold;
use std::time::Duration;
use tracing::{debug, warn};

use crate::lookup::{required_str, truncate};

const FRENCH_BRANDS: &[(&str, &str)] = &[
    ("gastral", "omeprazole"),
    ("mopral", "omeprazole"),
    ("inexium", "esomeprazole"),
    ("doliprane", "acetaminophen"),
    ("efferalgan", "acetaminophen"),
    ("dafalgan", "acetaminophen"),
    ("paracetamol", "acetaminophen"),
    ("advil", "ibuprofen"),
    ("nurofen", "ibuprofen"),
    ("voltarene", "diclofenac"),
    ("kardegic", "aspirin"),
    ("aspirine", "aspirin"),
    ("lexomil", "bromazepam"),
    ("xanax", "alprazolam"),
    ("stilnox", "zolpidem"),
    ("imovane", "zopiclone"),
    ("glucophage", "metformin"),
    ("coumadine", "warfarin"),
];

/// Label sections returned to the model, truncated.
const LABEL_SECTIONS: &[&str] = &[
    "indications_and_usage",
    "dosage_and_administration",
    "warnings",
    "adverse_reactions",
    "drug_interactions",
    "pregnancy",
];

const SECTION_MAX_CHARS: usize = 500;

/// US generic name for a French brand, if known.
pub fn generic_name(drug: &str) -> Option<&'static str> {
    let folded = fold(drug);
    let base = folded.split_whitespace().next().unwrap_or_default();
    FRENCH_BRANDS
        .iter()
        .find(|(brand, _)| *brand == base)
        .map(|(_, generic)| *generic)
}

/// Pull the label sections out of an openFDA response body.
pub fn extract_label(body: &serde_json::Value) -> Option<serde_json::Value> {
    let result = body["results"].as_array()?.first()?;

    let first_text = |v: &serde_json::Value| -> Option<String> {
        v.as_array()?
            .first()?
            .as_str()
            .map(|s| truncate(s, SECTION_MAX_CHARS))
    };

    let mut label = serde_json::Map::new();
    if let Some(brand) = first_text(&result["openfda"]["brand_name"]) {
        label.insert("brand_name".into(), brand.into());
    }
    if let Some(generic) = first_text(&result["openfda"]["generic_name"]) {
        label.insert("generic_name".into(), generic.into());
    }
    for section in LABEL_SECTIONS {
        if let Some(text) = first_text(&result[*section]) {
            label.insert((*section).into(), text.into());
        }
    }
    Some(serde_json::Value::Object(label))
}

pub struct ExternalSourceTool {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ExternalSourceTool {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> ToolError {
        ToolError::UpstreamUnavailable {
            tool_name: self.name().to_string(),
            reason: reason.into(),
        }
    }

    /// One label search. `Ok(None)` when openFDA has no match.
    async fn search(&self, term: &str) -> Result<Option<serde_json::Value>, ToolError> {
        let search = format!("openfda.brand_name:\"{term}\" OR openfda.generic_name:\"{term}\"");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("search", search.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: self.name().to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    self.unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        // openFDA answers 404 when a search has no results
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid response: {e}")))?;
        Ok(extract_label(&body))
    }
}

#[async_trait]
impl Tool for ExternalSourceTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ExternalSource
    }

    fn description(&self) -> &str {
        "Look up the official US drug label (openFDA) for a medication: indications, \
         dosage, warnings, adverse reactions, interactions and pregnancy information. \
         French brand names are translated to generic names automatically."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "drug_name": {
                    "type": "string",
                    "description": "Brand or generic medication name"
                }
            },
            "required": ["drug_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let drug = required_str(&arguments, "drug_name")?;
        let generic = generic_name(drug);

        let mut terms: Vec<String> = Vec::new();
        if let Some(generic) = generic {
            debug!(drug, generic, "Mapped French brand to generic name");
            terms.push(generic.to_string());
        }
        terms.push(fold(drug));

        for term in &terms {
            if let Some(mut label) = self.search(term).await? {
                label["source"] = serde_json::json!("openFDA");
                label["searched_as"] = serde_json::json!(term);
                let output = serde_json::to_string_pretty(&label).unwrap_or_default();
                return Ok(ToolOutput::ok(output).with_data(label));
            }
        }

        Err(ToolError::NotFound(format!(
            "no openFDA label for {}",
            terms.join(" / ")
        )))
    }
}
