//! Confidence estimation.
//!
//! Fast-path answers score `0.95 × match_score / 100`. Agent answers start
//! at 0.55 and move with tool outcomes:
//! - +0.1 per successful tool call, at most +0.3
//! - −0.15 per failed tool call, at most −0.3
//! - +0.1 when one drug is confirmed by two or more successful calls
//! - a certainty stated by the model is blended in at 30%
//! - degraded resolutions are capped at 0.45
//!
//! The score is clamped to [0, 1]; the level is a pure function of it.

use medquery_core::response::{RouteDecision, RoutePath};
use medquery_core::tool::ToolOutput;
use medquery_core::trace::ConfidenceLevel;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

const AGENT_BASE: f64 = 0.55;
const SUCCESS_BONUS: f64 = 0.1;
const MAX_SUCCESS_BONUS: f64 = 0.3;
const FAILURE_PENALTY: f64 = 0.15;
const MAX_FAILURE_PENALTY: f64 = 0.3;
const CONFIRMATION_BONUS: f64 = 0.1;
const MODEL_WEIGHT: f64 = 0.3;
const DEGRADED_CAP: f64 = 0.45;

const FAST_PATH_SCALE: f64 = 0.95;
/// Symptom lookups have no name match score.
const SYMPTOM_CONFIDENCE: f64 = 0.9;
/// Ambiguous name matches never report more than medium confidence.
const AMBIGUOUS_CAP: f64 = 0.6;

static MODEL_CERTAINTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:confidence|confiance|certitude)\s*[:=]\s*(\d+(?:\.\d+)?\s*%?|high|medium|low|elevee|élevée|haute|moyenne|faible|basse)")
        .expect("certainty pattern is valid")
});

/// Everything a resolution observed that bears on confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionSignals {
    /// Fast path: similarity of the matched drug (None for symptom lookups)
    pub match_score: Option<u8>,
    /// Fast path: several candidates were too close to call
    pub ambiguous: bool,
    pub successful_tools: usize,
    pub failed_tools: usize,
    /// A drug was confirmed by at least two successful tool calls
    pub cross_confirmed: bool,
    /// Certainty the model stated in its final answer, in [0, 1]
    pub model_certainty: Option<f64>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    pub score: f64,
    pub level: ConfidenceLevel,
}

impl Confidence {
    pub fn new(score: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            score,
            level: ConfidenceLevel::from_score(score),
        }
    }
}

pub fn estimate(route: &RouteDecision, signals: &ResolutionSignals) -> Confidence {
    let mut score = match route.path {
        RoutePath::FastPath => {
            let base = signals
                .match_score
                .map_or(SYMPTOM_CONFIDENCE, |s| FAST_PATH_SCALE * f64::from(s) / 100.0);
            if signals.ambiguous {
                base.min(AMBIGUOUS_CAP)
            } else {
                base
            }
        }
        RoutePath::Agent => {
            let bonus = (SUCCESS_BONUS * signals.successful_tools as f64).min(MAX_SUCCESS_BONUS);
            let penalty = (FAILURE_PENALTY * signals.failed_tools as f64).min(MAX_FAILURE_PENALTY);
            let confirmation = if signals.cross_confirmed {
                CONFIRMATION_BONUS
            } else {
                0.0
            };
            let tools = (AGENT_BASE + bonus - penalty + confirmation).clamp(0.0, 1.0);
            match signals.model_certainty {
                Some(stated) => (1.0 - MODEL_WEIGHT) * tools + MODEL_WEIGHT * stated.clamp(0.0, 1.0),
                None => tools,
            }
        }
    };

    if signals.degraded {
        score = score.min(DEGRADED_CAP);
    }
    Confidence::new(score)
}

/// Parse a certainty the model stated, e.g. `confidence: 0.8`,
/// `confiance: 80%` or `confidence: high`.
pub fn parse_model_certainty(text: &str) -> Option<f64> {
    let raw = MODEL_CERTAINTY.captures(text)?.get(1)?.as_str().trim().to_lowercase();
    let value = match raw.as_str() {
        "high" | "elevee" | "élevée" | "haute" => 0.9,
        "medium" | "moyenne" => 0.6,
        "low" | "faible" | "basse" => 0.3,
        number => {
            let percent = number.ends_with('%');
            let n: f64 = number.trim_end_matches('%').trim().parse().ok()?;
            if percent || n > 1.0 { n / 100.0 } else { n }
        }
    };
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Whether any drug appears in the confirmed list of two or more
/// successful tool outputs.
pub fn cross_confirmed<'a>(outputs: impl IntoIterator<Item = &'a ToolOutput>) -> bool {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for output in outputs.into_iter().filter(|o| o.success) {
        let mut drugs = output.confirmed_drugs();
        drugs.sort();
        drugs.dedup();
        for drug in drugs {
            *seen.entry(drug).or_insert(0) += 1;
        }
    }
    seen.values().any(|n| *n >= 2)
}
