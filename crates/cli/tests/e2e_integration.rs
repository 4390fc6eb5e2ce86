//! End-to-end tests for the MedQuery engine.
//!
//! These exercise the full pipeline the binary wires up: seed catalog, tool
//! registry, agent loop and router, with a scripted model standing in for
//! the language model.

use std::sync::Arc;

use medquery_agent::{FastLookup, QueryRouter, ResponseFrame, build_router_with, collect_answer, load_knowledge};
use medquery_config::AppConfig;
use medquery_core::error::ProviderError;
use medquery_core::message::{Message, MessageToolCall};
use medquery_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use medquery_core::response::RoutePath;
use medquery_core::trace::{ConfidenceLevel, Intent};

// ── Scripted Provider ────────────────────────────────────────────────────

/// A model stand-in that returns scripted results in sequence.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            call_count: std::sync::Mutex::new(0),
        }
    }

    fn silent() -> Self {
        Self::new(Vec::new())
    }

    fn text(response: &str) -> Self {
        Self::new(vec![Ok(text_response(response))])
    }

    fn tool_then_text(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![Ok(tool_response(tool_calls)), Ok(text_response(answer))])
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let resp = responses[*count].clone();
        *count += 1;
        resp
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = text_response("");
    response.message.tool_calls = tool_calls;
    response
}

fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

async fn engine(provider: Arc<ScriptedProvider>) -> Arc<QueryRouter> {
    let mut config = AppConfig::default();
    config.external.enabled = false;
    let kb = load_knowledge(&config.knowledge).await.unwrap();
    Arc::new(build_router_with(&config, kb, provider))
}

// ── E2E: Fast path ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_bare_drug_name_never_calls_the_model() {
    let provider = Arc::new(ScriptedProvider::silent());
    let router = engine(provider.clone()).await;

    let response = router.resolve("Doliprane").await.unwrap();
    assert!(response.success);
    assert_eq!(response.route.path, RoutePath::FastPath);
    assert!(response.answer.contains("Doliprane"));
    assert_eq!(response.confidence_level, ConfidenceLevel::High);
    assert_eq!(response.trace.intent, Intent::DrugInfo);
    assert!(response.tool_calls.is_empty());
    assert_eq!(response.trace.steps.len(), 1);
    assert!(response.trace.steps[0].action.starts_with("fast_path:"));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn e2e_symptom_question_lists_catalog_drugs() {
    let provider = Arc::new(ScriptedProvider::silent());
    let router = engine(provider.clone()).await;

    let response = router.resolve("médicaments pour la fièvre").await.unwrap();
    assert_eq!(response.route.pattern.as_deref(), Some("symptom_search"));
    assert!(response.answer.starts_with("**Médicaments pour"));
    assert_eq!(provider.calls(), 0);
}

// ── E2E: Agent path ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_substitution_question_runs_tools_and_explains() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![
            make_tool_call("compare_medications", serde_json::json!({"drug1": "doliprane", "drug2": "aspirine"})),
            make_tool_call("check_drug_interactions", serde_json::json!({"drugs": ["doliprane", "aspirine"]})),
        ],
        "Attention : le Doliprane (paracétamol) ne remplace pas l'aspirine prescrite contre les caillots.",
    ));
    let router = engine(provider.clone()).await;

    let response = router.resolve("doliprane au lieu de aspirine").await.unwrap();
    assert!(response.success);
    assert!(!response.degraded);
    assert_eq!(response.route.path, RoutePath::Agent);
    assert!(response.answer.contains("paracétamol"));

    let tools: Vec<_> = response.tool_calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(tools, vec!["compare_medications", "check_drug_interactions"]);
    assert!(response.tool_calls.iter().all(|c| c.success));

    // Both calls confirm doliprane and aspirine
    assert_eq!(response.confidence_level, ConfidenceLevel::High);
    assert_eq!(response.trace.intent, Intent::Comparison);
    assert!(response.trace.summary.contains("doliprane"));
    assert!(response.trace.summary.contains("aspirine"));

    let selected: Vec<_> = response
        .trace
        .tool_decisions
        .iter()
        .filter(|d| d.selected)
        .map(|d| d.tool.as_str())
        .collect();
    assert_eq!(selected, vec!["check_drug_interactions", "compare_medications"]);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_english_substitution_question_takes_the_agent_path() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![
            make_tool_call("compare_medications", serde_json::json!({"drug1": "doliprane", "drug2": "aspirine"})),
            make_tool_call("check_drug_interactions", serde_json::json!({"drugs": ["doliprane", "aspirine"]})),
        ],
        "Doliprane (paracetamol) does not replace aspirin prescribed against blood clots.",
    ));
    let router = engine(provider.clone()).await;

    assert!(matches!(
        router.fast_lookup("can i use doliprane instead of aspirine").await.unwrap(),
        FastLookup::Unresolved
    ));

    let response = router.resolve("can i use doliprane instead of aspirine").await.unwrap();
    assert!(response.success);
    assert_eq!(response.route.path, RoutePath::Agent);
    assert!(response.answer.contains("blood clots"));

    let tools: Vec<_> = response.tool_calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(tools, vec!["compare_medications", "check_drug_interactions"]);
    assert_eq!(response.trace.intent, Intent::Comparison);
    assert!(response.trace.summary.contains("doliprane"));
    assert!(response.trace.summary.contains("aspirine"));

    let selected: Vec<_> = response
        .trace
        .tool_decisions
        .iter()
        .filter(|d| d.selected)
        .map(|d| d.tool.as_str())
        .collect();
    assert_eq!(selected, vec!["check_drug_interactions", "compare_medications"]);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_repeated_question_is_served_from_cache() {
    let provider = Arc::new(ScriptedProvider::text("Demandez conseil à votre pharmacien."));
    let router = engine(provider.clone()).await;

    let first = router.resolve("puis-je prendre ça en voyage").await.unwrap();
    let second = router.resolve("Puis-je prendre ça en voyage ?").await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.trace_id(), second.trace_id());
    assert_eq!(first.answer, second.answer);
    assert_eq!(provider.calls(), 1);
    assert_eq!(router.stats().cache_hits, 1);
}

#[tokio::test]
async fn e2e_unreachable_model_degrades_and_retries_next_time() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::Network("connection refused".into())),
        Ok(text_response("Réponse complète.")),
    ]));
    let router = engine(provider.clone()).await;

    let degraded = router.resolve("puis-je prendre ça en voyage").await.unwrap();
    assert!(!degraded.success);
    assert!(degraded.degraded);
    assert!(degraded.note.is_some());
    assert_eq!(degraded.confidence_level, ConfidenceLevel::Low);
    assert_eq!(router.stats().cache_entries, 0);

    let recovered = router.resolve("puis-je prendre ça en voyage").await.unwrap();
    assert!(recovered.success);
    assert!(!recovered.cached);
    assert_eq!(recovered.answer, "Réponse complète.");
}

// ── E2E: Delivery and housekeeping ───────────────────────────────────────

#[tokio::test]
async fn e2e_streamed_answer_matches_resolved_answer() {
    let provider = Arc::new(ScriptedProvider::silent());
    let router = engine(provider).await;

    let mut rx = router.resolve_stream("effets secondaires du doliprane").unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    assert!(matches!(frames.first(), Some(ResponseFrame::Metadata { .. })));
    assert!(matches!(frames.last(), Some(ResponseFrame::Done { .. })));

    let cached = router.resolve("effets secondaires du doliprane").await.unwrap();
    assert!(cached.cached);
    assert_eq!(collect_answer(&frames), cached.answer);
}

#[tokio::test]
async fn e2e_fast_lookup_and_cache_invalidation() {
    let provider = Arc::new(ScriptedProvider::silent());
    let router = engine(provider).await;

    assert!(matches!(router.fast_lookup("advil").await.unwrap(), FastLookup::Resolved(_)));
    assert!(matches!(
        router.fast_lookup("doliprane au lieu de aspirine").await.unwrap(),
        FastLookup::Unresolved
    ));
    assert_eq!(router.stats().cache_entries, 0);

    router.resolve("advil").await.unwrap();
    router.resolve("xanax").await.unwrap();
    assert_eq!(router.invalidate_cache(), 2);
    assert!(!router.resolve("advil").await.unwrap().cached);

    let traces = router.recent_traces();
    assert_eq!(traces.len(), 4);
    assert!(traces.iter().all(|t| t.path == RoutePath::FastPath));
}

#[tokio::test]
async fn e2e_blank_question_is_rejected() {
    let router = engine(Arc::new(ScriptedProvider::silent())).await;
    let err = router.resolve("   ").await.unwrap_err();
    assert!(err.is_validation());
    assert!(router.recent_traces().is_empty());
}
