//! Query router: the service facade.
//!
//! Every query goes cache → fast path → agent. The router owns the response
//! cache, the resolution counters and the recent trace history, and turns
//! fast-path resolutions and agent outcomes into [`Response`]s.

use medquery_config::FastPathConfig;
use medquery_core::error::Error;
use medquery_core::event::{DomainEvent, EventBus};
use medquery_core::knowledge::KnowledgeBase;
use medquery_core::query::{DEFAULT_LOCALE, Query};
use medquery_core::response::{Note, Response, RouteDecision, RoutePath};
use medquery_core::trace::{Entities, EntityKind, Intent, TraceDigest};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent_loop::AgentLoop;
use crate::cache::ResponseCache;
use crate::confidence::{ResolutionSignals, cross_confirmed, estimate};
use crate::emitter::{FrameSequence, ResponseFrame, deliver};
use crate::fast_path::{FastPathClassifier, FastPathOutcome, FastPattern, FastResolution};
use crate::intent::{detect_intent, extract_entities};
use crate::trace_builder::TraceBuilder;

/// Recent traces kept when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Frames buffered ahead of a slow stream consumer.
const STREAM_BUFFER: usize = 32;

/// Result of a fast-path-only lookup.
#[derive(Debug, Clone)]
pub enum FastLookup {
    Resolved(Box<Response>),
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fast_path_resolutions: u64,
    pub agent_resolutions: u64,
    pub recent_traces: usize,
}

pub struct QueryRouter {
    kb: Arc<dyn KnowledgeBase>,
    cache: Arc<ResponseCache>,
    fast_path: FastPathClassifier,
    agent: AgentLoop,
    event_bus: Arc<EventBus>,
    locale: String,
    history_limit: usize,
    history: Mutex<VecDeque<TraceDigest>>,
    fast_resolutions: AtomicU64,
    agent_resolutions: AtomicU64,
}

impl QueryRouter {
    pub fn new(
        kb: Arc<dyn KnowledgeBase>,
        agent: AgentLoop,
        cache: Arc<ResponseCache>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            fast_path: FastPathClassifier::new(kb.clone(), &FastPathConfig::default()),
            kb,
            cache,
            agent,
            event_bus,
            locale: DEFAULT_LOCALE.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history: Mutex::new(VecDeque::new()),
            fast_resolutions: AtomicU64::new(0),
            agent_resolutions: AtomicU64::new(0),
        }
    }

    pub fn with_fast_path(mut self, config: &FastPathConfig) -> Self {
        self.fast_path = FastPathClassifier::new(self.kb.clone(), config);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeBase> {
        &self.kb
    }

    fn validate(&self, raw: &str) -> Result<Query, Error> {
        let query = Query::new(raw, &self.locale)?;
        self.event_bus.publish(DomainEvent::QueryReceived {
            fingerprint: query.fingerprint().to_string(),
            content_preview: query.raw().chars().take(80).collect(),
            timestamp: chrono::Utc::now(),
        });
        Ok(query)
    }

    /// Try the fast path alone. The cache is neither read nor written.
    pub async fn fast_lookup(&self, raw: &str) -> Result<FastLookup, Error> {
        let query = self.validate(raw)?;
        Ok(match self.fast_response(&query).await {
            Some(response) => {
                self.record(&query, &response);
                FastLookup::Resolved(Box::new(response))
            }
            None => FastLookup::Unresolved,
        })
    }

    /// Resolve a query: cache, then fast path, then agent.
    ///
    /// Only validation fails; every other problem yields a (possibly
    /// degraded) response.
    pub async fn resolve(&self, raw: &str) -> Result<Response, Error> {
        let query = self.validate(raw)?;
        Ok(self.resolve_query(&query).await)
    }

    /// Resolve a query and deliver it as frames.
    ///
    /// Resolution runs in its own task and completes (and is cached) even if
    /// the receiver is dropped early.
    pub fn resolve_stream(self: &Arc<Self>, raw: &str) -> Result<mpsc::Receiver<ResponseFrame>, Error> {
        let query = self.validate(raw)?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let response = router.resolve_query(&query).await;
            if !deliver(FrameSequence::new(response), &tx).await {
                debug!(fingerprint = query.fingerprint(), "Stream consumer left before the end");
            }
        });
        Ok(rx)
    }

    /// Drop every cached response. Returns how many were removed.
    pub fn invalidate_cache(&self) -> usize {
        let removed = self.cache.clear();
        info!(entries_removed = removed, "Response cache cleared");
        self.event_bus.publish(DomainEvent::CacheCleared {
            entries_removed: removed,
            timestamp: chrono::Utc::now(),
        });
        removed
    }

    pub fn stats(&self) -> RouterStats {
        let counters = self.cache.counters();
        RouterStats {
            cache_entries: self.cache.len(),
            cache_hits: counters.hits,
            cache_misses: counters.misses,
            fast_path_resolutions: self.fast_resolutions.load(Ordering::Relaxed),
            agent_resolutions: self.agent_resolutions.load(Ordering::Relaxed),
            recent_traces: self.history().len(),
        }
    }

    /// Digests of the most recent resolutions, newest first.
    pub fn recent_traces(&self) -> Vec<TraceDigest> {
        self.history().iter().rev().cloned().collect()
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<TraceDigest>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn resolve_query(&self, query: &Query) -> Response {
        if let Some(hit) = self.cache.get(query) {
            info!(
                fingerprint = query.fingerprint(),
                trace_id = hit.trace_id(),
                route = %hit.route.path,
                "Cache hit"
            );
            self.event_bus.publish(DomainEvent::CacheHit {
                fingerprint: query.fingerprint().to_string(),
                trace_id: hit.trace_id().to_string(),
                timestamp: chrono::Utc::now(),
            });
            return hit;
        }

        let response = match self.fast_response(query).await {
            Some(response) => response,
            None => self.agent_response(query).await,
        };

        self.cache.put(query, &response);
        self.record(query, &response);
        response
    }

    async fn entities(&self, query: &Query) -> Entities {
        match self.kb.known_names().await {
            Ok(names) => extract_entities(query, &names),
            Err(e) => {
                warn!(error = %e, "Could not list known drug names");
                extract_entities(query, &[])
            }
        }
    }

    async fn fast_response(&self, query: &Query) -> Option<Response> {
        let FastPathOutcome::Resolved(resolution) = self.fast_path.classify(query).await else {
            return None;
        };

        let mut trace = TraceBuilder::new();
        let mut entities = self.entities(query).await;
        if !resolution.drugs.is_empty() && !resolution.ambiguous {
            entities.insert(EntityKind::Drug, resolution.drugs.clone());
        }
        trace.set_entities(entities);
        trace.set_intent(fast_intent(&resolution));

        let route = RouteDecision::fast_path(resolution.pattern.name());
        let signals = ResolutionSignals {
            match_score: resolution.match_score,
            ambiguous: resolution.ambiguous,
            ..Default::default()
        };
        let confidence = estimate(&route, &signals);
        trace.step(
            format!("fast_path:{}", resolution.pattern),
            resolution.reasoning.clone(),
            confidence.score,
        );

        let trace = trace.finalize(confidence, true);
        Some(Response {
            success: true,
            answer: resolution.answer,
            confidence: confidence.score,
            confidence_level: confidence.level,
            route,
            tool_calls: Vec::new(),
            note: resolution.note,
            degraded: false,
            cached: false,
            trace,
        })
    }

    async fn agent_response(&self, query: &Query) -> Response {
        let mut trace = TraceBuilder::new();
        trace.set_entities(self.entities(query).await);

        let outcome = self.agent.resolve(query, &mut trace).await;
        trace.set_intent(detect_intent(query, &outcome.requested_kinds()));

        let route = RouteDecision::agent();
        let signals = ResolutionSignals {
            successful_tools: outcome.successful_tools,
            failed_tools: outcome.failed_tools,
            cross_confirmed: cross_confirmed(&outcome.outputs),
            model_certainty: outcome.model_certainty,
            degraded: outcome.degraded(),
            ..Default::default()
        };
        let confidence = estimate(&route, &signals);
        trace.step(
            "estimate_confidence",
            format!(
                "{} successful and {} failed tool calls{}",
                signals.successful_tools,
                signals.failed_tools,
                if signals.cross_confirmed {
                    ", drug confirmed by several tools"
                } else {
                    ""
                }
            ),
            confidence.score,
        );

        let degraded = outcome.degraded();
        let success = !degraded;
        let tool_calls = trace.tool_calls().to_vec();
        let trace = trace.finalize(confidence, success);
        Response {
            success,
            answer: outcome.answer,
            confidence: confidence.score,
            confidence_level: confidence.level,
            route,
            tool_calls,
            note: outcome.termination.note().map(Note::new),
            degraded,
            cached: false,
            trace,
        }
    }

    fn record(&self, query: &Query, response: &Response) {
        let counter = match response.route.path {
            RoutePath::FastPath => &self.fast_resolutions,
            RoutePath::Agent => &self.agent_resolutions,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        {
            let mut history = self.history();
            history.push_back(response.trace.digest(query.raw(), response.route.path));
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }

        info!(
            fingerprint = query.fingerprint(),
            trace_id = response.trace_id(),
            route = %response.route.path,
            confidence = response.confidence,
            degraded = response.degraded,
            duration_ms = response.trace.duration_ms,
            "Query resolved"
        );
        self.event_bus.publish(DomainEvent::QueryResolved {
            trace_id: response.trace_id().to_string(),
            path: response.route.path,
            confidence: response.confidence,
            degraded: response.degraded,
            duration_ms: response.trace.duration_ms,
            timestamp: chrono::Utc::now(),
        });
    }
}

fn fast_intent(resolution: &FastResolution) -> Intent {
    match resolution.pattern {
        FastPattern::SymptomSearch => Intent::SymptomSearch,
        _ => Intent::DrugInfo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use medquery_core::error::{ProviderError, ValidationError};
    use medquery_core::trace::ConfidenceLevel;
    use serde_json::json;
    use std::time::Duration;

    fn router(provider: Arc<SequentialMockProvider>) -> QueryRouter {
        let kb: Arc<dyn KnowledgeBase> = seed_kb();
        let bus = Arc::new(EventBus::default());
        let tools = Arc::new(medquery_tools::default_registry(kb.clone()));
        let agent = AgentLoop::new(provider, "mock-model", tools, bus.clone());
        QueryRouter::new(kb, agent, Arc::new(ResponseCache::new()), bus)
    }

    fn no_model() -> Arc<SequentialMockProvider> {
        Arc::new(SequentialMockProvider::new(vec![]))
    }

    fn comparison_provider() -> Arc<SequentialMockProvider> {
        Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call(
                "compare_medications",
                json!({"drug1": "doliprane", "drug2": "aspirine"}),
            )],
            "L'utilisateur veut remplacer l'aspirine par du Doliprane.",
            "Non. L'aspirine est ici un antiagrégant plaquettaire, le Doliprane ne la remplace pas. \
             Consultez votre médecin. confidence: 0.9",
        ))
    }

    #[tokio::test]
    async fn doliprane_takes_the_fast_path() {
        let router = router(no_model());
        let response = router.resolve("doliprane").await.unwrap();

        assert!(response.success);
        assert_eq!(response.route, RouteDecision::fast_path("bare_drug_name"));
        assert!((response.confidence - 0.95).abs() < 1e-9);
        assert_eq!(response.confidence_level, ConfidenceLevel::High);
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.trace.steps.len(), 1);
        assert_eq!(response.trace.intent, Intent::DrugInfo);
        assert_eq!(response.trace.drugs(), ["Doliprane 1000mg".to_string()]);
        assert!(response.answer.contains("Paracétamol"));
        assert_eq!(router.stats().fast_path_resolutions, 1);
    }

    #[tokio::test]
    async fn substitution_question_uses_the_agent() {
        let provider = comparison_provider();
        let router = router(provider.clone());
        let response = router.resolve("Je peux prendre doliprane au lieu de aspirine ?").await.unwrap();

        assert_eq!(response.route, RouteDecision::agent());
        assert!(!response.degraded);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool, "compare_medications");
        assert!(response.tool_calls[0].success);
        assert!(response.tool_calls[0].result.contains("antiplatelet_danger"));
        assert!(response.answer.starts_with("Non."));
        assert_eq!(response.trace.intent, Intent::Comparison);
        assert_eq!(response.trace.drugs(), ["doliprane".to_string(), "aspirine".to_string()]);
        assert!(response.confidence > 0.5 && response.confidence < 0.85);
        assert_eq!(provider.call_count(), 2);

        let selected: Vec<_> = response
            .trace
            .tool_decisions
            .iter()
            .filter(|d| d.selected)
            .map(|d| d.tool.as_str())
            .collect();
        assert_eq!(selected, vec!["compare_medications"]);
        assert_eq!(response.trace.tool_decisions.len(), 7);
    }

    #[tokio::test]
    async fn repeated_complex_query_hits_the_cache() {
        let provider = comparison_provider();
        let router = router(provider.clone());
        let first = router.resolve("doliprane au lieu de aspirine").await.unwrap();
        let second = router.resolve("Doliprane au lieu de Aspirine ?").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.trace_id(), second.trace_id());
        assert_eq!(first.answer, second.answer);
        assert_eq!(provider.call_count(), 2);

        let stats = router.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.agent_resolutions, 1);
    }

    #[tokio::test]
    async fn tool_failure_lowers_confidence() {
        let succeeding = router(Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("get_drug_details", json!({"drug_name": "advil"}))],
            "",
            "Advil contient de l'ibuprofène.",
        )));
        let failing = router(Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("get_drug_details", json!({"drug_name": "unknownium"}))],
            "",
            "Je ne trouve pas ce médicament.",
        )));

        let ok = succeeding.resolve("que contient advil et pourquoi").await.unwrap();
        let failed = failing.resolve("que contient unknownium et pourquoi").await.unwrap();

        assert!(!failed.tool_calls[0].success);
        assert!(failed.tool_calls[0].result.starts_with("Error: "));
        assert!(failed.confidence < ok.confidence);
        assert_eq!(failed.confidence_level, ConfidenceLevel::Low);
        assert!(failed.success);
    }

    #[tokio::test]
    async fn cross_confirmed_drug_raises_confidence() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("get_drug_details", json!({"drug_name": "advil"})),
                make_tool_call("find_alternatives", json!({"drug_name": "advil"})),
            ],
            "",
            "Nurofen contient le même principe actif.",
        ));
        let router = router(provider);
        let response = router.resolve("je cherche un equivalent a advil").await.unwrap();
        // Base 0.55 + two successes + confirmation
        assert!((response.confidence - 0.85).abs() < 1e-9);
        assert_eq!(response.confidence_level, ConfidenceLevel::High);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let provider = no_model();
        let router = Arc::new(router(provider.clone()));
        for raw in ["", "   ", "?!"] {
            let err = router.resolve(raw).await.unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::EmptyQuery)));
        }
        assert_eq!(router.stats().cache_entries, 0);
        assert_eq!(provider.call_count(), 0);
        assert!(router.resolve_stream("  ").is_err());
        assert!(router.fast_lookup("").await.is_err());
    }

    #[tokio::test]
    async fn degraded_responses_are_not_cached() {
        let provider = Arc::new(SequentialMockProvider::scripted(vec![
            Err(ProviderError::Network("connection refused".into())),
            Err(ProviderError::Network("connection refused".into())),
        ]));
        let router = router(provider.clone());

        let first = router.resolve("doliprane au lieu de aspirine").await.unwrap();
        assert!(first.degraded);
        assert!(!first.success);
        assert!(first.confidence <= 0.45);
        assert!(first.note.is_some());
        assert_eq!(router.stats().cache_entries, 0);

        let second = router.resolve("doliprane au lieu de aspirine").await.unwrap();
        assert!(!second.cached);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn stream_concatenates_to_the_answer() {
        let router = Arc::new(router(no_model()));
        let mut rx = router.resolve_stream("effets secondaires du doliprane").unwrap();

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.first().unwrap().event_type(), "metadata");
        assert_eq!(frames.last().unwrap().event_type(), "done");

        let atomic = router.resolve("effets secondaires du doliprane").await.unwrap();
        assert!(atomic.cached);
        assert_eq!(crate::emitter::collect_answer(&frames), atomic.answer);
    }

    #[tokio::test]
    async fn dropped_stream_still_caches() {
        let provider = comparison_provider();
        let router = Arc::new(router(provider));
        let rx = router.resolve_stream("doliprane au lieu de aspirine").unwrap();
        drop(rx);

        for _ in 0..100 {
            if router.stats().cache_entries == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(router.stats().cache_entries, 1);
        assert!(router.resolve("doliprane au lieu de aspirine").await.unwrap().cached);
    }

    #[tokio::test]
    async fn fast_lookup_bypasses_the_cache() {
        let router = router(no_model());
        let FastLookup::Resolved(response) = router.fast_lookup("posologie de l'efferalgan").await.unwrap() else {
            panic!("expected a fast path answer");
        };
        assert_eq!(response.route.pattern.as_deref(), Some("dosage"));
        assert_eq!(router.stats().cache_entries, 0);

        let unresolved = router.fast_lookup("doliprane au lieu de aspirine").await.unwrap();
        assert!(matches!(unresolved, FastLookup::Unresolved));
    }

    #[tokio::test]
    async fn invalidate_clears_entries() {
        let router = router(no_model());
        router.resolve("doliprane").await.unwrap();
        router.resolve("advil").await.unwrap();
        assert_eq!(router.invalidate_cache(), 2);
        assert_eq!(router.stats().cache_entries, 0);
        assert!(!router.resolve("doliprane").await.unwrap().cached);
    }

    #[tokio::test]
    async fn trace_history_is_bounded_newest_first() {
        let router = router(no_model()).with_history_limit(2);
        for raw in ["doliprane", "advil", "xanax"] {
            router.resolve(raw).await.unwrap();
        }
        let traces = router.recent_traces();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].query, "xanax");
        assert_eq!(traces[1].query, "advil");
        assert_eq!(traces[0].path, RoutePath::FastPath);
    }

    #[tokio::test]
    async fn events_follow_resolution() {
        let router = router(no_model());
        let mut rx = router.event_bus().subscribe();
        router.resolve("doliprane").await.unwrap();
        router.resolve("doliprane").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(serde_json::to_value(event.as_ref()).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert_eq!(
            kinds,
            vec!["query_received", "query_resolved", "query_received", "cache_hit"]
        );
    }

    #[tokio::test]
    async fn disabled_fast_path_sends_everything_to_the_agent() {
        let provider = Arc::new(SequentialMockProvider::single_text("Doliprane: paracétamol."));
        let config = FastPathConfig {
            enabled: false,
            ..Default::default()
        };
        let router = router(provider.clone()).with_fast_path(&config);
        let response = router.resolve("doliprane").await.unwrap();
        assert_eq!(response.route.path, RoutePath::Agent);
        assert_eq!(provider.call_count(), 1);
    }
}
