//! Wiring the engine together from configuration.

use medquery_config::{AppConfig, ExternalConfig, KnowledgeConfig};
use medquery_core::error::KnowledgeError;
use medquery_core::event::EventBus;
use medquery_core::knowledge::KnowledgeBase;
use medquery_core::provider::Provider;
use medquery_core::tool::ToolRegistry;
use medquery_knowledge::InMemoryKnowledgeBase;
use medquery_tools::ExternalSourceTool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::agent_loop::AgentLoop;
use crate::cache::ResponseCache;
use crate::router::QueryRouter;

/// Load the catalog named in config, or the bundled seed catalog.
pub async fn load_knowledge(config: &KnowledgeConfig) -> Result<Arc<dyn KnowledgeBase>, KnowledgeError> {
    let kb = match &config.database_path {
        Some(path) => InMemoryKnowledgeBase::load(path).await?,
        None => {
            let kb = InMemoryKnowledgeBase::seed()?;
            info!(drugs = kb.len(), "Using bundled seed catalog");
            kb
        }
    };
    Ok(Arc::new(kb))
}

/// The knowledge-backed tools, plus the external label source when enabled.
pub fn build_registry(kb: Arc<dyn KnowledgeBase>, external: &ExternalConfig) -> ToolRegistry {
    let mut registry = medquery_tools::default_registry(kb);
    if external.enabled {
        registry.register(Box::new(ExternalSourceTool::new(
            external.base_url.clone(),
            Duration::from_secs(external.timeout_secs),
        )));
    }
    registry
}

/// Build a router around an already constructed provider.
pub fn build_router_with(
    config: &AppConfig,
    kb: Arc<dyn KnowledgeBase>,
    provider: Arc<dyn Provider>,
) -> QueryRouter {
    let event_bus = Arc::new(EventBus::default());
    let tools = Arc::new(build_registry(kb.clone(), &config.external));
    info!(tools = tools.len(), model = %config.model.model, "Tool registry ready");

    let agent = AgentLoop::from_config(provider, tools, event_bus.clone(), &config.model, &config.agent);
    QueryRouter::new(kb, agent, Arc::new(ResponseCache::new()), event_bus)
        .with_fast_path(&config.fast_path)
        .with_locale(config.locale.clone())
        .with_history_limit(config.traces.history_limit)
}

/// Build the full engine: catalog, configured provider, tools and router.
pub async fn build_router(config: &AppConfig) -> Result<Arc<QueryRouter>, KnowledgeError> {
    let kb = load_knowledge(&config.knowledge).await?;
    let provider = medquery_providers::build_from_config(
        &config.model,
        Duration::from_secs(config.agent.model_timeout_secs),
    );
    Ok(Arc::new(build_router_with(config, kb, provider)))
}
