//! Provider selection from configuration.

use medquery_config::ModelConfig;
use medquery_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured language model provider.
///
/// Both supported providers speak the OpenAI chat-completions protocol; they
/// differ in default endpoint and whether an API key is sent.
pub fn build_from_config(config: &ModelConfig, timeout: Duration) -> Arc<dyn Provider> {
    let provider = match config.provider.as_str() {
        "ollama" => OpenAiCompatProvider::new(
            "ollama",
            &config.base_url,
            config.api_key.clone().unwrap_or_else(|| "ollama".into()),
        ),
        other => OpenAiCompatProvider::new(
            other,
            &config.base_url,
            config.api_key.clone().unwrap_or_default(),
        ),
    };

    tracing::debug!(
        provider = %config.provider,
        base_url = %provider.base_url(),
        model = %config.model,
        "Configured language model provider"
    );

    Arc::new(provider.with_timeout(timeout))
}
