pub mod ask;
pub mod config_cmd;
pub mod doctor;
pub mod serve;

use medquery_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config.validate()?;
    tracing::debug!(
        provider = %config.model.provider,
        model = %config.model.model,
        "Configuration loaded"
    );
    Ok(config)
}
