//! `medquery serve`: start the HTTP gateway.

use super::load_config;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    if let Some(port) = port_override {
        tracing::info!(port, "Overriding configured gateway port");
        config.gateway.port = port;
    }

    println!("MedQuery gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} ({})", config.model.model, config.model.provider);

    medquery_gateway::start(config).await?;

    Ok(())
}
