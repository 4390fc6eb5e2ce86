//! `medquery doctor` — Diagnose system health.

use medquery_config::AppConfig;
use std::time::Duration;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("MedQuery Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `medquery config init`)");
    }
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            return Err(e.into());
        }
    };
    match config.validate() {
        Ok(()) => println!("  ✅ Configuration valid"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    match medquery_agent::load_knowledge(&config.knowledge).await {
        Ok(kb) => match kb.stats().await {
            Ok(stats) => println!("  ✅ Catalog loaded: {} drugs", stats.total_drugs),
            Err(e) => {
                println!("  ❌ Catalog unreadable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Catalog failed to load: {e}");
            issues += 1;
        }
    }

    let provider = medquery_providers::build_from_config(
        &config.model,
        Duration::from_secs(config.agent.model_timeout_secs),
    );
    match provider.health_check().await {
        Ok(true) => println!("  ✅ Model reachable: {} via {}", config.model.model, provider.name()),
        Ok(false) | Err(_) => {
            println!(
                "  ⚠️  Model unreachable at {}; only fast-path questions will be answered",
                config.model.base_url
            );
            issues += 1;
        }
    }

    if config.model.provider == "openai" && !config.has_api_key() {
        println!("  ⚠️  No API key configured (set MEDQUERY_API_KEY)");
        issues += 1;
    }

    if config.external.enabled {
        println!("  ✅ External label source: {}", config.external.base_url);
    } else {
        println!("  ℹ️  External label source disabled");
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
