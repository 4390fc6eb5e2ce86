//! `medquery config` — Configuration management commands.

use medquery_config::AppConfig;
use std::path::Path;

use super::load_config;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;
    if config.model.api_key.is_some() {
        config.model.api_key = Some("***".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_dir().join("config.toml");
    if write_default(&path, force)? {
        println!("Wrote default configuration to {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
    Ok(())
}

/// Write the default config unless a file exists and `force` is off.
/// Returns whether the file was written.
fn write_default(path: &Path, force: bool) -> std::io::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".medquery"));
    }

    #[test]
    fn init_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(write_default(&path, false).unwrap());
        let written = AppConfig::load_from(&path).unwrap();
        assert_eq!(written.locale, AppConfig::default().locale);

        std::fs::write(&path, "locale = \"en\"\n").unwrap();
        assert!(!write_default(&path, false).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "locale = \"en\"\n");

        assert!(write_default(&path, true).unwrap());
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "locale = \"en\"\n");
    }
}
