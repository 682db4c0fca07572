use crate::config::schema::AppConfig;
use crate::error::{DemoError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("demo-agent"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// Load configuration from the default path, creating it if missing
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`, writing defaults there if it does not exist
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, creating default", path);
        let config = AppConfig::default();
        save_config_to(&config, path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        DemoError::Config(format!("Failed to read config from {:?}: {}", path, e))
    })?;

    let config: AppConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DemoError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(path, content).map_err(|e| {
        DemoError::Config(format!("Failed to write config to {:?}: {}", path, e))
    })?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("demo-agent-config-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_config_path() {
        let path = get_config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_load_creates_default_file() {
        let path = temp_path("config.toml");
        let config = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.pipeline.rank_candidate_cap, 30);
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path("config.toml");
        let mut config = AppConfig::default();
        config.browser.headless = true;
        config.pipeline.wait_ms = 50;
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert!(loaded.browser.headless);
        assert_eq!(loaded.pipeline.wait_ms, 50);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path("config.toml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[pipeline]\nrank_candidate_cap = 5\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.pipeline.rank_candidate_cap, 5);
        assert_eq!(loaded.pipeline.plan_element_cap, 10);
        assert_eq!(loaded.browser.viewport.width, 1280);
        assert!(loaded.ai.providers.contains_key("openai"));
    }
}
