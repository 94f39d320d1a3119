use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub system: SystemConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Upper bound on how many stream fragments the producer may buffer
    /// ahead of the consumer.
    pub channel_buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    /// Layered configuration: defaults, then an optional
    /// `config/{CONFIG_ENV}.toml` file, then `APP__`-prefixed environment
    /// variables. Every field has a default, so an empty environment is
    /// fully defined.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .set_default("provider.model", "gpt-3.5-turbo")?
            .set_default("provider.max_tokens", 500)?
            .set_default("provider.temperature", 0.7)?
            .set_default("provider.api_base", "https://api.openai.com/v1")?
            .set_default("storage.database_path", "chatbot.db")?
            .set_default("system.channel_buffer_size", 100)?
            .set_default("logging.level", "info")?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn api_key() -> Result<String> {
        env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_well_defined() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.model, "gpt-3.5-turbo");
        assert_eq!(settings.provider.max_tokens, 500);
        assert_eq!(settings.storage.database_path, "chatbot.db");
        assert_eq!(settings.system.channel_buffer_size, 100);
    }
}
