//! Configuration Loader
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml / config.local.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "SNOWDRAFT";

/// 加载应用配置
///
/// # 环境变量示例
/// - `SNOWDRAFT_SERVER__PORT=8080`
/// - `SNOWDRAFT_GENERATOR__URL=http://llm-gateway:8000`
/// - `SNOWDRAFT_GENERATOR__FAKE=true`
/// - `SNOWDRAFT_DATABASE__PATH=/data/snowdraft.db`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置；为 None 时搜索默认文件
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5070)?
        .set_default("generator.url", "http://localhost:8000")?
        .set_default("generator.timeout_secs", 120)?
        .set_default("generator.max_retries", 0)?
        .set_default("generator.max_concurrent", 4)?
        .set_default("generator.fake", false)?
        .set_default("generator.fake_fragment_delay_ms", 40)?
        .set_default("database.path", "data/snowdraft.db")?
        .set_default("database.max_connections", 5)?
        .set_default("playback.event_capacity", 256)?
        .set_default("playback.progress_batch", 8)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 层级分隔符为双下划线，例如 SNOWDRAFT_GENERATOR__URL
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let app_config: AppConfig = builder.build()?.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;
    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if !config.generator.fake && config.generator.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Generator URL cannot be empty".to_string(),
        ));
    }

    if config.generator.max_concurrent == 0 {
        return Err(ConfigError::ValidationError(
            "Generator max_concurrent must be at least 1".to_string(),
        ));
    }

    if config.database.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Database path cannot be empty".to_string(),
        ));
    }

    if config.playback.event_capacity == 0 || config.playback.progress_batch == 0 {
        return Err(ConfigError::ValidationError(
            "Playback event_capacity and progress_batch must be positive".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    if config.generator.fake {
        tracing::info!(
            "Generator: built-in placeholder ({}ms per fragment)",
            config.generator.fake_fragment_delay_ms
        );
    } else {
        tracing::info!("Generator URL: {}", config.generator.url);
        tracing::info!("Generator Timeout: {}s", config.generator.timeout_secs);
    }
    tracing::info!("Generator Max Concurrent: {}", config.generator.max_concurrent);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Event Capacity: {}", config.playback.event_capacity);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_default_config() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_url_allowed_with_fake_generator() {
        let mut config = AppConfig::default();
        config.generator.url = String::new();
        assert!(validate_config(&config).is_err());

        config.generator.fake = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_batch() {
        let mut config = AppConfig::default();
        config.playback.progress_batch = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[generator]\nfake = true\nfake_fragment_delay_ms = 5\n\n[playback]\nevent_capacity = 32"
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(config.generator.fake);
        assert_eq!(config.generator.fake_fragment_delay_ms, 5);
        assert_eq!(config.playback.event_capacity, 32);
        // 未覆盖的项保持默认值
        assert_eq!(config.database.path, "data/snowdraft.db");
    }

    #[test]
    fn test_invalid_file_value_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 0").unwrap();
        assert!(matches!(
            load_config_from_path(Some(file.path())),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
