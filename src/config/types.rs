//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 生成服务配置
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 回放与事件配置
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5070
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 生成服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// 生成服务基础 URL
    #[serde(default = "default_generator_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// 网络错误重试次数
    #[serde(default)]
    pub max_retries: u32,

    /// 最大并发生成数（跨故事）
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// 使用内置的占位生成器，不访问外部服务
    #[serde(default)]
    pub fake: bool,

    /// 占位生成器的片段间隔（毫秒）
    #[serde(default = "default_fake_delay")]
    pub fake_fragment_delay_ms: u64,
}

fn default_generator_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_generator_timeout() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    4
}

fn default_fake_delay() -> u64 {
    40
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: default_generator_url(),
            timeout_secs: default_generator_timeout(),
            max_retries: 0,
            max_concurrent: default_max_concurrent(),
            fake: false,
            fake_fragment_delay_ms: default_fake_delay(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/snowdraft.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 回放与事件配置
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// 每个故事事件通道的容量，慢订阅者超出后丢失最旧的事件
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// 合并为一个进度事件的字符数
    #[serde(default = "default_progress_batch")]
    pub progress_batch: usize,
}

fn default_event_capacity() -> usize {
    256
}

fn default_progress_batch() -> usize {
    8
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            progress_batch: default_progress_batch(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5070);
        assert_eq!(config.generator.url, "http://localhost:8000");
        assert!(!config.generator.fake);
        assert_eq!(config.playback.event_capacity, 256);
    }

    #[test]
    fn test_database_url() {
        let config = DatabaseConfig::default();
        assert_eq!(config.database_url(), "sqlite:data/snowdraft.db?mode=rwc");
    }
}
