//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub redis_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_keepalive_seconds: u64,
    /// 意外断线后的固定重连间隔。
    pub mqtt_reconnect_interval_seconds: u64,
    /// 超过该次数后停止重连，进入终态。
    pub mqtt_max_reconnect_attempts: u32,
    pub ws_ping_interval_seconds: u64,
    /// 每个连接的发送缓冲（帧数），写满视为投递失败。
    pub ws_send_buffer: usize,
    pub cache_latest_ttl_seconds: u64,
    pub cache_series_ttl_seconds: u64,
    pub cache_series_cap: usize,
    pub ingest_enabled: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("IOT_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("IOT_DATABASE_URL".to_string()))?;
        let http_addr = env::var("IOT_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let redis_url =
            env::var("IOT_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let mqtt_host = env::var("IOT_MQTT_HOST").unwrap_or_else(|_| "localhost".to_string());
        let mqtt_port = read_with_default("IOT_MQTT_PORT", 1883u16)?;
        let mqtt_username = read_optional("IOT_MQTT_USERNAME");
        let mqtt_password = read_optional("IOT_MQTT_PASSWORD");
        let mqtt_keepalive_seconds = read_with_default("IOT_MQTT_KEEPALIVE_SECONDS", 60u64)?;
        let mqtt_reconnect_interval_seconds =
            read_with_default("IOT_MQTT_RECONNECT_INTERVAL_SECONDS", 5u64)?;
        let mqtt_max_reconnect_attempts =
            read_with_default("IOT_MQTT_MAX_RECONNECT_ATTEMPTS", 10u32)?;
        let ws_ping_interval_seconds = read_with_default("IOT_WS_PING_INTERVAL_SECONDS", 30u64)?;
        let ws_send_buffer = read_with_default("IOT_WS_SEND_BUFFER", 64usize)?.max(1);
        let cache_latest_ttl_seconds =
            read_with_default("IOT_CACHE_LATEST_TTL_SECONDS", 3600u64)?;
        let cache_series_ttl_seconds =
            read_with_default("IOT_CACHE_SERIES_TTL_SECONDS", 86_400u64)?;
        let cache_series_cap = read_with_default("IOT_CACHE_SERIES_CAP", 100usize)?.max(1);
        let ingest_enabled = read_bool_with_default("IOT_INGEST", true)?;

        Ok(Self {
            http_addr,
            database_url,
            redis_url,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_keepalive_seconds,
            mqtt_reconnect_interval_seconds,
            mqtt_max_reconnect_attempts,
            ws_ping_interval_seconds,
            ws_send_buffer,
            cache_latest_ttl_seconds,
            cache_series_ttl_seconds,
            cache_series_cap,
            ingest_enabled,
        })
    }
}

/// 读取可解析的环境变量，缺省时使用默认值。
fn read_with_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

/// 读取开关变量：`1|true|on` 与 `0|false|off`，其他取值报错。
fn read_bool_with_default(key: &str, default: bool) -> Result<bool, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}
