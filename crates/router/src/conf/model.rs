//! Model: RouterConfig and related structs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// TCP address the newline-delimited JSON listener binds to
    pub bind_address: String,
    pub max_connections: usize,
    /// Longest accepted line; longer lines are skipped
    pub max_line_bytes: usize,
    pub shutdown_grace_secs: u64,
    pub routing: RoutingConfig,
    pub sink: SinkConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

/// Which records get date-bucketed, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub type_field: String,
    /// `type` value that enables date-based routing
    pub sentinel_type: String,
    pub timestamp_field: String,
    /// Canonical event-time field written on routed records
    pub target_field: String,
    pub index_prefix: String,
    /// Tag appended to `tags` when the timestamp cannot be parsed
    pub failure_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub url: String,
    /// Index used for records without a destination override
    pub default_index: String,
    pub username: String,
    pub password: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: String },
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            max_connections: 1024,
            max_line_bytes: crate::record::MAX_LINE_SIZE,
            shutdown_grace_secs: 10,
            routing: RoutingConfig::default(),
            sink: SinkConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            type_field: "type".to_string(),
            sentinel_type: "travel_agent".to_string(),
            timestamp_field: "timestamp".to_string(),
            target_field: "@timestamp".to_string(),
            index_prefix: "travel_agent-".to_string(),
            failure_tag: "_dateparsefailure".to_string(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: "http://elasticsearch:9200".to_string(),
            default_index: "logstash".to_string(),
            username: "elastic".to_string(),
            password: "".to_string(),
            request_timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 250,
            accept_invalid_certs: false,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:9600".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            output: LogOutput::Stdout,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("routing.type_field", &self.type_field),
            ("routing.sentinel_type", &self.sentinel_type),
            ("routing.timestamp_field", &self.timestamp_field),
            ("routing.target_field", &self.target_field),
            ("routing.index_prefix", &self.index_prefix),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", name));
            }
        }
        Ok(())
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("sink.url must be an http(s) URL, got: {}", self.url));
        }
        if self.default_index.trim().is_empty() {
            return Err("sink.default_index must not be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("sink.request_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
