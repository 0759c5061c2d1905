use crate::intercept::ReplayEndpoint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub intercept: InterceptConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener that pages send their fetches through.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Origin clients use to reach the proxy, when it differs from `host:port`
    /// (e.g. behind a port forward).
    #[serde(default)]
    pub public_origin: Option<String>,
    /// Request header naming the browsing context a fetch belongs to.
    #[serde(default = "default_context_header")]
    pub context_header: String,
    /// Upper bound on tracked browsing contexts; the least recently used one is
    /// dropped to make room.
    #[serde(default = "default_max_browsing_contexts")]
    pub max_browsing_contexts: usize,
    /// Contexts unused for this long are dropped. Unset keeps them until evicted.
    #[serde(default = "default_context_idle_timeout_secs")]
    pub context_idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_host")]
    pub host: String,
    #[serde(default = "default_replay_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptConfig {
    /// URLs containing any of these substrings are never rerouted.
    #[serde(default = "default_internal_markers")]
    pub internal_markers: Vec<String>,
    #[serde(default)]
    pub missing_timestamp_policy: MissingTimestampPolicy,
}

/// What to do with a subresource fetch when its browsing context has not navigated to
/// a timestamped URL yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingTimestampPolicy {
    /// Serve the fallback response.
    #[default]
    Reject,
    /// Dispatch the original request unmodified.
    Passthrough,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct UpstreamConfig {
    /// Unset means no limit beyond the HTTP client's own.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    #[serde(default = "default_admin_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write logs to this file, rotated daily.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// Default value functions
fn default_proxy_host() -> String {
    "127.0.0.1".to_string()
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_context_header() -> String {
    "x-browsing-context".to_string()
}

fn default_max_browsing_contexts() -> usize {
    1024
}

fn default_context_idle_timeout_secs() -> Option<u64> {
    Some(1800)
}

fn default_replay_host() -> String {
    "127.0.0.1".to_string()
}

fn default_replay_port() -> u16 {
    5000
}

fn default_internal_markers() -> Vec<String> {
    vec!["/webui/".to_string()]
}

fn default_admin_enabled() -> bool {
    true
}

fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_proxy_host(),
            port: default_proxy_port(),
            public_origin: None,
            context_header: default_context_header(),
            max_browsing_contexts: default_max_browsing_contexts(),
            context_idle_timeout_secs: default_context_idle_timeout_secs(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            host: default_replay_host(),
            port: default_replay_port(),
        }
    }
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            internal_markers: default_internal_markers(),
            missing_timestamp_policy: MissingTimestampPolicy::default(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    pub fn replay_endpoint(&self) -> ReplayEndpoint {
        ReplayEndpoint::new(&self.replay.host, self.replay.port)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn context_idle_timeout(&self) -> Option<Duration> {
        self.proxy.context_idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn proxy_address(&self) -> String {
        format!("{}:{}", self.proxy.host, self.proxy.port)
    }

    pub fn admin_address(&self) -> String {
        format!("{}:{}", self.admin.host, self.admin.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.proxy_address(), "127.0.0.1:8080");
        assert_eq!(config.admin_address(), "127.0.0.1:8081");
        assert_eq!(config.replay_endpoint().base_url(), "http://127.0.0.1:5000");
        assert_eq!(config.intercept.internal_markers, vec!["/webui/".to_string()]);
        assert_eq!(
            config.intercept.missing_timestamp_policy,
            MissingTimestampPolicy::Reject
        );
        assert!(config.upstream_timeout().is_none());
        assert_eq!(config.proxy.max_browsing_contexts, 1024);
        assert_eq!(config.context_idle_timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
replay:
  port: 5555
intercept:
  missing_timestamp_policy: passthrough
"#;
        let config: Config = serde_yaml::from_str(yaml).expect("Failed to deserialize");
        assert_eq!(config.replay.port, 5555);
        assert_eq!(config.replay.host, "127.0.0.1");
        assert_eq!(
            config.intercept.missing_timestamp_policy,
            MissingTimestampPolicy::Passthrough
        );
        assert_eq!(config.proxy.port, 8080);
        assert!(config.admin.enabled);
    }
}
