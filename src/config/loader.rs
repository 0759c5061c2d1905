use super::schema::Config;
use crate::error::{ConfigError, Result};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use regex::Regex;
use std::net::IpAddr;
use std::path::Path;
use url::Url;

const ENV_PREFIX: &str = "MEMENTO_PROXY_";

/// Nested keys are separated by a double underscore, e.g.
/// `MEMENTO_PROXY_REPLAY__PORT=5001`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

pub async fn load_from_env_or_file() -> Result<Config> {
    let config: Config = Figment::new()
        .merge(Toml::file("memento-proxy.toml"))
        .merge(Json::file("memento-proxy.json"))
        .merge(Yaml::file("memento-proxy.yaml"))
        .merge(Yaml::file("memento-proxy.yml"))
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    finish(config)
}

pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::Parse(format!(
            "Configuration file not found: {}",
            path.display()
        ))
        .into());
    }

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let config: Config = figment
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    finish(config)
}

fn finish(config: Config) -> Result<Config> {
    let config = apply_env_substitutions(config)?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.proxy.host.trim().is_empty() {
        return Err(ConfigError::Validation("Proxy host must not be empty".into()).into());
    }

    if config.replay.host.trim().is_empty() {
        return Err(ConfigError::Validation("Replay host must not be empty".into()).into());
    }

    if config.replay.port == 0 {
        return Err(ConfigError::Validation("Replay port must be greater than 0".into()).into());
    }

    if config.proxy.port == 0 {
        return Err(ConfigError::Validation("Proxy port must be greater than 0".into()).into());
    }

    // Rerouted requests must never reach the proxy itself
    if same_listener(
        (config.proxy.host.as_str(), config.proxy.port),
        (config.replay.host.as_str(), config.replay.port),
    ) {
        return Err(ConfigError::Validation(
            "Proxy must not listen on the replay endpoint address".into(),
        )
        .into());
    }

    if config.admin.enabled {
        if config.admin.host.trim().is_empty() {
            return Err(ConfigError::Validation("Admin host must not be empty".into()).into());
        }
        if config.admin.port == 0 {
            return Err(
                ConfigError::Validation("Admin port must be greater than 0".into()).into(),
            );
        }
        if same_listener(
            (config.admin.host.as_str(), config.admin.port),
            (config.proxy.host.as_str(), config.proxy.port),
        ) {
            return Err(ConfigError::Validation(
                "Proxy and admin ports must be different".into(),
            )
            .into());
        }
        if same_listener(
            (config.admin.host.as_str(), config.admin.port),
            (config.replay.host.as_str(), config.replay.port),
        ) {
            return Err(ConfigError::Validation(
                "Admin server must not listen on the replay endpoint address".into(),
            )
            .into());
        }
    }

    if config.proxy.max_browsing_contexts == 0 {
        return Err(ConfigError::Validation(
            "max_browsing_contexts must be greater than 0".into(),
        )
        .into());
    }

    if config.proxy.context_idle_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "context_idle_timeout_secs must be greater than 0".into(),
        )
        .into());
    }

    if config
        .intercept
        .internal_markers
        .iter()
        .any(|marker| marker.is_empty())
    {
        return Err(ConfigError::Validation(
            "Internal markers must not be empty strings".into(),
        )
        .into());
    }

    if warp::http::header::HeaderName::from_bytes(config.proxy.context_header.as_bytes()).is_err()
    {
        return Err(ConfigError::Validation(format!(
            "'{}' is not a valid header name",
            config.proxy.context_header
        ))
        .into());
    }

    if let Some(origin) = &config.proxy.public_origin {
        let parsed = Url::parse(origin).map_err(|e| {
            ConfigError::Validation(format!("Invalid public origin '{origin}': {e}"))
        })?;
        if !parsed.has_host() {
            return Err(ConfigError::Validation(format!(
                "Public origin '{origin}' has no host"
            ))
            .into());
        }
    }

    // The endpoint must produce parseable URLs
    let base = config.replay_endpoint();
    Url::parse(base.base_url()).map_err(|e| {
        ConfigError::Validation(format!("Invalid replay endpoint '{}': {e}", base.base_url()))
    })?;

    Ok(())
}

/// Whether two `host:port` pairs can end up on the same socket. Loopback spellings
/// compare equal and a wildcard host overlaps every host.
fn same_listener(a: (&str, u16), b: (&str, u16)) -> bool {
    if a.1 != b.1 {
        return false;
    }
    match (HostKind::of(a.0), HostKind::of(b.0)) {
        (HostKind::Wildcard, _) | (_, HostKind::Wildcard) => true,
        (HostKind::Loopback, HostKind::Loopback) => true,
        (HostKind::Named(a), HostKind::Named(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HostKind {
    Wildcard,
    Loopback,
    Named(String),
}

impl HostKind {
    fn of(host: &str) -> Self {
        let host = host
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();

        if host == "localhost" {
            return Self::Loopback;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => Self::Wildcard,
            Ok(ip) if ip.is_loopback() => Self::Loopback,
            _ => Self::Named(host),
        }
    }
}

fn apply_env_substitutions(mut config: Config) -> Result<Config> {
    config.proxy.host = substitute_env_vars(&config.proxy.host)?;
    config.replay.host = substitute_env_vars(&config.replay.host)?;
    config.admin.host = substitute_env_vars(&config.admin.host)?;

    if let Some(origin) = &mut config.proxy.public_origin {
        *origin = substitute_env_vars(origin)?;
    }

    if let Some(user_agent) = &mut config.upstream.user_agent {
        *user_agent = substitute_env_vars(user_agent)?;
    }

    Ok(config)
}

fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Parse(format!("Invalid substitution pattern: {e}")))?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        // ${VAR:-default}
        let (name, default) = match var_name.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (var_name, None),
        };

        match (std::env::var(name), default) {
            (Ok(value), _) => result = result.replace(&cap[0], &value),
            (Err(_), Some(default)) => result = result.replace(&cap[0], default),
            (Err(_), None) => {
                return Err(ConfigError::EnvVar(format!(
                    "Environment variable '{name}' not found"
                ))
                .into())
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingTimestampPolicy;
    use crate::error::ProxyError;
    use std::io::Write;

    #[test]
    fn test_env_substitution() {
        std::env::set_var("MEMENTO_TEST_VAR", "test_value");

        let result = substitute_env_vars("Hello ${MEMENTO_TEST_VAR}!").unwrap();
        assert_eq!(result, "Hello test_value!");

        let result = substitute_env_vars("${MEMENTO_MISSING_VAR:-default}").unwrap();
        assert_eq!(result, "default");

        assert!(matches!(
            substitute_env_vars("${MEMENTO_MISSING_VAR}"),
            Err(ProxyError::Config(ConfigError::EnvVar(_)))
        ));

        std::env::remove_var("MEMENTO_TEST_VAR");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_proxy_on_replay_address() {
        let mut config = Config::default();
        config.proxy.port = config.replay.port;
        assert!(matches!(
            validate(&config),
            Err(ProxyError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn test_rejects_shared_admin_port() {
        let mut config = Config::default();
        config.admin.port = config.proxy.port;
        assert!(validate(&config).is_err());

        config.admin.enabled = false;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.intercept.internal_markers.push(String::new());
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.proxy.context_header = "not a header".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.proxy.public_origin = Some("nowhere".to_string());
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.replay.port = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.proxy.port = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.admin.port = 0;
        assert!(validate(&config).is_err());
        config.admin.enabled = false;
        assert!(validate(&config).is_ok());

        let mut config = Config::default();
        config.proxy.max_browsing_contexts = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.proxy.context_idle_timeout_secs = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_loopback_aliases_of_replay_address() {
        for (proxy_host, replay_host) in [
            ("localhost", "127.0.0.1"),
            ("0.0.0.0", "127.0.0.1"),
            ("127.0.0.1", "LOCALHOST"),
            ("::1", "localhost"),
            ("[::]", "10.0.0.2"),
        ] {
            let mut config = Config::default();
            config.proxy.host = proxy_host.to_string();
            config.replay.host = replay_host.to_string();
            config.proxy.port = config.replay.port;
            assert!(
                validate(&config).is_err(),
                "{proxy_host} vs {replay_host} accepted"
            );
        }

        let mut config = Config::default();
        config.proxy.host = "0.0.0.0".to_string();
        config.admin.host = "localhost".to_string();
        config.admin.port = config.proxy.port;
        assert!(validate(&config).is_err());

        // Distinct hosts on the same port are fine
        let mut config = Config::default();
        config.replay.host = "10.0.0.2".to_string();
        config.proxy.port = config.replay.port;
        assert!(validate(&config).is_ok());
    }

    #[tokio::test]
    async fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
replay:
  host: 10.0.0.2
  port: 5001
intercept:
  internal_markers: ["/webui/", "/static/"]
  missing_timestamp_policy: passthrough
admin:
  enabled: false
"#
        )
        .unwrap();

        let config = load_from_path(file.path()).await.unwrap();
        assert_eq!(config.replay_endpoint().base_url(), "http://10.0.0.2:5001");
        assert_eq!(config.intercept.internal_markers.len(), 2);
        assert_eq!(
            config.intercept.missing_timestamp_policy,
            MissingTimestampPolicy::Passthrough
        );
        assert!(!config.admin.enabled);
    }

    #[tokio::test]
    async fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[proxy]
port = 9090
context_header = "x-tab-id"
"#
        )
        .unwrap();

        let config = load_from_path(file.path()).await.unwrap();
        assert_eq!(config.proxy.port, 9090);
        assert_eq!(config.proxy.context_header, "x-tab-id");
        assert_eq!(config.replay.port, 5000);
    }

    #[tokio::test]
    async fn test_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            load_from_path(file.path()).await,
            Err(ProxyError::Config(ConfigError::Parse(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(load_from_path("/definitely/not/here.yaml").await.is_err());
    }
}
