use crate::config::Config;
use crate::error::{ConfigError, FetchError, ProxyError, Result};
use std::time::Duration;
use tracing::{error, info};

const PING_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_config_check(config: Config, ping: bool) -> Result<()> {
    info!("Checking configuration...");

    crate::config::validate(&config)?;
    info!("✓ Configuration is valid");

    info!("Proxy listener: {}", config.proxy_address());
    if let Some(origin) = &config.proxy.public_origin {
        info!("  Public origin: {}", origin);
    }
    info!("  Browsing context header: {}", config.proxy.context_header);
    info!(
        "  Browsing context limit: {}",
        config.proxy.max_browsing_contexts
    );
    match config.context_idle_timeout() {
        Some(timeout) => info!("  Browsing context idle timeout: {:?}", timeout),
        None => info!("  Browsing context idle timeout: none"),
    }
    info!("Replay endpoint: {}", config.replay_endpoint().base_url());
    info!(
        "Internal markers: {}",
        config.intercept.internal_markers.join(", ")
    );
    info!(
        "Missing timestamp policy: {:?}",
        config.intercept.missing_timestamp_policy
    );
    match config.upstream_timeout() {
        Some(timeout) => info!("Upstream timeout: {:?}", timeout),
        None => info!("Upstream timeout: none"),
    }
    if config.admin.enabled {
        info!("Admin server: {}", config.admin_address());
    } else {
        info!("Admin server: disabled");
    }

    if ping {
        match ping_replay_endpoint(&config).await {
            Ok(status) => info!("✓ Replay endpoint answered with HTTP {}", status),
            Err(e) => {
                error!("✗ Replay endpoint unreachable: {}", e);
                return Err(ProxyError::Config(ConfigError::Validation(
                    "Replay endpoint did not answer the reachability check".to_string(),
                )));
            }
        }
    }

    info!("✓ All checks passed");
    Ok(())
}

/// Any HTTP answer counts as reachable; only transport failures fail the check.
pub async fn ping_replay_endpoint(config: &Config) -> std::result::Result<u16, FetchError> {
    let client = reqwest::Client::builder()
        .timeout(PING_TIMEOUT)
        .build()
        .map_err(|e| FetchError::Other(e.to_string()))?;

    let response = client
        .get(config.replay_endpoint().base_url())
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Connect(e.to_string())
            }
        })?;

    Ok(response.status().as_u16())
}
