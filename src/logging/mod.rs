use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ProxyError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// `RUST_LOG` directives plus `memento_rewrite_proxy=<level>`; `debug` wins over the
/// configured level.
pub fn build_filter(level: &str, debug: bool) -> Result<EnvFilter> {
    let level = if debug { "debug" } else { level };
    let directive = format!("memento_rewrite_proxy={level}")
        .parse::<Directive>()
        .map_err(|e| ProxyError::Logging(format!("invalid log level '{level}': {e}")))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

/// Installs the global subscriber. Keep the returned guard alive for as long as file
/// logging should keep flushing.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.level, debug)?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(match config.format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    });

    let guard = match &config.file {
        Some(path) => {
            let (layer, guard) = file_layer(path, config.format)?;
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ProxyError::Logging(e.to_string()))?;

    Ok(guard)
}

fn file_layer(path: &Path, format: LogFormat) -> Result<(BoxedLayer, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ProxyError::Logging(format!("'{}' is not a file path", path.display())))?;
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(directory)?;

    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = match format {
        LogFormat::Text => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };

    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_levels() {
        assert!(build_filter("info", false).is_ok());
        assert!(build_filter("warn", true).is_ok());
        assert!(build_filter("trace", false).is_ok());
    }

    #[test]
    fn test_filter_rejects_unknown_level() {
        assert!(matches!(
            build_filter("loud", false),
            Err(ProxyError::Logging(_))
        ));
        // --debug overrides a bad configured level
        assert!(build_filter("loud", true).is_ok());
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("proxy.log");

        let (_layer, _guard) = file_layer(&path, LogFormat::Json).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }
}
