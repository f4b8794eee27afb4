//! Tracing subscriber setup

use crate::config::LoggingConfig;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither `RUST_LOG` nor the config say otherwise
pub const DEFAULT_FILTER: &str = "intranet=info,tower_http=info";

/// Build the env filter: `RUST_LOG` wins, then the configured level
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directives = if config.level.eq_ignore_ascii_case("info") {
        DEFAULT_FILTER.to_string()
    } else {
        format!("intranet={0},tower_http={0}", config.level.to_lowercase())
    };
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber
///
/// `format = "json"` emits one JSON object per line; anything else uses the
/// human-readable formatter. When `file` is set, output goes there instead of
/// stdout.
pub fn init(config: &LoggingConfig) -> std::io::Result<()> {
    let json = config.format.eq_ignore_ascii_case("json");

    let layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = Arc::new(file);
            if json {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed()
            }
        }
        None if json => tracing_subscriber::fmt::layer().json().boxed(),
        None => tracing_subscriber::fmt::layer().boxed(),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(layer)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_builds_filter() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            ..Default::default()
        };
        let filter = env_filter(&config).to_string();
        assert!(filter.contains("intranet=debug"));
        assert!(filter.contains("tower_http=debug"));
    }

    #[test]
    fn test_bad_level_falls_back() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "loud!!".to_string(),
            ..Default::default()
        };
        assert!(env_filter(&config).to_string().contains("intranet=info"));
    }

    #[test]
    fn test_init_with_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            file: Some(dir.path().join("intranet.log").to_string_lossy().to_string()),
            format: "json".to_string(),
            ..Default::default()
        };
        init(&config).unwrap();
        assert!(dir.path().join("intranet.log").exists());
    }
}
