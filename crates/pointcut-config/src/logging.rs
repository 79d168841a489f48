use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

static TRACING_INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_owned()
    }

    /// The effective filter: the configured level, with `RUST_LOG` appended
    /// when set.
    pub fn env_filter(&self) -> EnvFilter {
        let rust_log = std::env::var("RUST_LOG").ok();
        filter_for(&self.level, rust_log.as_deref())
    }
}

/// Maps level synonyms onto `EnvFilter` syntax. Anything that is not a bare
/// level passes through as a directive string.
pub(crate) fn level_directive(level: &str) -> String {
    let level = level.trim();
    let canonical = match level.to_ascii_lowercase().as_str() {
        "" | "warn" | "warning" => "warn",
        "off" | "none" => "off",
        bare @ ("trace" | "debug" | "info" | "error") => return bare.to_owned(),
        _ => return level.to_owned(),
    };
    canonical.to_owned()
}

/// Builds the filter from the configured level and an optional `RUST_LOG`.
/// An unparsable combination drops the config part, then `RUST_LOG`, and
/// ends at `warn`.
fn filter_for(level: &str, rust_log: Option<&str>) -> EnvFilter {
    let configured = level_directive(level);
    let rust_log = rust_log.map(str::trim).filter(|value| !value.is_empty());
    let mut candidates = Vec::with_capacity(2);
    if let Some(rust_log) = rust_log {
        candidates.push(format!("{configured},{rust_log}"));
        candidates.push(rust_log.to_owned());
    } else {
        candidates.push(configured);
    }
    candidates
        .into_iter()
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// Only the first call has an effect; later calls and a subscriber installed
/// by someone else are left alone.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let layer: Box<dyn Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .boxed()
        };
        let subscriber = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            tracing::debug!(target: "pointcut.config", level = %config.level, json = config.json, "tracing initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_synonyms_are_normalized() {
        assert_eq!(level_directive(" WARNING "), "warn");
        assert_eq!(level_directive(""), "warn");
        assert_eq!(level_directive("Debug"), "debug");
        assert_eq!(
            level_directive("pointcut.resolve=trace"),
            "pointcut.resolve=trace"
        );
    }

    #[test]
    fn malformed_directives_fall_back() {
        assert_eq!(filter_for("pointcut=verbose", None).to_string(), "warn");
        assert_eq!(
            filter_for("pointcut=verbose", Some("debug")).to_string(),
            "debug"
        );
        assert_eq!(filter_for("info", Some("  ")).to_string(), "info");
    }
}
