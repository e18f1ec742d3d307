//! stderr tracing for a single cron-driven run.
//!
//! stdout stays reserved for `--validate` output; every log line goes to
//! stderr, where cron mail or the journal picks it up.

use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use logsentry_core::config::GeneralConfig;

/// Output shape selected by `general.log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, carrying the `pass`/`digest` span fields.
    Json,
    /// Multi-line human output for interactive runs.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => anyhow::bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
        }
    }
}

/// `RUST_LOG` wins when it is set and parses; otherwise the configured level.
fn build_filter(rust_log: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return Ok(filter),
            Err(e) => eprintln!("ignoring invalid RUST_LOG '{directives}': {e}"),
        }
    }
    EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))
}

/// Install the global subscriber. Call once, before the first event.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format: LogFormat = config.log_format.parse()?;
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), &config.log_level)?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.with_context(|| format!("failed to install {format:?} tracing subscriber"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn known_formats_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.to_string().contains("'xml'"));
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        let filter = build_filter(Some("logsentry_monitor=trace"), "warn").unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn blank_or_invalid_rust_log_falls_back() {
        let blank = build_filter(Some("  "), "info").unwrap();
        assert_eq!(blank.max_level_hint(), Some(LevelFilter::INFO));

        let invalid = build_filter(Some("logsentry=verbose"), "debug").unwrap();
        assert_eq!(invalid.max_level_hint(), Some(LevelFilter::DEBUG));

        let unset = build_filter(None, "error").unwrap();
        assert_eq!(unset.max_level_hint(), Some(LevelFilter::ERROR));
    }

    #[test]
    fn invalid_configured_level_is_error() {
        assert!(build_filter(None, "logsentry=verbose").is_err());
    }
}
