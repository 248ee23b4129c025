// file: src/tracing_setup.rs
// description: log filter selection and subscriber installation

use anyhow::Result;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    prelude::*,
    registry::LookupSpan,
};

/// How log lines are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Pretty }
    }
}

// The WebSocket stack logs every frame at debug; keep it quiet unless RUST_LOG asks.
const QUIET_DEPENDENCIES: &str = "tokio_tungstenite=warn,tungstenite=warn";

pub fn default_directives(level: &str) -> String {
    format!("disaster_feed={level},{QUIET_DEPENDENCIES}")
}

/// `rust_log` (the `RUST_LOG` value) wins when it parses. Otherwise the crate
/// logs at `level`, and an unparseable level falls back to info.
pub fn filter_for(rust_log: Option<&str>, level: &str) -> EnvFilter {
    if let Some(directives) = rust_log.map(str::trim).filter(|d| !d.is_empty())
        && let Ok(filter) = EnvFilter::try_new(directives)
    {
        return filter;
    }
    EnvFilter::try_new(default_directives(level))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")))
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(false)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => layer
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    }
}

/// Installs the global subscriber. Fails if one is already set.
pub fn setup_tracing(log_level: &str, json_logs: bool) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_for(rust_log.as_deref(), log_level);

    tracing_subscriber::registry()
        .with(filter)
        .with(output_layer(LogFormat::from_json_flag(json_logs)))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_applies_to_this_crate_and_quiets_websocket_stack() {
        let filter = filter_for(None, "debug").to_string();
        assert!(filter.contains("disaster_feed=debug"), "{filter}");
        assert!(filter.contains("tungstenite=warn"), "{filter}");
    }

    #[test]
    fn rust_log_overrides_level() {
        let filter = filter_for(Some("warn"), "trace").to_string();
        assert!(!filter.contains("disaster_feed"), "{filter}");
        assert!(filter.contains("warn"), "{filter}");
    }

    #[test]
    fn blank_or_invalid_rust_log_is_ignored() {
        for rust_log in ["", "   ", "disaster_feed=notalevel"] {
            let filter = filter_for(Some(rust_log), "debug").to_string();
            assert!(filter.contains("disaster_feed=debug"), "{rust_log:?} -> {filter}");
        }
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let filter = filter_for(None, "loudest").to_string();
        assert!(filter.contains("disaster_feed=info"), "{filter}");
    }

    #[test]
    fn json_flag_selects_format() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Pretty);
    }
}
