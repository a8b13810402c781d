use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// Directive enabling the per-packet admission decisions of every engine
pub const PACKET_TRACE_DIRECTIVE: &str = "synctv_simulcast::engine=trace";

type FilteredRegistry = Layered<EnvFilter, Registry>;

/// Install the subscriber built by [`build_subscriber`] as the global default.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    build_subscriber(config)?.try_init()?;
    Ok(())
}

/// Build the subscriber for processes embedding switching engines.
///
/// Layer switches, promotions and notification failures are logged at
/// `info`/`warn`/`error`. Per-packet admission decisions are `trace` and only
/// show up with `packet_trace` set or an explicit `RUST_LOG` directive, which
/// replaces the configured level.
pub fn build_subscriber(
    config: &LoggingConfig,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let filter = build_filter(config)?;

    let file = match &config.file_path {
        Some(path) => Some(std::sync::Arc::new(
            std::fs::OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    let output: Box<dyn Layer<FilteredRegistry> + Send + Sync> = if config.format == "json" {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true);

        match file {
            Some(file) => json_layer.with_writer(file).boxed(),
            None => json_layer.boxed(),
        }
    } else {
        let pretty_layer = fmt::layer().pretty().with_target(true).with_file(false);

        match file {
            Some(file) => pretty_layer.with_ansi(false).with_writer(file).boxed(),
            None => pretty_layer.boxed(),
        }
    };

    Ok(tracing_subscriber::registry().with(filter).with(output))
}

fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let level = parse_log_level(&config.level)?;

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if config.packet_trace {
        filter = filter.add_directive(PACKET_TRACE_DIRECTIVE.parse()?);
    }

    Ok(filter)
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
