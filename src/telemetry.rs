//! Logging setup and the tracer handle used around water lookups.

use anyhow::Result;
use tracing::{Span, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};

/// Install the global log subscriber. `RUST_LOG` takes precedence over
/// `level`.
///
/// With telemetry enabled every lookup span is written when it closes,
/// carrying its fields and busy/idle timings.
pub fn init_logging(level: &str, format: LogFormat, telemetry: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = build_subscriber(filter, format, telemetry.enabled, std::io::stdout);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_subscriber<W>(
    filter: EnvFilter,
    format: LogFormat,
    span_events: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_writer(writer);

    match format {
        LogFormat::Pretty => Box::new(builder.finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    }
}

/// Opens spans around water lookups.
///
/// Handed to the router as part of its state; when disabled every span is a
/// no-op.
#[derive(Debug, Clone)]
pub struct Tracer {
    enabled: bool,
    service_name: String,
    service_version: String,
}

impl Tracer {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            service_name: config.service_name.clone(),
            service_version: config.service_version.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Span covering the classification of `count` coordinates.
    pub fn lookup_span(&self, request_id: &str, count: usize) -> Span {
        if !self.enabled {
            return Span::none();
        }

        tracing::info_span!(
            "is_on_water",
            service.name = %self.service_name,
            service.version = %self.service_version,
            request_id = %request_id,
            count
        )
    }
}
