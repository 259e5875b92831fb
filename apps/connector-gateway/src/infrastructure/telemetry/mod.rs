//! Logging and OpenTelemetry Integration
//!
//! Installs the global `tracing` subscriber: an `EnvFilter`, a human or JSON
//! formatter, and an OTLP span exporter when `OTEL_ENABLED=true`.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "connector-gateway";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn,reqwest=warn,tower=warn";

/// Flushes and shuts down the span exporter when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to flush OpenTelemetry spans: {e}");
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable single-line output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Telemetry settings read from `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`,
/// `OTEL_SERVICE_NAME` and `LOG_FORMAT`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether spans are exported over OTLP.
    pub enabled: bool,
    /// OTLP gRPC endpoint.
    pub otlp_endpoint: String,
    /// Service name attached to exported spans.
    pub service_name: String,
    /// Log line format.
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    /// Read settings from an arbitrary key lookup. Unknown `LOG_FORMAT`
    /// values fall back to pretty output.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is = |key: &str, value: &str| {
            lookup(key).is_some_and(|v| v.trim().eq_ignore_ascii_case(value))
        };

        Self {
            enabled: is("OTEL_ENABLED", "true"),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
            service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            log_format: if is("LOG_FORMAT", "json") {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
        }
    }
}

/// Install the global subscriber from the process environment.
///
/// Keep the returned guard alive for the lifetime of the process. An exporter
/// that fails to build is reported on stderr and logging continues without it.
#[must_use]
pub fn init() -> TelemetryGuard {
    let config = TelemetryConfig::from_lookup(|key| std::env::var(key).ok());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    let tracer_provider = if config.enabled {
        build_tracer_provider(&config)
            .inspect_err(|e| eprintln!("OpenTelemetry disabled, exporter setup failed: {e}"))
            .ok()
    } else {
        None
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(otel_layer)
        .init();

    TelemetryGuard { tracer_provider }
}

fn build_tracer_provider(
    config: &TelemetryConfig,
) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build())
}
