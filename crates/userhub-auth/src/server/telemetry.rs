//! # Telemetry Features
//!
//! Console logging is always on. OpenTelemetry export is opt-in through cargo
//! features.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables OpenTelemetry distributed tracing (via spans) and the
//!   service's own log events.
//! - `metrics`: Enables OpenTelemetry metrics (counters, histograms).
//! - `stdout`: Exports spans and metrics to stdout.
//!
//! ## Span behavior
//!
//! - Every `QueryUsers` call runs inside a `pagination_session` span.
//! - Events inside a span become span events in the exporter; events outside
//!   a span only reach the console.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run -p userhub-auth --features tracing,metrics,stdout
//! ```

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "userhub-auth";

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down every enabled provider.
    pub fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {:#?}", err);
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {:#?}", err);
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {:#?}", err);
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {:#?}", err);
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Human-readable console output, independent of any OpenTelemetry
    // exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        );

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

/// Instruments recorded by the service, registered once the meter exists.
#[cfg(feature = "metrics")]
struct Instruments {
    sessions: Counter<u64>,
    sessions_inflight: UpDownCounter<i64>,
    stream_errors: Counter<u64>,
    session_duration_ms: Histogram<f64>,
    chunks_sent: Counter<u64>,
    users_per_chunk: Histogram<f64>,
}

#[cfg(feature = "metrics")]
static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = INSTRUMENTS.set(Instruments {
        sessions: meter
            .u64_counter("query_sessions")
            .with_description("Total QueryUsers sessions opened")
            .build(),
        sessions_inflight: meter
            .i64_up_down_counter("sessions_inflight")
            .with_description("Concurrent pagination sessions")
            .build(),
        stream_errors: meter
            .u64_counter("errors")
            .with_description("Refused or failed pagination sessions")
            .build(),
        session_duration_ms: meter
            .f64_histogram("session_duration")
            .with_unit("ms")
            .with_description("End-to-end pagination session duration")
            .build(),
        chunks_sent: meter
            .u64_counter("chunks_sent")
            .with_description("Users chunks streamed to clients")
            .build(),
        users_per_chunk: meter
            .f64_histogram("users_per_chunk")
            .with_description("Users carried by each streamed chunk")
            .build(),
    });
}

// The helpers below are no-ops unless the `metrics` feature is enabled.

#[cfg(feature = "metrics")]
fn record(f: impl FnOnce(&Instruments)) {
    if let Some(instruments) = INSTRUMENTS.get() {
        f(instruments);
    }
}

pub fn increment_requests() {
    #[cfg(feature = "metrics")]
    record(|m| m.sessions.add(1, &[]));
}

pub fn increment_sessions_inflight() {
    #[cfg(feature = "metrics")]
    record(|m| m.sessions_inflight.add(1, &[]));
}

pub fn decrement_sessions_inflight() {
    #[cfg(feature = "metrics")]
    record(|m| m.sessions_inflight.add(-1, &[]));
}

pub fn increment_stream_errors() {
    #[cfg(feature = "metrics")]
    record(|m| m.stream_errors.add(1, &[]));
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_session_duration(duration_ms: f64) {
    #[cfg(feature = "metrics")]
    record(|m| m.session_duration_ms.record(duration_ms, &[]));
}

pub fn increment_chunks_sent() {
    #[cfg(feature = "metrics")]
    record(|m| m.chunks_sent.add(1, &[]));
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
pub fn record_users_per_chunk(count: f64) {
    #[cfg(feature = "metrics")]
    record(|m| m.users_per_chunk.record(count, &[]));
}
