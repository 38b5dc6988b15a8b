//! OpenTelemetry export and context propagation.
//!
//! The W3C trace-context and baggage propagators are always installed, so
//! incoming trace ids are honored even when nothing is exported. Span and
//! metric export over OTLP/gRPC are enabled separately by `otel.trace` and
//! `otel.metric`.

use std::time::Duration;

use anyhow::{Context as _, Result};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::{
    Context, KeyValue, global,
    propagation::{Extractor, Injector, TextMapCompositePropagator},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::{BaggagePropagator, TraceContextPropagator},
    runtime,
    trace::{Sampler, TracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use tracing::{info, warn};

use crate::config::OtelConfig;

/// Instrumentation scope for spans and instruments created by this crate.
pub const INSTRUMENTATION_NAME: &str = "service-helper";

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(3);

/// Owns the SDK providers; call [`TelemetryGuard::shutdown`] before exit to
/// flush pending exports.
#[derive(Default)]
#[must_use]
pub struct TelemetryGuard {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    pub fn tracing_enabled(&self) -> bool {
        self.tracer_provider.is_some()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.meter_provider.is_some()
    }

    /// Flushes and stops both providers.
    pub fn shutdown(self) {
        if let Some(provider) = self.meter_provider
            && let Err(e) = provider.shutdown()
        {
            warn!(error = %e, "metric provider shutdown failed");
        }
        if self.tracer_provider.is_some() {
            global::shutdown_tracer_provider();
        }
        info!("Telemetry shut down");
    }
}

fn resource(service_name: &str, service_version: &str) -> Resource {
    Resource::new([
        KeyValue::new(SERVICE_NAME, service_name.to_string()),
        KeyValue::new(SERVICE_VERSION, service_version.to_string()),
    ])
}

/// Installs the propagator and, when enabled, the OTLP tracer and meter providers.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if an exporter cannot be built.
pub fn init(config: &OtelConfig, service_name: &str, service_version: &str) -> Result<TelemetryGuard> {
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    if !config.trace && !config.metric {
        warn!("OpenTelemetry export is disabled");
        return Ok(TelemetryGuard::default());
    }

    let timeout = Duration::from_secs(config.timeout);
    let resource = resource(service_name, service_version);
    let mut guard = TelemetryGuard::default();

    if config.trace {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&config.host)
            .with_timeout(timeout)
            .build()
            .context("Failed to create trace exporter")?;

        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone())
            .build();

        global::set_tracer_provider(provider.clone());
        guard.tracer_provider = Some(provider);
        info!(endpoint = %config.host, "✓ Trace export enabled");
    }

    if config.metric {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&config.host)
            .with_timeout(timeout)
            .build()
            .context("Failed to create metric exporter")?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio)
            .with_interval(METRIC_EXPORT_INTERVAL)
            .build();

        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource)
            .build();

        global::set_meter_provider(provider.clone());
        guard.meter_provider = Some(provider);
        info!(endpoint = %config.host, "✓ Metric export enabled");
    }

    Ok(guard)
}

/// Reads trace context from request headers.
pub fn extract_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Writes trace context into outgoing headers.
pub fn inject_context(context: &Context, headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(context, &mut HeaderInjector(headers));
    });
}

/// [`Extractor`] over an `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// [`Injector`] over an `http::HeaderMap`.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TraceContextExt;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[tokio::test]
    async fn test_disabled_export_still_propagates() {
        let guard = init(&OtelConfig::default(), "svc", "0.0.0").unwrap();
        assert!(!guard.tracing_enabled());
        assert!(!guard.metrics_enabled());

        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(TRACEPARENT));

        let cx = extract_context(&headers);
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );

        let mut outgoing = HeaderMap::new();
        inject_context(&cx, &mut outgoing);
        assert_eq!(outgoing.get("traceparent").unwrap(), TRACEPARENT);

        guard.shutdown();
    }

    #[test]
    fn test_extractor_lists_keys() {
        let mut headers = HeaderMap::new();
        headers.insert("baggage", HeaderValue::from_static("k=v"));
        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("baggage"), Some("k=v"));
        assert_eq!(extractor.keys(), vec!["baggage"]);
    }
}
