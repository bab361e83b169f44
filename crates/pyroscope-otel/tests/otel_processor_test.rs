use opentelemetry::trace::{
    Span as _, SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState, Tracer,
    TracerProvider,
};
use opentelemetry::{Context, Value};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SdkTracerProvider, Span, SpanData, SpanProcessor};
use pyroscope_otel::{ProfilerBackend, ProfilingConfig, PyroscopeSpanProcessor, install};
use pyroscope_otel_core::span::{PROFILE_ID_ATTRIBUTE, PROFILE_URL_ATTRIBUTE};
use pyroscope_otel_core::unix_millis;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_support::RecordingBridge;
use url::form_urlencoded;

#[derive(Debug, Clone, Default)]
struct CollectingProcessor {
    ended: Arc<Mutex<Vec<SpanData>>>,
}

impl CollectingProcessor {
    fn ended(&self) -> Vec<SpanData> {
        self.ended.lock().expect("ended lock").clone()
    }
}

impl SpanProcessor for CollectingProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        self.ended.lock().expect("ended lock").push(span);
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

fn attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| match &kv.value {
            Value::String(value) => value.as_str().to_string(),
            other => other.to_string(),
        })
}

fn by_name<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|span| span.name == name)
        .unwrap_or_else(|| panic!("span {} not exported", name))
}

fn provider(processor: PyroscopeSpanProcessor) -> SdkTracerProvider {
    SdkTracerProvider::builder().with_span_processor(processor).build()
}

#[test]
fn root_span_carries_its_profile_id() {
    let installation = install(ProfilingConfig::default(), Some(Arc::new(RecordingBridge::new()))).expect("install");
    let collected = CollectingProcessor::default();
    let provider = provider(installation.span_processor().with_downstream(collected.clone()));
    let tracer = provider.tracer("correlation-test");

    tracer.in_span("GET /users", |_| {
        tracer.in_span("db.query", |_| {});
    });

    let spans = collected.ended();
    let root = by_name(&spans, "GET /users");
    let child = by_name(&spans, "db.query");
    assert_eq!(
        attribute(root, PROFILE_ID_ATTRIBUTE),
        Some(root.span_context.span_id().to_string())
    );
    assert!(attribute(root, PROFILE_URL_ATTRIBUTE).is_some());
    assert_eq!(attribute(child, PROFILE_ID_ATTRIBUTE), None);
    assert_eq!(installation.correlator().tracked_len(), 0);
}

#[test]
fn remote_parent_makes_an_entry_span() {
    let installation = install(ProfilingConfig::default(), None).expect("install");
    let collected = CollectingProcessor::default();
    let provider = provider(installation.span_processor().with_downstream(collected.clone()));
    let tracer = provider.tracer("correlation-test");

    let remote = Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from_bytes(42u128.to_be_bytes()),
        SpanId::from_bytes(7u64.to_be_bytes()),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    ));
    let mut span = tracer.start_with_context("POST /orders", &remote);
    assert!(installation.correlator().is_tracked(&span.span_context().span_id().to_string()));
    span.end();

    let spans = collected.ended();
    assert!(attribute(by_name(&spans, "POST /orders"), PROFILE_ID_ATTRIBUTE).is_some());
    assert_eq!(installation.correlator().tracked_len(), 0);
}

#[test]
fn accurate_urls_reach_the_downstream_processor() {
    let config = ProfilingConfig::builder()
        .app_name("checkout")
        .optimistic_timestamps(false)
        .build();
    let installation = install(config, None).expect("install");
    let collected = CollectingProcessor::default();
    let provider = provider(installation.span_processor().with_downstream(collected.clone()));
    let tracer = provider.tracer("correlation-test");

    tracer.in_span("GET /users", |_| {});

    let spans = collected.ended();
    let root = by_name(&spans, "GET /users");
    let url = attribute(root, PROFILE_URL_ATTRIBUTE).expect("profile url");
    let (_, query) = url.split_once('?').expect("query string");
    let until = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .find(|(k, _)| k == "until")
        .map(|(_, v)| v);
    assert_eq!(until, Some(unix_millis(root.end_time).to_string()));
}

#[test]
fn processor_without_downstream_still_tracks() {
    let installation = install(ProfilingConfig::default(), None).expect("install");
    let provider = provider(installation.span_processor());
    let tracer = provider.tracer("correlation-test");

    let mut span = tracer.start("GET /health");
    assert_eq!(installation.correlator().tracked_len(), 1);
    let profiler = installation.backend().in_process().expect("bundled profiler");
    assert_eq!(profiler.open_scope_count(), 1);
    span.end();

    assert_eq!(installation.correlator().tracked_len(), 0);
    assert_eq!(profiler.open_scope_count(), 0);
    assert!(matches!(installation.backend(), ProfilerBackend::Bundled(_)));
}
