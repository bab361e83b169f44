//! OpenTelemetry SDK span processor driving the correlation engine.

use crate::processor::{Correlator, EndOutcome};
use opentelemetry::trace::{Span as _, SpanId, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{Span, SpanData, SpanProcessor};
use pyroscope_otel_core::{ParentLink, SpanHandle};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Opens a profiling scope for each eligible span and annotates spans with
/// their profile id and URLs.
///
/// Ended spans reach this processor by value. They are only writable when a
/// downstream processor receives them afterwards, so URLs computed from the
/// real end time need [`with_downstream`](Self::with_downstream).
#[derive(Debug)]
pub struct PyroscopeSpanProcessor {
    correlator: Arc<Correlator>,
    downstream: Option<Box<dyn SpanProcessor>>,
}

impl PyroscopeSpanProcessor {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self {
            correlator,
            downstream: None,
        }
    }

    /// Forward every span to `downstream` after correlation, with end-time
    /// annotations applied.
    pub fn with_downstream<P: SpanProcessor + 'static>(mut self, downstream: P) -> Self {
        self.downstream = Some(Box::new(downstream));
        self
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }
}

impl SpanProcessor for PyroscopeSpanProcessor {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        let mut handle = StartingSpan::new(span, cx);
        self.correlator.on_span_start(&mut handle);
        if let Some(downstream) = &self.downstream {
            downstream.on_start(span, cx);
        }
    }

    fn on_end(&self, mut span: SpanData) {
        let end_time = span.end_time;
        let writable = self.downstream.is_some();
        let outcome = self
            .correlator
            .on_span_end(&mut EndedSpan::new(&mut span, writable), end_time);
        if let EndOutcome::Closed { profile_id, annotated: false, urls: Some(_) } = &outcome {
            tracing::trace!(profile_id = %profile_id, "no downstream processor, end-time urls dropped");
        }
        if let Some(downstream) = &self.downstream {
            downstream.on_end(span);
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        match &self.downstream {
            Some(downstream) => downstream.force_flush(),
            None => Ok(()),
        }
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        if self.correlator.tracked_len() > 0 {
            tracing::warn!(
                open_scopes = self.correlator.tracked_len(),
                "span processor shut down with open profiling scopes"
            );
        }
        match &self.downstream {
            Some(downstream) => downstream.shutdown_with_timeout(timeout),
            None => Ok(()),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Some(downstream) = self.downstream.as_mut() {
            downstream.set_resource(resource);
        }
    }
}

/// Parent relation of a span about to start under `cx`.
pub fn parent_link(cx: &Context) -> ParentLink {
    if !cx.has_active_span() {
        return ParentLink::None;
    }
    let span = cx.span();
    let parent = span.span_context();
    if !parent.is_valid() {
        ParentLink::None
    } else if parent.is_remote() {
        ParentLink::Remote
    } else {
        ParentLink::Local
    }
}

struct StartingSpan<'a> {
    span: &'a mut Span,
    name: Cow<'static, str>,
    start_time: SystemTime,
    parent: ParentLink,
}

impl<'a> StartingSpan<'a> {
    fn new(span: &'a mut Span, cx: &Context) -> Self {
        let (name, start_time) = match span.exported_data() {
            Some(data) => (data.name, data.start_time),
            None => (Cow::Borrowed(""), SystemTime::now()),
        };
        Self {
            span,
            name,
            start_time,
            parent: parent_link(cx),
        }
    }
}

impl SpanHandle for StartingSpan<'_> {
    fn span_id(&self) -> String {
        self.span.span_context().span_id().to_string()
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn parent(&self) -> ParentLink {
        self.parent
    }

    fn start_time(&self) -> SystemTime {
        self.start_time
    }

    fn set_attribute(&mut self, key: &'static str, value: String) -> bool {
        if !self.span.is_recording() {
            return false;
        }
        self.span.set_attribute(KeyValue::new(key, value));
        true
    }
}

struct EndedSpan<'a> {
    data: &'a mut SpanData,
    writable: bool,
}

impl<'a> EndedSpan<'a> {
    fn new(data: &'a mut SpanData, writable: bool) -> Self {
        Self { data, writable }
    }
}

impl SpanHandle for EndedSpan<'_> {
    fn span_id(&self) -> String {
        self.data.span_context.span_id().to_string()
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.data.name)
    }

    fn parent(&self) -> ParentLink {
        if self.data.parent_span_id == SpanId::INVALID {
            ParentLink::None
        } else if self.data.parent_span_is_remote {
            ParentLink::Remote
        } else {
            ParentLink::Local
        }
    }

    fn start_time(&self) -> SystemTime {
        self.data.start_time
    }

    /// Appends to the exported attributes as-is. The tracer's attribute limit
    /// was applied when the span was recorded and is not re-checked here, so
    /// `dropped_attributes_count` is left untouched and the profiling
    /// attributes can take a span past the limit.
    fn set_attribute(&mut self, key: &'static str, value: String) -> bool {
        if !self.writable {
            return false;
        }
        let attribute = KeyValue::new(key, value);
        match self
            .data
            .attributes
            .iter_mut()
            .find(|kv| kv.key.as_str() == key)
        {
            Some(existing) => *existing = attribute,
            None => self.data.attributes.push(attribute),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{
        Span as _, SpanContext, TraceFlags, TraceId, TraceState, Tracer, TracerProvider,
    };
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use pyroscope_otel_core::span::PROFILE_URL_ATTRIBUTE;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    struct Collect(Arc<Mutex<Vec<SpanData>>>);

    impl SpanProcessor for Collect {
        fn on_start(&self, _span: &mut Span, _cx: &Context) {}

        fn on_end(&self, span: SpanData) {
            self.0.lock().expect("collected lock").push(span);
        }

        fn force_flush(&self) -> OTelSdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
            Ok(())
        }
    }

    /// Record one span named `name` under `parent` and hand back its data.
    fn ended(name: &'static str, parent: &Context) -> SpanData {
        let collect = Collect::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(collect.clone())
            .build();
        provider.tracer("otel-test").start_with_context(name, parent).end();
        let mut spans = collect.0.lock().expect("collected lock");
        spans.pop().expect("span recorded")
    }

    fn remote(span_id: u64) -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from_bytes(1u128.to_be_bytes()),
            SpanId::from_bytes(span_id.to_be_bytes()),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    #[test]
    fn empty_context_has_no_parent() {
        assert_eq!(parent_link(&Context::new()), ParentLink::None);
    }

    #[test]
    fn propagated_context_is_remote_parent() {
        assert_eq!(parent_link(&remote(0xcafe)), ParentLink::Remote);
    }

    #[test]
    fn invalid_parent_counts_as_none() {
        assert_eq!(parent_link(&remote(0)), ParentLink::None);
    }

    #[test]
    fn ended_span_keeps_remote_parent() {
        let mut data = ended("POST /orders", &remote(0xcafe));
        assert_eq!(EndedSpan::new(&mut data, false).parent(), ParentLink::Remote);
    }

    #[test]
    fn ended_span_parent_links() {
        let mut root = ended("GET /users", &Context::new());
        assert_eq!(EndedSpan::new(&mut root, false).parent(), ParentLink::None);

        let local = Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from_bytes(1u128.to_be_bytes()),
            SpanId::from_bytes(0xbeef_u64.to_be_bytes()),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        ));
        let mut child = ended("db.query", &local);
        assert_eq!(EndedSpan::new(&mut child, false).parent(), ParentLink::Local);
    }

    #[test]
    fn ended_span_writes_replace_existing_key() {
        let mut data = ended("GET /users", &Context::new());
        let before = data.attributes.len();

        let mut span = EndedSpan::new(&mut data, true);
        assert!(span.set_attribute(PROFILE_URL_ATTRIBUTE, "first".to_string()));
        assert!(span.set_attribute(PROFILE_URL_ATTRIBUTE, "second".to_string()));
        assert_eq!(data.attributes.len(), before + 1);
        assert_eq!(
            data.attributes
                .iter()
                .find(|kv| kv.key.as_str() == PROFILE_URL_ATTRIBUTE)
                .map(|kv| kv.value.to_string()),
            Some("second".to_string())
        );

        assert!(!EndedSpan::new(&mut data, false).set_attribute(PROFILE_URL_ATTRIBUTE, "third".to_string()));
    }
}
