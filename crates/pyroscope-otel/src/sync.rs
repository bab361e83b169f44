//! Keeps the profiler's per-thread tracing context in step with the
//! OpenTelemetry context attached on the thread.
//!
//! OpenTelemetry contexts are attached per thread and restored in stack
//! order. Every attach and every restore goes through
//! [`ProfilingContextStorage`], which re-derives the profiler tag from the
//! context that is current at that moment. Closing an inner context puts
//! back the tag of the enclosing span instead of clearing it.

use crate::names::SpanNameIndex;
use opentelemetry::Context;
use opentelemetry::trace::{SpanId, TraceContextExt};
use pyroscope_otel_bridge::{ProfilerBackend, ProfilerBridge, TracingContext};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

/// Profiler encoding of an OpenTelemetry span id.
pub fn encode_span_id(span_id: SpanId) -> u64 {
    u64::from_be_bytes(span_id.to_bytes())
}

#[derive(Debug, Clone)]
pub struct ProfilingContextStorage {
    backend: ProfilerBackend,
    span_names: Arc<SpanNameIndex>,
}

impl ProfilingContextStorage {
    pub fn new(backend: ProfilerBackend, span_names: Arc<SpanNameIndex>) -> Self {
        Self { backend, span_names }
    }

    /// Tag for the span carried by `cx`, untagged when it carries none.
    pub fn marker_for(&self, cx: &Context) -> TracingContext {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return TracingContext::UNTAGGED;
        }
        let span_id = encode_span_id(span_context.span_id());
        TracingContext::new(span_id, self.span_names.name_id(span_id))
    }

    /// Tag for the context currently attached on this thread.
    pub fn current(&self) -> TracingContext {
        self.marker_for(&Context::current())
    }

    /// Attach `cx` on the calling thread and tag samples with its span until
    /// the guard drops.
    pub fn attach(&self, cx: Context) -> ProfilingContextGuard {
        self.backend.set_tracing_context(self.marker_for(&cx));
        ProfilingContextGuard {
            storage: self.clone(),
            inner: Some(cx.attach()),
        }
    }

    /// Run `future` with `cx` attached around every poll.
    pub fn in_profiled<F: Future>(&self, cx: Context, future: F) -> ProfiledFuture<F> {
        ProfiledFuture {
            storage: self.clone(),
            cx,
            inner: Box::pin(future),
        }
    }
}

/// Restores the previous OpenTelemetry context, then the profiler tag of
/// whatever span is current after the restore.
#[must_use = "dropping the guard detaches the context"]
pub struct ProfilingContextGuard {
    storage: ProfilingContextStorage,
    inner: Option<opentelemetry::ContextGuard>,
}

impl std::fmt::Debug for ProfilingContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingContextGuard")
            .field("attached", &self.inner.is_some())
            .finish()
    }
}

impl Drop for ProfilingContextGuard {
    fn drop(&mut self) {
        drop(self.inner.take());
        let restored = self.storage.current();
        self.storage.backend.set_tracing_context(restored);
    }
}

/// A future whose polls run with a fixed OpenTelemetry context attached, so
/// samples taken while it runs are tagged with its span on whichever worker
/// thread polls it.
pub struct ProfiledFuture<F> {
    storage: ProfilingContextStorage,
    cx: Context,
    inner: Pin<Box<F>>,
}

impl<F> std::fmt::Debug for ProfiledFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfiledFuture")
            .field("marker", &self.storage.marker_for(&self.cx))
            .finish()
    }
}

impl<F: Future> Future for ProfiledFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _guard = this.storage.attach(this.cx.clone());
        this.inner.as_mut().poll(task)
    }
}
