//! Span name constants for spans that are still open.
//!
//! OpenTelemetry contexts only expose a span's id, so the engine records the
//! registered name of each started span here and the context synchronizer
//! looks it up on attach.

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SpanNameIndex {
    names: DashMap<u64, u64>,
}

impl SpanNameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, span_id: u64, span_name_id: u64) {
        if span_id != 0 && span_name_id != 0 {
            self.names.insert(span_id, span_name_id);
        }
    }

    pub fn remove(&self, span_id: u64) {
        self.names.remove(&span_id);
    }

    /// Name constant of an open span, 0 when unknown.
    pub fn name_id(&self, span_id: u64) -> u64 {
        self.names.get(&span_id).map(|id| *id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
