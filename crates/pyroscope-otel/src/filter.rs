//! Which spans get a profiling scope.

use pyroscope_otel_core::{ParentLink, SpanHandle};

/// Admits trace entry spans: no parent, or a parent propagated from another
/// process. Admits everything when root-only filtering is off.
#[derive(Debug, Clone, Copy)]
pub struct RootSpanFilter {
    root_span_only: bool,
}

impl RootSpanFilter {
    pub fn new(root_span_only: bool) -> Self {
        Self { root_span_only }
    }

    pub fn is_eligible<S: SpanHandle + ?Sized>(&self, span: &S) -> bool {
        !self.root_span_only || Self::is_entry(span.parent())
    }

    pub fn is_entry(parent: ParentLink) -> bool {
        matches!(parent, ParentLink::None | ParentLink::Remote)
    }
}
