//! Correlation engine: span lifecycle to profiling scope lifecycle.
//!
//! A span is `NotTracked` until an eligible start opens its scope and files
//! it under the span's profile id (`Tracked`). The matching end removes and
//! closes the scope (`Closed`). Ends for untracked ids are no-ops.
//!
//! # Leaked scopes
//!
//! Scopes are only released by span end. If the tracing SDK never reports
//! the end of a tracked span (crash, SDK bug), its scope stays in the map
//! and its native scope stays open until the [`Correlator`] is dropped.

use crate::filter::RootSpanFilter;
use crate::names::SpanNameIndex;
use crate::scope::ProfilingScope;
use crate::urls::{ProfileUrlBuilder, ProfileUrls, TimestampPolicy};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pyroscope_otel_bridge::{ProfilerBackend, ProfilerBridge, TracingContext, encode_tracing_context};
use pyroscope_otel_core::span::{
    PROFILE_BASELINE_URL_ATTRIBUTE, PROFILE_DIFF_URL_ATTRIBUTE, PROFILE_ID_ATTRIBUTE,
    PROFILE_URL_ATTRIBUTE,
};
use pyroscope_otel_core::{LabelSet, ProfileId, ProfilingConfig, SpanHandle, decode_span_id, unix_millis};
use pyroscope_otel_observability::context_summary;
use std::sync::Arc;
use std::time::SystemTime;

/// What a span end did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    /// The span had no open scope.
    Untracked,
    Closed {
        profile_id: ProfileId,
        /// URLs computed from the real end time, when configured.
        urls: Option<ProfileUrls>,
        /// Whether the URLs made it onto the span.
        annotated: bool,
    },
}

#[derive(Debug)]
pub struct Correlator {
    config: ProfilingConfig,
    filter: RootSpanFilter,
    policy: TimestampPolicy,
    urls: ProfileUrlBuilder,
    backend: ProfilerBackend,
    scopes: DashMap<ProfileId, ProfilingScope>,
    span_names: Arc<SpanNameIndex>,
}

impl Correlator {
    pub fn new(config: ProfilingConfig, backend: ProfilerBackend) -> Self {
        Self {
            filter: RootSpanFilter::new(config.root_span_only),
            policy: TimestampPolicy::from_config(&config),
            urls: ProfileUrlBuilder::from_config(&config),
            config,
            backend,
            scopes: DashMap::new(),
            span_names: Arc::new(SpanNameIndex::new()),
        }
    }

    pub fn config(&self) -> &ProfilingConfig {
        &self.config
    }

    pub fn backend(&self) -> &ProfilerBackend {
        &self.backend
    }

    /// Name constants of open spans, shared with the context synchronizer.
    pub fn span_names(&self) -> Arc<SpanNameIndex> {
        Arc::clone(&self.span_names)
    }

    pub fn tracked_len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_tracked(&self, profile_id: &str) -> bool {
        self.scopes.contains_key(profile_id)
    }

    pub fn on_span_start<S: SpanHandle + ?Sized>(&self, span: &mut S) {
        let raw_id = span.span_id();
        let name = span.name().into_owned();
        // Ineligible spans are named too: the context synchronizer tags child
        // spans attached on other threads and only gets their ids.
        let tracing_context = encode_tracing_context(
            &self.backend,
            &raw_id,
            self.config.add_span_name.then_some(name.as_str()),
        );
        self.span_names
            .record(tracing_context.span_id, tracing_context.span_name_id);

        if !self.filter.is_eligible(span) {
            return;
        }

        let profile_id = ProfileId::new(raw_id);
        let labels = LabelSet::for_profile(&profile_id, self.config.add_span_name.then_some(name.as_str()));
        let start_time = span.start_time();
        let scope = if self.backend.supports_scoped_contexts() {
            ProfilingScope::open(&self.backend, profile_id.clone(), labels, tracing_context, start_time)
        } else {
            self.backend.set_tracing_context(tracing_context);
            ProfilingScope::detached(profile_id.clone(), labels, tracing_context, start_time)
        };

        span.set_attribute(PROFILE_ID_ATTRIBUTE, profile_id.to_string());
        if self.config.add_profile_url {
            if let TimestampPolicy::Optimistic { window } = self.policy {
                let (from, until) = TimestampPolicy::optimistic_range(window, start_time);
                let urls = self.urls.build(scope.labels(), from, until);
                annotate(span, &urls);
            }
        }

        tracing::trace!(
            profile_id = %profile_id,
            context = %context_summary(tracing_context),
            native = scope.has_native_scope(),
            "profiling scope opened"
        );

        match self.scopes.entry(profile_id) {
            Entry::Occupied(mut occupied) => {
                debug_assert!(
                    false,
                    "duplicate profiling scope for span {}",
                    occupied.key()
                );
                tracing::warn!(
                    profile_id = %occupied.key(),
                    "duplicate profiling scope, closing the previous one"
                );
                occupied.insert(scope).close();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(scope);
            }
        }
    }

    pub fn on_span_end<S: SpanHandle + ?Sized>(&self, span: &mut S, end_time: SystemTime) -> EndOutcome {
        let raw_id = span.span_id();
        self.span_names.remove(decode_span_id(Some(&raw_id)));

        let Some((profile_id, scope)) = self.scopes.remove(raw_id.as_str()) else {
            return EndOutcome::Untracked;
        };

        let mut urls = None;
        let mut annotated = false;
        if self.config.add_profile_url && self.policy == TimestampPolicy::Accurate {
            let computed = self
                .urls
                .build(scope.labels(), scope.start_time_millis(), unix_millis(end_time));
            annotated = annotate(span, &computed);
            if !annotated {
                tracing::trace!(profile_id = %profile_id, "span is read-only at end, profile urls skipped");
            }
            urls = Some(computed);
        }

        if !scope.has_native_scope() {
            self.backend.set_tracing_context(TracingContext::UNTAGGED);
        }
        scope.close();
        tracing::trace!(profile_id = %profile_id, "profiling scope closed");

        EndOutcome::Closed {
            profile_id,
            urls,
            annotated,
        }
    }
}

/// Write the URLs onto the span, stopping at the first rejected write.
fn annotate<S: SpanHandle + ?Sized>(span: &mut S, urls: &ProfileUrls) -> bool {
    if !span.set_attribute(PROFILE_URL_ATTRIBUTE, urls.profile.clone()) {
        return false;
    }
    if let Some(baseline) = &urls.baseline {
        if !span.set_attribute(PROFILE_BASELINE_URL_ATTRIBUTE, baseline.clone()) {
            return false;
        }
    }
    if let Some(diff) = &urls.diff {
        if !span.set_attribute(PROFILE_DIFF_URL_ATTRIBUTE, diff.clone()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{FakeSpan, RecordingBridge};
    use tracing_test::traced_test;

    fn correlator(config: ProfilingConfig, bridge: &Arc<RecordingBridge>) -> Correlator {
        Correlator::new(config, ProfilerBackend::External(bridge.clone()))
    }

    #[test]
    #[traced_test]
    fn degraded_bridge_still_annotates_profile_id() {
        let bridge = Arc::new(RecordingBridge::unavailable());
        let correlator = correlator(ProfilingConfig::default(), &bridge);
        let mut span = FakeSpan::root("000000000000cafe", "GET /users");

        correlator.on_span_start(&mut span);
        assert_eq!(span.attribute(PROFILE_ID_ATTRIBUTE), Some("000000000000cafe"));
        assert!(correlator.is_tracked("000000000000cafe"));
        assert!(logs_contain("scope degraded"));

        let outcome = correlator.on_span_end(&mut span, SystemTime::now());
        assert!(matches!(outcome, EndOutcome::Closed { .. }));
        assert_eq!(correlator.tracked_len(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "duplicate profiling scope")]
    fn duplicate_start_is_a_programmer_error() {
        let bridge = Arc::new(RecordingBridge::new());
        let correlator = correlator(ProfilingConfig::default(), &bridge);
        let mut span = FakeSpan::root("000000000000cafe", "GET /users");
        correlator.on_span_start(&mut span);
        correlator.on_span_start(&mut span);
    }

    #[test]
    fn span_names_are_indexed_while_open() {
        let bridge = Arc::new(RecordingBridge::new());
        let correlator = correlator(ProfilingConfig::default(), &bridge);
        let names = correlator.span_names();
        let mut child = FakeSpan::child("000000000000beef", "db.query");

        correlator.on_span_start(&mut child);
        assert!(!correlator.is_tracked("000000000000beef"));
        assert!(bridge.created_scopes().is_empty());
        assert_eq!(names.len(), 1);
        assert_eq!(names.name_id(0xbeef), bridge.constant_id("db.query").expect("registered"));

        correlator.on_span_end(&mut child, SystemTime::now());
        assert_eq!(names.name_id(0xbeef), 0);
    }
}
