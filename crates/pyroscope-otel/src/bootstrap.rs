//! One-shot wiring of the correlation stack.

use crate::otel::PyroscopeSpanProcessor;
use crate::processor::Correlator;
use crate::sync::ProfilingContextStorage;
use pyroscope_otel_bridge::{ProfilerBackend, ProfilerBridge};
use pyroscope_otel_core::{ProfilingConfig, ProfilingError, Result};
use std::sync::Arc;
use url::Url;

/// Everything [`install`] wired together. Built once at startup; the
/// backend choice never changes afterwards.
#[derive(Debug, Clone)]
pub struct Installation {
    backend: ProfilerBackend,
    correlator: Arc<Correlator>,
    storage: ProfilingContextStorage,
}

impl Installation {
    pub fn backend(&self) -> &ProfilerBackend {
        &self.backend
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    pub fn storage(&self) -> &ProfilingContextStorage {
        &self.storage
    }

    /// A processor for the tracer provider. Every processor built from one
    /// installation shares its scope map.
    pub fn span_processor(&self) -> PyroscopeSpanProcessor {
        PyroscopeSpanProcessor::new(Arc::clone(&self.correlator))
    }
}

/// Select the profiler backend, start profiling if asked to, and build the
/// correlator and context storage on top of it.
///
/// `external` is the bridge to an already-loaded profiler SDK. Without one,
/// the bundled in-process profiler is used.
pub fn install(config: ProfilingConfig, external: Option<Arc<dyn ProfilerBridge>>) -> Result<Installation> {
    if config.add_profile_url {
        Url::parse(&config.endpoint).map_err(|err| {
            ProfilingError::Configuration(format!("invalid endpoint {:?}: {}", config.endpoint, err))
        })?;
    }

    let backend = select_backend(external);
    if config.start_profiling {
        start_profiling(&backend);
    }

    tracing::info!(
        backend = backend.kind(),
        app_name = %config.app_name,
        endpoint = %config.endpoint,
        root_span_only = config.root_span_only,
        optimistic_timestamps = config.optimistic_timestamps,
        "profiling correlation installed"
    );

    let correlator = Arc::new(Correlator::new(config, backend.clone()));
    let storage = ProfilingContextStorage::new(backend.clone(), correlator.span_names());
    Ok(Installation {
        backend,
        correlator,
        storage,
    })
}

fn select_backend(external: Option<Arc<dyn ProfilerBridge>>) -> ProfilerBackend {
    match external {
        Some(bridge) => ProfilerBackend::External(bridge),
        None => ProfilerBackend::bundled(),
    }
}

fn start_profiling(backend: &ProfilerBackend) {
    // An external SDK may have been started by its own agent.
    if matches!(backend, ProfilerBackend::External(_)) && backend.is_profiling_started() {
        tracing::debug!("external profiler already started");
        return;
    }
    if let Err(err) = backend.start_profiling() {
        tracing::warn!(error = %err, backend = backend.kind(), "failed to start profiler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::RecordingBridge;
    use tracing_test::traced_test;

    #[test]
    fn bundled_backend_is_started_by_default() {
        let installation = install(ProfilingConfig::default(), None).expect("install");
        let profiler = installation.backend().in_process().expect("bundled");
        assert!(profiler.is_profiling_started());
    }

    #[test]
    fn external_profiler_started_once() {
        let bridge = Arc::new(RecordingBridge::new());
        install(ProfilingConfig::default(), Some(bridge.clone())).expect("install");
        assert_eq!(bridge.start_count(), 1);

        let started = Arc::new(RecordingBridge::new().already_started());
        install(ProfilingConfig::default(), Some(started.clone())).expect("install");
        assert_eq!(started.start_count(), 0);
    }

    #[test]
    fn start_can_be_skipped() {
        let bridge = Arc::new(RecordingBridge::new());
        let config = ProfilingConfig::builder().start_profiling(false).build();
        install(config, Some(bridge.clone())).expect("install");
        assert_eq!(bridge.start_count(), 0);
    }

    #[test]
    #[traced_test]
    fn start_failure_is_logged_not_returned() {
        let bridge = Arc::new(RecordingBridge::unavailable());
        let installation = install(ProfilingConfig::default(), Some(bridge)).expect("install");
        assert_eq!(installation.backend().kind(), "external");
        assert!(logs_contain("failed to start profiler"));
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        let config = ProfilingConfig::builder().endpoint("not a url").build();
        let err = install(config, None).expect_err("invalid endpoint");
        assert!(matches!(err, ProfilingError::Configuration(_)));

        let config = ProfilingConfig::builder()
            .endpoint("not a url")
            .add_profile_url(false)
            .build();
        assert!(install(config, None).is_ok());
    }
}
