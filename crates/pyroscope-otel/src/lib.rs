//! Span-to-profile correlation for OpenTelemetry.
//!
//! Each eligible span opens a profiling scope labelled with its id, so the
//! profiler's samples can be sliced down to a single request. The
//! [`PyroscopeSpanProcessor`] drives scopes from span start/end, and the
//! [`ProfilingContextStorage`] keeps each thread's profiler tag in step
//! with the OpenTelemetry context attached on it.

pub mod bootstrap;
pub mod filter;
pub mod names;
pub mod otel;
pub mod processor;
pub mod scope;
pub mod sync;
pub mod urls;

pub use bootstrap::{Installation, install};
pub use filter::RootSpanFilter;
pub use names::SpanNameIndex;
pub use otel::PyroscopeSpanProcessor;
pub use processor::{Correlator, EndOutcome};
pub use pyroscope_otel_bridge::{ProfilerBackend, ProfilerBridge, ScopedContext, TracingContext};
pub use pyroscope_otel_core::{LabelSet, ProfileId, ProfilingConfig, ProfilingError, Result};
pub use scope::ProfilingScope;
pub use sync::{ProfiledFuture, ProfilingContextGuard, ProfilingContextStorage};
pub use urls::{ProfileUrlBuilder, ProfileUrls, TimestampPolicy};
