//! Encoding of span data into the integer form the sampler tags with.
//!
//! Both helpers run on the span start/end path and never fail: a problem
//! degrades to 0, meaning "no id" or "no name".

use crate::bridge::{ProfilerBridge, TracingContext};
use pyroscope_otel_core::decode_span_id;

/// Constant id for `name`, or 0 when the bridge cannot register it.
pub fn register_label(bridge: &dyn ProfilerBridge, name: &str) -> u64 {
    match bridge.register_constant(name) {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(error = %err, label = name, "label registration failed");
            0
        }
    }
}

/// Tracing context for a span, registering its name when one is given.
pub fn encode_tracing_context(
    bridge: &dyn ProfilerBridge,
    span_id_hex: &str,
    span_name: Option<&str>,
) -> TracingContext {
    let span_id = decode_span_id(Some(span_id_hex));
    let span_name_id = span_name.map_or(0, |name| register_label(bridge, name));
    TracingContext::new(span_id, span_name_id)
}
