//! The view of a tracing span that correlation reads and annotates.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

pub const PROFILE_ID_ATTRIBUTE: &str = "pyroscope.profile.id";
pub const PROFILE_URL_ATTRIBUTE: &str = "pyroscope.profile.url";
pub const PROFILE_BASELINE_URL_ATTRIBUTE: &str = "pyroscope.profile.baseline.url";
pub const PROFILE_DIFF_URL_ATTRIBUTE: &str = "pyroscope.profile.diff.url";

/// How a span relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// No parent: the span starts a trace.
    None,
    /// Parent lives in this process.
    Local,
    /// Parent was propagated from another process.
    Remote,
}

pub trait SpanHandle {
    /// Span id as 16 lowercase hex digits.
    fn span_id(&self) -> String;

    fn name(&self) -> Cow<'_, str>;

    fn parent(&self) -> ParentLink;

    fn start_time(&self) -> SystemTime;

    /// Write a string attribute. Returns `false` when the span no longer
    /// accepts writes.
    fn set_attribute(&mut self, key: &'static str, value: String) -> bool;
}

/// Milliseconds since the Unix epoch, 0 for times before it.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
