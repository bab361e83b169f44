//! Shared fakes for correlation tests.

pub mod support;

pub use support::bridge::{BridgeCall, RecordingBridge};
pub use support::span::FakeSpan;
