//! Core types shared by the span-to-profile correlation crates.

pub mod config;
pub mod error;
pub mod ids;
pub mod labels;
pub mod span;

pub use config::{ProfilingConfig, ProfilingConfigBuilder};
pub use error::{ProfilingError, Result};
pub use ids::{ProfileId, decode_span_id};
pub use labels::{LabelSet, PROFILE_ID_LABEL, SPAN_NAME_LABEL};
pub use span::{ParentLink, SpanHandle, unix_millis};
