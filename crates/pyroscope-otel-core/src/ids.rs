//! Span identifiers and their integer encoding for native tagging.
//!
//! The hex string form is what profiling queries use; the integer form is
//! only a cheap handle for the native side, so decoding never fails loudly.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Length of a hex-encoded span id.
pub const SPAN_ID_HEX_LEN: usize = 16;

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id_type!(
    /// Span id (hex form) reused as the correlation key into the profiler.
    ProfileId
);

impl ProfileId {
    /// Integer form handed to the native layer, 0 when the id is malformed.
    pub fn encoded(&self) -> u64 {
        decode_span_id(Some(self.as_str()))
    }
}

/// Decode a 16 hex digit span id into its unsigned 64-bit value.
///
/// Returns 0 for `None`, a wrong length or any non-hex character. Zero means
/// "untagged" downstream, which is always a safe value.
pub fn decode_span_id(hex: Option<&str>) -> u64 {
    let Some(hex) = hex else {
        return 0;
    };
    // from_str_radix tolerates a leading '+', a span id never carries one
    if hex.len() != SPAN_ID_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return 0;
    }
    u64::from_str_radix(hex, 16).unwrap_or(0)
}
