//! Compact renderings of correlation state for structured log fields.

use pyroscope_otel_bridge::TracingContext;
use pyroscope_otel_core::LabelSet;

/// Format a label set as `k=v, k2=v2`, or `no_labels` when empty.
#[inline]
pub fn labels_summary(labels: &LabelSet) -> String {
    if labels.is_empty() {
        return "no_labels".to_string();
    }
    labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a tracing context, `untagged` when it carries no span.
#[inline]
pub fn context_summary(context: TracingContext) -> String {
    if context.is_untagged() {
        "untagged".to_string()
    } else {
        format!("span_id={:016x}, span_name_id={}", context.span_id, context.span_name_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_labels_in_key_order() {
        let labels: LabelSet = [("span_name", "GET /"), ("profile_id", "000000000000cafe")]
            .into_iter()
            .collect();
        assert_eq!(
            labels_summary(&labels),
            "profile_id=000000000000cafe, span_name=GET /"
        );
        assert_eq!(labels_summary(&LabelSet::new()), "no_labels");
    }

    #[test]
    fn summarizes_contexts() {
        assert_eq!(context_summary(TracingContext::UNTAGGED), "untagged");
        assert_eq!(
            context_summary(TracingContext::new(0xcafe, 3)),
            "span_id=000000000000cafe, span_name_id=3"
        );
    }
}
