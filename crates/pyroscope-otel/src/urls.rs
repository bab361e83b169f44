//! Profiling backend URLs for a span's scope.
//!
//! Three views are produced: the profile of the single span, a comparison of
//! the span against its baseline population, and the diff of the two.

use pyroscope_otel_core::{LabelSet, PROFILE_ID_LABEL, ProfilingConfig, unix_millis};
use std::time::{Duration, SystemTime};
use url::form_urlencoded;

/// When the query time range is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPolicy {
    /// At span start, over `start - window .. start + window`.
    Optimistic { window: Duration },
    /// At span end, over the span's real lifetime.
    Accurate,
}

impl TimestampPolicy {
    pub fn from_config(config: &ProfilingConfig) -> Self {
        if config.optimistic_timestamps {
            Self::Optimistic {
                window: config.optimistic_window(),
            }
        } else {
            Self::Accurate
        }
    }

    /// Query range for a span that started at `start`, in epoch millis.
    pub fn optimistic_range(window: Duration, start: SystemTime) -> (u64, u64) {
        let start = unix_millis(start);
        let window = window.as_millis() as u64;
        (start.saturating_sub(window), start.saturating_add(window))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUrls {
    pub profile: String,
    pub baseline: Option<String>,
    pub diff: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileUrlBuilder {
    app_name: String,
    endpoint: String,
    baseline_labels: LabelSet,
    include_baseline: bool,
}

impl ProfileUrlBuilder {
    pub fn new(app_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            baseline_labels: LabelSet::new(),
            include_baseline: true,
        }
    }

    pub fn from_config(config: &ProfilingConfig) -> Self {
        Self::new(config.app_name.clone(), config.endpoint.clone())
            .with_baseline_labels(config.baseline_labels.clone())
            .with_baseline(config.add_profile_baseline_urls)
    }

    pub fn with_baseline_labels(mut self, baseline_labels: LabelSet) -> Self {
        self.baseline_labels = baseline_labels;
        self
    }

    pub fn with_baseline(mut self, include_baseline: bool) -> Self {
        self.include_baseline = include_baseline;
        self
    }

    /// `app{profile_id="<id>"}`
    pub fn profile_query(&self, profile_id: &str) -> String {
        format!("{}{{{}=\"{}\"}}", self.app_name, PROFILE_ID_LABEL, profile_id)
    }

    /// Query over every scope label except the profile id, with baseline
    /// labels overriding scope labels of the same key.
    pub fn baseline_query(&self, labels: &LabelSet) -> String {
        let mut merged: LabelSet = labels
            .iter()
            .filter(|(key, _)| *key != PROFILE_ID_LABEL && !self.baseline_labels.contains_key(key))
            .collect();
        for (key, value) in self.baseline_labels.iter() {
            if key != PROFILE_ID_LABEL {
                merged.insert(key, value);
            }
        }
        format!("{}{{{}}}", self.app_name, merged.to_query_terms())
    }

    pub fn build(&self, labels: &LabelSet, from_millis: u64, until_millis: u64) -> ProfileUrls {
        let profile_id = labels.profile_id().unwrap_or_default();
        let profile_query = self.profile_query(profile_id);
        let from = from_millis.to_string();
        let until = until_millis.to_string();

        let profile = format!(
            "{}/?{}",
            self.endpoint,
            form_urlencoded::Serializer::new(String::new())
                .append_pair("query", &profile_query)
                .append_pair("from", &from)
                .append_pair("until", &until)
                .finish()
        );

        if !self.include_baseline {
            return ProfileUrls {
                profile,
                baseline: None,
                diff: None,
            };
        }

        let baseline_query = self.baseline_query(labels);
        let comparison = form_urlencoded::Serializer::new(String::new())
            .append_pair("query", &baseline_query)
            .append_pair("from", &from)
            .append_pair("until", &until)
            .append_pair("leftQuery", &baseline_query)
            .append_pair("leftFrom", &from)
            .append_pair("leftUntil", &until)
            .append_pair("rightQuery", &profile_query)
            .append_pair("rightFrom", &from)
            .append_pair("rightUntil", &until)
            .finish();

        ProfileUrls {
            profile,
            baseline: Some(format!("{}/comparison?{}", self.endpoint, comparison)),
            diff: Some(format!("{}/comparison-diff?{}", self.endpoint, comparison)),
        }
    }
}
