//! Correlation settings.
//!
//! Settings are read from `otel.pyroscope.*` properties. The environment
//! form of a property upper-cases it and swaps dots for underscores, so
//! `otel.pyroscope.app.name` becomes `OTEL_PYROSCOPE_APP_NAME`.

use crate::error::{ProfilingError, Result};
use crate::labels::LabelSet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const APP_NAME_KEY: &str = "otel.pyroscope.app.name";
pub const ENDPOINT_KEY: &str = "otel.pyroscope.endpoint";
pub const ROOT_SPAN_ONLY_KEY: &str = "otel.pyroscope.root.span.only";
pub const ADD_SPAN_NAME_KEY: &str = "otel.pyroscope.add.span.name";
pub const ADD_PROFILE_URL_KEY: &str = "otel.pyroscope.add.profile.url";
pub const ADD_PROFILE_BASELINE_URL_KEY: &str = "otel.pyroscope.add.profile.baseline.url";
pub const OPTIMISTIC_TIMESTAMPS_KEY: &str = "otel.pyroscope.optimistic.timestamps";
pub const OPTIMISTIC_WINDOW_KEY: &str = "otel.pyroscope.optimistic.window.seconds";
pub const BASELINE_LABELS_KEY: &str = "otel.pyroscope.baseline.labels";
pub const START_PROFILING_KEY: &str = "otel.pyroscope.start.profiling";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4040";
pub const DEFAULT_OPTIMISTIC_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub app_name: String,
    pub endpoint: String,
    /// Only trace entry spans open a profiling scope.
    pub root_span_only: bool,
    pub add_span_name: bool,
    pub add_profile_url: bool,
    pub add_profile_baseline_urls: bool,
    /// Build URLs at span start over a fixed window instead of at span end.
    pub optimistic_timestamps: bool,
    pub optimistic_window_secs: u64,
    pub baseline_labels: LabelSet,
    pub start_profiling: bool,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            root_span_only: true,
            add_span_name: true,
            add_profile_url: true,
            add_profile_baseline_urls: true,
            optimistic_timestamps: true,
            optimistic_window_secs: DEFAULT_OPTIMISTIC_WINDOW_SECS,
            baseline_labels: LabelSet::new(),
            start_profiling: true,
        }
    }
}

impl ProfilingConfig {
    pub fn builder() -> ProfilingConfigBuilder {
        ProfilingConfigBuilder::default()
    }

    pub fn optimistic_window(&self) -> Duration {
        Duration::from_secs(self.optimistic_window_secs)
    }

    /// Load settings through a property lookup; unset keys keep their
    /// defaults.
    pub fn from_properties<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            app_name: lookup(APP_NAME_KEY).unwrap_or(defaults.app_name),
            endpoint: lookup(ENDPOINT_KEY)
                .map(|endpoint| endpoint.trim_end_matches('/').to_string())
                .unwrap_or(defaults.endpoint),
            root_span_only: bool_property(&lookup, ROOT_SPAN_ONLY_KEY, defaults.root_span_only)?,
            add_span_name: bool_property(&lookup, ADD_SPAN_NAME_KEY, defaults.add_span_name)?,
            add_profile_url: bool_property(&lookup, ADD_PROFILE_URL_KEY, defaults.add_profile_url)?,
            add_profile_baseline_urls: bool_property(
                &lookup,
                ADD_PROFILE_BASELINE_URL_KEY,
                defaults.add_profile_baseline_urls,
            )?,
            optimistic_timestamps: bool_property(
                &lookup,
                OPTIMISTIC_TIMESTAMPS_KEY,
                defaults.optimistic_timestamps,
            )?,
            optimistic_window_secs: match lookup(OPTIMISTIC_WINDOW_KEY) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    ProfilingError::Configuration(format!(
                        "{} must be a number of seconds, got '{}'",
                        OPTIMISTIC_WINDOW_KEY, raw
                    ))
                })?,
                None => defaults.optimistic_window_secs,
            },
            baseline_labels: match lookup(BASELINE_LABELS_KEY) {
                Some(raw) => LabelSet::parse_pairs(&raw)?,
                None => defaults.baseline_labels,
            },
            start_profiling: bool_property(&lookup, START_PROFILING_KEY, defaults.start_profiling)?,
        };
        tracing::debug!(config = ?config, "loaded profiling configuration");
        Ok(config)
    }

    /// Load settings from `OTEL_PYROSCOPE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_properties(|key| std::env::var(env_var_name(key)).ok())
    }
}

/// `otel.pyroscope.app.name` -> `OTEL_PYROSCOPE_APP_NAME`
pub fn env_var_name(property: &str) -> String {
    property.replace('.', "_").to_ascii_uppercase()
}

fn bool_property<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ProfilingError::Configuration(format!(
            "{} must be true or false, got '{}'",
            key, raw
        ))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfilingConfigBuilder {
    config: ProfilingConfig,
}

impl ProfilingConfigBuilder {
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.config.app_name = app_name.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn root_span_only(mut self, root_span_only: bool) -> Self {
        self.config.root_span_only = root_span_only;
        self
    }

    pub fn add_span_name(mut self, add_span_name: bool) -> Self {
        self.config.add_span_name = add_span_name;
        self
    }

    pub fn add_profile_url(mut self, add_profile_url: bool) -> Self {
        self.config.add_profile_url = add_profile_url;
        self
    }

    pub fn add_profile_baseline_urls(mut self, add_profile_baseline_urls: bool) -> Self {
        self.config.add_profile_baseline_urls = add_profile_baseline_urls;
        self
    }

    pub fn optimistic_timestamps(mut self, optimistic_timestamps: bool) -> Self {
        self.config.optimistic_timestamps = optimistic_timestamps;
        self
    }

    pub fn optimistic_window(mut self, window: Duration) -> Self {
        self.config.optimistic_window_secs = window.as_secs();
        self
    }

    pub fn baseline_labels(mut self, baseline_labels: LabelSet) -> Self {
        self.config.baseline_labels = baseline_labels;
        self
    }

    pub fn start_profiling(mut self, start_profiling: bool) -> Self {
        self.config.start_profiling = start_profiling;
        self
    }

    pub fn build(self) -> ProfilingConfig {
        self.config
    }
}
