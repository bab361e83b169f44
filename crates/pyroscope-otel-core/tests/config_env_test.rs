//! Kept in its own test binary: it is the only test in the process that
//! touches the environment.

use pyroscope_otel_core::config::{APP_NAME_KEY, ENDPOINT_KEY, OPTIMISTIC_TIMESTAMPS_KEY, env_var_name};
use pyroscope_otel_core::{ProfilingConfig, ProfilingError};
use std::env;

struct EnvGuard {
    key: String,
    original_value: Option<String>,
}

impl EnvGuard {
    fn new(property: &str, value: &str) -> Self {
        let key = env_var_name(property);
        let original_value = env::var(&key).ok();
        // SAFETY: no other thread in this test binary reads the environment.
        unsafe { env::set_var(&key, value) };
        Self { key, original_value }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see `EnvGuard::new`.
        unsafe {
            match &self.original_value {
                Some(value) => env::set_var(&self.key, value),
                None => env::remove_var(&self.key),
            }
        }
    }
}

#[test]
fn from_env_reads_pyroscope_variables() {
    {
        let _app = EnvGuard::new(APP_NAME_KEY, "checkout");
        let _endpoint = EnvGuard::new(ENDPOINT_KEY, "http://pyroscope:4040/");
        let _optimistic = EnvGuard::new(OPTIMISTIC_TIMESTAMPS_KEY, "FALSE");

        let config = ProfilingConfig::from_env().expect("load config from env");
        assert_eq!(config.app_name, "checkout");
        assert_eq!(config.endpoint, "http://pyroscope:4040");
        assert!(!config.optimistic_timestamps);
        assert!(config.root_span_only);
    }

    {
        let _optimistic = EnvGuard::new(OPTIMISTIC_TIMESTAMPS_KEY, "sometimes");
        assert!(matches!(
            ProfilingConfig::from_env(),
            Err(ProfilingError::Configuration(_))
        ));
    }
}
