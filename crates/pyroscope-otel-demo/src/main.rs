//! Pyroscope OTel demo
//!
//! Runs a synthetic request workload through an OpenTelemetry tracer with
//! profiling correlation installed, and logs the profile links written onto
//! each entry span.

use anyhow::Context as _;
use clap::Parser;
use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{Context, Value};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, Span, SpanData, SpanProcessor};
use pyroscope_otel::{ProfilingContextStorage, ProfilingConfig, install};
use pyroscope_otel_observability::tracing_setup;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pyroscope-otel-demo")]
#[command(about = "Drive traced requests through span-to-profile correlation", long_about = None)]
struct Cli {
    /// Application name used in profile queries (overrides OTEL_PYROSCOPE_APP_NAME).
    #[arg(long)]
    app_name: Option<String>,

    /// Profiling backend base URL (overrides OTEL_PYROSCOPE_ENDPOINT).
    #[arg(long)]
    endpoint: Option<String>,

    /// Number of requests to simulate.
    #[arg(long, default_value_t = 8)]
    requests: usize,

    /// Number of concurrent workers.
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Compute profile URLs from the real span end time.
    #[arg(long)]
    accurate: bool,
}

/// Logs the profiling attributes of every ended span.
#[derive(Debug)]
struct ProfileLinkLogger;

impl SpanProcessor for ProfileLinkLogger {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        for kv in span.attributes.iter().filter(|kv| kv.key.as_str().starts_with("pyroscope.")) {
            let value = match &kv.value {
                Value::String(value) => value.as_str().to_string(),
                other => other.to_string(),
            };
            info!(span = %span.name, key = kv.key.as_str(), value = %value, "profile link");
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }
}

async fn handle_request(tracer: SdkTracer, storage: ProfilingContextStorage, request: usize) {
    let cx = Context::current_with_span(tracer.start(format!("GET /orders/{}", request % 4)));
    let work_cx = cx.clone();
    storage
        .in_profiled(cx.clone(), async move {
            let lookup = work_cx.with_span(tracer.start_with_context("db.query", &work_cx));
            busy_work(200_000 + request as u64 * 1_000);
            tokio::time::sleep(Duration::from_millis(5)).await;
            lookup.span().end();
        })
        .await;
    cx.span().end();
}

fn busy_work(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, i| acc.wrapping_mul(31).wrapping_add(i))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_setup::init_tracing("info");

    let cli = Cli::parse();
    let mut config = ProfilingConfig::from_env().context("loading OTEL_PYROSCOPE_* settings")?;
    if let Some(app_name) = cli.app_name {
        config.app_name = app_name;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint.trim_end_matches('/').to_string();
    }
    if cli.accurate {
        config.optimistic_timestamps = false;
    }
    if config.app_name.is_empty() {
        config.app_name = "pyroscope-otel-demo".to_string();
    }

    let installation = install(config, None).context("installing profiling correlation")?;
    let provider = SdkTracerProvider::builder()
        .with_span_processor(installation.span_processor().with_downstream(ProfileLinkLogger))
        .build();
    let tracer = provider.tracer("pyroscope-otel-demo");

    let workers = cli.workers.max(1);
    let mut tasks = tokio::task::JoinSet::new();
    for worker in 0..workers {
        let tracer = tracer.clone();
        let storage = installation.storage().clone();
        let requests = cli.requests;
        tasks.spawn(async move {
            for request in (worker..requests).step_by(workers) {
                handle_request(tracer.clone(), storage.clone(), request).await;
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.context("request worker failed")?;
    }

    if let Some(profiler) = installation.backend().in_process() {
        info!(
            constants = profiler.constant_count(),
            open_scopes = profiler.open_scope_count(),
            "in-process profiler state"
        );
    }
    info!(open_spans = installation.correlator().tracked_len(), "workload finished");

    provider.shutdown().context("shutting down tracer provider")?;
    Ok(())
}
