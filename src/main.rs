//! Thin entry point: loads configuration and trace fixtures from
//! conventional paths, wires up [`replay_runner::run_replay`], and prints a
//! summary. CLI-flag parsing, cloud trace fetching, and result upload are
//! external collaborators and live outside this binary.

use anyhow::Context;
use replay_common::RunnerConfig;
use replay_executor::{JsonlSpanSource, TestFilter};
use replay_runner::run_replay;
use replay_trace_model::TraceTest;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_output = std::env::var("REPLAY_RUNNER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_output {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var_os(var).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = env_path("REPLAY_RUNNER_CONFIG", "replay-runner.yaml");
    let config = RunnerConfig::from_file(&config_path)
        .with_context(|| format!("failed to load runner config from {}", config_path.display()))?;

    let traces_path = env_path("REPLAY_RUNNER_TRACES", "traces.json");
    let traces_content = std::fs::read_to_string(&traces_path)
        .with_context(|| format!("failed to read trace tests from {}", traces_path.display()))?;
    let trace_tests: Vec<TraceTest> =
        serde_json::from_str(&traces_content).with_context(|| "failed to parse trace tests as JSON")?;

    let suite_source = JsonlSpanSource::new(
        env_path("REPLAY_RUNNER_PRE_APP_START_SPANS", "pre-app-start-spans.jsonl"),
        env_path("REPLAY_RUNNER_GLOBAL_SPANS", "global-spans.jsonl"),
        env_path("REPLAY_RUNNER_TEST_SPANS", "test-spans.jsonl"),
    );

    let filter = std::env::var("REPLAY_RUNNER_FILTER")
        .ok()
        .map(|expr| TestFilter::parse(&expr))
        .transpose()
        .context("failed to parse REPLAY_RUNNER_FILTER")?;

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("ctrl-c received, cancelling run");
            shutdown_cancel.cancel();
        }
    });

    let report = run_replay(&config, &trace_tests, &suite_source, filter.as_ref(), cancel, |result, test| {
        tracing::info!(
            test_id = %test.trace_test_id,
            passed = result.passed,
            cancelled = result.cancelled,
            crashed_server = result.crashed_server,
            "test completed"
        );
    })
    .await?;

    tracing::info!(
        passed = report.summary.passed,
        deviating = report.summary.deviating,
        crashed = report.summary.crashed,
        cancelled = report.summary.cancelled,
        "replay run finished"
    );

    if report.summary.deviating > 0 || report.summary.crashed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
