//! Replay runner core: public facade wiring the IPC mock server, span
//! matching engine, process supervisor, and replay executor into one
//! environment-group run.
//!
//! The CLI front-end, cloud-API trace/result transport, and on-disk trace
//! parsing beyond the `SuiteSpanSource`/`Test::from_trace` seams are
//! deliberately external collaborators — this facade only wires the core
//! components together for a single invoking process.

use replay_comparator::body_codec;
use replay_common::{ComparisonConfig, RunnerConfig};
use replay_dynamic_match::DynamicMatchConfig;
use replay_executor::{group, load_suite_pool, EnvSnapshot, Executor, SuiteSpanSource, TestFilter};
use replay_ipc_server::{IpcServer, IpcTransport, ServerState};
use replay_process_supervisor::{IpcEndpointEnv, SupervisorConfig};
use replay_trace_model::{EnvironmentGroup, Test, TestResult, TraceTest, TraceTestReport};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use replay_comparator as comparator;
pub use replay_common as common;
pub use replay_dynamic_match as dynamic_match;
pub use replay_executor as executor;
pub use replay_ipc_server as ipc_server;
pub use replay_process_supervisor as process_supervisor;
pub use replay_span_matcher as span_matcher;
pub use replay_trace_model as trace_model;

#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<TestResult>,
    pub reports: Vec<TraceTestReport>,
    pub summary: replay_executor::Summary,
}

/// Decodes every trace's root span into a runtime `Test` (component C4's
/// body codec plugged into `Test::from_trace`) and applies the optional
/// filter DSL.
pub fn build_tests(trace_tests: &[TraceTest], filter: Option<&TestFilter>) -> anyhow::Result<Vec<Test>> {
    let mut tests = Vec::with_capacity(trace_tests.len());
    for trace_test in trace_tests {
        let test = Test::from_trace(trace_test, |value, schema| {
            let (bytes, parsed) = body_codec::decode(value, schema)?;
            Ok((bytes, parsed))
        })?;
        if filter.map(|f| f.matches(&test)).unwrap_or(true) {
            tests.push(test);
        }
    }
    Ok(tests)
}

/// Runs every environment group in sequence: snapshot/override
/// host env vars, bring up the IPC server and SUT, drive the group's tests
/// through the executor, tear both down, and restore the snapshot — even
/// on failure.
pub async fn run_replay(
    config: &RunnerConfig,
    trace_tests: &[TraceTest],
    suite_source: &dyn SuiteSpanSource,
    filter: Option<&TestFilter>,
    cancel: CancellationToken,
    mut on_test_completed: impl FnMut(&TestResult, &Test) + Send,
) -> anyhow::Result<RunReport> {
    let tests = build_tests(trace_tests, filter)?;
    let (suite_pool, suite_report) = load_suite_pool(suite_source).await?;
    tracing::info!(
        unique_traces = suite_report.unique_traces,
        pre_app_start_count = suite_report.pre_app_start_count,
        "loaded suite span pool"
    );

    let pre_app_start_spans: Vec<_> = suite_pool.iter().filter(|s| s.is_pre_app_start).cloned().collect();
    let groups = group(tests, &pre_app_start_spans);
    let dynamic_match = DynamicMatchConfig::from_comparison_config(&config.comparison);

    let mut report = RunReport::default();
    for env_group in groups {
        if cancel.is_cancelled() {
            for test in &env_group.tests {
                report.results.push(TestResult::cancelled(test.trace_test_id.clone()));
            }
            continue;
        }
        let group_report = run_environment_group(config, env_group, &suite_pool, &dynamic_match, &cancel, &mut on_test_completed).await?;
        report.results.extend(group_report.0);
        report.reports.extend(group_report.1);
    }

    report.summary = replay_executor::Summary::tally(&report.results);
    Ok(report)
}

async fn run_environment_group(
    config: &RunnerConfig,
    env_group: EnvironmentGroup,
    suite_pool: &[replay_trace_model::Span],
    dynamic_match: &DynamicMatchConfig,
    cancel: &CancellationToken,
    on_test_completed: &mut (impl FnMut(&TestResult, &Test) + Send),
) -> anyhow::Result<(Vec<TestResult>, Vec<TraceTestReport>)> {
    tracing::info!(environment = %env_group.name, tests = env_group.tests.len(), "starting environment group");
    let snapshot = EnvSnapshot::apply(&env_group.env_vars);

    let outcome = run_environment_group_inner(config, &env_group, suite_pool, dynamic_match, cancel, on_test_completed).await;

    snapshot.restore();
    outcome
}

async fn run_environment_group_inner(
    config: &RunnerConfig,
    env_group: &EnvironmentGroup,
    suite_pool: &[replay_trace_model::Span],
    dynamic_match: &DynamicMatchConfig,
    cancel: &CancellationToken,
    on_test_completed: &mut (impl FnMut(&TestResult, &Test) + Send),
) -> anyhow::Result<(Vec<TestResult>, Vec<TraceTestReport>)> {
    let state = Arc::new(ServerState::new());
    state.add_to_suite_index(suite_pool.to_vec(), replay_ipc_server::hashes::reduced_value_hash_of);

    let transport = resolve_transport(config);
    let ipc_server = IpcServer::start(transport.clone(), state.clone()).await?;
    let ipc_env = to_ipc_endpoint_env(&transport);

    let supervisor_config = SupervisorConfig::new(config.service.clone());
    let service_url = format!("http://127.0.0.1:{}", config.service.port);

    let process = replay_process_supervisor::start_service(&supervisor_config, &ipc_env).await?;

    let executor = Executor::new(
        state.clone(),
        service_url,
        dynamic_match.clone(),
        config.executor.clone(),
        supervisor_config,
        ipc_env,
        process,
    );

    let (results, reports) = executor.run(&env_group.tests, cancel, &mut *on_test_completed).await;

    executor.shutdown().await?;
    ipc_server.stop().await?;

    Ok((results, reports))
}

/// Config `communication.type ∈ {auto, unix, tcp}`: `auto` picks TCP when the start command tokenizes to
/// contain `docker`/`docker-compose`, else a Unix domain socket.
fn resolve_transport(config: &RunnerConfig) -> IpcTransport {
    use replay_common::CommunicationType;
    match config.service.communication.kind {
        CommunicationType::Unix => IpcTransport::Unix {
            path: std::env::temp_dir().join(format!("replay-runner-{}.sock", config.service.id)),
        },
        CommunicationType::Tcp => IpcTransport::Tcp {
            host: "127.0.0.1".to_string(),
            port: config.service.communication.tcp_port.unwrap_or(0),
        },
        CommunicationType::Auto => {
            let uses_container_runtime = config
                .service
                .start_command
                .split_whitespace()
                .any(|token| token == "docker" || token == "docker-compose");
            if uses_container_runtime {
                IpcTransport::Tcp {
                    host: "127.0.0.1".to_string(),
                    port: config.service.communication.tcp_port.unwrap_or(0),
                }
            } else {
                IpcTransport::resolve_auto(&config.service.id)
            }
        }
    }
}

fn to_ipc_endpoint_env(transport: &IpcTransport) -> IpcEndpointEnv {
    match transport {
        IpcTransport::Unix { path } => IpcEndpointEnv::Unix { socket_path: path.clone() },
        IpcTransport::Tcp { host, port } => IpcEndpointEnv::Tcp {
            host: host.clone(),
            port: *port,
        },
    }
}

pub fn sdk_connect_wait(config: &RunnerConfig) -> Duration {
    Duration::from_secs(config.executor.sdk_connect_wait_secs)
}

#[allow(dead_code)]
fn default_comparison() -> ComparisonConfig {
    ComparisonConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_common::{CommunicationConfig, CommunicationType as CT, ReadinessConfig, ServiceConfig};

    fn service(start_command: &str, kind: CT) -> ServiceConfig {
        ServiceConfig {
            id: "svc".to_string(),
            port: 4000,
            start_command: start_command.to_string(),
            stop_command: None,
            readiness: ReadinessConfig::default(),
            communication: CommunicationConfig { kind, tcp_port: None },
        }
    }

    fn runner_config(service: ServiceConfig) -> RunnerConfig {
        RunnerConfig {
            service,
            comparison: ComparisonConfig::default(),
            executor: Default::default(),
            extra: Default::default(),
        }
    }

    #[test]
    fn auto_transport_picks_tcp_for_docker_start_command() {
        let config = runner_config(service("docker compose up", CT::Auto));
        assert!(matches!(resolve_transport(&config), IpcTransport::Tcp { .. }));
    }

    #[test]
    fn auto_transport_picks_unix_for_plain_start_command() {
        let config = runner_config(service("node server.js", CT::Auto));
        assert!(matches!(resolve_transport(&config), IpcTransport::Unix { .. }));
    }

    #[test]
    fn explicit_transport_kind_is_honored() {
        let config = runner_config(service("node server.js", CT::Tcp));
        assert!(matches!(resolve_transport(&config), IpcTransport::Tcp { .. }));
    }
}
