//! Replay executor: batches trace-tests through the SUT, detects crashes,
//! restarts with bounded retry, and falls back to a sequential re-run of
//! the crashed batch.

use crate::crash::{backoff_delay, batch_looks_crashed};
use crate::http_client::HttpClient;
use futures::future::join_all;
use replay_common::{ExecutorConfig, Value};
use replay_comparator::{compare_response, ActualResponse, ExpectedResponse};
use replay_dynamic_match::DynamicMatchConfig;
use replay_ipc_server::{hashes::reduced_value_hash_of, ServerState};
use replay_process_supervisor::{
    force_stop_environment, start_service, stop_service, IpcEndpointEnv, SupervisedProcess, SupervisorConfig,
};
use replay_trace_model::{classify_failure, MatchEvent, SpanResult, Test, TestFailureReason, TestResult, TraceTestReport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("server restart budget exhausted")]
    RestartBudgetExhausted,
    #[error("no SUT process is currently running")]
    NoActiveProcess,
}

/// One test's internal outcome plus the pieces needed to build its external
/// `TraceTestReport`.
struct SingleTestOutcome {
    result: TestResult,
    failure_reason: Option<TestFailureReason>,
    match_events: Vec<MatchEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub passed: usize,
    pub deviating: usize,
    pub crashed: usize,
    pub cancelled: usize,
}

impl Summary {
    pub fn tally(results: &[TestResult]) -> Self {
        let mut summary = Summary::default();
        for result in results {
            if result.cancelled {
                summary.cancelled += 1;
            } else if result.crashed_server {
                summary.crashed += 1;
            } else if result.passed {
                summary.passed += 1;
            } else {
                summary.deviating += 1;
            }
        }
        summary
    }
}

/// Drives a batch of trace-tests through one running SUT, owning the
/// process handle across crash-triggered restarts. The executor is the
/// only component that spawns test workers.
pub struct Executor {
    state: Arc<ServerState>,
    http_client: HttpClient,
    dynamic_match: DynamicMatchConfig,
    config: ExecutorConfig,
    supervisor_config: SupervisorConfig,
    ipc_env: IpcEndpointEnv,
    process: Mutex<Option<SupervisedProcess>>,
}

impl Executor {
    pub fn new(
        state: Arc<ServerState>,
        service_url: impl Into<String>,
        dynamic_match: DynamicMatchConfig,
        config: ExecutorConfig,
        supervisor_config: SupervisorConfig,
        ipc_env: IpcEndpointEnv,
        process: SupervisedProcess,
    ) -> Self {
        Self {
            state,
            http_client: HttpClient::new(service_url),
            dynamic_match,
            config,
            supervisor_config,
            ipc_env,
            process: Mutex::new(Some(process)),
        }
    }

    /// Stops whatever SUT process the executor currently owns. Called once
    /// at the end of an environment group's run.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if let Some(process) = self.process.lock().await.take() {
            stop_service(process).await?;
        }
        Ok(())
    }

    /// Runs every test, batched by `config.parallel`, with crash-triggered
    /// restart and sequential fallback.
    pub async fn run(
        &self,
        tests: &[Test],
        cancel: &CancellationToken,
        mut on_test_completed: impl FnMut(&TestResult, &Test),
    ) -> (Vec<TestResult>, Vec<TraceTestReport>) {
        let mut results = Vec::with_capacity(tests.len());
        let mut reports = Vec::with_capacity(tests.len());
        let batch_size = self.config.parallel.max(1);

        for batch in tests.chunks(batch_size) {
            if cancel.is_cancelled() {
                for test in batch {
                    let result = TestResult::cancelled(test.trace_test_id.clone());
                    on_test_completed(&result, test);
                    results.push(result);
                }
                continue;
            }

            let outcomes = self.run_batch_concurrent(batch, cancel).await;
            let errors: Vec<String> = outcomes
                .iter()
                .filter_map(|o| o.result.error.clone())
                .collect();

            if !batch_looks_crashed(&errors, &self.http_client).await {
                for (test, outcome) in batch.iter().zip(outcomes) {
                    on_test_completed(&outcome.result, test);
                    reports.push(self.build_report(test, &outcome));
                    results.push(outcome.result);
                }
                continue;
            }

            tracing::warn!(batch_len = batch.len(), "SUT crash detected, attempting restart");
            match self.restart_with_retry().await {
                Ok(()) => {
                    let sequential = self.run_batch_sequential(batch, cancel, &mut on_test_completed).await;
                    for (test, outcome) in batch.iter().zip(sequential) {
                        reports.push(self.build_report(test, &outcome));
                        results.push(outcome.result);
                    }
                }
                Err(_) => {
                    tracing::error!("restart budget exhausted, failing remaining batch");
                    for test in batch {
                        let result = TestResult::errored(test.trace_test_id.clone(), 0, "Server repeatedly crashed");
                        on_test_completed(&result, test);
                        reports.push(TraceTestReport {
                            trace_test_id: test.trace_test_id.clone(),
                            test_success: false,
                            test_failure_reason: Some(TestFailureReason::NoResponse),
                            test_failure_message: Some("Server repeatedly crashed".to_string()),
                            span_results: Vec::new(),
                        });
                        results.push(result);
                    }
                }
            }
        }

        (results, reports)
    }

    async fn run_batch_concurrent(&self, batch: &[Test], cancel: &CancellationToken) -> Vec<SingleTestOutcome> {
        let futures = batch.iter().map(|test| self.run_single_test(test, cancel));
        join_all(futures).await
    }

    /// Re-runs a crashed batch one test at a time, health-checking after
    /// each failure and restarting before the next test when the server
    /// crashes again between tests.
    async fn run_batch_sequential(
        &self,
        batch: &[Test],
        cancel: &CancellationToken,
        on_test_completed: &mut impl FnMut(&TestResult, &Test),
    ) -> Vec<SingleTestOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut budget_exhausted = false;

        for test in batch {
            if budget_exhausted {
                let result = TestResult::errored(test.trace_test_id.clone(), 0, "Server repeatedly crashed");
                on_test_completed(&result, test);
                outcomes.push(SingleTestOutcome {
                    result,
                    failure_reason: Some(TestFailureReason::NoResponse),
                    match_events: Vec::new(),
                });
                continue;
            }

            let mut outcome = self.run_single_test(test, cancel).await;
            let crashed = outcome
                .result
                .error
                .as_deref()
                .is_some_and(crate::crash::looks_like_crash)
                && !self.http_client.probe_alive().await;

            if crashed {
                outcome.result.crashed_server = true;
                outcome.result.retried_after_crash = true;
                on_test_completed(&outcome.result, test);
                outcomes.push(outcome);

                if self.restart_with_retry().await.is_err() {
                    budget_exhausted = true;
                }
                continue;
            }

            on_test_completed(&outcome.result, test);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_single_test(&self, test: &Test, cancel: &CancellationToken) -> SingleTestOutcome {
        if cancel.is_cancelled() {
            return SingleTestOutcome {
                result: TestResult::cancelled(test.trace_test_id.clone()),
                failure_reason: None,
                match_events: Vec::new(),
            };
        }

        let trace_id = trace_id_of(test);
        self.state.load_spans_for_trace(&trace_id, test.spans.clone(), reduced_value_hash_of);
        self.state.set_current_test_id(Some(test.trace_test_id.clone()));

        let started = Instant::now();
        let outcome = self
            .http_client
            .send(&trace_id, test, Duration::from_secs(self.config.test_timeout_secs))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let had_mock_not_found = self
            .state
            .mock_not_found_events()
            .iter()
            .any(|e| e.trace_id == trace_id);
        let match_events: Vec<MatchEvent> = self
            .state
            .match_events()
            .into_iter()
            .filter(|e| e.trace_id == trace_id)
            .collect();

        let (result, failure_reason) = match outcome {
            Ok(raw) => {
                let actual = ActualResponse {
                    status: raw.status,
                    headers: raw.headers,
                    body: parse_body(&raw.body),
                };
                let expected = ExpectedResponse {
                    status: test.expected_status,
                    headers: test.expected_headers.clone(),
                    body: test.expected_body.clone(),
                };
                let comparison = compare_response(&expected, &actual, &self.dynamic_match);

                match classify_failure(had_mock_not_found, None, &comparison.deviations) {
                    Some((reason, message)) => {
                        let mut result = TestResult::errored(
                            test.trace_test_id.clone(),
                            duration_ms,
                            message.unwrap_or_else(|| failure_reason_message(reason)),
                        );
                        result.deviations = comparison.deviations;
                        (result, Some(reason))
                    }
                    None => (TestResult::passed(test.trace_test_id.clone(), duration_ms), None),
                }
            }
            Err(err) => {
                let message = err.message();
                match classify_failure(had_mock_not_found, Some(&message), &[]) {
                    Some((reason, classified_message)) => (
                        TestResult::errored(test.trace_test_id.clone(), duration_ms, classified_message.unwrap_or(message)),
                        Some(reason),
                    ),
                    None => (TestResult::errored(test.trace_test_id.clone(), duration_ms, message), None),
                }
            }
        };

        self.state.set_current_test_id(None);
        self.state.cleanup_trace_spans(&trace_id);

        SingleTestOutcome {
            result,
            failure_reason,
            match_events,
        }
    }

    fn build_report(&self, test: &Test, outcome: &SingleTestOutcome) -> TraceTestReport {
        let mut span_results: Vec<SpanResult> = outcome
            .match_events
            .iter()
            .map(|event| SpanResult {
                matched_span_recording_id: Some(event.matched_span_id.clone()),
                match_level: Some(event.match_level.clone()),
                stack_trace: None,
                replay_span: None,
                deviations: Vec::new(),
            })
            .collect();
        if !outcome.result.deviations.is_empty() {
            span_results.push(SpanResult {
                matched_span_recording_id: None,
                match_level: None,
                stack_trace: None,
                replay_span: None,
                deviations: outcome.result.deviations.clone(),
            });
        }

        TraceTestReport {
            trace_test_id: test.trace_test_id.clone(),
            test_success: outcome.result.passed,
            test_failure_reason: outcome.failure_reason,
            test_failure_message: outcome.result.error.clone(),
            span_results,
        }
    }

    /// `RestartServerWithRetry`: force-stops whatever's currently running,
    /// then attempts up to `max_server_restart_attempts` restarts with
    /// `2s * 2^min(attempt, cap)` backoff between tries.
    async fn restart_with_retry(&self) -> Result<(), ExecutorError> {
        let mut guard = self.process.lock().await;
        if let Some(old) = guard.take() {
            let _ = force_stop_environment(old).await;
        }

        for attempt in 0..self.config.max_server_restart_attempts {
            let delay = backoff_delay(attempt, self.config.backoff_base_secs, self.config.backoff_cap_exponent);
            tokio::time::sleep(delay).await;
            match start_service(&self.supervisor_config, &self.ipc_env).await {
                Ok(new_process) => {
                    *guard = Some(new_process);
                    return Ok(());
                }
                Err(err) => tracing::warn!(error = %err, attempt, "restart attempt failed"),
            }
        }
        Err(ExecutorError::RestartBudgetExhausted)
    }
}

fn trace_id_of(test: &Test) -> String {
    test.spans
        .first()
        .map(|s| s.trace_id.clone())
        .unwrap_or_else(|| test.trace_test_id.clone())
}

fn failure_reason_message(reason: TestFailureReason) -> String {
    match reason {
        TestFailureReason::NoResponse => "no response received".to_string(),
        TestFailureReason::ResponseMismatch => "response did not match recording".to_string(),
        TestFailureReason::MockNotFound => "a required mock was not found".to_string(),
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_trace_model::TestResult as TR;

    #[test]
    fn summary_tallies_each_bucket_once() {
        let results = vec![
            TR::passed("a", 1),
            {
                let mut r = TR::errored("b", 1, "mismatch");
                r.deviations.push(replay_trace_model::Deviation {
                    field_path: "x".to_string(),
                    expected: Value::Null,
                    actual: Value::Null,
                    description: "d".to_string(),
                });
                r
            },
            {
                let mut r = TR::errored("c", 1, "Server repeatedly crashed");
                r.crashed_server = true;
                r
            },
            TR::cancelled("d"),
        ];
        let summary = Summary::tally(&results);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.deviating, 1);
        assert_eq!(summary.crashed, 1);
        assert_eq!(summary.cancelled, 1);
    }

    #[test]
    fn trace_id_falls_back_to_trace_test_id_without_spans() {
        let test = Test {
            trace_test_id: "tt-1".to_string(),
            method: "GET".to_string(),
            path: "/x".to_string(),
            headers: Default::default(),
            request_body: None,
            expected_status: 200,
            expected_headers: Default::default(),
            expected_body: Value::Null,
            display_name: None,
            metadata: Default::default(),
            spans: Vec::new(),
        };
        assert_eq!(trace_id_of(&test), "tt-1");
    }

    #[test]
    fn parse_body_falls_back_to_raw_string_on_invalid_json() {
        assert_eq!(parse_body(b"not json"), Value::String("not json".to_string()));
        assert_eq!(parse_body(b"{\"a\":1}"), serde_json::json!({"a": 1}));
    }
}
