//! Accept loop and per-connection dispatch.
//!
//! Grounded on the same `tokio::select! { cancel, JoinSet::join_next, accept }`
//! shape the TCP bridge uses elsewhere in this codebase, generalized to two
//! listener kinds and a length-prefixed JSON protocol instead of raw
//! bidirectional copying.

use crate::hashes::{reduced_schema_hash, reduced_value_hash};
use crate::protocol::{self, FrameError, MockInteraction, MockInteractionSide, Request, Response};
use crate::state::ServerState;
use crate::transport::IpcTransport;
use crate::version::check_handshake_compatibility;
use chrono::Utc;
use replay_common::Value;
use replay_span_matcher::{find_best_match_across_traces, find_best_match_in_trace, MatchRequest};
use replay_trace_model::{MatchEvent, MatchScope, MockNotFoundEvent};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const MOCK_SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

enum BoundListener {
    Unix(UnixListener, PathBuf),
    Tcp(TcpListener),
}

impl BoundListener {
    async fn bind(transport: &IpcTransport) -> anyhow::Result<Self> {
        match transport {
            IpcTransport::Unix { path } => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
                if tokio::fs::metadata(path).await.is_ok() {
                    tokio::fs::remove_file(path).await?;
                }
                let listener = UnixListener::bind(path)?;
                Ok(BoundListener::Unix(listener, path.clone()))
            }
            IpcTransport::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port)).await?;
                Ok(BoundListener::Tcp(listener))
            }
        }
    }

    async fn accept(&self) -> std::io::Result<Box<dyn DuplexStream>> {
        match self {
            BoundListener::Unix(listener, _) => {
                let (stream, _addr) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            BoundListener::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                stream.set_nodelay(true).ok();
                Ok(Box::new(stream))
            }
        }
    }

    fn local_endpoint_uri(&self) -> String {
        match self {
            BoundListener::Unix(_, path) => format!("unix://{}", path.display()),
            BoundListener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| format!("tcp://{addr}"))
                .unwrap_or_else(|_| "tcp://unknown".to_string()),
        }
    }
}

pub struct IpcServer {
    state: Arc<ServerState>,
    cancel: CancellationToken,
    accept_task: tokio::task::JoinHandle<()>,
    unix_socket_path: Option<PathBuf>,
    endpoint_uri: String,
}

impl IpcServer {
    pub async fn start(transport: IpcTransport, state: Arc<ServerState>) -> anyhow::Result<Self> {
        let listener = BoundListener::bind(&transport).await?;
        let endpoint_uri = listener.local_endpoint_uri();
        let unix_socket_path = match &listener {
            BoundListener::Unix(_, path) => Some(path.clone()),
            BoundListener::Tcp(_) => None,
        };

        tracing::info!(endpoint = %endpoint_uri, "IPC mock server listening");

        let cancel = CancellationToken::new();
        let accept_cancel = cancel.clone();
        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move { accept_loop(listener, accept_state, accept_cancel).await });

        Ok(Self {
            state,
            cancel,
            accept_task,
            unix_socket_path,
            endpoint_uri,
        })
    }

    pub fn endpoint_uri(&self) -> &str {
        &self.endpoint_uri
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub async fn wait_for_sdk_connection(&self, timeout: Duration) -> Result<(), crate::state::SdkConnectWaitError> {
        self.state.wait_for_sdk_connection(timeout).await
    }

    pub async fn stop(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.accept_task.await?;
        if let Some(path) = self.unix_socket_path {
            tokio::fs::remove_file(&path).await.ok();
        }
        Ok(())
    }
}

async fn accept_loop(listener: BoundListener, state: Arc<ServerState>, cancel: CancellationToken) {
    let mut sessions: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("IPC server accept loop shutting down");
                break;
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            accept_res = listener.accept() => {
                match accept_res {
                    Ok(stream) => {
                        let conn_state = state.clone();
                        let conn_cancel = cancel.clone();
                        sessions.spawn(async move {
                            if let Err(err) = handle_connection(stream, conn_state, conn_cancel).await {
                                tracing::debug!(error = %err, "IPC connection ended");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to accept IPC connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    sessions.shutdown().await;
}

async fn handle_connection(
    mut stream: Box<dyn DuplexStream>,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<(), FrameError> {
    loop {
        let request = match protocol::read_request(&mut stream).await {
            Ok(request) => request,
            Err(FrameError::Closed) => return Ok(()),
            Err(err) => return Err(err),
        };

        let response = dispatch(request, &state, &cancel).await;
        protocol::write_response(&mut stream, &response).await?;
    }
}

async fn dispatch(request: Request, state: &Arc<ServerState>, cancel: &CancellationToken) -> Response {
    match request {
        Request::SdkConnect {
            request_id,
            service_id,
            sdk_version,
            min_cli_version,
        } => handle_sdk_connect(request_id, service_id, sdk_version, min_cli_version, state, cancel),
        Request::MockRequest {
            request_id,
            trace_id,
            test_id,
            package_name,
            input_value,
            input_schema,
            input_value_hash,
            input_schema_hash,
            operation,
        } => {
            handle_mock_request(
                request_id,
                trace_id,
                test_id,
                package_name,
                input_value,
                input_schema,
                input_value_hash,
                input_schema_hash,
                operation,
                state,
            )
            .await
        }
        Request::InboundSpan {
            request_id,
            trace_id,
            span,
        } => {
            state.stash_inbound_span(&trace_id, span);
            Response::InboundSpanAck {
                request_id,
                success: true,
            }
        }
    }
}

fn handle_sdk_connect(
    request_id: String,
    service_id: String,
    sdk_version: String,
    min_cli_version: String,
    state: &Arc<ServerState>,
    cancel: &CancellationToken,
) -> Response {
    if let Err(error) = check_handshake_compatibility(&sdk_version, &min_cli_version) {
        tracing::error!(service = %service_id, error = %error, "SDK/CLI version incompatible");
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        return Response::SdkConnectAck {
            request_id,
            success: false,
            error: Some(error),
        };
    }

    state.set_sdk_version(sdk_version);
    state.mark_sdk_connected();
    Response::SdkConnectAck {
        request_id,
        success: true,
        error: None,
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_mock_request(
    request_id: String,
    trace_id: String,
    test_id: Option<String>,
    package_name: String,
    input_value: Value,
    input_schema: replay_common::Schema,
    input_value_hash: String,
    input_schema_hash: String,
    operation: Option<String>,
    state: &Arc<ServerState>,
) -> Response {
    let effective_test_id = test_id.or_else(|| state.current_test_id());
    let search_state = state.clone();

    let search = tokio::spawn(async move {
        search_for_mock(
            &search_state,
            &trace_id,
            &package_name,
            input_value,
            input_schema,
            input_value_hash,
            input_schema_hash,
            operation,
        )
    });

    match tokio::time::timeout(MOCK_SEARCH_TIMEOUT, search).await {
        Ok(Ok(Some(interaction))) => Response::MockResponse {
            request_id,
            found: true,
            response_data: Some(interaction),
            error: None,
        },
        Ok(Ok(None)) => Response::MockResponse {
            request_id,
            found: false,
            response_data: None,
            error: Some("no matching mock found".to_string()),
        },
        Ok(Err(join_err)) => Response::MockResponse {
            request_id,
            found: false,
            response_data: None,
            error: Some(format!("mock search task failed: {join_err}")),
        },
        Err(_) => {
            let _ = effective_test_id;
            Response::MockResponse {
                request_id,
                found: false,
                response_data: None,
                error: Some("mock search timed out after 15s".to_string()),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn search_for_mock(
    state: &ServerState,
    trace_id: &str,
    package_name: &str,
    input_value: Value,
    input_schema: replay_common::Schema,
    input_value_hash: String,
    input_schema_hash: String,
    operation: Option<String>,
) -> Option<MockInteraction> {
    let input_reduced_schema_hash = reduced_schema_hash(&input_schema);
    let request = MatchRequest {
        package_name: package_name.to_string(),
        input_value,
        input_schema,
        input_value_hash,
        input_schema_hash,
        input_reduced_schema_hash,
        operation,
    };

    let trace_candidates = state.candidates_for_trace(trace_id, package_name);
    let trace_id_owned = trace_id.to_string();
    let outcome = find_best_match_in_trace(
        &request,
        &trace_candidates,
        |span_id| state.is_used(&trace_id_owned, span_id),
        |span| reduced_value_hash(&span.input_value, &span.input_schema),
        |span| reduced_schema_hash(&span.input_schema),
    )
    .or_else(|| {
        let suite_candidates = state.candidates_suite_wide(package_name);
        find_best_match_across_traces(&request, &suite_candidates, |_| false, |span| {
            reduced_value_hash(&span.input_value, &span.input_schema)
        })
    });

    match outcome {
        Some(outcome) => {
            if outcome.match_level.match_scope == MatchScope::TraceLocal {
                state.mark_used(trace_id, &outcome.span.span_id);
            }
            state.record_match_event(MatchEvent {
                trace_id: trace_id.to_string(),
                matched_span_id: outcome.span.span_id.clone(),
                match_level: outcome.match_level,
                timestamp: Utc::now(),
            });
            Some(span_to_mock_interaction(&outcome.span))
        }
        None => {
            state.record_mock_not_found(MockNotFoundEvent {
                trace_id: trace_id.to_string(),
                package_name: package_name.to_string(),
                reason: "no span matched any priority in the match ladder".to_string(),
                timestamp: Utc::now(),
            });
            None
        }
    }
}

fn span_to_mock_interaction(span: &replay_trace_model::Span) -> MockInteraction {
    let request_headers = extract_headers(span.input_value.get("headers"));
    let response_headers = extract_headers(span.output_value.get("headers"));

    MockInteraction {
        service: span.package_name.clone(),
        request: MockInteractionSide {
            method: span.input_value.get("method").and_then(Value::as_str).map(str::to_string),
            path: span.input_value.get("path").and_then(Value::as_str).map(str::to_string),
            status: None,
            headers: request_headers,
            body: span.input_value.get("body").cloned().unwrap_or(Value::Null),
        },
        response: MockInteractionSide {
            method: None,
            path: None,
            status: span.output_value.get("status").and_then(Value::as_i64).or(span.status),
            headers: response_headers,
            body: span.output_value.get("body").cloned().unwrap_or(Value::Null),
        },
        order: span.timestamp.timestamp_millis().max(0) as u64,
        timestamp: span.timestamp.to_rfc3339(),
    }
}

fn extract_headers(value: Option<&Value>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(Value::Object(map)) = value {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                out.insert(k.clone(), s.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::read_frame;
    use replay_common::Schema;
    use replay_trace_model::{Span, SpanKind};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    fn test_span() -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: "s1".to_string(),
            package_name: "http".to_string(),
            submodule_name: None,
            kind: SpanKind::Client,
            is_root_span: false,
            is_pre_app_start: false,
            timestamp: Utc::now(),
            duration_ms: Some(5),
            input_value: json!({"method": "GET", "path": "/users", "headers": {}}),
            input_schema: Schema::default(),
            input_value_hash: "abc".to_string(),
            input_schema_hash: "sh".to_string(),
            output_value: json!({"status": 200, "headers": {}, "body": {"ok": true}}),
            output_schema: Schema::default(),
            status: Some(200),
            metadata: HashMap::new(),
            environment: None,
        }
    }

    async fn send(stream: &mut UnixStream, request: &Request) -> Response {
        let payload = serde_json::to_vec(request).unwrap();
        stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
        stream.write_all(&payload).await.unwrap();
        stream.flush().await.unwrap();
        let frame = read_frame(stream).await.unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn handshake_then_mock_lookup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let transport = IpcTransport::Unix { path: socket_path.clone() };
        let state = Arc::new(ServerState::new());
        state.load_spans_for_trace("t1", vec![test_span()], |_| None);

        let server = IpcServer::start(transport, state.clone()).await.unwrap();
        let mut client = UnixStream::connect(&socket_path).await.unwrap();

        let connect_reply = send(
            &mut client,
            &Request::SdkConnect {
                request_id: "r1".to_string(),
                service_id: "svc".to_string(),
                sdk_version: "1.0.0".to_string(),
                min_cli_version: "0.0.1".to_string(),
            },
        )
        .await;
        match connect_reply {
            Response::SdkConnectAck { success, .. } => assert!(success),
            _ => panic!("expected handshake ack"),
        }
        assert!(state.is_sdk_connected());

        let mock_reply = send(
            &mut client,
            &Request::MockRequest {
                request_id: "r2".to_string(),
                trace_id: "t1".to_string(),
                test_id: None,
                package_name: "http".to_string(),
                input_value: json!({"method": "GET", "path": "/users", "headers": {}}),
                input_schema: Schema::default(),
                input_value_hash: "abc".to_string(),
                input_schema_hash: "sh".to_string(),
                operation: None,
            },
        )
        .await;
        match mock_reply {
            Response::MockResponse { found, response_data, .. } => {
                assert!(found);
                assert_eq!(response_data.unwrap().response.status, Some(200));
            }
            _ => panic!("expected mock response"),
        }

        drop(client);
        server.stop().await.unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn incompatible_handshake_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test2.sock");
        let transport = IpcTransport::Unix { path: socket_path.clone() };
        let state = Arc::new(ServerState::new());

        let server = IpcServer::start(transport, state.clone()).await.unwrap();
        let mut client = UnixStream::connect(&socket_path).await.unwrap();

        let reply = send(
            &mut client,
            &Request::SdkConnect {
                request_id: "r1".to_string(),
                service_id: "svc".to_string(),
                sdk_version: "0.0.1".to_string(),
                min_cli_version: "0.0.1".to_string(),
            },
        )
        .await;
        match reply {
            Response::SdkConnectAck { success, error, .. } => {
                assert!(!success);
                assert!(error.is_some());
            }
            _ => panic!("expected handshake ack"),
        }
        assert!(!state.is_sdk_connected());

        drop(client);
        server.stop().await.unwrap();
    }
}
