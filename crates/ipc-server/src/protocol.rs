//! Wire protocol: `uint32_be length || JSON payload` framing, carrying the
//! three request kinds an SDK sends and the CLI's correlated replies.
//!
//! JSON stands in for "a versioned binary message" here: nothing in this
//! codebase's dependency stack offers a protobuf/flatbuffers codec, while
//! `serde_json` is already load-bearing everywhere else a recorded value
//! crosses a boundary.

use replay_common::{Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_BYTES: u32 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "SDK_CONNECT")]
    SdkConnect {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "serviceId")]
        service_id: String,
        #[serde(rename = "sdkVersion")]
        sdk_version: String,
        #[serde(rename = "minCliVersion")]
        min_cli_version: String,
    },
    #[serde(rename = "MOCK_REQUEST")]
    MockRequest {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "traceId")]
        trace_id: String,
        #[serde(rename = "testId")]
        test_id: Option<String>,
        #[serde(rename = "packageName")]
        package_name: String,
        #[serde(rename = "inputValue")]
        input_value: Value,
        #[serde(rename = "inputSchema")]
        input_schema: Schema,
        #[serde(rename = "inputValueHash")]
        input_value_hash: String,
        #[serde(rename = "inputSchemaHash")]
        input_schema_hash: String,
        operation: Option<String>,
    },
    #[serde(rename = "INBOUND_SPAN")]
    InboundSpan {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(rename = "traceId")]
        trace_id: String,
        span: Value,
    },
}

impl Request {
    pub fn request_id(&self) -> &str {
        match self {
            Request::SdkConnect { request_id, .. } => request_id,
            Request::MockRequest { request_id, .. } => request_id,
            Request::InboundSpan { request_id, .. } => request_id,
        }
    }
}

/// The "MockInteraction" shape the instrumentation expects on a successful
/// mock lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockInteraction {
    pub service: String,
    pub request: MockInteractionSide,
    pub response: MockInteractionSide,
    pub order: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockInteractionSide {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "SDK_CONNECT_ACK")]
    SdkConnectAck {
        #[serde(rename = "requestId")]
        request_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "MOCK_RESPONSE")]
    MockResponse {
        #[serde(rename = "requestId")]
        request_id: String,
        found: bool,
        #[serde(skip_serializing_if = "Option::is_none", rename = "responseData")]
        response_data: Option<MockInteraction>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "INBOUND_SPAN_ACK")]
    InboundSpanAck {
        #[serde(rename = "requestId")]
        request_id: String,
        success: bool,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection closed")]
    Closed,
    #[error("frame exceeded {MAX_FRAME_BYTES} bytes, discarded")]
    TooLarge,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed json frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one length-prefixed frame. Oversized frames are read to completion
/// and discarded (keeping the stream in sync) rather than dropping the
/// connection, per the "rejected silently" wire-protocol rule.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
            Err(err) => return Err(FrameError::Io(err)),
        }
        let len = u32::from_be_bytes(len_buf);

        if len > MAX_FRAME_BYTES {
            let mut remaining = len as u64;
            let mut sink = [0u8; 8192];
            while remaining > 0 {
                let chunk = remaining.min(sink.len() as u64) as usize;
                reader.read_exact(&mut sink[..chunk]).await?;
                remaining -= chunk as u64;
            }
            tracing::warn!(frame_len = len, "discarded oversized IPC frame");
            continue;
        }

        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;
        return Ok(payload);
    }
}

pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request, FrameError> {
    let payload = read_frame(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}

pub async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<(), FrameError> {
    let payload = serde_json::to_vec(response)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_sdk_connect_request() {
        let request = Request::SdkConnect {
            request_id: "r1".to_string(),
            service_id: "svc".to_string(),
            sdk_version: "1.2.3".to_string(),
            min_cli_version: "1.0.0".to_string(),
        };
        let payload = serde_json::to_vec(&request).unwrap();
        let mut framed = Vec::new();
        framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        framed.extend_from_slice(&payload);

        let mut cursor = std::io::Cursor::new(framed);
        let decoded = read_request(&mut cursor).await.unwrap();
        assert_eq!(decoded.request_id(), "r1");
    }

    #[tokio::test]
    async fn oversized_frame_is_discarded_and_stream_resyncs() {
        let big_len = MAX_FRAME_BYTES + 1;
        let mut framed = Vec::new();
        framed.extend_from_slice(&big_len.to_be_bytes());
        framed.extend(std::iter::repeat(0u8).take(big_len as usize));

        let good = Request::InboundSpan {
            request_id: "r2".to_string(),
            trace_id: "t1".to_string(),
            span: json!({"ok": true}),
        };
        let good_payload = serde_json::to_vec(&good).unwrap();
        framed.extend_from_slice(&(good_payload.len() as u32).to_be_bytes());
        framed.extend_from_slice(&good_payload);

        let mut cursor = std::io::Cursor::new(framed);
        let decoded = read_request(&mut cursor).await.unwrap();
        assert_eq!(decoded.request_id(), "r2");
    }

    #[tokio::test]
    async fn write_then_read_response_round_trips() {
        let response = Response::MockResponse {
            request_id: "r1".to_string(),
            found: false,
            response_data: None,
            error: Some("mock search timed out".to_string()),
        };
        let mut buf = Vec::new();
        write_response(&mut buf, &response).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap();
        let decoded: Response = serde_json::from_slice(&frame).unwrap();
        match decoded {
            Response::MockResponse { found, .. } => assert!(!found),
            _ => panic!("expected mock response"),
        }
    }
}
