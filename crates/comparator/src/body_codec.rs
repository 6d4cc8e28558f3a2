//! Recorded-body codec (component C4).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use replay_common::{Schema, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("explicit BASE64 encoding declared but payload failed to decode: {0}")]
    Base64Fatal(base64::DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Base64,
    Raw,
    Unspecified,
}

fn resolve_encoding(schema: &Schema) -> Encoding {
    match schema.encoding.as_deref() {
        Some(e) if e.eq_ignore_ascii_case("BASE64") => Encoding::Base64,
        Some(e) if e.eq_ignore_ascii_case("RAW") => Encoding::Raw,
        _ => Encoding::Unspecified,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Text,
    Binary,
    Unspecified,
}

const TEXT_KINDS: &[&str] = &[
    "plain_text", "html", "css", "javascript", "xml", "yaml", "markdown", "csv", "sql", "graphql",
    "svg", "form_data", "multipart_form",
];

const BINARY_KINDS: &[&str] = &[
    "binary", "pdf", "audio", "video", "gzip", "zip", "jpeg", "png", "gif", "webp",
];

fn resolve_content_kind(schema: &Schema) -> ContentKind {
    match schema.decoded_type.as_deref().map(str::to_ascii_lowercase) {
        Some(ref kind) if kind == "json" => ContentKind::Json,
        Some(ref kind) if TEXT_KINDS.contains(&kind.as_str()) => ContentKind::Text,
        Some(ref kind) if BINARY_KINDS.contains(&kind.as_str()) => ContentKind::Binary,
        _ => ContentKind::Unspecified,
    }
}

fn raw_string_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

/// Decode a recorded payload into wire bytes (`bytes`, used for replay) and
/// a semantically-comparable `parsed` value (used for diffing).
pub fn decode(value: &Value, schema: &Schema) -> Result<(Vec<u8>, Value), CodecError> {
    let source = raw_string_bytes(value);
    let encoding = resolve_encoding(schema);

    let bytes = match encoding {
        Encoding::Raw => source,
        Encoding::Base64 => {
            let source_str = String::from_utf8_lossy(&source);
            BASE64
                .decode(source_str.trim())
                .map_err(CodecError::Base64Fatal)?
        }
        Encoding::Unspecified => {
            let source_str = String::from_utf8_lossy(&source);
            BASE64.decode(source_str.trim()).unwrap_or(source.clone())
        }
    };

    let parsed = parse_for_kind(&bytes, resolve_content_kind(schema));
    Ok((bytes, parsed))
}

/// Encode a `parsed` value back into wire bytes using the schema's encoding
/// (inverse of `decode`).
pub fn encode(parsed: &Value, schema: &Schema) -> Vec<u8> {
    let bytes = match parsed {
        Value::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    };
    match resolve_encoding(schema) {
        Encoding::Raw => bytes,
        Encoding::Base64 | Encoding::Unspecified => BASE64.encode(bytes).into_bytes(),
    }
}

fn parse_for_kind(bytes: &[u8], kind: ContentKind) -> Value {
    match kind {
        ContentKind::Json => parse_json_or_string(bytes),
        ContentKind::Text => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ContentKind::Binary => Value::String(BASE64.encode(bytes)),
        ContentKind::Unspecified => parse_json_or_string(bytes),
    }
}

fn parse_json_or_string(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(encoding: Option<&str>, decoded_type: Option<&str>) -> Schema {
        Schema {
            type_: "string".into(),
            encoding: encoding.map(str::to_string),
            decoded_type: decoded_type.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_base64_json_body() {
        let payload = serde_json::json!({"ok": true});
        let encoded = BASE64.encode(payload.to_string());
        let value = Value::String(encoded);
        let (bytes, parsed) = decode(&value, &schema(Some("BASE64"), Some("JSON"))).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), payload.to_string());
        assert_eq!(parsed, payload);
    }

    #[test]
    fn explicit_base64_failure_is_fatal() {
        let value = Value::String("not base64!!".to_string());
        let result = decode(&value, &schema(Some("BASE64"), Some("JSON")));
        assert!(matches!(result, Err(CodecError::Base64Fatal(_))));
    }

    #[test]
    fn unspecified_encoding_falls_back_to_raw_on_decode_failure() {
        let value = Value::String("plain text body".to_string());
        let (bytes, parsed) = decode(&value, &schema(None, Some("PLAIN_TEXT"))).unwrap();
        assert_eq!(bytes, b"plain text body");
        assert_eq!(parsed, Value::String("plain text body".to_string()));
    }

    #[test]
    fn text_family_produces_utf8_string() {
        let value = Value::String(BASE64.encode("<html></html>"));
        let (_, parsed) = decode(&value, &schema(None, Some("HTML"))).unwrap();
        assert_eq!(parsed, Value::String("<html></html>".to_string()));
    }

    #[test]
    fn binary_family_round_trips_through_base64_for_diffing() {
        let raw = vec![0u8, 1, 2, 255];
        let value = Value::String(BASE64.encode(&raw));
        let (bytes, parsed) = decode(&value, &schema(None, Some("PNG"))).unwrap();
        assert_eq!(bytes, raw);
        assert_eq!(parsed, Value::String(BASE64.encode(&raw)));
    }

    #[test]
    fn json_round_trip_invariant() {
        let payload = serde_json::json!({"a": 1, "b": [1, 2, 3]});
        let schema = schema(Some("BASE64"), Some("JSON"));
        let encoded_bytes = encode(&payload, &schema);
        let encoded_value = Value::String(String::from_utf8(encoded_bytes).unwrap());
        let (_, parsed) = decode(&encoded_value, &schema).unwrap();
        assert_eq!(parsed, payload);
    }
}
