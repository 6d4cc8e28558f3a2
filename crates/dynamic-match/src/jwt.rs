//! JWT payload equivalence. Signatures are never compared.

use crate::config::DynamicMatchConfig;
use crate::patterns::is_jwt;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use replay_common::Value;

/// Claims whose value is expected to vary between recording and replay even
/// when the token is "the same" token semantically.
const DYNAMIC_CLAIMS: &[&str] = &["jti"];

fn decode_payload(token: &str) -> Option<Value> {
    let payload_segment = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload_segment).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// True iff `expected` and `actual` are both JWTs whose payloads are
/// equivalent under `should_ignore` (recursive dynamic-field tolerance).
pub fn jwt_equivalent(
    config: &DynamicMatchConfig,
    expected: &str,
    actual: &str,
    should_ignore: impl Fn(&DynamicMatchConfig, &str, &Value, &Value) -> bool,
) -> bool {
    if !is_jwt(expected) || !is_jwt(actual) {
        return false;
    }

    let (Some(Value::Object(expected_claims)), Some(Value::Object(actual_claims))) =
        (decode_payload(expected), decode_payload(actual))
    else {
        return false;
    };

    let expected_keys: std::collections::BTreeSet<&String> = expected_claims.keys().collect();
    let actual_keys: std::collections::BTreeSet<&String> = actual_claims.keys().collect();
    if expected_keys != actual_keys {
        return false;
    }

    expected_claims.iter().all(|(key, expected_value)| {
        let actual_value = &actual_claims[key];
        if expected_value == actual_value {
            return true;
        }
        if DYNAMIC_CLAIMS.contains(&key.as_str()) {
            return true;
        }
        should_ignore(config, key, expected_value, actual_value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::should_ignore;
    use base64::Engine;
    use serde_json::json;

    fn make_jwt(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\"}");
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn differing_only_in_jti_is_equivalent() {
        let config = DynamicMatchConfig::default();
        let a = make_jwt(&json!({"sub": "1", "jti": "aaa"}));
        let b = make_jwt(&json!({"sub": "1", "jti": "bbb"}));
        assert!(jwt_equivalent(&config, &a, &b, should_ignore));
    }

    #[test]
    fn differing_in_token_type_is_not_equivalent() {
        let config = DynamicMatchConfig::default();
        let a = make_jwt(&json!({"sub": "1", "token_type": "access"}));
        let b = make_jwt(&json!({"sub": "1", "token_type": "refresh"}));
        assert!(!jwt_equivalent(&config, &a, &b, should_ignore));
    }

    #[test]
    fn jti_difference_rejected_when_jwt_fields_disabled() {
        let config = DynamicMatchConfig::builder().ignore_jwt_fields(false).build();
        let a = make_jwt(&json!({"jti": "aaa"}));
        let b = make_jwt(&json!({"jti": "bbb"}));
        // jwt_equivalent itself doesn't gate on ignore_jwt_fields; the caller
        // (should_ignore) is responsible for that top-level check.
        assert!(jwt_equivalent(&config, &a, &b, should_ignore));
    }
}
