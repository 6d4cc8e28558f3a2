//! Crash detection and restart backoff, grounded on
//! `agent-api-client::retry`'s `is_retryable_error`/backoff shape but
//! specialized to this executor's exact substring list and formula.

use crate::http_client::HttpClient;
use std::time::Duration;

/// Case-insensitive substrings that, seen in a transport error, suggest the
/// SUT process itself went down rather than the call being a one-off error.
const CRASH_SIGNATURES: &[&str] = &[
    "connection refused",
    ": eof",
    "connection reset",
    "broken pipe",
    "no such host",
    "connection closed",
];

pub fn looks_like_crash(error_message: &str) -> bool {
    let lower = error_message.to_ascii_lowercase();
    CRASH_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// A batch is considered server-crashing when at least one result carries a
/// crash-signature error AND a liveness probe to the SUT also fails.
pub async fn batch_looks_crashed(errors: &[String], client: &HttpClient) -> bool {
    if !errors.iter().any(|e| looks_like_crash(e)) {
        return false;
    }
    !client.probe_alive().await
}

/// `2s * 2^min(attempt, cap_exponent)`, attempt starting at 0.
pub fn backoff_delay(attempt: u32, base_secs: u64, cap_exponent: u32) -> Duration {
    let exponent = attempt.min(cap_exponent);
    let multiplier = 1u64 << exponent;
    Duration::from_secs(base_secs.saturating_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_documented_signature_case_insensitively() {
        for sig in CRASH_SIGNATURES {
            let msg = format!("Error: {}", sig.to_ascii_uppercase());
            assert!(looks_like_crash(&msg), "expected {sig} to be detected");
        }
    }

    #[test]
    fn unrelated_error_is_not_a_crash_signature() {
        assert!(!looks_like_crash("invalid JSON in response body"));
    }

    #[test]
    fn backoff_doubles_and_caps_at_exponent() {
        assert_eq!(backoff_delay(0, 2, 10), Duration::from_secs(2));
        assert_eq!(backoff_delay(1, 2, 10), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, 2, 10), Duration::from_secs(2 * 1024));
        assert_eq!(backoff_delay(20, 2, 10), Duration::from_secs(2 * 1024));
    }
}
