//! Structural similarity scoring used to break ties among schema-hash
//! candidates that all pass the shape guard.

use replay_common::Value;

const MAX_DEPTH: usize = 5;

/// Score `actual` against `expected` in `[0.0, 1.0]`, 1.0 meaning identical.
/// Recursion stops at `MAX_DEPTH`: anything deeper is stringified and
/// compared by edit distance instead of walked further, so a few mismatched
/// leaves several levels down don't dominate the score.
pub fn similarity_score(expected: &Value, actual: &Value) -> f64 {
    score_at_depth(expected, actual, 0)
}

fn score_at_depth(expected: &Value, actual: &Value, depth: usize) -> f64 {
    if expected == actual {
        return 1.0;
    }
    if depth >= MAX_DEPTH {
        return string_similarity(&expected.to_string(), &actual.to_string());
    }

    match (expected, actual) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            if keys.is_empty() {
                return 1.0;
            }
            let total: f64 = keys
                .iter()
                .map(|key| match (a.get(*key), b.get(*key)) {
                    (Some(av), Some(bv)) => score_at_depth(av, bv, depth + 1),
                    _ => 0.0,
                })
                .sum();
            total / keys.len() as f64
        }
        (Value::Array(a), Value::Array(b)) => {
            let len = a.len().max(b.len());
            if len == 0 {
                return 1.0;
            }
            let total: f64 = (0..len)
                .map(|i| match (a.get(i), b.get(i)) {
                    (Some(av), Some(bv)) => score_at_depth(av, bv, depth + 1),
                    _ => 0.0,
                })
                .sum();
            total / len as f64
        }
        (Value::String(a), Value::String(b)) => string_similarity(a, b),
        _ => 0.0,
    }
}

fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein(a, b);
    1.0 - (distance as f64 / max_len as f64)
}

/// Classic O(n*m) edit-distance DP. No crate in the corpus offers this, so
/// it's hand-rolled rather than pulled in as a dependency.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_values_score_one() {
        assert_eq!(similarity_score(&json!({"a": 1}), &json!({"a": 1})), 1.0);
    }

    #[test]
    fn completely_different_objects_score_low() {
        let score = similarity_score(&json!({"a": "hello"}), &json!({"a": "zzzzz"}));
        assert!(score < 0.3, "expected low score, got {score}");
    }

    #[test]
    fn near_miss_strings_score_high() {
        let score = similarity_score(&json!("hello world"), &json!("hello worlx"));
        assert!(score > 0.8, "expected high score, got {score}");
    }

    #[test]
    fn missing_keys_penalized() {
        let score = similarity_score(&json!({"a": 1, "b": 2}), &json!({"a": 1}));
        assert_eq!(score, 0.5);
    }

    #[test]
    fn depth_beyond_cap_falls_back_to_string_edit_distance() {
        let deep_expected = json!({"l1": {"l2": {"l3": {"l4": {"l5": {"l6": "x"}}}}}});
        let deep_actual = json!({"l1": {"l2": {"l3": {"l4": {"l5": {"l6": "y"}}}}}});
        let score = similarity_score(&deep_expected, &deep_actual);
        assert!(score > 0.8, "expected a near-miss score from stringified comparison, got {score}");
        assert!(score < 1.0);
    }

    #[test]
    fn levenshtein_basic_cases() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
    }
}
