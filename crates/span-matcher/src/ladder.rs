//! The eight-priority (plus suite-global) span match ladder.

use crate::request::MatchRequest;
use crate::shape_guard::{is_http_like, shape_guard_passes};
use crate::similarity::similarity_score;
use replay_common::Schema;
use replay_trace_model::{MatchLevel, MatchScope, MatchType, RunnerUp, Span};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub span: Arc<Span>,
    pub match_level: MatchLevel,
}

const MAX_RUNNER_UPS: usize = 5;
const MAX_SIMILARITY_CANDIDATES: usize = 50;

/// Search priorities 1-8 (trace-local) against a single trace's candidate
/// slice. `candidates` must already be restricted to the request's package
/// name and sorted timestamp-ascending then by span id (as `SpanIndex`
/// produces). `is_used`, `reduced_value_hash_of` and `reduced_schema_hash_of`
/// are supplied by the caller so this crate stays free of the usage ledger
/// and the schema reducer.
pub fn find_best_match_in_trace<IsUsed, ReducedValueHash, ReducedSchemaHash>(
    request: &MatchRequest,
    candidates: &[Arc<Span>],
    is_used: IsUsed,
    reduced_value_hash_of: ReducedValueHash,
    reduced_schema_hash_of: ReducedSchemaHash,
) -> Option<MatchOutcome>
where
    IsUsed: Fn(&str) -> bool,
    ReducedValueHash: Fn(&Span) -> Option<String>,
    ReducedSchemaHash: Fn(&Span) -> Option<String>,
{
    if let Some(outcome) = by_value_hash(
        candidates,
        &request.input_value_hash,
        MatchType::ExactValueHash,
        MatchScope::TraceLocal,
        &is_used,
    ) {
        return Some(outcome);
    }

    if let Some(reduced) = reduced_value_hash_of_request(request, &reduced_value_hash_of) {
        if let Some(outcome) = by_hash(candidates, &reduced, &reduced_value_hash_of, MatchType::ReducedValueHash, MatchScope::TraceLocal, &is_used) {
            return Some(outcome);
        }
    }

    if let Some(outcome) = by_schema_hash(
        request,
        candidates,
        &request.input_schema_hash,
        |s| s.input_schema_hash.clone(),
        MatchType::SchemaHash,
        MatchScope::TraceLocal,
        &is_used,
    ) {
        return Some(outcome);
    }

    if let Some(reduced_schema_hash) = request.input_reduced_schema_hash.clone() {
        if let Some(outcome) = by_schema_hash(
            request,
            candidates,
            &reduced_schema_hash,
            |s| reduced_schema_hash_of(s).unwrap_or_default(),
            MatchType::ReducedSchemaHash,
            MatchScope::TraceLocal,
            &is_used,
        ) {
            return Some(outcome);
        }
    }

    None
}

fn reduced_value_hash_of_request<ReducedValueHash>(request: &MatchRequest, reduced_value_hash_of: &ReducedValueHash) -> Option<String>
where
    ReducedValueHash: Fn(&Span) -> Option<String>,
{
    reduced_value_hash_of(&synthetic_span(request))
}

fn synthetic_span(request: &MatchRequest) -> Span {
    Span {
        trace_id: String::new(),
        span_id: String::new(),
        package_name: request.package_name.clone(),
        submodule_name: None,
        kind: replay_trace_model::SpanKind::Client,
        is_root_span: false,
        is_pre_app_start: false,
        timestamp: chrono::Utc::now(),
        duration_ms: None,
        input_value: request.input_value.clone(),
        input_schema: request.input_schema.clone(),
        input_value_hash: request.input_value_hash.clone(),
        input_schema_hash: request.input_schema_hash.clone(),
        output_value: replay_common::Value::Null,
        output_schema: Schema::default(),
        status: None,
        metadata: Default::default(),
        environment: None,
    }
}

/// Suite-wide fallback (priorities 10-11): value-hash tiers only, never
/// schema-hash tiers, tried only after the trace-local ladder is exhausted.
pub fn find_best_match_across_traces<IsUsed, ReducedValueHash>(
    request: &MatchRequest,
    suite_candidates: &[Arc<Span>],
    is_used: IsUsed,
    reduced_value_hash_of: ReducedValueHash,
) -> Option<MatchOutcome>
where
    IsUsed: Fn(&str) -> bool,
    ReducedValueHash: Fn(&Span) -> Option<String>,
{
    if let Some(outcome) = by_value_hash(
        suite_candidates,
        &request.input_value_hash,
        MatchType::ExactValueHash,
        MatchScope::SuiteGlobal,
        &is_used,
    ) {
        return Some(outcome);
    }

    if let Some(reduced) = reduced_value_hash_of_request(request, &reduced_value_hash_of) {
        return by_hash(suite_candidates, &reduced, &reduced_value_hash_of, MatchType::ReducedValueHash, MatchScope::SuiteGlobal, &is_used);
    }
    None
}

fn by_value_hash<IsUsed>(
    candidates: &[Arc<Span>],
    target_hash: &str,
    match_type: MatchType,
    scope: MatchScope,
    is_used: &IsUsed,
) -> Option<MatchOutcome>
where
    IsUsed: Fn(&str) -> bool,
{
    let matching: Vec<&Arc<Span>> = candidates
        .iter()
        .filter(|s| s.input_value_hash == target_hash)
        .collect();
    pick_preferring_unused(&matching, match_type, scope, is_used)
}

fn by_hash<IsUsed, HashOf>(
    candidates: &[Arc<Span>],
    target_hash: &str,
    hash_of: &HashOf,
    match_type: MatchType,
    scope: MatchScope,
    is_used: &IsUsed,
) -> Option<MatchOutcome>
where
    IsUsed: Fn(&str) -> bool,
    HashOf: Fn(&Span) -> Option<String>,
{
    let matching: Vec<&Arc<Span>> = candidates
        .iter()
        .filter(|s| hash_of(s).as_deref() == Some(target_hash))
        .collect();
    pick_preferring_unused(&matching, match_type, scope, is_used)
}

fn pick_preferring_unused<IsUsed>(
    matching: &[&Arc<Span>],
    match_type: MatchType,
    scope: MatchScope,
    is_used: &IsUsed,
) -> Option<MatchOutcome>
where
    IsUsed: Fn(&str) -> bool,
{
    let mut unused = matching.iter().filter(|s| !is_used(&s.span_id));
    if let Some(span) = unused.next() {
        return Some(MatchOutcome {
            span: (*span).clone(),
            match_level: MatchLevel {
                match_type,
                match_scope: scope,
                description: format!("{match_type:?} match (unused span preferred)"),
                similarity_score: None,
                top_candidates: Vec::new(),
            },
        });
    }
    matching.first().map(|span| MatchOutcome {
        span: (*span).clone(),
        match_level: MatchLevel {
            match_type,
            match_scope: scope,
            description: format!("{match_type:?} match (falling back to a previously-used span)"),
            similarity_score: None,
            top_candidates: Vec::new(),
        },
    })
}

/// Priorities 5-8 (schema hash, exact and reduced): shape-guard-gated,
/// similarity-scored when more than one candidate survives the guard.
fn by_schema_hash<IsUsed, SpanHash>(
    request: &MatchRequest,
    candidates: &[Arc<Span>],
    target_schema_hash: &str,
    span_schema_hash: SpanHash,
    match_type: MatchType,
    scope: MatchScope,
    is_used: &IsUsed,
) -> Option<MatchOutcome>
where
    IsUsed: Fn(&str) -> bool,
    SpanHash: Fn(&Span) -> String,
{
    if target_schema_hash.is_empty() {
        return None;
    }
    let guarded = is_http_like(&request.package_name);
    let matching: Vec<&Arc<Span>> = candidates
        .iter()
        .filter(|s| span_schema_hash(s) == target_schema_hash)
        .filter(|s| !guarded || shape_guard_passes(&request.input_value, &s.input_value))
        .collect();
    if matching.is_empty() {
        return None;
    }

    let unused: Vec<&Arc<Span>> = matching.iter().filter(|s| !is_used(&s.span_id)).copied().collect();
    let (pool, description_suffix) = if unused.is_empty() {
        (matching, "falling back to a previously-used span")
    } else {
        (unused, "unused span preferred")
    };

    best_by_similarity(request, &pool, match_type, scope, description_suffix)
}

fn best_by_similarity(
    request: &MatchRequest,
    pool: &[&Arc<Span>],
    match_type: MatchType,
    scope: MatchScope,
    description_suffix: &str,
) -> Option<MatchOutcome> {
    let capped: Vec<&Arc<Span>> = pool.iter().take(MAX_SIMILARITY_CANDIDATES).copied().collect();

    let mut scored: Vec<(f64, &Arc<Span>)> = capped
        .iter()
        .map(|span| (similarity_score(&request.input_value, &span.input_value), *span))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let (best_score, best_span) = scored.first().copied()?;
    let top_candidates = scored
        .iter()
        .skip(1)
        .take(MAX_RUNNER_UPS)
        .map(|(score, span)| RunnerUp {
            span_id: span.span_id.clone(),
            score: *score,
        })
        .collect();

    Some(MatchOutcome {
        span: best_span.clone(),
        match_level: MatchLevel {
            match_type,
            match_scope: scope,
            description: format!("{match_type:?} match ({description_suffix}), similarity {best_score:.3}"),
            similarity_score: Some(best_score),
            top_candidates,
        },
    })
}
