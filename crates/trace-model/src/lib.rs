//! Span, trace and result data model.

pub mod environment;
pub mod events;
pub mod index;
pub mod ledger;
pub mod result;
pub mod span;

pub use environment::EnvironmentGroup;
pub use events::{MatchEvent, MatchLevel, MatchScope, MatchType, MockNotFoundEvent, RunnerUp};
pub use index::SpanIndex;
pub use ledger::SpanUsageLedger;
pub use result::{classify_failure, Deviation, SpanResult, TestFailureReason, TestResult, TraceTestReport};
pub use span::{Span, SpanKind, Test, Trace, TraceTest};
