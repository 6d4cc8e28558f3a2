//! Semantic response comparator (C3) and recorded-body codec (C4).

pub mod body_codec;
pub mod compare;

pub use body_codec::{decode, encode, CodecError, ContentKind};
pub use compare::{compare_response, ActualResponse, ComparisonResult, ExpectedResponse};
