//! Feed retrieval and payload decoding
//!
//! A fetcher turns a `SourceConfig` into a `RawPayload`. Network and HTTP
//! failures, and payloads that cannot be decoded at all, are `FeedError`s;
//! the pipeline isolates them to the failing source.

mod fetcher;
mod payload;

pub use fetcher::{FeedFetcher, HttpFetcher, USER_AGENT};
pub use payload::{decode_payload, FeedError, PayloadKind, RawPayload};
