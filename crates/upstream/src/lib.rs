//! Wire-level transport to OpenAI-compatible upstream vendors.
//!
//! This crate owns exactly the parts of the pipeline that talk to a socket: building and sending
//! the outbound `/chat/completions` request (C6), and framing a streamed response body into
//! individual SSE events (C8's mechanical half). It knows nothing about vendor identity rewriting,
//! tool-call policy, or fallback — that lives in `gateway`, one layer up.

pub mod client;
pub mod sse;

pub use client::{UpstreamClient, UpstreamError, UpstreamResponse};
pub use sse::{gunzip_all, FrameReader};
