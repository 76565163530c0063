//! C8's mechanical half: turning a byte stream into one `data: ...` frame at a time.
//!
//! Grounded directly on `inference_providers/src/sse_parser.rs`'s `BufferedSSEParser` —
//! the same buffered-line, multi-event-per-packet, partial-line-across-packets handling — but
//! simplified to yield raw frame text rather than a provider-typed `StreamChunk`, since the
//! identity/compatibility rewrite (done one layer up, in `gateway::stream`) needs the frame as
//! JSON `Value`, not a fixed Rust type.

use std::collections::VecDeque;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use flate2::read::GzDecoder;
use futures_core::Stream;

use crate::client::UpstreamError;

/// Decompresses a fully-buffered gzip body. Streaming SSE responses are rarely more than a few
/// hundred KiB in practice, so we buffer-then-decompress rather than drive a partial/streaming
/// inflate state machine — the same accumulate-then-`GzDecoder` shape used elsewhere in the
/// surrounding pack for gzip-encoded SSE bodies.
pub fn gunzip_all(bytes: &[u8]) -> Result<Vec<u8>, UpstreamError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Yields one raw SSE frame (e.g. `"data: {...}"` or `"data: [DONE]"`) at a time from an
/// underlying byte stream, buffering across network packet boundaries and blank-line event
/// separators. Comment lines (`: ...`) and blank lines are dropped. Stateless across responses —
/// one `FrameReader` is constructed per request.
pub struct FrameReader<S> {
    inner: S,
    buffer: String,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn drain_complete_frames(&mut self) {
        while let Some(sep) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..sep + 2).collect();
            let frame = raw.trim();
            if frame.is_empty() || frame.starts_with(':') {
                continue;
            }
            self.pending.push_back(frame.to_string());
        }
    }
}

impl<S> Stream for FrameReader<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, UpstreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(frame) = this.pending.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.buffer.push_str(&String::from_utf8_lossy(&bytes));
                this.drain_complete_frames();
                match this.pending.pop_front() {
                    Some(frame) => Poll::Ready(Some(Ok(frame))),
                    None => {
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    }
                }
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(UpstreamError::Transport(e)))),
            Poll::Ready(None) => {
                this.done = true;
                let remainder = this.buffer.trim().to_string();
                if !remainder.is_empty() {
                    this.buffer.clear();
                    return Poll::Ready(Some(Ok(remainder)));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
