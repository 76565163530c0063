//! C1 — ID mint.
//!
//! Every generator draws from a CSPRNG and hex-encodes, matching the teacher's `format!("call_{}",
//! Uuid::new_v4())` fixed-prefix-plus-opaque-token idiom (`inference_providers/src/external/
//! gemini/converter.rs`), but swaps UUID-with-dashes for raw CSPRNG bytes hex-encoded via `hex`
//! since the spec's ID lengths are bit-exact and a UUID's dashes don't fit that shape.
//!
//! On CSPRNG failure (`OsRng::try_fill_bytes` erroring — effectively never on a real OS, but the
//! spec requires a documented fallback) we fall back to a monotonic timestamp-plus-counter
//! encoding. This is best-effort: it is not cryptographically unpredictable, only collision-free
//! for the lifetime of the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::TryRngCore;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

fn random_hex(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => hex::encode(buf),
        Err(e) => {
            tracing::error!(error = %e, "CSPRNG unavailable, falling back to timestamp-based id");
            fallback_hex(n_bytes)
        }
    }
}

/// Best-effort fallback: nanosecond timestamp XORed with a process-local monotonic counter,
/// hex-encoded and padded/truncated to the requested byte length so prefixes stay bit-exact.
fn fallback_hex(n_bytes: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let raw = format!("{nanos:032x}{counter:016x}");
    let want = n_bytes * 2;
    if raw.len() >= want {
        raw[..want].to_string()
    } else {
        format!("{raw:0>width$}", width = want)
    }
}

/// `chatcmpl-` + 20 lowercase hex chars (10 random bytes).
pub fn chat_completion_id() -> String {
    format!("chatcmpl-{}", random_hex(10))
}

/// `call_` + 32 lowercase hex chars (16 random bytes).
pub fn tool_call_id() -> String {
    format!("call_{}", random_hex(16))
}

/// `fp_` + 18 lowercase hex chars (9 random bytes).
pub fn system_fingerprint() -> String {
    format!("fp_{}", random_hex(9))
}

/// `req_` + 32 lowercase hex chars (16 random bytes).
pub fn request_id() -> String {
    format!("req_{}", random_hex(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_hex_lowercase(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn chat_completion_id_has_documented_shape() {
        let id = chat_completion_id();
        assert_eq!(id.len(), 29);
        assert!(id.starts_with("chatcmpl-"));
        assert!(all_hex_lowercase(&id[9..]));
    }

    #[test]
    fn tool_call_id_has_documented_shape() {
        let id = tool_call_id();
        assert_eq!(id.len(), 37);
        assert!(id.starts_with("call_"));
        assert!(all_hex_lowercase(&id[5..]));
    }

    #[test]
    fn system_fingerprint_has_documented_shape() {
        let id = system_fingerprint();
        assert_eq!(id.len(), 21);
        assert!(id.starts_with("fp_"));
        assert!(all_hex_lowercase(&id[3..]));
    }

    #[test]
    fn request_id_has_documented_shape() {
        let id = request_id();
        assert_eq!(id.len(), 36);
        assert!(id.starts_with("req_"));
        assert!(all_hex_lowercase(&id[4..]));
    }

    #[test]
    fn ids_are_not_repeated_across_many_draws() {
        let ids: std::collections::HashSet<_> = (0..10_000).map(|_| chat_completion_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn fallback_hex_respects_requested_length() {
        assert_eq!(fallback_hex(10).len(), 20);
        assert_eq!(fallback_hex(16).len(), 32);
        assert_eq!(fallback_hex(9).len(), 18);
    }
}
