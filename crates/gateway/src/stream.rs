//! C8 — SSE stream processor.
//!
//! Grounded on `services/src/completions/mod.rs`'s `InterceptStream` (a stateful wrapper around an
//! upstream byte stream, inspecting and forwarding each chunk) combined with `upstream::sse`'s
//! frame reader for the `data: ...\n\n` splitting this module builds on top of.

use serde_json::Value;

use crate::normalize::apply_tool_call_policy;
use crate::types::ConversationIdentity;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Per-conversation state carried across every frame of one streaming response. Stateless across
/// responses — a fresh `StreamRewriter` is built per request via [`StreamRewriter::new`].
pub struct StreamRewriter {
    identity: ConversationIdentity,
    is_first_chunk: bool,
}

impl StreamRewriter {
    pub fn new(identity: ConversationIdentity) -> Self {
        Self {
            identity,
            is_first_chunk: true,
        }
    }

    /// Rewrites one already-unwrapped SSE frame (the `data: ...` prefix stripped by the caller
    /// having come from [`upstream::sse::FrameReader`]) and re-wraps it as `data: <json>\n\n`.
    /// Frames that don't start with `data: ` or that fail to parse as JSON are returned unchanged.
    pub fn process_frame(&mut self, raw_frame: &str) -> String {
        let trimmed = raw_frame.trim();
        if trimmed == "data: [DONE]" || trimmed == "[DONE]" {
            return DONE_FRAME.to_string();
        }

        let Some(payload) = trimmed.strip_prefix("data:").map(str::trim) else {
            return format!("{raw_frame}\n\n");
        };

        let Ok(mut value) = serde_json::from_str::<Value>(payload) else {
            return format!("{raw_frame}\n\n");
        };

        self.rewrite_value(&mut value);

        match serde_json::to_string(&value) {
            Ok(json) => format!("data: {json}\n\n"),
            Err(_) => format!("{raw_frame}\n\n"),
        }
    }

    fn rewrite_value(&mut self, value: &mut Value) {
        let Value::Object(obj) = value else {
            return;
        };

        obj.insert(
            "id".to_string(),
            Value::String(self.identity.chat_completion_id.clone()),
        );
        obj.insert("created".to_string(), Value::from(self.identity.created_timestamp));
        obj.insert(
            "system_fingerprint".to_string(),
            Value::String(self.identity.system_fingerprint.clone()),
        );
        if !self.identity.caller_model.is_empty() {
            obj.insert(
                "model".to_string(),
                Value::String(self.identity.caller_model.clone()),
            );
        }
        if !obj.contains_key("service_tier") {
            obj.insert("service_tier".to_string(), Value::String("default".to_string()));
        }

        let mut saw_role_in_first_choice = false;
        if let Some(Value::Array(choices)) = obj.get_mut("choices") {
            for (index, choice) in choices.iter_mut().enumerate() {
                let has_role = self.rewrite_choice(choice);
                if index == 0 {
                    saw_role_in_first_choice = has_role;
                }
            }
        }

        if self.is_first_chunk && saw_role_in_first_choice && !obj.contains_key("usage") {
            obj.insert(
                "usage".to_string(),
                serde_json::json!({
                    "prompt_tokens": 0,
                    "completion_tokens": 0,
                    "total_tokens": 0,
                    "prompt_tokens_details": { "cached_tokens": 0, "audio_tokens": 0 },
                    "completion_tokens_details": {
                        "reasoning_tokens": 0,
                        "audio_tokens": 0,
                        "accepted_prediction_tokens": 0,
                        "rejected_prediction_tokens": 0
                    }
                }),
            );
        }
        if obj.get("choices").and_then(Value::as_array).is_some_and(|c| !c.is_empty()) {
            self.is_first_chunk = false;
        }
    }

    /// Returns whether this choice's delta (or message, for the first-frame alternate shape)
    /// carried a `role` field, which gates the first-chunk zeroed-usage injection.
    fn rewrite_choice(&self, choice: &mut Value) -> bool {
        let Value::Object(choice) = choice else {
            return false;
        };
        if !choice.contains_key("logprobs") {
            choice.insert("logprobs".to_string(), Value::Null);
        }

        let body_key = if choice.contains_key("delta") {
            "delta"
        } else if choice.contains_key("message") {
            "message"
        } else {
            return false;
        };

        let mut saw_role = false;
        if let Some(Value::Object(body)) = choice.get_mut(body_key) {
            saw_role = body.contains_key("role");
            if !body.contains_key("annotations") {
                body.insert("annotations".to_string(), Value::Array(vec![]));
            }
            if !body.contains_key("refusal") {
                body.insert("refusal".to_string(), Value::Null);
            }
            if let Some(Value::Array(tool_calls)) = body.get("tool_calls").cloned() {
                let rewritten = apply_tool_call_policy(tool_calls, &self.identity.vendor);
                body.insert("tool_calls".to_string(), Value::Array(rewritten));
            }
        }
        saw_role
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ConversationIdentity {
        ConversationIdentity {
            chat_completion_id: "chatcmpl-fixed".to_string(),
            created_timestamp: 1234,
            system_fingerprint: "fp_fixed".to_string(),
            vendor: "openai".to_string(),
            caller_model: "my-model".to_string(),
        }
    }

    #[test]
    fn passes_through_done_marker_and_terminates() {
        let mut rewriter = StreamRewriter::new(identity());
        assert_eq!(rewriter.process_frame("data: [DONE]"), DONE_FRAME);
    }

    #[test]
    fn passes_through_non_data_frames_unchanged() {
        let mut rewriter = StreamRewriter::new(identity());
        assert_eq!(rewriter.process_frame(": comment"), ": comment\n\n");
    }

    #[test]
    fn rewrites_identity_fields_on_every_frame() {
        let mut rewriter = StreamRewriter::new(identity());
        let frame = rewriter.process_frame(
            "data: {\"id\":\"up-1\",\"created\":1,\"model\":\"gpt-4\",\"choices\":[]}",
        );
        assert!(frame.contains("\"id\":\"chatcmpl-fixed\""));
        assert!(frame.contains("\"created\":1234"));
        assert!(frame.contains("\"model\":\"my-model\""));
        assert!(frame.contains("\"system_fingerprint\":\"fp_fixed\""));
    }

    #[test]
    fn multiple_frames_share_one_conversation_identity() {
        let mut rewriter = StreamRewriter::new(identity());
        let first = rewriter.process_frame("data: {\"id\":\"a\",\"created\":1}");
        let second = rewriter.process_frame("data: {\"id\":\"b\",\"created\":2}");
        assert!(first.contains("\"id\":\"chatcmpl-fixed\""));
        assert!(second.contains("\"id\":\"chatcmpl-fixed\""));
        assert!(first.contains("\"created\":1234"));
        assert!(second.contains("\"created\":1234"));
    }

    #[test]
    fn first_chunk_with_role_injects_zeroed_usage() {
        let mut rewriter = StreamRewriter::new(identity());
        let frame = rewriter.process_frame(
            "data: {\"id\":\"a\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}",
        );
        assert!(frame.contains("\"usage\""));
        assert!(frame.contains("\"prompt_tokens\":0"));
    }

    #[test]
    fn subsequent_chunks_do_not_inject_usage() {
        let mut rewriter = StreamRewriter::new(identity());
        rewriter.process_frame(
            "data: {\"id\":\"a\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}",
        );
        let second = rewriter.process_frame(
            "data: {\"id\":\"b\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}",
        );
        assert!(!second.contains("\"usage\""));
    }

    #[test]
    fn malformed_json_frame_passes_through_unchanged() {
        let mut rewriter = StreamRewriter::new(identity());
        let frame = rewriter.process_frame("data: {not json");
        assert_eq!(frame, "data: {not json\n\n");
    }

    #[test]
    fn delta_tool_calls_are_rewritten_through_shared_policy() {
        let mut rewriter = StreamRewriter::new(identity());
        let frame = rewriter.process_frame(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"id\":\"\",\"function\":{\"name\":\"f\",\"arguments\":\"{}\"}}]}}]}",
        );
        assert!(frame.contains("\"call_"));
    }
}
