//! C7 — unary response normalizer, plus the §4.7.1 tool-call policy shared with C8's per-frame
//! rewrite.
//!
//! Grounded on `inference_providers/src/external/gemini/converter.rs`'s field-by-field
//! `serde_json::Value` patching style (read a field, default/inject if absent, write back) —
//! this module keeps that Value-level approach rather than a typed response struct because the
//! normalizer must pass through every field it doesn't know about unchanged.

use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

use crate::id;

fn brace_split_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\}\s*\{").unwrap())
}

fn bracket_split_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\]\s*\[").unwrap())
}

/// Normalizes one complete, decompressed upstream JSON body. `vendor` informs the tool-call ID
/// policy; `caller_model` is written back into `model` (identity rewriting).
///
/// Step 2 of §4.7: on a parse error the original bytes pass through unchanged, so this takes
/// already-parsed JSON and returns it unmodified when it isn't an object after the singleton-array
/// unwrap.
pub fn normalize(body: Value, vendor: &str, caller_model: &str) -> Value {
    let body = unwrap_singleton_array(body);
    let Value::Object(mut obj) = body else {
        return body;
    };

    inject_id(&mut obj);
    inject_compat_fields(&mut obj);
    rewrite_identity(&mut obj, caller_model);

    if obj.contains_key("error") {
        normalize_error(&mut obj);
    }

    process_choices(&mut obj, vendor);
    normalize_usage(&mut obj);

    Value::Object(obj)
}

fn unwrap_singleton_array(body: Value) -> Value {
    match body {
        Value::Array(mut arr) if arr.len() == 1 => arr.remove(0),
        other => other,
    }
}

fn inject_id(obj: &mut serde_json::Map<String, Value>) {
    let missing = match obj.get("id") {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    };
    if missing {
        obj.insert("id".to_string(), Value::String(id::chat_completion_id()));
    }
}

fn inject_compat_fields(obj: &mut serde_json::Map<String, Value>) {
    if !obj.contains_key("service_tier") {
        obj.insert("service_tier".to_string(), Value::String("default".to_string()));
    }
    let needs_fingerprint = match obj.get("system_fingerprint") {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => true,
    };
    if needs_fingerprint {
        obj.insert(
            "system_fingerprint".to_string(),
            Value::String(id::system_fingerprint()),
        );
    }
}

fn rewrite_identity(obj: &mut serde_json::Map<String, Value>, caller_model: &str) {
    if !caller_model.is_empty() {
        obj.insert("model".to_string(), Value::String(caller_model.to_string()));
    }
}

fn normalize_error(obj: &mut serde_json::Map<String, Value>) {
    let Some(Value::Object(error)) = obj.get_mut("error") else {
        return;
    };
    let code = error.get("code").and_then(Value::as_str).map(str::to_string);
    let normalized_type = match code {
        Some(code) => format!("{code}_error"),
        None => "api_error".to_string(),
    };
    error.insert("type".to_string(), Value::String(normalized_type));
    if !error.contains_key("param") {
        error.insert("param".to_string(), Value::Null);
    }
}

fn process_choices(obj: &mut serde_json::Map<String, Value>, vendor: &str) {
    match obj.get_mut("choices") {
        Some(Value::Array(choices)) if !choices.is_empty() => {
            for choice in choices.iter_mut() {
                process_choice(choice, vendor);
            }
        }
        Some(Value::Array(_)) => {}
        _ => {
            let completion_tokens_zero = obj
                .get("usage")
                .and_then(|u| u.get("completion_tokens"))
                .and_then(Value::as_u64)
                .map(|n| n == 0)
                .unwrap_or(false);
            if completion_tokens_zero {
                obj.insert(
                    "choices".to_string(),
                    json!([{
                        "index": 0,
                        "message": {
                            "role": "assistant",
                            "content": "",
                            "annotations": [],
                            "refusal": null
                        },
                        "finish_reason": "stop"
                    }]),
                );
            }
        }
    }
}

fn process_choice(choice: &mut Value, vendor: &str) {
    let Value::Object(choice) = choice else {
        return;
    };
    if !choice.contains_key("logprobs") {
        choice.insert("logprobs".to_string(), Value::Null);
    }
    if let Some(Value::Object(message)) = choice.get_mut("message") {
        ensure_message_compat_fields(message);
        if let Some(tool_calls) = message.get("tool_calls").cloned() {
            if let Value::Array(calls) = tool_calls {
                let rewritten = apply_tool_call_policy(calls, vendor);
                message.insert("tool_calls".to_string(), Value::Array(rewritten));
            }
        }
    }
}

fn ensure_message_compat_fields(message: &mut serde_json::Map<String, Value>) {
    if !message.contains_key("annotations") {
        message.insert("annotations".to_string(), Value::Array(vec![]));
    }
    if !message.contains_key("refusal") {
        message.insert("refusal".to_string(), Value::Null);
    }
}

fn normalize_usage(obj: &mut serde_json::Map<String, Value>) {
    let mut usage = match obj.remove("usage") {
        Some(Value::Object(usage)) => usage,
        _ => serde_json::Map::new(),
    };

    for field in ["prompt_tokens", "completion_tokens", "total_tokens"] {
        if !usage.get(field).and_then(Value::as_u64).is_some() {
            usage.insert(field.to_string(), json!(0));
        }
    }
    usage
        .entry("prompt_tokens_details")
        .or_insert_with(|| json!({ "cached_tokens": 0, "audio_tokens": 0 }));
    usage.entry("completion_tokens_details").or_insert_with(|| {
        json!({
            "reasoning_tokens": 0,
            "audio_tokens": 0,
            "accepted_prediction_tokens": 0,
            "rejected_prediction_tokens": 0
        })
    });

    obj.insert("usage".to_string(), Value::Object(usage));
}

/// §4.7.1. `vendor` decides the ID-overwrite rule; the argument-repair split is vendor-agnostic.
pub fn apply_tool_call_policy(calls: Vec<Value>, vendor: &str) -> Vec<Value> {
    let mut rewritten = Vec::with_capacity(calls.len());
    for call in calls {
        let pieces = repair_arguments(&call);
        match pieces {
            Some(pieces) if pieces.len() >= 2 => {
                for piece in pieces {
                    rewritten.push(build_tool_call(&call, piece, vendor, true));
                }
            }
            _ => {
                rewritten.push(build_tool_call(&call, original_arguments(&call), vendor, false));
            }
        }
    }
    rewritten
}

fn original_arguments(call: &Value) -> String {
    call.get("function")
        .and_then(|f| f.get("arguments"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn build_tool_call(original: &Value, arguments: String, vendor: &str, force_fresh_id: bool) -> Value {
    let mut call = original.clone();
    if let Some(function) = call.get_mut("function").and_then(Value::as_object_mut) {
        function.insert("arguments".to_string(), Value::String(arguments));
    }
    let needs_fresh_id = force_fresh_id
        || vendor == "gemini"
        || match call.get("id") {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
    if needs_fresh_id {
        if let Some(obj) = call.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id::tool_call_id()));
        }
    }
    call
}

/// Returns `Some(pieces)` only when a repair strategy produced at least one valid JSON piece;
/// the caller only accepts the split when `pieces.len() >= 2`.
fn repair_arguments(call: &Value) -> Option<Vec<String>> {
    let arguments = original_arguments(call);
    if arguments.is_empty() {
        return None;
    }

    if brace_split_pattern().is_match(&arguments) {
        if let Some(pieces) = split_and_reclose(&arguments, brace_split_pattern(), '{', '}') {
            if pieces.len() >= 2 {
                return Some(pieces);
            }
        }
    }

    if bracket_split_pattern().is_match(&arguments) {
        if let Some(pieces) = split_and_reclose(&arguments, bracket_split_pattern(), '[', ']') {
            if pieces.len() >= 2 {
                return Some(pieces);
            }
        }
    }

    sequential_decode(&arguments)
}

fn split_and_reclose(input: &str, pattern: &Regex, open: char, close: char) -> Option<Vec<String>> {
    let segments: Vec<&str> = pattern.split(input).collect();
    if segments.len() < 2 {
        return None;
    }

    let last = segments.len() - 1;
    let mut valid = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        let mut piece = segment.to_string();
        if i > 0 {
            piece.insert(0, open);
        }
        if i < last {
            piece.push(close);
        }
        if serde_json::from_str::<Value>(&piece).is_ok() {
            valid.push(piece);
        }
    }
    Some(valid)
}

fn sequential_decode(input: &str) -> Option<Vec<String>> {
    let mut deserializer = serde_json::Deserializer::from_str(input).into_iter::<Value>();
    let mut pieces = Vec::new();
    for value in &mut deserializer {
        match value {
            Ok(value) => pieces.push(value.to_string()),
            Err(_) => return None,
        }
    }
    if pieces.len() >= 2 {
        Some(pieces)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_id_when_missing() {
        let body = json!({ "object": "chat.completion" });
        let result = normalize(body, "openai", "my-model");
        let id = result["id"].as_str().unwrap();
        assert!(id.starts_with("chatcmpl-"));
    }

    #[test]
    fn rewrites_model_to_caller_model() {
        let body = json!({ "id": "x", "model": "gpt-4" });
        let result = normalize(body, "openai", "my-model");
        assert_eq!(result["model"], "my-model");
    }

    #[test]
    fn skips_model_rewrite_when_caller_model_is_empty() {
        let body = json!({ "id": "x", "model": "gpt-4" });
        let result = normalize(body, "openai", "");
        assert_eq!(result["model"], "gpt-4");
    }

    #[test]
    fn injects_service_tier_and_fingerprint() {
        let body = json!({ "id": "x" });
        let result = normalize(body, "openai", "m");
        assert_eq!(result["service_tier"], "default");
        assert!(result["system_fingerprint"].as_str().unwrap().starts_with("fp_"));
    }

    #[test]
    fn unwraps_singleton_array_bodies() {
        let body = json!([{ "id": "x" }]);
        let result = normalize(body, "openai", "m");
        assert_eq!(result["id"], "x");
    }

    #[test]
    fn normalizes_error_type_from_code() {
        let body = json!({ "error": { "code": "rate_limit", "message": "slow down" } });
        let result = normalize(body, "openai", "m");
        assert_eq!(result["error"]["type"], "rate_limit_error");
        assert_eq!(result["error"]["param"], Value::Null);
    }

    #[test]
    fn normalizes_error_type_to_api_error_when_code_absent() {
        let body = json!({ "error": { "message": "oops" } });
        let result = normalize(body, "openai", "m");
        assert_eq!(result["error"]["type"], "api_error");
    }

    #[test]
    fn processes_choice_compat_fields() {
        let body = json!({
            "id": "x",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hi" } }]
        });
        let result = normalize(body, "openai", "m");
        let choice = &result["choices"][0];
        assert_eq!(choice["logprobs"], Value::Null);
        assert_eq!(choice["message"]["annotations"], json!([]));
        assert_eq!(choice["message"]["refusal"], Value::Null);
    }

    #[test]
    fn synthesizes_stub_choice_when_no_completion_tokens() {
        let body = json!({ "id": "x", "usage": { "completion_tokens": 0 } });
        let result = normalize(body, "openai", "m");
        let choices = result["choices"].as_array().unwrap();
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0]["finish_reason"], "stop");
        assert_eq!(choices[0]["message"]["content"], "");
    }

    #[test]
    fn leaves_choices_absent_when_completion_tokens_nonzero() {
        let body = json!({ "id": "x", "usage": { "completion_tokens": 3 } });
        let result = normalize(body, "openai", "m");
        assert!(result.get("choices").is_none());
    }

    #[test]
    fn normalizes_usage_defaults_and_detail_objects() {
        let body = json!({ "id": "x" });
        let result = normalize(body, "openai", "m");
        assert_eq!(result["usage"]["prompt_tokens"], 0);
        assert_eq!(result["usage"]["prompt_tokens_details"]["cached_tokens"], 0);
        assert_eq!(result["usage"]["completion_tokens_details"]["reasoning_tokens"], 0);
    }

    #[test]
    fn normalizer_is_idempotent() {
        let body = json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hi" } }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2 }
        });
        let once = normalize(body, "openai", "m");
        let twice = normalize(once.clone(), "openai", "m");
        assert_eq!(once["usage"], twice["usage"]);
        assert_eq!(once["choices"], twice["choices"]);
        assert_eq!(once["service_tier"], twice["service_tier"]);
    }

    #[test]
    fn tool_call_split_on_adjacent_objects() {
        let calls = vec![json!({
            "id": "orig",
            "type": "function",
            "function": { "name": "f", "arguments": "{\"a\":1}{\"b\":2}" }
        })];
        let rewritten = apply_tool_call_policy(calls, "openai");
        assert_eq!(rewritten.len(), 2);
        assert_eq!(rewritten[0]["function"]["arguments"], "{\"a\":1}");
        assert_eq!(rewritten[1]["function"]["arguments"], "{\"b\":2}");
        assert_ne!(rewritten[0]["id"], rewritten[1]["id"]);
        assert!(rewritten[0]["id"].as_str().unwrap().starts_with("call_"));
    }

    #[test]
    fn tool_call_split_on_adjacent_arrays() {
        let calls = vec![json!({
            "id": "orig",
            "function": { "name": "f", "arguments": "[1,2][3,4]" }
        })];
        let rewritten = apply_tool_call_policy(calls, "openai");
        assert_eq!(rewritten.len(), 2);
        assert_eq!(rewritten[0]["function"]["arguments"], "[1,2]");
        assert_eq!(rewritten[1]["function"]["arguments"], "[3,4]");
    }

    #[test]
    fn tool_call_unchanged_when_single_valid_json_value() {
        let calls = vec![json!({
            "id": "orig",
            "function": { "name": "f", "arguments": "{\"a\":1}" }
        })];
        let rewritten = apply_tool_call_policy(calls, "openai");
        assert_eq!(rewritten.len(), 1);
        assert_eq!(rewritten[0]["function"]["arguments"], "{\"a\":1}");
        assert_eq!(rewritten[0]["id"], "orig");
    }

    #[test]
    fn gemini_tool_call_id_is_always_overwritten() {
        let calls = vec![json!({
            "id": "existing-id",
            "function": { "name": "f", "arguments": "{\"a\":1}" }
        })];
        let rewritten = apply_tool_call_policy(calls, "gemini");
        assert_ne!(rewritten[0]["id"], "existing-id");
        assert!(rewritten[0]["id"].as_str().unwrap().starts_with("call_"));
    }

    #[test]
    fn non_gemini_tool_call_id_preserved_when_present() {
        let calls = vec![json!({
            "id": "existing-id",
            "function": { "name": "f", "arguments": "{\"a\":1}" }
        })];
        let rewritten = apply_tool_call_policy(calls, "openai");
        assert_eq!(rewritten[0]["id"], "existing-id");
    }

    #[test]
    fn non_gemini_tool_call_id_minted_when_absent() {
        let calls = vec![json!({
            "function": { "name": "f", "arguments": "{\"a\":1}" }
        })];
        let rewritten = apply_tool_call_policy(calls, "openai");
        assert!(rewritten[0]["id"].as_str().unwrap().starts_with("call_"));
    }
}
