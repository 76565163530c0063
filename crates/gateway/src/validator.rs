//! C4 — request validator.
//!
//! Grounded on `api/src/models.rs`'s `ChatCompletionRequest::validate()` (empty-field checks
//! returning a `Result<(), String>`); the error text here is SPEC_FULL-exact rather than the
//! teacher's, and the type is a proper `thiserror` enum per this crate's error-handling
//! convention (§4.9/§7) rather than a bare `String`.
//!
//! Split into two functions rather than the single `validate_and_rewrite` the design ledger
//! sketches, because the pipeline (§2's data flow) runs the multimodal rewrite (C3) and the
//! vendor selection (C5) *between* parsing the caller's body and knowing the actual model to
//! substitute: [`validate`] runs once, up front; [`substitute_model`] runs immediately before
//! each upstream call (initial attempt and the one allowed fallback), since only at that point is
//! `actual_model` known.

use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing 'messages' field")]
    MissingMessages,
}

/// Default caller model name when the request omits `model` or it isn't a string (§4.4, and
/// invariant 2 in §8).
pub const DEFAULT_CALLER_MODEL: &str = "any-model";

/// Parses `body` as a JSON object, requires `messages` to be present, and extracts the caller's
/// original `model` (defaulting per [`DEFAULT_CALLER_MODEL`]). Returns the body unmodified —
/// `model` substitution happens later, via [`substitute_model`].
pub fn validate(body: Value) -> Result<(Value, String), ValidationError> {
    let has_messages = body.get("messages").is_some();
    if !has_messages {
        return Err(ValidationError::MissingMessages);
    }
    let original_model = body
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_CALLER_MODEL.to_string());
    Ok((body, original_model))
}

/// Overwrites the top-level `model` field with the router-selected actual model.
pub fn substitute_model(mut body: Value, actual_model: &str) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), Value::String(actual_model.to_string()));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_messages_is_rejected() {
        let body = json!({ "model": "gpt-4" });
        assert_eq!(validate(body), Err(ValidationError::MissingMessages));
    }

    #[test]
    fn model_defaults_to_any_model_when_absent() {
        let body = json!({ "messages": [] });
        let (_, original_model) = validate(body).unwrap();
        assert_eq!(original_model, "any-model");
    }

    #[test]
    fn model_defaults_to_any_model_when_non_string() {
        let body = json!({ "messages": [], "model": 42 });
        let (_, original_model) = validate(body).unwrap();
        assert_eq!(original_model, "any-model");
    }

    #[test]
    fn model_is_preserved_when_present() {
        let body = json!({ "messages": [], "model": "my-model" });
        let (_, original_model) = validate(body).unwrap();
        assert_eq!(original_model, "my-model");
    }

    #[test]
    fn substitute_model_overwrites_model_field() {
        let body = json!({ "messages": [], "model": "my-model" });
        let rewritten = substitute_model(body, "gpt-4");
        assert_eq!(rewritten["model"], "gpt-4");
    }

    #[test]
    fn round_trip_absent_model_substitutes_actual_model() {
        let body = json!({ "messages": [{"role": "user", "content": "hi"}] });
        let (body, original_model) = validate(body).unwrap();
        assert_eq!(original_model, "any-model");
        let rewritten = substitute_model(body, "gpt-4");
        assert_eq!(rewritten["model"], "gpt-4");
    }
}
