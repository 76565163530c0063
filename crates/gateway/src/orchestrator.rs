//! C9 — retry/fallback coordinator. Ties the request validator (C4), multimodal rewriter (C3),
//! vendor selector (C5), and upstream client (C6) into the one pipeline the HTTP surface (C12)
//! drives per request, and owns the single allowed Gemini→OpenAI fallback.
//!
//! Grounded on `services/src/completions/mod.rs`'s `CompletionServiceImpl::create_completion`
//! top-level orchestration shape (validate → rewrite → select provider → call → handle failure),
//! adapted from its attestation/usage side-effects (dropped — Non-goal) to this spec's
//! single-retry fallback protocol.

use std::collections::HashMap;
use std::time::Duration;

use config::VendorRegistry;
use serde_json::Value;
use upstream::{UpstreamClient, UpstreamResponse};

use crate::errors::{classify_vendor_error, RouterError};
use crate::selector::{self, filter_to_vendor};
use crate::types::{ConversationIdentity, VendorSelection};
use crate::validator::{self, substitute_model};
use crate::{multimodal, normalize};

/// The result of a successfully routed request, still awaiting C7/C8 + HTTP framing — those are
/// the HTTP surface's (C12) concern since they depend on how the caller's connection is served.
pub enum RouterOutcome {
    Unary {
        body: Value,
        vendor: String,
    },
    Stream {
        identity: ConversationIdentity,
        upstream: UpstreamResponse,
        vendor: String,
    },
}

pub struct Orchestrator {
    media_client: reqwest::Client,
    upstream: UpstreamClient,
    registry: VendorRegistry,
}

impl Orchestrator {
    pub fn new(registry: VendorRegistry, request_timeout: Duration) -> Self {
        Self {
            media_client: reqwest::Client::new(),
            upstream: UpstreamClient::new(request_timeout),
            registry,
        }
    }

    /// Runs the full pipeline once, including the one allowed fallback. `caller_headers` are the
    /// inbound request's headers, forwarded upstream verbatim (minus `Accept-Encoding`, handled by
    /// C6) so callers can pass vendor-specific extensions through the router.
    pub async fn route(
        &self,
        body: Value,
        caller_headers: &reqwest::header::HeaderMap,
    ) -> Result<RouterOutcome, RouterError> {
        let (body, caller_model) = validator::validate(body)?;
        let body = multimodal::rewrite(&self.media_client, body).await;
        let is_streaming = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

        let selection = selector::select(&self.registry.credentials, &self.registry.models)?;
        match self
            .attempt(&body, &selection, &caller_model, is_streaming, caller_headers)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_retriable_validation_error() => {
                self.fallback(&body, &caller_model, is_streaming, caller_headers).await
            }
            Err(err) => Err(err),
        }
    }

    async fn fallback(
        &self,
        body: &Value,
        caller_model: &str,
        is_streaming: bool,
        caller_headers: &reqwest::header::HeaderMap,
    ) -> Result<RouterOutcome, RouterError> {
        let (openai_credentials, openai_models) =
            filter_to_vendor(&self.registry.credentials, &self.registry.models, "openai");
        if openai_credentials.is_empty() || openai_models.is_empty() {
            return Err(RouterError::FallbackUnavailable);
        }
        let selection = selector::select(&openai_credentials, &openai_models)?;
        tracing::info!(
            fallback_vendor = %selection.vendor,
            "retrying request after gemini missing-choices validation failure"
        );
        self.attempt(body, &selection, caller_model, is_streaming, caller_headers)
            .await
    }

    async fn attempt(
        &self,
        body: &Value,
        selection: &VendorSelection,
        caller_model: &str,
        is_streaming: bool,
        caller_headers: &reqwest::header::HeaderMap,
    ) -> Result<RouterOutcome, RouterError> {
        let base_url = self
            .registry
            .base_urls
            .get(&selection.vendor)
            .ok_or_else(|| RouterError::UnknownVendor(selection.vendor.clone()))?;

        let outbound_body = substitute_model(body.clone(), &selection.actual_model);
        let payload = serde_json::to_vec(&outbound_body)
            .map_err(|e| RouterError::Transport(e.to_string()))?;

        let response = self
            .upstream
            .send(base_url, caller_headers, &selection.credential.value, payload)
            .await
            .map_err(|e| RouterError::Transport(e.to_string()))?;

        if !response.is_success() {
            let status = response.status.as_u16();
            let text = response
                .response
                .text()
                .await
                .unwrap_or_else(|_| String::new());
            return Err(classify_vendor_error(&selection.vendor, status, &text));
        }

        if is_streaming {
            let identity = ConversationIdentity::new(selection.vendor.clone(), caller_model.to_string());
            return Ok(RouterOutcome::Stream {
                identity,
                upstream: response,
                vendor: selection.vendor.clone(),
            });
        }

        let gzip_encoded = response.gzip_encoded;
        let raw = response
            .response
            .bytes()
            .await
            .map_err(|e| RouterError::Transport(e.to_string()))?;
        let decompressed = if gzip_encoded {
            upstream::gunzip_all(&raw).map_err(|e| RouterError::Transport(e.to_string()))?
        } else {
            raw.to_vec()
        };

        let parsed: Value = match serde_json::from_slice(&decompressed) {
            Ok(value) => value,
            Err(_) => {
                return Err(RouterError::Transport(
                    "upstream returned a malformed response body".to_string(),
                ))
            }
        };

        require_field(&parsed, "id", &selection.vendor)?;
        require_field(&parsed, "object", &selection.vendor)?;
        if parsed.get("error").is_none() {
            require_field(&parsed, "choices", &selection.vendor)?;
        }

        let normalized = normalize::normalize(parsed, &selection.vendor, caller_model);
        Ok(RouterOutcome::Unary {
            body: normalized,
            vendor: selection.vendor.clone(),
        })
    }
}

/// Checks the field the normalizer relies on being present on a non-error body; missing fields
/// surface as a `VendorValidation` error, which is the only error class the fallback acts on.
fn require_field(parsed: &Value, field: &str, vendor: &str) -> Result<(), RouterError> {
    let present = parsed.get(field).is_some();
    if present {
        Ok(())
    } else {
        Err(RouterError::VendorValidation {
            vendor: vendor.to_string(),
            missing_field: field.to_string(),
        })
    }
}

/// Convenience used by the HTTP surface to describe the caller-headers map it forwards upstream.
pub type CallerHeaders = HashMap<String, String>;
