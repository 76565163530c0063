//! Shared data model (§3 of the design document): the request-scoped and process-lifetime types
//! every component in this crate passes around.

pub use config::{Credential, VendorModel};

/// `{vendor, actual_model, credential}`, produced per request by the selector (C5).
///
/// Invariant: `credential.platform == vendor`, and some loaded `VendorModel` shares `vendor` and
/// `actual_model` — the selector can only construct one by drawing from the combination set, so
/// the invariant holds by construction.
#[derive(Debug, Clone)]
pub struct VendorSelection {
    pub vendor: String,
    pub actual_model: String,
    pub credential: Credential,
}

/// Minted once at the start of a streaming response and attached to every chunk so the caller
/// sees one stable identity across the whole stream (invariant 3 in §8).
#[derive(Debug, Clone)]
pub struct ConversationIdentity {
    pub chat_completion_id: String,
    pub created_timestamp: i64,
    pub system_fingerprint: String,
    pub vendor: String,
    pub caller_model: String,
}

impl ConversationIdentity {
    pub fn new(vendor: String, caller_model: String) -> Self {
        Self {
            chat_completion_id: crate::id::chat_completion_id(),
            created_timestamp: chrono::Utc::now().timestamp(),
            system_fingerprint: crate::id::system_fingerprint(),
            vendor,
            caller_model,
        }
    }
}
