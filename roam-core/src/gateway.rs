use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use roam_shared::Booking;
use serde::{Deserialize, Serialize};

/// Shared error taxonomy all provider adapters translate into.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transient provider-side failure; the caller may retry.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider refused the request; retrying the same request
    /// will not help.
    #[error("payment provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("payment provider timed out: {0}")]
    ProviderTimeout(String),

    /// Webhook payload failed authenticity verification. Never
    /// surfaced to the payer; the callback is dropped.
    #[error("webhook signature invalid")]
    InvalidSignature,
}

/// What a provider reports about a payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Captured,
    Denied,
    /// Still in flight on the provider side.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenedSession {
    pub provider_session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub outcome: PaymentOutcome,
    pub amount_minor: i64,
    pub currency: String,
}

/// A verified, parsed provider callback.
#[derive(Debug, Clone)]
pub struct WebhookNotice {
    pub provider_session_id: String,
    pub outcome: PaymentOutcome,
}

/// Signature material from the inbound callback request, header names
/// lowercased. Kept as a plain map so adapters stay off the HTTP
/// types.
pub type SignatureHeaders = HashMap<String, String>;

/// Normalized interface over heterogeneous payment providers. Each
/// implementation owns its auth-token caching, request signing and
/// error translation. Adapters never decide reservation state; they
/// only report provider outcomes.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Open an external payment session for the booking's total.
    async fn open_session(&self, booking: &Booking) -> Result<OpenedSession, GatewayError>;

    /// Re-query the provider for the session's current result.
    async fn capture_result(
        &self,
        provider_session_id: &str,
    ) -> Result<CaptureOutcome, GatewayError>;

    /// Verify callback authenticity and extract the notice. Must not
    /// mutate any state; verification failures reject the payload.
    async fn verify_webhook(
        &self,
        body: &[u8],
        headers: &SignatureHeaders,
    ) -> Result<WebhookNotice, GatewayError>;
}

/// Provider id -> adapter. Webhook routing and session opening both
/// resolve through here.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self { gateways: HashMap::new() }
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider_id().to_string(), gateway);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.gateways.keys().map(String::as_str).collect()
    }
}
