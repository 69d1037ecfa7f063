use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use roam_core::gateway::{
    CaptureOutcome, GatewayError, OpenedSession, PaymentGateway, PaymentOutcome, SignatureHeaders,
    WebhookNotice,
};
use roam_shared::Booking;
use serde::Deserialize;

/// In-process adapter with scriptable outcomes, for tests and local
/// development. Webhook "signing" is a shared-secret header.
pub struct MockGateway {
    secret: String,
    open_fails: AtomicBool,
    capture_results: Mutex<HashMap<String, PaymentOutcome>>,
}

#[derive(Debug, Deserialize)]
struct MockWebhookBody {
    session_id: String,
    outcome: PaymentOutcome,
}

impl MockGateway {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
            open_fails: AtomicBool::new(false),
            capture_results: Mutex::new(HashMap::new()),
        }
    }

    pub fn session_id_for(booking: &Booking) -> String {
        format!("mock_sess_{}", booking.id.simple())
    }

    pub fn fail_next_open(&self, fail: bool) {
        self.open_fails.store(fail, Ordering::SeqCst);
    }

    pub fn script_capture(&self, provider_session_id: &str, outcome: PaymentOutcome) {
        self.capture_results
            .lock()
            .expect("mock lock")
            .insert(provider_session_id.to_string(), outcome);
    }

    /// A correctly "signed" webhook body for the given session.
    pub fn webhook_payload(session_id: &str, outcome: PaymentOutcome) -> Vec<u8> {
        let outcome = match outcome {
            PaymentOutcome::Captured => "CAPTURED",
            PaymentOutcome::Denied => "DENIED",
            PaymentOutcome::Pending => "PENDING",
        };
        format!(r#"{{"session_id":"{}","outcome":"{}"}}"#, session_id, outcome).into_bytes()
    }

    pub fn signature_headers(&self) -> SignatureHeaders {
        let mut headers = SignatureHeaders::new();
        headers.insert("x-mock-signature".to_string(), self.secret.clone());
        headers
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn open_session(&self, booking: &Booking) -> Result<OpenedSession, GatewayError> {
        if self.open_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::ProviderUnavailable("scripted outage".to_string()));
        }
        let provider_session_id = Self::session_id_for(booking);
        Ok(OpenedSession {
            redirect_url: format!("https://pay.example/mock/{}", provider_session_id),
            provider_session_id,
        })
    }

    async fn capture_result(
        &self,
        provider_session_id: &str,
    ) -> Result<CaptureOutcome, GatewayError> {
        let outcome = self
            .capture_results
            .lock()
            .expect("mock lock")
            .get(provider_session_id)
            .copied()
            .unwrap_or(PaymentOutcome::Pending);
        Ok(CaptureOutcome { outcome, amount_minor: 0, currency: "USD".to_string() })
    }

    async fn verify_webhook(
        &self,
        body: &[u8],
        headers: &SignatureHeaders,
    ) -> Result<WebhookNotice, GatewayError> {
        match headers.get("x-mock-signature") {
            Some(sig) if *sig == self.secret => {}
            _ => return Err(GatewayError::InvalidSignature),
        }
        let parsed: MockWebhookBody =
            serde_json::from_slice(body).map_err(|_| GatewayError::InvalidSignature)?;
        Ok(WebhookNotice {
            provider_session_id: parsed.session_id,
            outcome: parsed.outcome,
        })
    }
}
