use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use roam_core::gateway::{
    CaptureOutcome, GatewayError, OpenedSession, PaymentGateway, PaymentOutcome, SignatureHeaders,
    WebhookNotice,
};
use roam_shared::Booking;
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Webhook timestamps older than this are replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub return_url: String,
    pub timeout_seconds: u64,
}

/// Stripe Checkout adapter. Auth is a static secret key; webhook
/// authenticity is verified locally against the endpoint secret.
pub struct StripeGateway {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    status: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn verify_signature(&self, body: &[u8], header: &str) -> Result<(), GatewayError> {
        let mut timestamp: Option<i64> = None;
        let mut signature: Option<Vec<u8>> = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = v.parse().ok(),
                Some(("v1", v)) => signature = hex::decode(v).ok(),
                _ => {}
            }
        }
        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(s)) => (t, s),
            _ => return Err(GatewayError::InvalidSignature),
        };

        if (Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(GatewayError::InvalidSignature);
        }

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|_| GatewayError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.verify_slice(&signature)
            .map_err(|_| GatewayError::InvalidSignature)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider_id(&self) -> &str {
        "stripe"
    }

    async fn open_session(&self, booking: &Booking) -> Result<OpenedSession, GatewayError> {
        let name = format!("Vehicle rental {}", booking.id);
        let params = [
            ("mode", "payment".to_string()),
            ("client_reference_id", booking.id.to_string()),
            ("success_url", self.config.return_url.clone()),
            ("cancel_url", self.config.return_url.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                booking.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                booking.total_minor.to_string(),
            ),
            ("line_items[0][price_data][product_data][name]", name),
        ];

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.base_url))
            .bearer_auth(&self.config.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(translate_transport)?;
        let response = check_status(response)?;

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;
        let redirect_url = session
            .url
            .ok_or_else(|| GatewayError::ProviderRejected("session has no redirect url".into()))?;

        Ok(OpenedSession {
            provider_session_id: session.id,
            redirect_url,
        })
    }

    async fn capture_result(
        &self,
        provider_session_id: &str,
    ) -> Result<CaptureOutcome, GatewayError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.config.base_url, provider_session_id
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(translate_transport)?;
        let response = check_status(response)?;

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        let outcome = match (session.payment_status.as_deref(), session.status.as_deref()) {
            (Some("paid"), _) => PaymentOutcome::Captured,
            (_, Some("expired")) => PaymentOutcome::Denied,
            _ => PaymentOutcome::Pending,
        };

        Ok(CaptureOutcome {
            outcome,
            amount_minor: session.amount_total.unwrap_or_default(),
            currency: session.currency.unwrap_or_default().to_uppercase(),
        })
    }

    async fn verify_webhook(
        &self,
        body: &[u8],
        headers: &SignatureHeaders,
    ) -> Result<WebhookNotice, GatewayError> {
        let header = headers
            .get("stripe-signature")
            .ok_or(GatewayError::InvalidSignature)?;
        self.verify_signature(body, header)?;

        let event: WebhookEvent =
            serde_json::from_slice(body).map_err(|_| GatewayError::InvalidSignature)?;

        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => PaymentOutcome::Captured,
            "checkout.session.expired" | "checkout.session.async_payment_failed" => {
                PaymentOutcome::Denied
            }
            other => {
                // Authentic but irrelevant; the processor acks it.
                warn!("Ignoring stripe event type {}", other);
                PaymentOutcome::Pending
            }
        };

        Ok(WebhookNotice {
            provider_session_id: event.data.object.id,
            outcome,
        })
    }
}

pub(crate) fn translate_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::ProviderTimeout(e.to_string())
    } else {
        GatewayError::ProviderUnavailable(e.to_string())
    }
}

pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status.is_server_error() || status.as_u16() == 429 {
        Err(GatewayError::ProviderUnavailable(format!("status {}", status)))
    } else {
        Err(GatewayError::ProviderRejected(format!("status {}", status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> StripeGateway {
        StripeGateway::new(StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            base_url: "https://api.stripe.example".to_string(),
            return_url: "https://roam.example/return".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn test_valid_signature_accepted() {
        let gw = gateway();
        let body = br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_123"}}}"#;
        let t = Utc::now().timestamp();
        let header = format!("t={},v1={}", t, sign("whsec_test", t, body));

        let mut headers = SignatureHeaders::new();
        headers.insert("stripe-signature".to_string(), header);

        let notice = gw.verify_webhook(body, &headers).await.unwrap();
        assert_eq!(notice.provider_session_id, "cs_123");
        assert_eq!(notice.outcome, PaymentOutcome::Captured);
    }

    #[tokio::test]
    async fn test_tampered_body_rejected() {
        let gw = gateway();
        let body = br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_123"}}}"#;
        let t = Utc::now().timestamp();
        let header = format!("t={},v1={}", t, sign("whsec_test", t, body));

        let mut headers = SignatureHeaders::new();
        headers.insert("stripe-signature".to_string(), header);

        let tampered = br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_999"}}}"#;
        let err = gw.verify_webhook(tampered, &headers).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let gw = gateway();
        let body = br#"{"type":"checkout.session.expired","data":{"object":{"id":"cs_123"}}}"#;
        let t = Utc::now().timestamp();
        let header = format!("t={},v1={}", t, sign("whsec_other", t, body));

        let mut headers = SignatureHeaders::new();
        headers.insert("stripe-signature".to_string(), header);

        let err = gw.verify_webhook(body, &headers).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let gw = gateway();
        let body = br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_123"}}}"#;
        let t = Utc::now().timestamp() - SIGNATURE_TOLERANCE_SECS - 10;
        let header = format!("t={},v1={}", t, sign("whsec_test", t, body));

        let mut headers = SignatureHeaders::new();
        headers.insert("stripe-signature".to_string(), header);

        let err = gw.verify_webhook(body, &headers).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let gw = gateway();
        let err = gw
            .verify_webhook(b"{}", &SignatureHeaders::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSignature));
    }
}
