use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roam_catalog::pricing::minor_unit_exponent;
use roam_core::gateway::{
    CaptureOutcome, GatewayError, OpenedSession, PaymentGateway, PaymentOutcome, SignatureHeaders,
    WebhookNotice,
};
use roam_shared::Booking;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::stripe::{check_status, translate_transport};

/// Refresh the cached token this long before the provider expires it.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub webhook_id: String,
    pub return_url: String,
    pub timeout_seconds: u64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// PayPal Orders adapter. Auth is an OAuth2 client-credentials bearer
/// token cached until shortly before expiry; webhook authenticity is
/// checked against the provider's remote verification endpoint, with
/// the client's bounded timeout capping the round trip.
pub struct PaypalGateway {
    http: reqwest::Client,
    config: PaypalConfig,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: Option<String>,
    #[serde(default)]
    links: Vec<OrderLink>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: Option<OrderAmount>,
}

#[derive(Debug, Deserialize)]
struct OrderAmount {
    currency_code: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    verification_status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event_type: String,
    resource: WebhookResource,
}

#[derive(Debug, Deserialize)]
struct WebhookResource {
    id: String,
}

impl PaypalGateway {
    pub fn new(config: PaypalConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;
        Ok(Self { http, config, token: RwLock::new(None) })
    }

    async fn bearer(&self) -> Result<String, GatewayError> {
        {
            let cached = self.token.read().await;
            if let Some(t) = cached.as_ref() {
                if t.expires_at > Utc::now() {
                    return Ok(t.token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        // Another caller may have refreshed while we waited.
        if let Some(t) = cached.as_ref() {
            if t.expires_at > Utc::now() {
                return Ok(t.token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(translate_transport)?;
        let response = check_status(response)?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        let expires_at = Utc::now()
            + chrono::Duration::seconds((token.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0));
        let bearer = token.access_token.clone();
        *cached = Some(CachedToken { token: token.access_token, expires_at });
        Ok(bearer)
    }

    #[cfg(test)]
    async fn seed_token(&self, token: &str, expires_at: DateTime<Utc>) {
        *self.token.write().await = Some(CachedToken { token: token.to_string(), expires_at });
    }

    fn major_amount(&self, minor: i64, currency: &str) -> String {
        Decimal::new(minor, minor_unit_exponent(currency)).to_string()
    }

    fn minor_amount(&self, amount: &OrderAmount) -> i64 {
        let exp = minor_unit_exponent(&amount.currency_code);
        Decimal::from_str(&amount.value)
            .ok()
            .and_then(|d| (d * Decimal::from(10_i64.pow(exp))).to_i64())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn provider_id(&self) -> &str {
        "paypal"
    }

    async fn open_session(&self, booking: &Booking) -> Result<OpenedSession, GatewayError> {
        let bearer = self.bearer().await?;
        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": booking.id.to_string(),
                "amount": {
                    "currency_code": booking.currency,
                    "value": self.major_amount(booking.total_minor, &booking.currency),
                }
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.return_url,
            }
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.base_url))
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
            .map_err(translate_transport)?;
        let response = check_status(response)?;
        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        let redirect_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone())
            .ok_or_else(|| GatewayError::ProviderRejected("order has no approval link".into()))?;

        Ok(OpenedSession { provider_session_id: order.id, redirect_url })
    }

    async fn capture_result(
        &self,
        provider_session_id: &str,
    ) -> Result<CaptureOutcome, GatewayError> {
        let bearer = self.bearer().await?;
        let response = self
            .http
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.config.base_url, provider_session_id
            ))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(translate_transport)?;
        let response = check_status(response)?;
        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        let outcome = match order.status.as_deref() {
            Some("COMPLETED") => PaymentOutcome::Captured,
            Some("VOIDED") | Some("DECLINED") => PaymentOutcome::Denied,
            _ => PaymentOutcome::Pending,
        };

        let (amount_minor, currency) = order
            .purchase_units
            .first()
            .and_then(|u| u.amount.as_ref())
            .map(|a| (self.minor_amount(a), a.currency_code.clone()))
            .unwrap_or((0, String::new()));

        Ok(CaptureOutcome { outcome, amount_minor, currency })
    }

    async fn verify_webhook(
        &self,
        body: &[u8],
        headers: &SignatureHeaders,
    ) -> Result<WebhookNotice, GatewayError> {
        let header = |name: &str| {
            headers
                .get(name)
                .cloned()
                .ok_or(GatewayError::InvalidSignature)
        };
        let event_json: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| GatewayError::InvalidSignature)?;

        let verification = serde_json::json!({
            "transmission_id": header("paypal-transmission-id")?,
            "transmission_time": header("paypal-transmission-time")?,
            "cert_url": header("paypal-cert-url")?,
            "auth_algo": header("paypal-auth-algo")?,
            "transmission_sig": header("paypal-transmission-sig")?,
            "webhook_id": self.config.webhook_id,
            "webhook_event": event_json,
        });

        let bearer = self.bearer().await?;
        let response = self
            .http
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.config.base_url
            ))
            .bearer_auth(bearer)
            .json(&verification)
            .send()
            .await
            .map_err(translate_transport)?;
        let response = check_status(response)?;
        let verdict: VerificationResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;
        if verdict.verification_status != "SUCCESS" {
            return Err(GatewayError::InvalidSignature);
        }

        let event: WebhookEvent =
            serde_json::from_slice(body).map_err(|_| GatewayError::InvalidSignature)?;
        let outcome = match event.event_type.as_str() {
            "CHECKOUT.ORDER.COMPLETED" | "PAYMENT.CAPTURE.COMPLETED" => PaymentOutcome::Captured,
            "CHECKOUT.ORDER.DECLINED" | "PAYMENT.CAPTURE.DENIED" => PaymentOutcome::Denied,
            other => {
                warn!("Ignoring paypal event type {}", other);
                PaymentOutcome::Pending
            }
        };

        Ok(WebhookNotice { provider_session_id: event.resource.id, outcome })
    }
}
