use std::collections::HashMap;

use anyhow::Result;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Minimal Stripe client built on reqwest.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: Option<String>,
    pub status: Option<String>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    /// Returns the period end timestamp, falling back to the first item when
    /// the top-level field is absent.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }
}

impl StripeClient {
    pub fn new(
        secret_key: String,
        webhook_secret: String,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
            success_url,
            cancel_url,
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .or_else(|| resp.headers().get("stripe-request-id"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (stripe_error_type, stripe_error_code, stripe_error_param, stripe_error_message) =
            match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(envelope) => {
                    let details = envelope.error;
                    (details.type_, details.code, details.param, details.message)
                }
                Err(_) => (None, None, None, None),
            };

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?stripe_error_type,
            stripe_error_code = ?stripe_error_code,
            stripe_error_param = ?stripe_error_param,
            stripe_error_message = ?stripe_error_message,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    /// Looks up an existing Stripe customer by email. Checkout and refresh
    /// both key off the email the identity provider vouched for.
    pub async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>> {
        // https://stripe.com/docs/api/customers/list
        let resp = self
            .http
            .get("https://api.stripe.com/v1/customers")
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "list customers by email").await?;

        #[derive(Deserialize)]
        struct CustomerList {
            data: Vec<CustomerResp>,
        }

        #[derive(Deserialize)]
        struct CustomerResp {
            id: String,
        }

        let parsed: CustomerList = resp.json().await?;
        Ok(parsed.data.into_iter().next().map(|customer| customer.id))
    }

    /// Creates a Stripe customer for the given email/user.
    pub async fn create_customer(&self, email: &str, user_id: Uuid) -> Result<String> {
        // https://stripe.com/docs/api/customers/create
        let body = [
            ("email", email.to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];

        let resp = self
            .http
            .post("https://api.stripe.com/v1/customers")
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create customer").await?;

        #[derive(Deserialize)]
        struct CustomerResp {
            id: String,
        }

        let parsed: CustomerResp = resp.json().await?;
        Ok(parsed.id)
    }

    /// Creates a subscription-mode Checkout Session and returns its URL.
    ///
    /// With `price_id = None` the session carries an inline `price_data`
    /// definition instead, so checkout still works before a price has been
    /// provisioned in the Stripe dashboard.
    pub async fn create_checkout_session(
        &self,
        price_id: Option<&str>,
        customer_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        // https://stripe.com/docs/payments/checkout
        let mut body: Vec<(String, String)> = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        match price_id {
            Some(price) => {
                body.push(("line_items[0][price]".to_string(), price.to_string()));
            }
            None => {
                body.extend([
                    (
                        "line_items[0][price_data][currency]".to_string(),
                        "usd".to_string(),
                    ),
                    (
                        "line_items[0][price_data][product_data][name]".to_string(),
                        "Pro Plan".to_string(),
                    ),
                    (
                        "line_items[0][price_data][unit_amount]".to_string(),
                        "999".to_string(),
                    ),
                    (
                        "line_items[0][price_data][recurring][interval]".to_string(),
                        "month".to_string(),
                    ),
                ]);
            }
        }

        for (key, value) in metadata {
            body.push((format!("metadata[{}]", key), value));
        }

        let resp = self
            .http
            .post("https://api.stripe.com/v1/checkout/sessions")
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&body)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "create checkout session").await?;

        #[derive(Deserialize)]
        struct CheckoutResp {
            url: Option<String>,
        }

        let parsed: CheckoutResp = resp.json().await?;
        parsed
            .url
            .ok_or_else(|| anyhow::anyhow!("Stripe Checkout session URL is missing"))
    }

    /// Returns the customer's active subscription, if any. Used by the
    /// refresh path to re-derive billing state straight from Stripe.
    pub async fn find_active_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<StripeSubscription>> {
        // https://stripe.com/docs/api/subscriptions/list
        let resp = self
            .http
            .get("https://api.stripe.com/v1/subscriptions")
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .query(&[
                ("customer", customer_id),
                ("status", "active"),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "list active subscriptions").await?;

        #[derive(Deserialize)]
        struct SubscriptionList {
            data: Vec<StripeSubscription>,
        }

        let parsed: SubscriptionList = resp.json().await?;
        Ok(parsed.data.into_iter().next())
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
        let signature =
            signature.ok_or_else(|| anyhow::anyhow!("missing v1 in stripe-signature"))?;

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();
        let provided = hex::decode(signature)?;

        if expected[..] != provided[..] {
            anyhow::bail!("invalid webhook signature");
        }

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }

    pub fn extract_checkout_session(event: &StripeEvent) -> Option<StripeCheckoutSession> {
        serde_json::from_value(event.data.object.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_secret(webhook_secret: &str) -> StripeClient {
        StripeClient::new(
            "sk_test_123".to_string(),
            webhook_secret.to_string(),
            "https://app.example.com/billing/success".to_string(),
            "https://app.example.com/billing/cancel".to_string(),
        )
    }

    fn sign(payload: &[u8], timestamp: &str, secret: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_correctly_signed_payload() {
        let client = client_with_secret("whsec_test");
        let payload =
            br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
        let signature = sign(payload, "1700000000", "whsec_test");
        let header = format!("t=1700000000,v1={}", signature);

        let event = client.verify_webhook_signature(payload, &header).unwrap();
        assert_eq!(event.type_, "checkout.session.completed");
    }

    #[test]
    fn rejects_wrong_secret() {
        let client = client_with_secret("whsec_test");
        let payload = br#"{"type":"checkout.session.completed","data":{"object":{}}}"#;
        let signature = sign(payload, "1700000000", "whsec_other");
        let header = format!("t=1700000000,v1={}", signature);

        assert!(client.verify_webhook_signature(payload, &header).is_err());
    }

    #[test]
    fn rejects_header_without_signature() {
        let client = client_with_secret("whsec_test");
        let payload = br#"{"type":"x","data":{"object":{}}}"#;

        assert!(client
            .verify_webhook_signature(payload, "t=1700000000")
            .is_err());
    }

    #[test]
    fn extracts_checkout_session_fields() {
        let payload = br#"{
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_1",
                    "mode": "subscription",
                    "subscription": "sub_1",
                    "customer": "cus_1",
                    "metadata": {"user_id": "3f67a1d4-7e2d-4a97-9c70-6d0f6ab70e2a"}
                }
            }
        }"#;
        let event: StripeEvent = serde_json::from_slice(payload).unwrap();
        let session = StripeClient::extract_checkout_session(&event).unwrap();

        assert_eq!(session.mode.as_deref(), Some("subscription"));
        assert_eq!(session.subscription.as_deref(), Some("sub_1"));
        assert_eq!(session.customer.as_deref(), Some("cus_1"));
        assert_eq!(
            session.metadata.unwrap().get("user_id").map(String::as_str),
            Some("3f67a1d4-7e2d-4a97-9c70-6d0f6ab70e2a")
        );
    }

    #[test]
    fn subscription_period_end_falls_back_to_first_item() {
        let subscription: StripeSubscription = serde_json::from_str(
            r#"{"id":"sub_1","status":"active","items":{"data":[{"current_period_end":1750000000}]}}"#,
        )
        .unwrap();
        assert_eq!(subscription.period_end(), Some(1750000000));
    }
}
