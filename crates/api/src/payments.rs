use std::env;

use anyhow::{Context, Result};
use club_core::CheckoutQuote;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

pub const STRIPE_PAYMENT_INTENTS_URL: &str = "https://api.stripe.com/v1/payment_intents";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub currency: String,
    /// Payment intents URL, overridable with `CLUB_STRIPE_ENDPOINT`.
    pub endpoint: String,
}

impl StripeConfig {
    pub fn from_env(default_currency: &str) -> Option<Self> {
        let secret_key = env::var("CLUB_STRIPE_SECRET_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;
        let currency = env::var("CLUB_STRIPE_CURRENCY")
            .ok()
            .map(|value| value.trim().to_lowercase())
            .filter(|value| value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic()))
            .unwrap_or_else(|| default_currency.to_string());

        let endpoint = env::var("CLUB_STRIPE_ENDPOINT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| STRIPE_PAYMENT_INTENTS_URL.to_string());

        Some(Self {
            secret_key,
            currency,
            endpoint,
        })
    }

    pub fn new(secret_key: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            currency: currency.into(),
            endpoint: STRIPE_PAYMENT_INTENTS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

pub fn intent_form(quote: &CheckoutQuote) -> Vec<(&'static str, String)> {
    vec![
        ("amount", quote.amount_cents.to_string()),
        ("currency", quote.currency.clone()),
        ("automatic_payment_methods[enabled]", "true".to_string()),
        ("description", quote.course_title.clone()),
        ("metadata[course_id]", quote.course_id.clone()),
        ("metadata[course_slug]", quote.course_slug.clone()),
    ]
}

pub fn parse_intent(payload: &Value) -> Option<PaymentIntent> {
    let id = payload.get("id")?.as_str()?.to_string();
    let client_secret = payload.get("client_secret")?.as_str()?.to_string();
    Some(PaymentIntent { id, client_secret })
}

pub async fn create_payment_intent(
    client: &Client,
    config: &StripeConfig,
    quote: &CheckoutQuote,
) -> Result<PaymentIntent> {
    let response = client
        .post(config.endpoint.as_str())
        .bearer_auth(config.secret_key.as_str())
        .form(&intent_form(quote))
        .send()
        .await
        .context("Stripe request failed")?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("Stripe payment intent failed {}: {}", status.as_u16(), body);
    }

    let parsed: Value = serde_json::from_str(body.as_str()).context("Stripe parse failed")?;
    parse_intent(&parsed).context("Stripe payment intent missing id or client_secret")
}
