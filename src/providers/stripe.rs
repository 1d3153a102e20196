// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stripe hosted checkout sessions and webhook verification.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::info;

use super::{ensure_success, http_client, ProviderError, SignatureError};
use crate::config::StripeConfig;
use crate::storage::PaymentMethod;

/// Maximum age of a signed webhook timestamp.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A checkout session to create for one order.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: String,
    pub order_number: String,
    pub product_name: String,
    pub payment_method: PaymentMethod,
    /// Gross amount in minor units of `currency`
    pub amount_cents: u64,
    /// Lowercase ISO code (`usd`, `brl`)
    pub currency: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Attached to both the session and its payment intent.
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait::async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;
}

pub type DynCheckoutProvider = Arc<dyn CheckoutProvider>;

/// Provider used when no Stripe key is configured for the active mode.
pub struct UnconfiguredCheckout;

#[async_trait::async_trait]
impl CheckoutProvider for UnconfiguredCheckout {
    async fn create_session(
        &self,
        _request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        Err(ProviderError::NotConfigured("Stripe"))
    }
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    api_base_url: String,
    secret_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeClient {
    pub fn new(api_base_url: &str, secret_key: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            http: http_client()?,
        })
    }
}

/// Client for the configured mode, or [`UnconfiguredCheckout`] without a key.
pub fn create_checkout_provider(config: &StripeConfig) -> Result<DynCheckoutProvider, ProviderError> {
    match &config.secret_key {
        Some(key) => {
            info!(mode = config.mode.as_str(), "Stripe checkout enabled");
            Ok(Arc::new(StripeClient::new(&config.api_base_url, key)?))
        }
        None => {
            tracing::warn!(
                mode = config.mode.as_str(),
                "No Stripe secret key for this mode, checkout disabled"
            );
            Ok(Arc::new(UnconfiguredCheckout))
        }
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let method_type = match request.payment_method {
        PaymentMethod::Pix => "pix",
        _ => "card",
    };

    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), method_type.to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.amount_cents.to_string(),
        ),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("customer_email".to_string(), request.customer_email.clone()),
        ("client_reference_id".to_string(), request.order_id.clone()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((
            format!("payment_intent_data[metadata][{key}]"),
            value.clone(),
        ));
    }
    form
}

#[async_trait::async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base_url))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", format!("checkout-{}", request.order_id))
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("create checkout session: {e}")))?;

        let session: SessionResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("checkout session: {e}")))?;

        let url = session.url.ok_or_else(|| {
            ProviderError::InvalidResponse("checkout session has no url".to_string())
        })?;

        info!(
            order_id = %request.order_id,
            session_id = %session.id,
            "Stripe checkout session created"
        );
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

// =============================================================================
// Webhooks
// =============================================================================

/// Verify a `Stripe-Signature` header (`t=…,v1=…`) against the raw body.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now.timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::MissingSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Fields of a checkout session event the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSessionEvent {
    pub event_id: String,
    pub event_type: String,
    pub session_id: String,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: Option<String>,
    /// `metadata.order_id`, used when the session id is not indexed
    pub order_id: Option<String>,
}

/// Extract a checkout session event. Other event types yield `None`.
pub fn parse_session_event(payload: &Value) -> Option<StripeSessionEvent> {
    let event_type = payload.get("type")?.as_str()?;
    if !event_type.starts_with("checkout.session.") {
        return None;
    }
    let object = payload.pointer("/data/object")?;
    Some(StripeSessionEvent {
        event_id: payload
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        event_type: event_type.to_string(),
        session_id: object.get("id")?.as_str()?.to_string(),
        payment_status: object
            .get("payment_status")
            .and_then(Value::as_str)
            .map(str::to_string),
        order_id: object
            .pointer("/metadata/order_id")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
