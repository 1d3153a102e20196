// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound integrations: Stripe checkout, Wise webhooks, contract PDFs.

use std::time::Duration;

use reqwest::Client;

pub mod contracts;
pub mod stripe;
pub mod wise;

pub use contracts::{create_contract_generator, ContractGenerator, DynContractGenerator};
pub use stripe::{
    create_checkout_provider, CheckoutProvider, CheckoutSession, CheckoutSessionRequest,
    DynCheckoutProvider,
};

/// Timeout applied to every outbound provider call.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("response was invalid: {0}")]
    InvalidResponse(String),
}

/// Why a webhook signature was not accepted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    MissingHeader,

    #[error("webhook secret not configured")]
    MissingSecret,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,
}

/// HTTP client shared by provider integrations.
pub fn http_client() -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-success response into [`ProviderError::Upstream`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Upstream { status, body })
}
