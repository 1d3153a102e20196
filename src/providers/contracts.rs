// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract PDF generation service.

use std::sync::Arc;

use reqwest::Client;
use serde_json::json;

use super::{ensure_success, http_client, ProviderError};
use crate::config::ContractPdfConfig;

#[async_trait::async_trait]
pub trait ContractGenerator: Send + Sync {
    /// Render (or re-render) the contract PDF for an order.
    async fn generate(&self, order_id: &str) -> Result<(), ProviderError>;
}

pub type DynContractGenerator = Arc<dyn ContractGenerator>;

/// Posts `{"order_id": …}` to the PDF service.
pub struct HttpContractGenerator {
    url: String,
    token: Option<String>,
    http: Client,
}

impl HttpContractGenerator {
    pub fn new(config: &ContractPdfConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            url: config.url.clone(),
            token: config.token.clone(),
            http: http_client()?,
        })
    }
}

#[async_trait::async_trait]
impl ContractGenerator for HttpContractGenerator {
    async fn generate(&self, order_id: &str) -> Result<(), ProviderError> {
        let mut request = self.http.post(&self.url).json(&json!({ "order_id": order_id }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("contract generation: {e}")))?;
        ensure_success(response).await?;
        tracing::info!(order_id, "Contract PDF generation requested");
        Ok(())
    }
}

/// Used when no PDF service is configured.
pub struct SkippedContractGenerator;

#[async_trait::async_trait]
impl ContractGenerator for SkippedContractGenerator {
    async fn generate(&self, order_id: &str) -> Result<(), ProviderError> {
        tracing::warn!(order_id, "Contract PDF service not configured, generation skipped");
        Ok(())
    }
}

pub fn create_contract_generator(
    config: Option<&ContractPdfConfig>,
) -> Result<DynContractGenerator, ProviderError> {
    match config {
        Some(config) => Ok(Arc::new(HttpContractGenerator::new(config)?)),
        None => Ok(Arc::new(SkippedContractGenerator)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skipped_generator_succeeds() {
        let generator = create_contract_generator(None).unwrap();
        generator.generate("order-1").await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        let generator = HttpContractGenerator::new(&ContractPdfConfig {
            url: "http://127.0.0.1:9/contracts".to_string(),
            token: Some("t".to_string()),
        })
        .unwrap();
        assert!(matches!(
            generator.generate("order-1").await,
            Err(ProviderError::Request(_))
        ));
    }
}
