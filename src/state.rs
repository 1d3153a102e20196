// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::AppConfig;
use crate::fx::{DynFxRateSource, HttpFxRateSource};
use crate::mail::{create_email_sender, DynEmailSender, MailError};
use crate::providers::{
    create_checkout_provider, create_contract_generator, DynCheckoutProvider,
    DynContractGenerator, ProviderError,
};
use crate::storage::OrderDatabase;
use crate::workflow::Outbox;

/// Failure wiring the outbound integrations at start-up.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<OrderDatabase>,
    pub checkout: DynCheckoutProvider,
    pub fx: DynFxRateSource,
    pub outbox: Arc<Outbox>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: Arc<OrderDatabase>,
        checkout: DynCheckoutProvider,
        fx: DynFxRateSource,
        mailer: DynEmailSender,
        contracts: DynContractGenerator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            outbox: Arc::new(Outbox::new(db.clone(), mailer, contracts)),
            db,
            checkout,
            fx,
        }
    }

    /// Build the state with the real integrations selected by `config`.
    pub fn from_config(config: AppConfig, db: OrderDatabase) -> Result<Self, StateError> {
        let checkout = create_checkout_provider(&config.stripe)?;
        let fx: DynFxRateSource = Arc::new(HttpFxRateSource::new(config.fx_api_url.clone())?);
        let mailer = create_email_sender(config.smtp.as_ref())?;
        let contracts = create_contract_generator(config.contract_pdf.as_ref())?;
        Ok(Self::new(config, Arc::new(db), checkout, fx, mailer, contracts))
    }
}
