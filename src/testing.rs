// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixtures and recording doubles for the outbound seams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::fees::card_gross;
use crate::fx::FxRateSource;
use crate::mail::{EmailMessage, EmailSender, MailError};
use crate::providers::{
    CheckoutProvider, CheckoutSession, CheckoutSessionRequest, ContractGenerator, ProviderError,
};
use crate::state::AppState;
use crate::storage::database::tests::temp_db;
use crate::storage::{
    AntiFraudRecord, CalculationType, CatalogRepository, ClientContact, DocumentReview,
    OrderMetadata, PaymentMethod, PaymentStatus, Seller, StoredOrder, VisaProduct,
};

pub(crate) const WISE_SECRET: &str = "wise-secret";
pub(crate) const STRIPE_SECRET: &str = "whsec_test";
pub(crate) const ADMIN_TOKEN: &str = "admin-token";

/// A pending card order for the `b1` product with two extra units.
pub(crate) fn sample_order(id: &str, order_number: &str) -> StoredOrder {
    let now = Utc::now();
    StoredOrder {
        id: id.to_string(),
        order_number: order_number.to_string(),
        product_slug: "b1".to_string(),
        seller_id: None,
        base_price_cents: 10_000,
        extra_units: 2,
        extra_unit_price_cents: 2_000,
        total_cents: 14_000,
        payment_method: PaymentMethod::Card,
        payment_status: PaymentStatus::Pending,
        provider_status: None,
        contract_review: DocumentReview::default(),
        annex_review: DocumentReview::default(),
        stripe_session_id: None,
        wise_transfer_id: None,
        payment_id: None,
        client: ClientContact {
            name: "Ana Souza".to_string(),
            email: "client@example.com".to_string(),
            whatsapp: None,
            country: Some("BR".to_string()),
            nationality: None,
            observations: None,
        },
        contract_document_url: None,
        contract_selfie_url: None,
        zelle_proof_url: None,
        service_request_id: None,
        metadata: OrderMetadata {
            fees: card_gross(14_000).unwrap(),
            anti_fraud: AntiFraudRecord {
                ip_address: Some("203.0.113.7".to_string()),
                terms_accepted: true,
                data_authorization: true,
                accepted_at: now,
                version: "test".to_string(),
            },
        },
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn b1_product() -> VisaProduct {
    VisaProduct {
        slug: "b1".to_string(),
        name: "B1/B2 Tourist Visa".to_string(),
        base_price_cents: 10_000,
        extra_unit_price_cents: 2_000,
        calculation_type: CalculationType::BasePlusUnits,
        is_active: true,
        updated_at: Utc::now(),
    }
}

/// Buffer for formatted log lines written during a test.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a subscriber that records log output on this thread.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    (result, logs)
}

pub(crate) struct FixedFxRateSource(pub f64);

#[async_trait::async_trait]
impl FxRateSource for FixedFxRateSource {
    async fn usd_to_brl(&self) -> Result<f64, ProviderError> {
        Ok(self.0)
    }
}

pub(crate) struct FailingFxRateSource;

#[async_trait::async_trait]
impl FxRateSource for FailingFxRateSource {
    async fn usd_to_brl(&self) -> Result<f64, ProviderError> {
        Err(ProviderError::Request("connection refused".to_string()))
    }
}

#[derive(Default)]
pub(crate) struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingEmailSender {
    pub(crate) fn failing() -> Self {
        let sender = Self::default();
        sender.set_failing(true);
        sender
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("relay unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingContractGenerator {
    calls: Mutex<Vec<String>>,
}

impl RecordingContractGenerator {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContractGenerator for RecordingContractGenerator {
    async fn generate(&self, order_id: &str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

/// Returns `cs_test_<n>` sessions and records every request.
#[derive(Default)]
pub(crate) struct StaticCheckoutProvider {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl StaticCheckoutProvider {
    pub(crate) fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CheckoutProvider for StaticCheckoutProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let id = format!("cs_test_{}", requests.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/pay/{id}"),
            id,
        })
    }
}

/// Application state over a throwaway database with recording doubles.
pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) mailer: Arc<RecordingEmailSender>,
    pub(crate) contracts: Arc<RecordingContractGenerator>,
    pub(crate) checkout: Arc<StaticCheckoutProvider>,
    _dir: TempDir,
}

pub(crate) fn test_context() -> TestContext {
    let (db, dir) = temp_db();
    let config = AppConfig::from_lookup(|name| match name {
        "APP_URL" => Some("https://app.example.com/".to_string()),
        "ADMIN_API_TOKEN" => Some(ADMIN_TOKEN.to_string()),
        "WISE_WEBHOOK_SECRET" => Some(WISE_SECRET.to_string()),
        "STRIPE_WEBHOOK_SECRET_TEST" => Some(STRIPE_SECRET.to_string()),
        _ => None,
    })
    .unwrap();

    let mailer = Arc::new(RecordingEmailSender::default());
    let contracts = Arc::new(RecordingContractGenerator::default());
    let checkout = Arc::new(StaticCheckoutProvider::default());
    let state = AppState::new(
        config,
        Arc::new(db),
        checkout.clone(),
        Arc::new(FixedFxRateSource(5.0)),
        mailer.clone(),
        contracts.clone(),
    );

    state
        .db
        .write(|txn| {
            let catalog = CatalogRepository::new(txn);
            catalog.upsert_product(&b1_product())?;
            catalog.upsert_product(&VisaProduct {
                slug: "dependents".to_string(),
                name: "Dependents only".to_string(),
                base_price_cents: 50_000,
                extra_unit_price_cents: 15_000,
                calculation_type: CalculationType::UnitsOnly,
                is_active: true,
                updated_at: Utc::now(),
            })?;
            catalog.upsert_seller(&Seller {
                seller_id: "seller-1".to_string(),
                display_name: "Seller One".to_string(),
                is_active: true,
                updated_at: Utc::now(),
            })
        })
        .unwrap();

    TestContext {
        state,
        mailer,
        contracts,
        checkout,
        _dir: dir,
    }
}
