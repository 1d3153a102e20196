// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Order repository.
//!
//! Orders are never deleted. Lookups by provider identifier go through the
//! `provider_refs` index; order numbers are unique through `order_numbers`.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::fees::FeeBreakdown;
use crate::storage::database::{
    DbError, DbResult, TableReader, TableWriter, ORDERS, ORDER_NUMBERS, PROVIDER_REFS,
};

/// How the client pays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Pix,
    Wise,
    Zelle,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Wise => "wise",
            PaymentMethod::Zelle => "zelle",
        }
    }

    /// Whether payment happens through a hosted Stripe session.
    pub fn is_stripe(&self) -> bool {
        matches!(self, PaymentMethod::Card | PaymentMethod::Pix)
    }
}

/// Order payment status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// Contract or annex review status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Which signed document a review applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Contract,
    /// The "Annex I" addendum.
    Annex,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Contract => "contract",
            DocumentKind::Annex => "annex",
        }
    }
}

/// Review state of one document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, Default)]
pub struct DocumentReview {
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Client contact details captured at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ClientContact {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
}

/// Evidence kept for chargeback disputes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AntiFraudRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub terms_accepted: bool,
    pub data_authorization: bool,
    pub accepted_at: DateTime<Utc>,
    /// Terms version the client accepted.
    pub version: String,
}

/// Typed order metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct OrderMetadata {
    pub fees: FeeBreakdown,
    pub anti_fraud: AntiFraudRecord,
}

/// One client purchase.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct StoredOrder {
    pub id: String,
    /// Human readable, `VISA-YYYYMMDD-NNNN`
    pub order_number: String,
    pub product_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    pub base_price_cents: u64,
    pub extra_units: u32,
    pub extra_unit_price_cents: u64,
    /// Net total in USD cents, before processing fees
    pub total_cents: u64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Last raw status reported by the payment provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<String>,
    pub contract_review: DocumentReview,
    pub annex_review: DocumentReview,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wise_transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub client: ClientContact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_document_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_selfie_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zelle_proof_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_request_id: Option<String>,
    pub metadata: OrderMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredOrder {
    pub fn review(&self, kind: DocumentKind) -> &DocumentReview {
        match kind {
            DocumentKind::Contract => &self.contract_review,
            DocumentKind::Annex => &self.annex_review,
        }
    }

    pub fn review_mut(&mut self, kind: DocumentKind) -> &mut DocumentReview {
        match kind {
            DocumentKind::Contract => &mut self.contract_review,
            DocumentKind::Annex => &mut self.annex_review,
        }
    }
}

/// External identifier an order can be found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRef<'a> {
    StripeSession(&'a str),
    WiseTransfer(&'a str),
}

impl ProviderRef<'_> {
    fn key(&self) -> String {
        match self {
            ProviderRef::StripeSession(id) => format!("stripe:{id}"),
            ProviderRef::WiseTransfer(id) => format!("wise:{id}"),
        }
    }
}

/// Generate an order number for `date`: `VISA-YYYYMMDD-NNNN`.
pub fn generate_order_number(date: DateTime<Utc>) -> Result<String, Unspecified> {
    let mut bytes = [0u8; 4];
    SystemRandom::new().fill(&mut bytes)?;
    let suffix = u32::from_be_bytes(bytes) % 10_000;
    Ok(format!("VISA-{}-{suffix:04}", date.format("%Y%m%d")))
}

/// Order access within a transaction.
pub struct OrderRepository<'t, T> {
    txn: &'t T,
}

impl<'t, T: TableReader> OrderRepository<'t, T> {
    pub fn new(txn: &'t T) -> Self {
        Self { txn }
    }

    pub fn get(&self, order_id: &str) -> DbResult<Option<StoredOrder>> {
        self.txn.read_json(ORDERS, order_id)
    }

    /// Like [`OrderRepository::get`] but a miss is [`DbError::NotFound`].
    pub fn require(&self, order_id: &str) -> DbResult<StoredOrder> {
        self.get(order_id)?
            .ok_or_else(|| DbError::NotFound(format!("Order {order_id}")))
    }

    pub fn get_by_number(&self, order_number: &str) -> DbResult<Option<StoredOrder>> {
        match self.txn.read_index(ORDER_NUMBERS, order_number)? {
            Some(order_id) => self.get(&order_id),
            None => Ok(None),
        }
    }

    pub fn find_by_provider_ref(&self, reference: ProviderRef<'_>) -> DbResult<Option<StoredOrder>> {
        match self.txn.read_index(PROVIDER_REFS, &reference.key())? {
            Some(order_id) => self.get(&order_id),
            None => Ok(None),
        }
    }

    /// Order id currently linked to `reference`, if any.
    pub fn provider_ref_owner(&self, reference: ProviderRef<'_>) -> DbResult<Option<String>> {
        self.txn.read_index(PROVIDER_REFS, &reference.key())
    }

    /// Newest first, optionally filtered by payment status.
    pub fn list(&self, status: Option<PaymentStatus>, limit: usize) -> DbResult<Vec<StoredOrder>> {
        let mut orders: Vec<StoredOrder> = self
            .txn
            .all_json::<StoredOrder>(ORDERS)?
            .into_iter()
            .filter(|o| status.map_or(true, |s| o.payment_status == s))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }
}

impl<'t> OrderRepository<'t, WriteTransaction> {
    /// Insert a new order, claiming its order number.
    ///
    /// Fails with [`DbError::AlreadyExists`] when the id or order number is taken.
    pub fn insert(&self, order: &StoredOrder) -> DbResult<()> {
        if self
            .txn
            .read_index(ORDER_NUMBERS, &order.order_number)?
            .is_some()
        {
            return Err(DbError::AlreadyExists(format!(
                "Order number {}",
                order.order_number
            )));
        }
        if self.get(&order.id)?.is_some() {
            return Err(DbError::AlreadyExists(format!("Order {}", order.id)));
        }

        self.txn
            .write_index(ORDER_NUMBERS, &order.order_number, &order.id)?;
        self.txn.write_json(ORDERS, &order.id, order)
    }

    /// Replace an existing order.
    pub fn update(&self, order: &StoredOrder) -> DbResult<()> {
        if self.get(&order.id)?.is_none() {
            return Err(DbError::NotFound(format!("Order {}", order.id)));
        }
        self.txn.write_json(ORDERS, &order.id, order)
    }

    /// Point `reference` at `order_id`.
    pub fn link_provider_ref(&self, reference: ProviderRef<'_>, order_id: &str) -> DbResult<()> {
        self.txn.write_index(PROVIDER_REFS, &reference.key(), order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;
    use crate::testing::sample_order;

    #[test]
    fn order_number_format() {
        let date = DateTime::parse_from_rfc3339("2026-03-09T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = generate_order_number(date).unwrap();
        assert!(number.starts_with("VISA-20260309-"), "{number}");
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn duplicate_order_number_is_rejected() {
        let (db, _dir) = temp_db();
        let first = sample_order("order-1", "VISA-20260101-0001");
        let mut second = sample_order("order-2", "VISA-20260101-0001");
        second.client.email = "other@example.com".to_string();

        db.write(|txn| OrderRepository::new(txn).insert(&first))
            .unwrap();
        let err = db
            .write(|txn| OrderRepository::new(txn).insert(&second))
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));

        let missing = db.read(|txn| OrderRepository::new(txn).get("order-2")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn lookup_by_number_and_provider_ref() {
        let (db, _dir) = temp_db();
        let order = sample_order("order-1", "VISA-20260101-0042");
        db.write(|txn| {
            let repo = OrderRepository::new(txn);
            repo.insert(&order)?;
            repo.link_provider_ref(ProviderRef::WiseTransfer("777"), &order.id)
        })
        .unwrap();

        let (by_number, by_ref, miss) = db
            .read(|txn| {
                let repo = OrderRepository::new(txn);
                Ok::<_, DbError>((
                    repo.get_by_number("VISA-20260101-0042")?,
                    repo.find_by_provider_ref(ProviderRef::WiseTransfer("777"))?,
                    repo.find_by_provider_ref(ProviderRef::StripeSession("777"))?,
                ))
            })
            .unwrap();
        assert_eq!(by_number.map(|o| o.id), Some("order-1".to_string()));
        assert_eq!(by_ref.map(|o| o.id), Some("order-1".to_string()));
        assert!(miss.is_none());
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let (db, _dir) = temp_db();
        let mut older = sample_order("order-old", "VISA-20260101-0001");
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut newer = sample_order("order-new", "VISA-20260101-0002");
        newer.payment_status = PaymentStatus::Completed;
        let pending = sample_order("order-mid", "VISA-20260101-0003");

        db.write(|txn| {
            let repo = OrderRepository::new(txn);
            repo.insert(&older)?;
            repo.insert(&newer)?;
            repo.insert(&pending)
        })
        .unwrap();

        let all = db.read(|txn| OrderRepository::new(txn).list(None, 10)).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().map(|o| o.id.as_str()), Some("order-old"));

        let completed = db
            .read(|txn| OrderRepository::new(txn).list(Some(PaymentStatus::Completed), 10))
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, "order-new");

        let limited = db.read(|txn| OrderRepository::new(txn).list(None, 1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn review_accessors_are_independent() {
        let mut order = sample_order("order-1", "VISA-20260101-0001");
        order.review_mut(DocumentKind::Annex).status = ApprovalStatus::Rejected;
        assert_eq!(order.review(DocumentKind::Annex).status, ApprovalStatus::Rejected);
        assert_eq!(order.review(DocumentKind::Contract).status, ApprovalStatus::Pending);
    }
}
