// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment ledger rows.
//!
//! One row per order, kept for traceability only. The row mirrors the
//! order's payment status and carries the provider's external id once known.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::orders::{PaymentMethod, PaymentStatus};
use crate::storage::database::{DbError, DbResult, TableReader, TableWriter, PAYMENTS};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredPayment {
    pub id: String,
    pub order_id: String,
    /// Requested amount in minor units of `currency`
    pub amount_cents: u64,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider: PaymentMethod,
    /// Stripe session id or Wise transfer id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PaymentRepository<'t, T> {
    txn: &'t T,
}

impl<'t, T: TableReader> PaymentRepository<'t, T> {
    pub fn new(txn: &'t T) -> Self {
        Self { txn }
    }

    pub fn get(&self, payment_id: &str) -> DbResult<Option<StoredPayment>> {
        self.txn.read_json(PAYMENTS, payment_id)
    }
}

impl<'t> PaymentRepository<'t, WriteTransaction> {
    pub fn insert(&self, payment: &StoredPayment) -> DbResult<()> {
        if self.get(&payment.id)?.is_some() {
            return Err(DbError::AlreadyExists(format!("Payment {}", payment.id)));
        }
        self.txn.write_json(PAYMENTS, &payment.id, payment)
    }

    /// Record the provider's external id. Returns false if the row is missing.
    pub fn set_external_id(&self, payment_id: &str, external_id: &str) -> DbResult<bool> {
        let Some(mut payment) = self.get(payment_id)? else {
            return Ok(false);
        };
        payment.external_id = Some(external_id.to_string());
        payment.updated_at = Utc::now();
        self.txn.write_json(PAYMENTS, payment_id, &payment)?;
        Ok(true)
    }

    /// Mirror the order's status. Returns false if the row is missing.
    pub fn set_status(&self, payment_id: &str, status: PaymentStatus) -> DbResult<bool> {
        let Some(mut payment) = self.get(payment_id)? else {
            return Ok(false);
        };
        if payment.status != status {
            payment.status = status;
            payment.updated_at = Utc::now();
            self.txn.write_json(PAYMENTS, payment_id, &payment)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;

    fn payment(id: &str) -> StoredPayment {
        StoredPayment {
            id: id.to_string(),
            order_id: "order-1".to_string(),
            amount_cents: 14_576,
            currency: "USD".to_string(),
            status: PaymentStatus::Pending,
            provider: PaymentMethod::Card,
            external_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn insert_twice_fails() {
        let (db, _dir) = temp_db();
        let p = payment("pay-1");
        db.write(|txn| PaymentRepository::new(txn).insert(&p)).unwrap();
        let err = db
            .write(|txn| PaymentRepository::new(txn).insert(&p))
            .unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
    }

    #[test]
    fn external_id_and_status_updates() {
        let (db, _dir) = temp_db();
        db.write(|txn| PaymentRepository::new(txn).insert(&payment("pay-1")))
            .unwrap();

        db.write(|txn| {
            let repo = PaymentRepository::new(txn);
            assert!(repo.set_external_id("pay-1", "cs_test_123")?);
            assert!(repo.set_status("pay-1", PaymentStatus::Completed)?);
            assert!(!repo.set_status("missing", PaymentStatus::Completed)?);
            Ok::<_, DbError>(())
        })
        .unwrap();

        let stored = db
            .read(|txn| PaymentRepository::new(txn).get("pay-1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.external_id.as_deref(), Some("cs_test_123"));
        assert_eq!(stored.status, PaymentStatus::Completed);
    }
}
