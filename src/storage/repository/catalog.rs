// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Product and seller catalog.
//!
//! Products are keyed by slug, sellers by seller id. Both are seeded from the
//! optional catalog file at start-up and maintained through admin endpoints.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbResult, TableReader, TableWriter, PRODUCTS, SELLERS};

/// How an order total is derived from a product's prices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    /// `extra_units * extra_unit_price`. The base price is ignored.
    UnitsOnly,
    /// `base_price + extra_units * extra_unit_price`.
    BasePlusUnits,
}

/// A sellable visa service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VisaProduct {
    pub slug: String,
    pub name: String,
    /// Base price in USD cents
    pub base_price_cents: u64,
    /// Price per extra unit (dependant, extra applicant) in USD cents
    pub extra_unit_price_cents: u64,
    pub calculation_type: CalculationType,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl VisaProduct {
    /// Net order total in USD cents, before any processing fee.
    ///
    /// `None` on overflow.
    pub fn total_cents(&self, extra_units: u32) -> Option<u64> {
        let units = self
            .extra_unit_price_cents
            .checked_mul(u64::from(extra_units))?;
        match self.calculation_type {
            CalculationType::UnitsOnly => Some(units),
            CalculationType::BasePlusUnits => self.base_price_cents.checked_add(units),
        }
    }
}

/// A seller (affiliate) orders can be attributed to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Seller {
    pub seller_id: String,
    pub display_name: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Catalog access within a transaction.
pub struct CatalogRepository<'t, T> {
    txn: &'t T,
}

impl<'t, T: TableReader> CatalogRepository<'t, T> {
    pub fn new(txn: &'t T) -> Self {
        Self { txn }
    }

    pub fn product(&self, slug: &str) -> DbResult<Option<VisaProduct>> {
        self.txn.read_json(PRODUCTS, slug)
    }

    /// Product by slug, only if it is active.
    pub fn active_product(&self, slug: &str) -> DbResult<Option<VisaProduct>> {
        Ok(self.product(slug)?.filter(|p| p.is_active))
    }

    pub fn products(&self) -> DbResult<Vec<VisaProduct>> {
        self.txn.all_json(PRODUCTS)
    }

    pub fn seller(&self, seller_id: &str) -> DbResult<Option<Seller>> {
        self.txn.read_json(SELLERS, seller_id)
    }

    /// Seller by id, only if it is active.
    pub fn active_seller(&self, seller_id: &str) -> DbResult<Option<Seller>> {
        Ok(self.seller(seller_id)?.filter(|s| s.is_active))
    }
}

impl<'t> CatalogRepository<'t, WriteTransaction> {
    pub fn upsert_product(&self, product: &VisaProduct) -> DbResult<()> {
        self.txn.write_json(PRODUCTS, &product.slug, product)
    }

    pub fn upsert_seller(&self, seller: &Seller) -> DbResult<()> {
        self.txn.write_json(SELLERS, &seller.seller_id, seller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;
    use crate::storage::DbError;

    fn product(slug: &str, calculation_type: CalculationType) -> VisaProduct {
        VisaProduct {
            slug: slug.to_string(),
            name: format!("Product {slug}"),
            base_price_cents: 10_000,
            extra_unit_price_cents: 2_000,
            calculation_type,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn base_plus_units_total() {
        let p = product("b1", CalculationType::BasePlusUnits);
        assert_eq!(p.total_cents(2), Some(14_000));
        assert_eq!(p.total_cents(0), Some(10_000));
    }

    #[test]
    fn units_only_with_zero_units_is_zero() {
        let p = product("u1", CalculationType::UnitsOnly);
        assert_eq!(p.total_cents(0), Some(0));
        assert_eq!(p.total_cents(3), Some(6_000));
    }

    #[test]
    fn total_overflow_is_none() {
        let mut p = product("big", CalculationType::BasePlusUnits);
        p.extra_unit_price_cents = u64::MAX;
        assert_eq!(p.total_cents(2), None);
    }

    #[test]
    fn inactive_product_is_hidden() {
        let (db, _dir) = temp_db();
        let mut p = product("off", CalculationType::BasePlusUnits);
        p.is_active = false;
        db.write(|txn| CatalogRepository::new(txn).upsert_product(&p))
            .unwrap();

        let (any, active) = db
            .read(|txn| {
                let repo = CatalogRepository::new(txn);
                Ok::<_, DbError>((repo.product("off")?, repo.active_product("off")?))
            })
            .unwrap();
        assert!(any.is_some());
        assert!(active.is_none());
    }

    #[test]
    fn seller_upsert_replaces() {
        let (db, _dir) = temp_db();
        let mut seller = Seller {
            seller_id: "s-1".to_string(),
            display_name: "Ana".to_string(),
            is_active: true,
            updated_at: Utc::now(),
        };
        db.write(|txn| CatalogRepository::new(txn).upsert_seller(&seller))
            .unwrap();
        seller.is_active = false;
        db.write(|txn| CatalogRepository::new(txn).upsert_seller(&seller))
            .unwrap();

        let active = db
            .read(|txn| CatalogRepository::new(txn).active_seller("s-1"))
            .unwrap();
        assert!(active.is_none());
    }
}
