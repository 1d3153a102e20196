// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Start-up seeding of products and sellers from a JSON file.
//!
//! ```json
//! {
//!   "products": [
//!     { "slug": "b1", "name": "B1/B2", "base_price_usd": "100",
//!       "extra_unit_price_usd": "20", "calculation_type": "base_plus_units" }
//!   ],
//!   "sellers": [ { "seller_id": "seller-1", "display_name": "Seller One" } ]
//! }
//! ```
//!
//! Entries are upserted, so the file can be re-applied on every start.

use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::fees::parse_amount_to_cents;
use crate::storage::{CalculationType, CatalogRepository, DbError, OrderDatabase, Seller, VisaProduct};

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("product `{slug}`: {reason}")]
    InvalidProduct { slug: String, reason: String },

    #[error(transparent)]
    Storage(#[from] DbError),
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ProductSeed {
    slug: String,
    name: String,
    base_price_usd: String,
    extra_unit_price_usd: String,
    calculation_type: CalculationType,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct SellerSeed {
    seller_id: String,
    display_name: String,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<ProductSeed>,
    #[serde(default)]
    sellers: Vec<SellerSeed>,
}

/// Counts of upserted entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub products: usize,
    pub sellers: usize,
}

impl ProductSeed {
    fn into_product(self) -> Result<VisaProduct, SeedError> {
        let invalid = |reason: String| SeedError::InvalidProduct {
            slug: self.slug.clone(),
            reason,
        };
        let base_price_cents = parse_amount_to_cents(&self.base_price_usd).map_err(invalid)?;
        let extra_unit_price_cents =
            parse_amount_to_cents(&self.extra_unit_price_usd).map_err(invalid)?;
        Ok(VisaProduct {
            slug: self.slug,
            name: self.name,
            base_price_cents,
            extra_unit_price_cents,
            calculation_type: self.calculation_type,
            is_active: self.is_active,
            updated_at: Utc::now(),
        })
    }
}

/// Parse a catalog document and upsert it in one transaction.
pub fn seed_catalog_json(db: &OrderDatabase, json: &str) -> Result<SeedReport, SeedError> {
    let file: CatalogFile = serde_json::from_str(json)?;
    let products = file
        .products
        .into_iter()
        .map(ProductSeed::into_product)
        .collect::<Result<Vec<_>, _>>()?;
    let now = Utc::now();
    let sellers: Vec<Seller> = file
        .sellers
        .into_iter()
        .map(|s| Seller {
            seller_id: s.seller_id,
            display_name: s.display_name,
            is_active: s.is_active,
            updated_at: now,
        })
        .collect();

    db.write(|txn| {
        let catalog = CatalogRepository::new(txn);
        for product in &products {
            catalog.upsert_product(product)?;
        }
        for seller in &sellers {
            catalog.upsert_seller(seller)?;
        }
        Ok::<_, DbError>(())
    })?;

    Ok(SeedReport {
        products: products.len(),
        sellers: sellers.len(),
    })
}

/// Seed the catalog from a file.
pub fn seed_catalog(db: &OrderDatabase, path: &Path) -> Result<SeedReport, SeedError> {
    let json = std::fs::read_to_string(path)?;
    let report = seed_catalog_json(db, &json)?;
    info!(
        path = %path.display(),
        products = report.products,
        sellers = report.sellers,
        "Catalog seeded"
    );
    Ok(report)
}
