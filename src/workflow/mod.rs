// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Order Workflows
//!
//! Everything that changes an order goes through this module:
//!
//! - `orders` - order creation (pricing, fees, anti-fraud record)
//! - `checkout` - Stripe sessions, manual Wise/Zelle orders, Wise transfer linking
//! - `reconcile` - provider events and Zelle decisions to payment status
//! - `review` - contract/annex approval, rejection and resubmission
//! - `outbox` - delivery of side effects after commit
//!
//! Each state transition commits in a single write transaction together with
//! the tokens, mirrors and outbox entries it implies.

use url::Url;

use crate::config::AppConfig;
use crate::error::WorkflowError;

pub mod checkout;
pub mod orders;
pub mod outbox;
pub mod reconcile;
pub mod review;

pub use checkout::{create_manual_order, link_wise_transfer, start_checkout, CheckoutOutcome};
pub use orders::{create_order, CreatedOrder, NewOrder, ANTI_FRAUD_VERSION};
pub use outbox::{DispatchReport, Outbox, OutboxDispatcher};
pub use reconcile::{
    approve_zelle, reconcile_stripe, reconcile_wise, reject_zelle, ReconcileOutcome, Transition,
};
pub use review::{
    approve_document, reject_document, resubmission_details, resubmit_documents, view_contract,
    ReviewOutcome, TokenLookup,
};

/// Base URL for client links: the caller's override or the configured one,
/// without trailing slash.
pub(crate) fn link_base(
    config: &AppConfig,
    override_url: Option<&str>,
) -> Result<String, WorkflowError> {
    let Some(raw) = override_url.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(config.app_url.clone());
    };
    let parsed = Url::parse(raw)
        .map_err(|e| WorkflowError::Validation(format!("app_url is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(WorkflowError::Validation(
            "app_url must use http or https".to_string(),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Trimmed, non-empty value of a required text field.
pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, WorkflowError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WorkflowError::Validation(format!("{field} is required")))
}
