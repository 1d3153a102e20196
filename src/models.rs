// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. All types derive `ToSchema`
//! for the OpenAPI document; stored records (`StoredOrder`, `AuditEvent`, ...)
//! are returned as-is where the admin UI needs the full picture.
//!
//! ## Model Categories
//!
//! - **Checkout**: session and manual-order creation
//! - **Webhooks**: provider acknowledgements
//! - **Contracts**: review actions and client token links
//! - **Admin**: catalog upserts, order and audit queries, Zelle decisions
//!
//! Money crosses the API as USD decimal strings (`"145.76"`) and is held as
//! integer cents everywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::fees::format_cents;
use crate::storage::{
    AuditEvent, CalculationType, ClientContact, ContractToken, DocumentKind, DocumentReview,
    OutboxEntry, PaymentMethod, PaymentStatus, StoredOrder, StoredPayment, VisaProduct,
    WiseTransferRecord,
};
use crate::workflow::{NewOrder, Transition};

fn default_true() -> bool {
    true
}

// =============================================================================
// Checkout Models
// =============================================================================

/// Checkout payload shared by hosted sessions and manual orders.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub product_slug: String,
    pub seller_id: Option<String>,
    #[serde(default)]
    pub extra_units: u32,
    pub client_name: String,
    pub client_email: String,
    pub client_whatsapp: Option<String>,
    pub client_country: Option<String>,
    pub client_nationality: Option<String>,
    pub client_observations: Option<String>,
    pub payment_method: PaymentMethod,
    /// Caller-supplied USD to BRL rate for PIX.
    pub exchange_rate: Option<f64>,
    pub contract_document_url: Option<String>,
    pub contract_selfie_url: Option<String>,
    /// Proof of payment for Zelle orders.
    pub zelle_proof_url: Option<String>,
    pub ip_address: Option<String>,
    pub service_request_id: Option<String>,
    #[serde(default = "default_true")]
    pub terms_accepted: bool,
    #[serde(default = "default_true")]
    pub data_authorization: bool,
}

impl CheckoutRequest {
    /// Convert into a workflow input; `fallback_ip` fills a missing `ip_address`.
    pub fn into_new_order(self, fallback_ip: Option<String>) -> NewOrder {
        NewOrder {
            product_slug: self.product_slug,
            seller_id: self.seller_id,
            extra_units: self.extra_units,
            client: ClientContact {
                name: self.client_name,
                email: self.client_email,
                whatsapp: self.client_whatsapp,
                country: self.client_country,
                nationality: self.client_nationality,
                observations: self.client_observations,
            },
            payment_method: self.payment_method,
            contract_document_url: self.contract_document_url,
            contract_selfie_url: self.contract_selfie_url,
            zelle_proof_url: self.zelle_proof_url,
            ip_address: self.ip_address.or(fallback_ip),
            service_request_id: self.service_request_id,
            terms_accepted: self.terms_accepted,
            data_authorization: self.data_authorization,
        }
    }
}

/// Hosted payment session created for a new order.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub success: bool,
    /// Redirect the client here to pay.
    pub checkout_url: String,
    pub session_id: String,
    pub order_id: String,
    pub order_number: String,
}

/// Order created for an offline payment method.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManualOrderResponse {
    pub success: bool,
    pub order_id: String,
    pub order_number: String,
    pub total_price_usd: String,
    pub payment_method: PaymentMethod,
}

impl From<&StoredOrder> for ManualOrderResponse {
    fn from(order: &StoredOrder) -> Self {
        Self {
            success: true,
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            total_price_usd: format_cents(order.total_cents),
            payment_method: order.payment_method,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkWiseTransferRequest {
    pub transfer_id: String,
}

/// Public view of an active product.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub slug: String,
    pub name: String,
    pub base_price_usd: String,
    pub extra_unit_price_usd: String,
    pub calculation_type: CalculationType,
}

impl From<VisaProduct> for ProductResponse {
    fn from(product: VisaProduct) -> Self {
        Self {
            base_price_usd: format_cents(product.base_price_cents),
            extra_unit_price_usd: format_cents(product.extra_unit_price_cents),
            slug: product.slug,
            name: product.name,
            calculation_type: product.calculation_type,
        }
    }
}

// =============================================================================
// Webhook Models
// =============================================================================

/// Acknowledgement returned to every webhook delivery.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

// =============================================================================
// Contract Models
// =============================================================================

/// Approve or reject one of an order's documents.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub order_id: String,
    /// Reviewer identity recorded on the order.
    pub reviewed_by: Option<String>,
    /// Defaults to `contract`.
    pub contract_type: Option<DocumentKind>,
    /// Required when rejecting.
    pub rejection_reason: Option<String>,
    /// Overrides `APP_URL` for the emailed link.
    pub app_url: Option<String>,
}

/// Outcome of an admin action.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TokenQuery {
    pub token: String,
}

/// Order summary behind a view link.
#[derive(Debug, Serialize, ToSchema)]
pub struct ContractViewResponse {
    pub order_id: String,
    pub order_number: String,
    pub product_slug: String,
    pub client_name: String,
    pub payment_status: PaymentStatus,
    pub contract_review: DocumentReview,
    pub annex_review: DocumentReview,
    pub contract_document_url: Option<String>,
    pub contract_selfie_url: Option<String>,
}

impl From<StoredOrder> for ContractViewResponse {
    fn from(order: StoredOrder) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number,
            product_slug: order.product_slug,
            client_name: order.client.name,
            payment_status: order.payment_status,
            contract_review: order.contract_review,
            annex_review: order.annex_review,
            contract_document_url: order.contract_document_url,
            contract_selfie_url: order.contract_selfie_url,
        }
    }
}

/// What a resubmission link asks the client to replace.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResubmissionDetailsResponse {
    pub order_number: String,
    pub client_name: String,
    pub document: DocumentKind,
    pub rejection_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResubmitRequest {
    pub token: String,
    pub contract_document_url: Option<String>,
    pub contract_selfie_url: Option<String>,
}

// =============================================================================
// Admin Models
// =============================================================================

/// Create or replace a product. Amounts are USD decimal strings.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductUpsertRequest {
    pub name: String,
    pub base_price_usd: String,
    pub extra_unit_price_usd: String,
    pub calculation_type: CalculationType,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SellerUpsertRequest {
    pub display_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub payment_status: Option<PaymentStatus>,
    /// Maximum number of results (default 50).
    pub limit: Option<usize>,
}

/// An order with everything linked to it.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminOrderDetail {
    pub order: StoredOrder,
    pub payment: Option<StoredPayment>,
    pub wise_transfer: Option<WiseTransferRecord>,
    pub tokens: Vec<ContractToken>,
    /// Side effects, delivered or pending.
    pub side_effects: Vec<OutboxEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<StoredOrder>,
    pub total: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    pub order_id: Option<String>,
    /// Maximum number of results (default 100).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub events: Vec<AuditEvent>,
    pub total: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ZelleApproveRequest {
    pub order_id: String,
    pub reviewed_by: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ZelleRejectRequest {
    pub order_id: String,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub app_url: Option<String>,
}

/// Payment status change applied by a Zelle decision.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransitionResponse {
    pub success: bool,
    pub order_id: String,
    pub order_number: String,
    pub previous_status: PaymentStatus,
    pub payment_status: PaymentStatus,
}

impl From<Transition> for TransitionResponse {
    fn from(t: Transition) -> Self {
        Self {
            success: true,
            order_id: t.order_id,
            order_number: t.order_number,
            previous_status: t.previous,
            payment_status: t.current,
        }
    }
}
