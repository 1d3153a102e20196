// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Order creation.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::audit_log;
use crate::error::WorkflowError;
use crate::fees::{gross_for, ExchangeRate};
use crate::storage::repository::generate_order_number;
use crate::storage::{
    AntiFraudRecord, AuditEvent, AuditEventType, CatalogRepository, ClientContact, DbError,
    DocumentReview, OrderDatabase, OrderMetadata, OrderRepository, PaymentMethod,
    PaymentRepository, PaymentStatus, StoredOrder, StoredPayment, VisaProduct,
};

/// Terms version recorded with every order's anti-fraud block.
pub const ANTI_FRAUD_VERSION: &str = "visa-terms-2026-01";

const ORDER_NUMBER_ATTEMPTS: usize = 8;

/// Validated checkout input.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub product_slug: String,
    pub seller_id: Option<String>,
    pub extra_units: u32,
    pub client: ClientContact,
    pub payment_method: PaymentMethod,
    pub contract_document_url: Option<String>,
    pub contract_selfie_url: Option<String>,
    pub zelle_proof_url: Option<String>,
    pub ip_address: Option<String>,
    pub service_request_id: Option<String>,
    pub terms_accepted: bool,
    pub data_authorization: bool,
}

/// A freshly written order and the product it was priced from.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: StoredOrder,
    pub product: VisaProduct,
}

fn validate(input: &NewOrder) -> Result<(), WorkflowError> {
    if input.product_slug.trim().is_empty() {
        return Err(WorkflowError::Validation("product_slug is required".to_string()));
    }
    if input.client.name.trim().is_empty() {
        return Err(WorkflowError::Validation("client_name is required".to_string()));
    }
    let email = input.client.email.trim();
    if email.is_empty() {
        return Err(WorkflowError::Validation("client_email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(WorkflowError::Validation(
            "client_email is not a valid email address".to_string(),
        ));
    }
    Ok(())
}

/// Price and persist a new pending order.
///
/// The payment row is written first and is best effort: if it fails the
/// order is still created without a `payment_id`. The order insert claims a
/// unique order number, regenerating it on collision.
pub fn create_order(
    db: &OrderDatabase,
    input: NewOrder,
    rate: Option<ExchangeRate>,
) -> Result<CreatedOrder, WorkflowError> {
    validate(&input)?;

    let (product, seller) = db.read(|txn| {
        let catalog = CatalogRepository::new(txn);
        let product = catalog.active_product(input.product_slug.trim())?;
        let seller = match input.seller_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Some(catalog.active_seller(id)?.ok_or_else(|| {
                WorkflowError::NotFound(format!("Seller {id} not found"))
            })?),
            _ => None,
        };
        Ok::<_, WorkflowError>((product, seller))
    })?;
    let product = product.ok_or_else(|| {
        WorkflowError::NotFound(format!("Product {} not found", input.product_slug.trim()))
    })?;

    let total_cents = product
        .total_cents(input.extra_units)
        .ok_or_else(|| WorkflowError::Validation("order total is too large".to_string()))?;
    let fees = gross_for(input.payment_method, total_cents, rate)?;

    let now = Utc::now();
    let order_id = uuid::Uuid::new_v4().to_string();
    let payment = StoredPayment {
        id: uuid::Uuid::new_v4().to_string(),
        order_id: order_id.clone(),
        amount_cents: fees.gross_cents(),
        currency: fees.currency().to_string(),
        status: PaymentStatus::Pending,
        provider: input.payment_method,
        external_id: None,
        created_at: now,
        updated_at: now,
    };
    let mut order = StoredOrder {
        id: order_id,
        order_number: String::new(),
        product_slug: product.slug.clone(),
        seller_id: seller.map(|s| s.seller_id),
        base_price_cents: product.base_price_cents,
        extra_units: input.extra_units,
        extra_unit_price_cents: product.extra_unit_price_cents,
        total_cents,
        payment_method: input.payment_method,
        payment_status: PaymentStatus::Pending,
        provider_status: None,
        contract_review: DocumentReview::default(),
        annex_review: DocumentReview::default(),
        stripe_session_id: None,
        wise_transfer_id: None,
        payment_id: None,
        client: trim_contact(input.client),
        contract_document_url: input.contract_document_url,
        contract_selfie_url: input.contract_selfie_url,
        zelle_proof_url: input.zelle_proof_url,
        service_request_id: input.service_request_id,
        metadata: OrderMetadata {
            fees,
            anti_fraud: AntiFraudRecord {
                ip_address: input.ip_address.clone(),
                terms_accepted: input.terms_accepted,
                data_authorization: input.data_authorization,
                accepted_at: now,
                version: ANTI_FRAUD_VERSION.to_string(),
            },
        },
        created_at: now,
        updated_at: now,
    };

    persist_order(db, &payment, &mut order)?;

    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        product_slug = %order.product_slug,
        payment_method = order.payment_method.as_str(),
        total_cents = order.total_cents,
        "Order created"
    );
    audit_log!(
        db,
        AuditEvent::new(AuditEventType::OrderCreated)
            .with_actor("client")
            .with_order(&order.id)
            .with_resource(&order.product_slug)
            .with_ip(input.ip_address)
            .with_details(json!({
                "order_number": order.order_number,
                "payment_method": order.payment_method.as_str(),
                "total_cents": order.total_cents,
                "gross_cents": order.metadata.fees.gross_cents(),
                "currency": order.metadata.fees.currency(),
            }))
    );

    Ok(CreatedOrder { order, product })
}

/// Best-effort payment row, then the order itself.
fn persist_order(
    db: &OrderDatabase,
    payment: &StoredPayment,
    order: &mut StoredOrder,
) -> Result<(), WorkflowError> {
    order.payment_id = match db.write(|txn| PaymentRepository::new(txn).insert(payment)) {
        Ok(()) => Some(payment.id.clone()),
        Err(e) => {
            warn!(order_id = %order.id, error = %e, "Failed to write payment row, continuing");
            None
        }
    };
    insert_with_unique_number(db, order)
}

fn insert_with_unique_number(
    db: &OrderDatabase,
    order: &mut StoredOrder,
) -> Result<(), WorkflowError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        order.order_number = generate_order_number(order.created_at)
            .map_err(|_| WorkflowError::Internal("order number generation failed".to_string()))?;
        match db.write(|txn| OrderRepository::new(txn).insert(order)) {
            Ok(()) => return Ok(()),
            Err(DbError::AlreadyExists(what)) => {
                warn!(order_id = %order.id, collision = %what, "Order number taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(WorkflowError::Conflict(
        "could not allocate a unique order number".to_string(),
    ))
}

fn trim_contact(contact: ClientContact) -> ClientContact {
    let trim_opt = |v: Option<String>| {
        v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    };
    ClientContact {
        name: contact.name.trim().to_string(),
        email: contact.email.trim().to_string(),
        whatsapp: trim_opt(contact.whatsapp),
        country: trim_opt(contact.country),
        nationality: trim_opt(contact.nationality),
        observations: trim_opt(contact.observations),
    }
}
