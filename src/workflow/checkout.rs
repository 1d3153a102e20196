// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Checkout entry points: hosted Stripe sessions, manual Wise/Zelle orders
//! and Wise transfer linking.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::orders::{create_order, CreatedOrder, NewOrder};
use crate::audit_log;
use crate::error::WorkflowError;
use crate::fx::resolve_brl_rate;
use crate::providers::{CheckoutSession, CheckoutSessionRequest};
use crate::state::AppState;
use crate::storage::{
    AuditEvent, AuditEventType, OrderDatabase, OrderRepository, PaymentMethod, PaymentRepository,
    ProviderRef, StoredOrder, WiseTransferRecord, WiseTransferRepository,
};

/// Result of a successful Stripe checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: StoredOrder,
    pub session: CheckoutSession,
}

/// Create a card or PIX order and its hosted Stripe session.
///
/// A provider failure is returned to the caller; the pending order stays
/// behind for the audit trail.
pub async fn start_checkout(
    state: &AppState,
    input: NewOrder,
    caller_rate: Option<f64>,
) -> Result<CheckoutOutcome, WorkflowError> {
    if !input.payment_method.is_stripe() {
        return Err(WorkflowError::Validation(
            "payment_method must be `card` or `pix` for a checkout session".to_string(),
        ));
    }

    let rate = match input.payment_method {
        PaymentMethod::Pix => Some(resolve_brl_rate(caller_rate, state.fx.as_ref()).await?),
        _ => None,
    };

    let CreatedOrder { order, product } = create_order(&state.db, input, rate)?;
    let request = session_request(state, &order, &product.name);

    let session = match state.checkout.create_session(&request).await {
        Ok(session) => session,
        Err(e) => {
            warn!(order_id = %order.id, error = %e, "Checkout session creation failed");
            audit_log!(
                &state.db,
                AuditEvent::new(AuditEventType::CheckoutSessionCreated)
                    .with_actor("stripe")
                    .with_order(&order.id)
                    .failed(e.to_string())
            );
            return Err(e.into());
        }
    };

    let order = state.db.write(|txn| {
        let orders = OrderRepository::new(txn);
        let mut order = orders.require(&order.id)?;
        order.stripe_session_id = Some(session.id.clone());
        order.updated_at = Utc::now();
        orders.update(&order)?;
        orders.link_provider_ref(ProviderRef::StripeSession(&session.id), &order.id)?;
        if let Some(payment_id) = &order.payment_id {
            if !PaymentRepository::new(txn).set_external_id(payment_id, &session.id)? {
                warn!(order_id = %order.id, payment_id = %payment_id, "Payment row missing, session id not mirrored");
            }
        }
        Ok::<_, WorkflowError>(order)
    })?;

    info!(
        order_id = %order.id,
        session_id = %session.id,
        payment_method = order.payment_method.as_str(),
        "Checkout session created"
    );
    audit_log!(
        &state.db,
        AuditEvent::new(AuditEventType::CheckoutSessionCreated)
            .with_actor("stripe")
            .with_order(&order.id)
            .with_details(json!({
                "session_id": session.id,
                "amount_cents": request.amount_cents,
                "currency": request.currency,
            }))
    );

    Ok(CheckoutOutcome { order, session })
}

fn session_request(state: &AppState, order: &StoredOrder, product_name: &str) -> CheckoutSessionRequest {
    let base = &state.config.app_url;
    let fees = &order.metadata.fees;
    let anti_fraud = &order.metadata.anti_fraud;

    let metadata = vec![
        ("order_id".to_string(), order.id.clone()),
        ("order_number".to_string(), order.order_number.clone()),
        ("product_slug".to_string(), order.product_slug.clone()),
        ("payment_method".to_string(), order.payment_method.as_str().to_string()),
        ("terms_accepted".to_string(), anti_fraud.terms_accepted.to_string()),
        ("data_authorization".to_string(), anti_fraud.data_authorization.to_string()),
        ("accepted_at".to_string(), anti_fraud.accepted_at.to_rfc3339()),
        ("anti_fraud_version".to_string(), anti_fraud.version.clone()),
        (
            "ip_address".to_string(),
            anti_fraud.ip_address.clone().unwrap_or_default(),
        ),
    ];

    CheckoutSessionRequest {
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        product_name: product_name.to_string(),
        payment_method: order.payment_method,
        amount_cents: fees.gross_cents(),
        currency: fees.currency().to_ascii_lowercase(),
        customer_email: order.client.email.clone(),
        success_url: format!(
            "{base}/checkout/visa/success?session_id={{CHECKOUT_SESSION_ID}}&order_id={}",
            order.id
        ),
        cancel_url: format!("{base}/checkout/visa/{}?canceled=true", order.product_slug),
        metadata,
    }
}

/// Create a Wise or Zelle order. Gross equals net; nothing is charged here.
pub fn create_manual_order(state: &AppState, input: NewOrder) -> Result<StoredOrder, WorkflowError> {
    if input.payment_method.is_stripe() {
        return Err(WorkflowError::Validation(
            "payment_method must be `wise` or `zelle` for a manual order".to_string(),
        ));
    }
    Ok(create_order(&state.db, input, None)?.order)
}

/// Attach a Wise transfer to a Wise order so its webhooks can be matched.
///
/// Linking the same pair again is a no-op. A transfer can belong to one
/// order only, and an order to one transfer.
pub fn link_wise_transfer(
    db: &OrderDatabase,
    order_id: &str,
    transfer_id: &str,
) -> Result<WiseTransferRecord, WorkflowError> {
    let transfer_id = transfer_id.trim();
    if transfer_id.is_empty() {
        return Err(WorkflowError::Validation("transfer_id is required".to_string()));
    }
    let now = Utc::now();

    let (record, newly_linked) = db.write(|txn| {
        let orders = OrderRepository::new(txn);
        let transfers = WiseTransferRepository::new(txn);
        let reference = ProviderRef::WiseTransfer(transfer_id);

        let mut order = orders.require(order_id)?;
        if order.payment_method != PaymentMethod::Wise {
            return Err(WorkflowError::Validation(format!(
                "order {order_id} is not a Wise order"
            )));
        }
        if let Some(owner) = orders.provider_ref_owner(reference)? {
            if owner != order.id {
                return Err(WorkflowError::Conflict(format!(
                    "transfer {transfer_id} is already linked to another order"
                )));
            }
        }
        match order.wise_transfer_id.as_deref() {
            Some(existing) if existing != transfer_id => {
                return Err(WorkflowError::Conflict(format!(
                    "order {order_id} is already linked to transfer {existing}"
                )));
            }
            Some(_) => {
                if let Some(record) = transfers.get(transfer_id)? {
                    return Ok((record, false));
                }
            }
            None => {}
        }

        let record = match transfers.get(transfer_id)? {
            Some(record) => record,
            None => {
                let record = WiseTransferRecord::new(transfer_id, &order.id, now);
                transfers.insert(&record)?;
                record
            }
        };
        orders.link_provider_ref(reference, &order.id)?;
        order.wise_transfer_id = Some(transfer_id.to_string());
        order.updated_at = now;
        orders.update(&order)?;
        if let Some(payment_id) = &order.payment_id {
            PaymentRepository::new(txn).set_external_id(payment_id, transfer_id)?;
        }
        Ok((record, true))
    })?;

    if newly_linked {
        info!(order_id, transfer_id, "Wise transfer linked");
        audit_log!(
            db,
            AuditEvent::new(AuditEventType::WiseTransferLinked)
                .with_actor("client")
                .with_order(order_id)
                .with_resource(transfer_id)
        );
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::storage::{DbError, PaymentStatus};
    use crate::testing::test_context;
    use crate::workflow::orders::tests::new_order;

    #[tokio::test]
    async fn card_checkout_links_session_to_order_and_payment() {
        let ctx = test_context();
        let outcome = start_checkout(&ctx.state, new_order("b1", 2, PaymentMethod::Card), None)
            .await
            .unwrap();

        assert_eq!(outcome.session.id, "cs_test_1");
        assert_eq!(outcome.order.stripe_session_id.as_deref(), Some("cs_test_1"));

        let requests = ctx.checkout.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.amount_cents, 14_576);
        assert_eq!(request.currency, "usd");
        assert_eq!(
            request.cancel_url,
            "https://app.example.com/checkout/visa/b1?canceled=true"
        );
        assert!(request
            .success_url
            .starts_with("https://app.example.com/checkout/visa/success?session_id={CHECKOUT_SESSION_ID}"));
        assert!(request
            .metadata
            .iter()
            .any(|(k, v)| k == "order_id" && v == &outcome.order.id));
        assert!(request
            .metadata
            .iter()
            .any(|(k, v)| k == "terms_accepted" && v == "true"));

        let (by_session, payment) = ctx
            .state
            .db
            .read(|txn| {
                let order = OrderRepository::new(txn)
                    .find_by_provider_ref(ProviderRef::StripeSession("cs_test_1"))?;
                let payment = PaymentRepository::new(txn)
                    .get(outcome.order.payment_id.as_deref().unwrap())?;
                Ok::<_, DbError>((order, payment))
            })
            .unwrap();
        assert_eq!(by_session.map(|o| o.id), Some(outcome.order.id.clone()));
        assert_eq!(payment.unwrap().external_id.as_deref(), Some("cs_test_1"));
    }

    #[tokio::test]
    async fn pix_checkout_uses_live_rate_with_margin() {
        let ctx = test_context();
        let outcome = start_checkout(&ctx.state, new_order("b1", 0, PaymentMethod::Pix), None)
            .await
            .unwrap();
        let request = &ctx.checkout.requests()[0];
        assert_eq!(request.currency, "brl");
        // 10000 USD cents at 5.0 * 1.04, grossed up by 1.79%
        assert_eq!(request.amount_cents, 52_948);
        assert_eq!(outcome.order.metadata.fees.gross_cents(), 52_948);
    }

    #[tokio::test]
    async fn manual_methods_are_rejected_for_sessions() {
        let ctx = test_context();
        let err = start_checkout(&ctx.state, new_order("b1", 0, PaymentMethod::Wise), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(ctx.checkout.requests().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_stripe_is_a_provider_error() {
        let mut ctx = test_context();
        ctx.state.checkout = std::sync::Arc::new(crate::providers::stripe::UnconfiguredCheckout);
        let err = start_checkout(&ctx.state, new_order("b1", 0, PaymentMethod::Card), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Provider(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn manual_order_has_no_fee() {
        let ctx = test_context();
        let order = create_manual_order(&ctx.state, new_order("b1", 1, PaymentMethod::Zelle)).unwrap();
        assert_eq!(order.total_cents, 12_000);
        assert_eq!(order.metadata.fees.gross_cents(), 12_000);
        assert_eq!(order.payment_status, PaymentStatus::Pending);

        let err = create_manual_order(&ctx.state, new_order("b1", 1, PaymentMethod::Card)).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn wise_transfer_linking_rules() {
        let ctx = test_context();
        let db = &ctx.state.db;
        let first = create_manual_order(&ctx.state, new_order("b1", 0, PaymentMethod::Wise)).unwrap();
        let second = create_manual_order(&ctx.state, new_order("b1", 0, PaymentMethod::Wise)).unwrap();
        let zelle = create_manual_order(&ctx.state, new_order("b1", 0, PaymentMethod::Zelle)).unwrap();

        let record = link_wise_transfer(db, &first.id, "9001").unwrap();
        assert_eq!(record.current_state, "incoming_payment_waiting");
        assert_eq!(record.order_id, first.id);

        // Same pair again is accepted.
        link_wise_transfer(db, &first.id, "9001").unwrap();

        assert!(matches!(
            link_wise_transfer(db, &second.id, "9001"),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(matches!(
            link_wise_transfer(db, &first.id, "9002"),
            Err(WorkflowError::Conflict(_))
        ));
        assert!(matches!(
            link_wise_transfer(db, &zelle.id, "9003"),
            Err(WorkflowError::Validation(_))
        ));

        let linked = db
            .read(|txn| OrderRepository::new(txn).find_by_provider_ref(ProviderRef::WiseTransfer("9001")))
            .unwrap()
            .unwrap();
        assert_eq!(linked.id, first.id);
        assert_eq!(linked.wise_transfer_id.as_deref(), Some("9001"));
    }
}
