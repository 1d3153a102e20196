// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Reconciliation
//!
//! Maps provider events (Wise transfer states, Stripe checkout sessions) and
//! admin Zelle decisions onto the order's payment status.
//!
//! Status is always *set*, never incremented, so a repeated event lands on
//! the same final state. Completion side effects (contract PDF, confirmation
//! email) are enqueued only on the transition into `completed`, under fixed
//! idempotency keys, so duplicate deliveries never resend them.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde_json::json;
use tracing::{info, warn};

use super::{link_base, required};
use crate::audit_log;
use crate::error::WorkflowError;
use crate::fees::format_cents;
use crate::mail::templates;
use crate::providers::stripe::StripeSessionEvent;
use crate::providers::wise::{classify_state, WiseEvent, WiseStateClass};
use crate::state::AppState;
use crate::storage::{
    AuditEvent, AuditEventType, OrderRepository, OutboxEffect, OutboxRepository, PaymentMethod,
    PaymentRepository, PaymentStatus, ProviderRef, StoredOrder, WiseTransferRepository,
};

/// A status update applied to one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub order_id: String,
    pub order_number: String,
    pub previous: PaymentStatus,
    pub current: PaymentStatus,
    pub provider_status: String,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No order matched the provider reference; nothing was written.
    Unmatched,
    /// The event type carries no payment information.
    Ignored,
    Applied(Transition),
}

/// Set the order's status inside `txn`, mirror it onto the payment row and
/// enqueue the completion effects when the order just became completed.
fn apply_status(
    txn: &WriteTransaction,
    order: &mut StoredOrder,
    target: Option<PaymentStatus>,
    provider_status: &str,
    now: DateTime<Utc>,
) -> Result<Transition, WorkflowError> {
    let previous = order.payment_status;
    if let Some(status) = target {
        order.payment_status = status;
    }
    order.provider_status = Some(provider_status.to_string());
    order.updated_at = now;
    OrderRepository::new(txn).update(order)?;

    if let Some(payment_id) = &order.payment_id {
        if !PaymentRepository::new(txn).set_status(payment_id, order.payment_status)? {
            warn!(order_id = %order.id, payment_id = %payment_id, "Payment row missing, status not mirrored");
        }
    }

    if previous != PaymentStatus::Completed && order.payment_status == PaymentStatus::Completed {
        enqueue_completion_effects(txn, order, now)?;
    }

    Ok(Transition {
        order_id: order.id.clone(),
        order_number: order.order_number.clone(),
        previous,
        current: order.payment_status,
        provider_status: provider_status.to_string(),
    })
}

fn enqueue_completion_effects(
    txn: &WriteTransaction,
    order: &StoredOrder,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    let outbox = OutboxRepository::new(txn);
    outbox.enqueue(
        &format!("{}:completed:contract", order.id),
        &order.id,
        OutboxEffect::GenerateContract {
            order_id: order.id.clone(),
        },
        now,
    )?;

    let fees = &order.metadata.fees;
    let message = templates::payment_confirmed(
        &order.client.email,
        &order.client.name,
        &order.order_number,
        &format_cents(fees.gross_cents()),
        fees.currency(),
    );
    outbox.enqueue(
        &format!("{}:completed:email", order.id),
        &order.id,
        OutboxEffect::SendEmail { message },
        now,
    )?;
    Ok(())
}

fn audit_transition(
    state: &AppState,
    event_type: AuditEventType,
    actor: &str,
    t: &Transition,
    mut details: serde_json::Value,
) {
    if let Some(map) = details.as_object_mut() {
        map.insert("previous_status".to_string(), json!(t.previous.as_str()));
        map.insert("status".to_string(), json!(t.current.as_str()));
        map.insert("provider_status".to_string(), json!(t.provider_status));
    }
    audit_log!(
        &state.db,
        AuditEvent::new(event_type)
            .with_actor(actor)
            .with_order(&t.order_id)
            .with_details(details)
    );
}

/// Apply a verified Wise transfer state change.
///
/// An unknown transfer is logged and dropped without any write.
pub async fn reconcile_wise(
    state: &AppState,
    event: &WiseEvent,
) -> Result<ReconcileOutcome, WorkflowError> {
    let reference = ProviderRef::WiseTransfer(&event.transfer_id);
    let Some(order_id) = state
        .db
        .read(|txn| OrderRepository::new(txn).provider_ref_owner(reference))?
    else {
        warn!(
            transfer_id = %event.transfer_id,
            state = %event.current_state,
            "Wise event for unknown transfer, ignoring"
        );
        return Ok(ReconcileOutcome::Unmatched);
    };

    let class = classify_state(&event.current_state);
    if class == WiseStateClass::Unknown {
        warn!(
            transfer_id = %event.transfer_id,
            state = %event.current_state,
            "Unrecognised Wise transfer state, status unchanged"
        );
    }

    let now = Utc::now();
    let transition = state.db.write(|txn| {
        let mut order = OrderRepository::new(txn).require(&order_id)?;
        WiseTransferRepository::new(txn).record_state(
            &event.transfer_id,
            &order.id,
            &event.current_state,
            now,
        )?;
        apply_status(txn, &mut order, class.target_status(), &event.current_state, now)
    })?;

    info!(
        order_id = %transition.order_id,
        transfer_id = %event.transfer_id,
        state = %event.current_state,
        status = transition.current.as_str(),
        changed = transition.changed(),
        "Wise event reconciled"
    );
    state.outbox.dispatch_for_order(&transition.order_id).await;
    audit_transition(
        state,
        AuditEventType::PaymentReconciled,
        "wise",
        &transition,
        json!({
            "transfer_id": event.transfer_id,
            "event_type": event.event_type,
            "previous_state": event.previous_state,
            "occurred_at": event.occurred_at,
        }),
    );
    Ok(ReconcileOutcome::Applied(transition))
}

/// Target status for a checkout session event. `None` means the event type
/// is not one we act on; `Some(None)` records the provider status only.
fn stripe_target(event: &StripeSessionEvent) -> Option<Option<PaymentStatus>> {
    match event.event_type.as_str() {
        "checkout.session.completed" => match event.payment_status.as_deref() {
            Some("paid") | Some("no_payment_required") => Some(Some(PaymentStatus::Completed)),
            _ => Some(None),
        },
        "checkout.session.async_payment_succeeded" => Some(Some(PaymentStatus::Completed)),
        "checkout.session.async_payment_failed" => Some(Some(PaymentStatus::Failed)),
        "checkout.session.expired" => Some(Some(PaymentStatus::Cancelled)),
        _ => None,
    }
}

/// Apply a verified Stripe checkout session event.
///
/// The order is found by session id, falling back to `metadata.order_id`.
pub async fn reconcile_stripe(
    state: &AppState,
    event: &StripeSessionEvent,
) -> Result<ReconcileOutcome, WorkflowError> {
    let Some(target) = stripe_target(event) else {
        info!(event_type = %event.event_type, "Stripe event type not handled, ignoring");
        return Ok(ReconcileOutcome::Ignored);
    };

    let reference = ProviderRef::StripeSession(&event.session_id);
    let order_id = state.db.read(|txn| {
        let orders = OrderRepository::new(txn);
        if let Some(id) = orders.provider_ref_owner(reference)? {
            return Ok::<_, WorkflowError>(Some(id));
        }
        match event.order_id.as_deref() {
            Some(id) => Ok(orders.get(id)?.map(|o| o.id)),
            None => Ok(None),
        }
    })?;
    let Some(order_id) = order_id else {
        warn!(
            session_id = %event.session_id,
            event_type = %event.event_type,
            "Stripe event for unknown session, ignoring"
        );
        return Ok(ReconcileOutcome::Unmatched);
    };

    let kind = event
        .event_type
        .trim_start_matches("checkout.session.")
        .to_string();
    let provider_status = match &event.payment_status {
        Some(payment_status) => format!("{kind}:{payment_status}"),
        None => kind,
    };

    let now = Utc::now();
    let transition = state.db.write(|txn| {
        let orders = OrderRepository::new(txn);
        let mut order = orders.require(&order_id)?;
        if order.stripe_session_id.is_none() {
            order.stripe_session_id = Some(event.session_id.clone());
            orders.link_provider_ref(reference, &order.id)?;
        }
        apply_status(txn, &mut order, target, &provider_status, now)
    })?;

    info!(
        order_id = %transition.order_id,
        session_id = %event.session_id,
        event_type = %event.event_type,
        status = transition.current.as_str(),
        changed = transition.changed(),
        "Stripe event reconciled"
    );
    state.outbox.dispatch_for_order(&transition.order_id).await;
    audit_transition(
        state,
        AuditEventType::PaymentReconciled,
        "stripe",
        &transition,
        json!({
            "event_id": event.event_id,
            "event_type": event.event_type,
            "session_id": event.session_id,
        }),
    );
    Ok(ReconcileOutcome::Applied(transition))
}

fn require_zelle(order: &StoredOrder) -> Result<(), WorkflowError> {
    if order.payment_method != PaymentMethod::Zelle {
        return Err(WorkflowError::Validation(format!(
            "order {} is not a Zelle order",
            order.id
        )));
    }
    Ok(())
}

/// Admin confirmation that a Zelle payment arrived.
pub async fn approve_zelle(
    state: &AppState,
    order_id: &str,
    reviewed_by: Option<&str>,
) -> Result<Transition, WorkflowError> {
    let reviewer = required(reviewed_by, "reviewed_by")?;
    let now = Utc::now();

    let transition = state.db.write(|txn| {
        let mut order = OrderRepository::new(txn).require(order_id)?;
        require_zelle(&order)?;
        apply_status(txn, &mut order, Some(PaymentStatus::Completed), "zelle_approved", now)
    })?;

    info!(order_id, reviewed_by = reviewer, "Zelle payment approved");
    state.outbox.dispatch_for_order(&transition.order_id).await;
    audit_transition(state, AuditEventType::ZelleApproved, reviewer, &transition, json!({}));
    Ok(transition)
}

/// Admin rejection of a Zelle proof of payment. The client is emailed the
/// reason and a link to send a new proof.
pub async fn reject_zelle(
    state: &AppState,
    order_id: &str,
    reviewed_by: Option<&str>,
    rejection_reason: Option<&str>,
    app_url: Option<&str>,
) -> Result<Transition, WorkflowError> {
    let reviewer = required(reviewed_by, "reviewed_by")?;
    let reason = required(rejection_reason, "rejection_reason")?;
    let base = link_base(&state.config, app_url)?;
    let now = Utc::now();

    let transition = state.db.write(|txn| {
        let mut order = OrderRepository::new(txn).require(order_id)?;
        require_zelle(&order)?;
        let transition =
            apply_status(txn, &mut order, Some(PaymentStatus::Failed), "zelle_rejected", now)?;

        let proof_url = format!(
            "{base}/checkout/visa/zelle-proof?order={}",
            order.order_number
        );
        let message = templates::zelle_payment_rejected(
            &order.client.email,
            &order.client.name,
            &order.order_number,
            reason,
            &proof_url,
        );
        OutboxRepository::new(txn).enqueue(
            &format!("{}:zelle-rejected:{}", order.id, uuid::Uuid::new_v4()),
            &order.id,
            OutboxEffect::SendEmail { message },
            now,
        )?;
        Ok::<_, WorkflowError>(transition)
    })?;

    info!(order_id, reviewed_by = reviewer, "Zelle payment rejected");
    state.outbox.dispatch_for_order(&transition.order_id).await;
    audit_transition(
        state,
        AuditEventType::ZelleRejected,
        reviewer,
        &transition,
        json!({ "rejection_reason": reason }),
    );
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AuditRepository, DbError, StoredPayment, WiseTransferRecord};
    use crate::testing::{sample_order, test_context, TestContext};
    use crate::workflow::checkout::link_wise_transfer;

    fn wise_event(transfer_id: &str, state: &str) -> WiseEvent {
        WiseEvent {
            event_type: "transfers#state-change".to_string(),
            transfer_id: transfer_id.to_string(),
            current_state: state.to_string(),
            previous_state: None,
            occurred_at: None,
        }
    }

    /// A pending Wise order linked to transfer `t-100`, with a payment row.
    fn wise_order(ctx: &TestContext) -> StoredOrder {
        let mut order = sample_order("order-wise", "VISA-20260101-0100");
        order.payment_method = PaymentMethod::Wise;
        order.payment_id = Some("pay-1".to_string());
        let payment = StoredPayment {
            id: "pay-1".to_string(),
            order_id: order.id.clone(),
            amount_cents: 14_000,
            currency: "USD".to_string(),
            status: PaymentStatus::Pending,
            provider: PaymentMethod::Wise,
            external_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        ctx.state
            .db
            .write(|txn| {
                PaymentRepository::new(txn).insert(&payment)?;
                OrderRepository::new(txn).insert(&order)
            })
            .unwrap();
        link_wise_transfer(&ctx.state.db, &order.id, "t-100").unwrap();
        order
    }

    fn load(ctx: &TestContext, order_id: &str) -> StoredOrder {
        ctx.state
            .db
            .read(|txn| OrderRepository::new(txn).require(order_id))
            .unwrap()
    }

    #[tokio::test]
    async fn outgoing_payment_sent_completes_order_once() {
        let ctx = test_context();
        let order = wise_order(&ctx);

        let outcome = reconcile_wise(&ctx.state, &wise_event("t-100", "outgoing_payment_sent"))
            .await
            .unwrap();
        let ReconcileOutcome::Applied(transition) = outcome else {
            panic!("expected a transition");
        };
        assert_eq!(transition.previous, PaymentStatus::Pending);
        assert_eq!(transition.current, PaymentStatus::Completed);

        let stored = load(&ctx, &order.id);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(stored.provider_status.as_deref(), Some("outgoing_payment_sent"));
        assert_eq!(ctx.contracts.calls(), vec![order.id.clone()]);
        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "client@example.com");
        assert!(sent[0].subject.contains("VISA-20260101-0100"));

        let (payment, record) = ctx
            .state
            .db
            .read(|txn| {
                Ok::<_, DbError>((
                    PaymentRepository::new(txn).get("pay-1")?,
                    WiseTransferRepository::new(txn).get("t-100")?,
                ))
            })
            .unwrap();
        assert_eq!(payment.unwrap().status, PaymentStatus::Completed);
        let record: WiseTransferRecord = record.unwrap();
        assert_eq!(record.current_state, "outgoing_payment_sent");
        assert_eq!(record.previous_state.as_deref(), Some("incoming_payment_waiting"));
    }

    #[tokio::test]
    async fn duplicate_wise_event_is_idempotent() {
        let ctx = test_context();
        let order = wise_order(&ctx);
        let event = wise_event("t-100", "funds_sent");

        reconcile_wise(&ctx.state, &event).await.unwrap();
        let second = reconcile_wise(&ctx.state, &event).await.unwrap();
        let ReconcileOutcome::Applied(transition) = second else {
            panic!("expected a transition");
        };
        assert!(!transition.changed());
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Completed);
        assert_eq!(ctx.contracts.calls().len(), 1);
        assert_eq!(ctx.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn unknown_transfer_writes_nothing() {
        let ctx = test_context();
        let order = wise_order(&ctx);
        let before = load(&ctx, &order.id);
        let audit_before = AuditRepository::new(&ctx.state.db).list(None, 100).unwrap().len();

        let outcome = reconcile_wise(&ctx.state, &wise_event("t-999", "outgoing_payment_sent"))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unmatched);

        assert_eq!(load(&ctx, &order.id), before);
        let (record, audit_after) = (
            ctx.state
                .db
                .read(|txn| WiseTransferRepository::new(txn).get("t-999"))
                .unwrap(),
            AuditRepository::new(&ctx.state.db).list(None, 100).unwrap().len(),
        );
        assert!(record.is_none());
        assert_eq!(audit_after, audit_before);
        assert!(ctx.mailer.sent().is_empty());
        assert!(ctx.contracts.calls().is_empty());
    }

    #[tokio::test]
    async fn in_progress_and_failure_states() {
        let ctx = test_context();
        let order = wise_order(&ctx);

        reconcile_wise(&ctx.state, &wise_event("t-100", "funds_converted"))
            .await
            .unwrap();
        let stored = load(&ctx, &order.id);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.provider_status.as_deref(), Some("funds_converted"));

        reconcile_wise(&ctx.state, &wise_event("t-100", "something_new"))
            .await
            .unwrap();
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Pending);

        reconcile_wise(&ctx.state, &wise_event("t-100", "bounced_back"))
            .await
            .unwrap();
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Failed);

        reconcile_wise(&ctx.state, &wise_event("t-100", "cancelled"))
            .await
            .unwrap();
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Cancelled);
        assert!(ctx.mailer.sent().is_empty());
    }

    fn stripe_event(event_type: &str, payment_status: Option<&str>) -> StripeSessionEvent {
        StripeSessionEvent {
            event_id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            session_id: "cs_live_1".to_string(),
            payment_status: payment_status.map(str::to_string),
            order_id: Some("order-card".to_string()),
        }
    }

    #[tokio::test]
    async fn stripe_events_map_to_statuses() {
        let ctx = test_context();
        let order = sample_order("order-card", "VISA-20260101-0200");
        ctx.state
            .db
            .write(|txn| OrderRepository::new(txn).insert(&order))
            .unwrap();

        // Unpaid completion only records the provider status; the fallback
        // lookup by metadata links the session.
        reconcile_stripe(&ctx.state, &stripe_event("checkout.session.completed", Some("unpaid")))
            .await
            .unwrap();
        let stored = load(&ctx, "order-card");
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(stored.provider_status.as_deref(), Some("completed:unpaid"));
        assert_eq!(stored.stripe_session_id.as_deref(), Some("cs_live_1"));

        let mut by_session = stripe_event("checkout.session.async_payment_succeeded", None);
        by_session.order_id = None;
        reconcile_stripe(&ctx.state, &by_session).await.unwrap();
        assert_eq!(load(&ctx, "order-card").payment_status, PaymentStatus::Completed);
        assert_eq!(ctx.mailer.sent().len(), 1);
        assert_eq!(ctx.contracts.calls().len(), 1);

        let ignored = reconcile_stripe(&ctx.state, &stripe_event("checkout.session.other", None))
            .await
            .unwrap();
        assert_eq!(ignored, ReconcileOutcome::Ignored);

        let mut unknown = stripe_event("checkout.session.expired", None);
        unknown.session_id = "cs_unknown".to_string();
        unknown.order_id = None;
        assert_eq!(
            reconcile_stripe(&ctx.state, &unknown).await.unwrap(),
            ReconcileOutcome::Unmatched
        );
    }

    #[test]
    fn stripe_target_mapping() {
        let target = |t: &str, s: Option<&str>| stripe_target(&stripe_event(t, s));
        assert_eq!(
            target("checkout.session.completed", Some("paid")),
            Some(Some(PaymentStatus::Completed))
        );
        assert_eq!(
            target("checkout.session.completed", Some("no_payment_required")),
            Some(Some(PaymentStatus::Completed))
        );
        assert_eq!(target("checkout.session.completed", Some("unpaid")), Some(None));
        assert_eq!(
            target("checkout.session.async_payment_failed", None),
            Some(Some(PaymentStatus::Failed))
        );
        assert_eq!(
            target("checkout.session.expired", None),
            Some(Some(PaymentStatus::Cancelled))
        );
        assert_eq!(target("checkout.session.created", None), None);
    }

    fn zelle_order(ctx: &TestContext) -> StoredOrder {
        let mut order = sample_order("order-zelle", "VISA-20260101-0300");
        order.payment_method = PaymentMethod::Zelle;
        ctx.state
            .db
            .write(|txn| OrderRepository::new(txn).insert(&order))
            .unwrap();
        order
    }

    #[tokio::test]
    async fn zelle_approval_completes_with_side_effects() {
        let ctx = test_context();
        let order = zelle_order(&ctx);

        assert!(matches!(
            approve_zelle(&ctx.state, &order.id, None).await,
            Err(WorkflowError::Validation(_))
        ));

        let transition = approve_zelle(&ctx.state, &order.id, Some("admin-1")).await.unwrap();
        assert_eq!(transition.current, PaymentStatus::Completed);
        assert_eq!(ctx.contracts.calls(), vec![order.id.clone()]);
        assert_eq!(ctx.mailer.sent().len(), 1);

        let events = AuditRepository::new(&ctx.state.db)
            .list(Some(&order.id), 10)
            .unwrap();
        assert_eq!(events[0].event_type, AuditEventType::ZelleApproved);
        assert_eq!(events[0].actor.as_deref(), Some("admin-1"));
    }

    #[tokio::test]
    async fn zelle_rejection_fails_order_and_emails_proof_link() {
        let ctx = test_context();
        let order = zelle_order(&ctx);

        assert!(matches!(
            reject_zelle(&ctx.state, &order.id, Some("admin-1"), None, None).await,
            Err(WorkflowError::Validation(_))
        ));

        let transition = reject_zelle(
            &ctx.state,
            &order.id,
            Some("admin-1"),
            Some("Amount does not match"),
            None,
        )
        .await
        .unwrap();
        assert_eq!(transition.current, PaymentStatus::Failed);
        assert!(ctx.contracts.calls().is_empty());

        let sent = ctx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .html
            .contains("https://app.example.com/checkout/visa/zelle-proof?order=VISA-20260101-0300"));
        assert!(sent[0].html.contains("Amount does not match"));
    }

    #[tokio::test]
    async fn zelle_actions_require_zelle_orders() {
        let ctx = test_context();
        let card = sample_order("order-card", "VISA-20260101-0400");
        ctx.state
            .db
            .write(|txn| OrderRepository::new(txn).insert(&card))
            .unwrap();

        assert!(matches!(
            approve_zelle(&ctx.state, &card.id, Some("admin-1")).await,
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            approve_zelle(&ctx.state, "missing", Some("admin-1")).await,
            Err(WorkflowError::NotFound(_))
        ));
        assert_eq!(load(&ctx, &card.id).payment_status, PaymentStatus::Pending);
    }
}
