// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider webhooks.
//!
//! Deliveries are acknowledged with 200 unless processing hit a storage
//! failure. Unsigned, badly signed, unparseable and unmatched events are
//! logged and dropped so the provider does not retry them.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    error::ApiError,
    models::WebhookAck,
    providers::{stripe, wise},
    state::AppState,
    workflow::{self, ReconcileOutcome},
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

fn ack() -> Json<WebhookAck> {
    Json(WebhookAck { received: true })
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn log_outcome(provider: &str, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Applied(t) => info!(
            provider,
            order_id = %t.order_id,
            previous = t.previous.as_str(),
            current = t.current.as_str(),
            "Webhook applied"
        ),
        ReconcileOutcome::Unmatched => info!(provider, "Webhook matched no order"),
        ReconcileOutcome::Ignored => {}
    }
}

/// Wise transfer state change.
#[utoipa::path(
    post,
    path = "/v1/webhooks/wise",
    tag = "Webhooks",
    request_body(content = String, description = "Raw Wise event JSON"),
    params(("X-Signature-SHA256" = Option<String>, Header, description = "Hex HMAC-SHA256 of the body")),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 500, description = "Storage failure, provider should retry")
    )
)]
pub async fn wise_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Err(e) = wise::verify_signature(
        state.config.wise_webhook_secret.as_deref(),
        header(&headers, wise::SIGNATURE_HEADER),
        &body,
    ) {
        warn!(error = %e, "Ignoring Wise webhook with unverified signature");
        return Ok(ack());
    }

    let event = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|payload| wise::parse_event(&payload));
    let Some(event) = event else {
        warn!("Ignoring Wise webhook without transfer id or state");
        return Ok(ack());
    };

    info!(
        event_type = %event.event_type,
        transfer_id = %event.transfer_id,
        current_state = %event.current_state,
        "Wise webhook received"
    );
    let outcome = workflow::reconcile_wise(&state, &event).await?;
    log_outcome("wise", &outcome);
    Ok(ack())
}

/// Stripe checkout session event.
#[utoipa::path(
    post,
    path = "/v1/webhooks/stripe",
    tag = "Webhooks",
    request_body(content = String, description = "Raw Stripe event JSON"),
    params(("Stripe-Signature" = Option<String>, Header, description = "t=<ts>,v1=<hmac>")),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 500, description = "Storage failure, provider should retry")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let Some(secret) = state.config.stripe.webhook_secret.as_deref() else {
        warn!("Ignoring Stripe webhook: webhook secret not configured");
        return Ok(ack());
    };
    let Some(signature) = header(&headers, STRIPE_SIGNATURE_HEADER) else {
        warn!("Ignoring Stripe webhook without signature header");
        return Ok(ack());
    };
    if let Err(e) = stripe::verify_signature(secret, signature, &body, Utc::now()) {
        warn!(error = %e, "Ignoring Stripe webhook with unverified signature");
        return Ok(ack());
    }

    let event = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|payload| stripe::parse_session_event(&payload));
    let Some(event) = event else {
        info!("Stripe event is not a checkout session event, ignoring");
        return Ok(ack());
    };

    info!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        session_id = %event.session_id,
        "Stripe webhook received"
    );
    let outcome = workflow::reconcile_stripe(&state, &event).await?;
    log_outcome("stripe", &outcome);
    Ok(ack())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::api::router;
    use crate::providers::{stripe, wise};
    use crate::storage::{AuditRepository, OrderRepository, PaymentStatus, StoredOrder};
    use crate::testing::{sample_order, test_context, TestContext, STRIPE_SECRET, WISE_SECRET};
    use crate::workflow::link_wise_transfer;

    fn wise_order(ctx: &TestContext) -> StoredOrder {
        let mut order = sample_order("order-wise", "VISA-20260101-0200");
        order.payment_method = crate::storage::PaymentMethod::Wise;
        ctx.state
            .db
            .write(|txn| OrderRepository::new(txn).insert(&order))
            .unwrap();
        link_wise_transfer(&ctx.state.db, &order.id, "48213").unwrap();
        order
    }

    fn load(ctx: &TestContext, id: &str) -> StoredOrder {
        ctx.state
            .db
            .read(|txn| OrderRepository::new(txn).require(id))
            .unwrap()
    }

    async fn post(
        ctx: &TestContext,
        uri: &str,
        headers: &[(&str, String)],
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = router(ctx.state.clone())
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn wise_body(transfer_id: &str, state: &str) -> String {
        serde_json::json!({
            "event_type": "transfers#state-change",
            "data": {
                "resource": { "id": transfer_id.parse::<u64>().unwrap(), "type": "transfer" },
                "current_state": state,
                "previous_state": "processing",
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn signed_wise_event_completes_order() {
        let ctx = test_context();
        let order = wise_order(&ctx);
        let body = wise_body("48213", "outgoing_payment_sent");
        let signature = wise::tests::sign(WISE_SECRET, body.as_bytes());

        let (status, json) = post(
            &ctx,
            "/v1/webhooks/wise",
            &[(wise::SIGNATURE_HEADER, signature)],
            &body,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["received"], true);
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Completed);
        assert_eq!(ctx.contracts.calls(), vec![order.id.clone()]);
        assert_eq!(ctx.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn unsigned_or_forged_wise_event_is_acked_without_processing() {
        let ctx = test_context();
        let order = wise_order(&ctx);
        let body = wise_body("48213", "outgoing_payment_sent");

        let (status, _) = post(&ctx, "/v1/webhooks/wise", &[], &body).await;
        assert_eq!(status, StatusCode::OK);

        let forged = wise::tests::sign("not-the-secret", body.as_bytes());
        let (status, _) = post(
            &ctx,
            "/v1/webhooks/wise",
            &[(wise::SIGNATURE_HEADER, forged)],
            &body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Pending);
        assert!(ctx.contracts.calls().is_empty());
        assert!(ctx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_transfer_is_acked_and_writes_nothing() {
        let ctx = test_context();
        let audit_before = AuditRepository::new(&ctx.state.db).list(None, 1000).unwrap().len();
        let body = wise_body("99999", "outgoing_payment_sent");
        let signature = wise::tests::sign(WISE_SECRET, body.as_bytes());

        let (status, json) = post(
            &ctx,
            "/v1/webhooks/wise",
            &[(wise::SIGNATURE_HEADER, signature)],
            &body,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["received"], true);
        let audit_after = AuditRepository::new(&ctx.state.db).list(None, 1000).unwrap().len();
        assert_eq!(audit_before, audit_after);
        assert!(ctx.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn signed_stripe_event_completes_order() {
        let ctx = test_context();
        let mut order = sample_order("order-card", "VISA-20260101-0201");
        order.stripe_session_id = Some("cs_test_abc".to_string());
        ctx.state
            .db
            .write(|txn| {
                let orders = OrderRepository::new(txn);
                orders.insert(&order)?;
                orders.link_provider_ref(
                    crate::storage::ProviderRef::StripeSession("cs_test_abc"),
                    &order.id,
                )
            })
            .unwrap();

        let body = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_abc",
                "payment_status": "paid",
                "metadata": { "order_id": order.id },
            }}
        })
        .to_string();
        let ts = chrono::Utc::now().timestamp();
        let signature = stripe::tests::sign(STRIPE_SECRET, ts, body.as_bytes());

        let (status, _) = post(
            &ctx,
            "/v1/webhooks/stripe",
            &[("stripe-signature", signature)],
            &body,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Completed);
        assert_eq!(ctx.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn stripe_event_with_bad_signature_is_ignored() {
        let ctx = test_context();
        let order = sample_order("order-card", "VISA-20260101-0202");
        ctx.state
            .db
            .write(|txn| OrderRepository::new(txn).insert(&order))
            .unwrap();
        let body = serde_json::json!({
            "id": "evt_2",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_zzz",
                "payment_status": "paid",
                "metadata": { "order_id": order.id },
            }}
        })
        .to_string();

        let (status, _) = post(
            &ctx,
            "/v1/webhooks/stripe",
            &[("stripe-signature", "t=1,v1=deadbeef".to_string())],
            &body,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(load(&ctx, &order.id).payment_status, PaymentStatus::Pending);
    }
}
