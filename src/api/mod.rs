// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::HeaderName,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    fees::{ExchangeRate, FeeBreakdown, RateSource},
    models::{
        ActionResponse, AdminOrderDetail, AuditLogResponse, CheckoutRequest,
        CheckoutSessionResponse, ContractViewResponse, LinkWiseTransferRequest,
        ManualOrderResponse, OrderListResponse, ProductResponse, ProductUpsertRequest,
        ResubmissionDetailsResponse, ResubmitRequest, ReviewRequest, SellerUpsertRequest,
        TransitionResponse, WebhookAck, ZelleApproveRequest, ZelleRejectRequest,
    },
    state::AppState,
    storage::{
        AntiFraudRecord, ApprovalStatus, AuditEvent, AuditEventType, CalculationType,
        ClientContact, ContractToken, DocumentKind, DocumentReview, OrderMetadata, OutboxEffect,
        OutboxEntry, PaymentMethod, PaymentStatus, Seller, StoredOrder, StoredPayment, TokenKind,
        VisaProduct, WiseTransferRecord,
    },
};

pub mod admin;
pub mod checkout;
pub mod contracts;
pub mod extract;
pub mod health;
pub mod webhooks;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/checkout/session", post(checkout::create_checkout_session))
        .route("/checkout/manual", post(checkout::create_manual_order))
        .route(
            "/orders/{order_id}/wise-transfer",
            post(checkout::link_wise_transfer),
        )
        .route("/products/{slug}", get(checkout::get_product))
        .route("/webhooks/wise", post(webhooks::wise_webhook))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/contracts/approve", post(contracts::approve_contract))
        .route("/contracts/reject", post(contracts::reject_contract))
        .route("/contracts/view", get(contracts::view_contract))
        .route(
            "/contracts/resubmit",
            get(contracts::resubmission_details).post(contracts::resubmit_documents),
        )
        .route("/admin/products/{slug}", put(admin::upsert_product))
        .route("/admin/sellers/{seller_id}", put(admin::upsert_seller))
        .route("/admin/orders", get(admin::list_orders))
        .route("/admin/orders/{order_id}", get(admin::get_order))
        .route("/admin/audit", get(admin::query_audit_logs))
        .route("/admin/zelle/approve", post(admin::approve_zelle))
        .route("/admin/zelle/reject", post(admin::reject_zelle))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(CorsLayer::permissive()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        checkout::create_checkout_session,
        checkout::create_manual_order,
        checkout::link_wise_transfer,
        checkout::get_product,
        webhooks::wise_webhook,
        webhooks::stripe_webhook,
        contracts::approve_contract,
        contracts::reject_contract,
        contracts::view_contract,
        contracts::resubmission_details,
        contracts::resubmit_documents,
        admin::upsert_product,
        admin::upsert_seller,
        admin::get_order,
        admin::list_orders,
        admin::query_audit_logs,
        admin::approve_zelle,
        admin::reject_zelle
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            CheckoutRequest,
            CheckoutSessionResponse,
            ManualOrderResponse,
            LinkWiseTransferRequest,
            ProductResponse,
            WebhookAck,
            ReviewRequest,
            ActionResponse,
            ContractViewResponse,
            ResubmissionDetailsResponse,
            ResubmitRequest,
            ProductUpsertRequest,
            SellerUpsertRequest,
            AdminOrderDetail,
            OrderListResponse,
            AuditLogResponse,
            ZelleApproveRequest,
            ZelleRejectRequest,
            TransitionResponse,
            StoredOrder,
            StoredPayment,
            OrderMetadata,
            AntiFraudRecord,
            ClientContact,
            DocumentReview,
            DocumentKind,
            ApprovalStatus,
            PaymentMethod,
            PaymentStatus,
            FeeBreakdown,
            ExchangeRate,
            RateSource,
            VisaProduct,
            Seller,
            CalculationType,
            ContractToken,
            TokenKind,
            WiseTransferRecord,
            OutboxEntry,
            OutboxEffect,
            AuditEvent,
            AuditEventType
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Checkout", description = "Order creation and payment sessions"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Contracts", description = "Contract review and client document links"),
        (name = "Admin", description = "Back-office catalog, orders, audit and Zelle review")
    )
)]
struct ApiDoc;
