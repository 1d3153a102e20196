// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for the back-office.
//!
//! These endpoints require the admin bearer token and provide:
//! - Catalog maintenance (products, sellers)
//! - Order reads with linked payment, tokens and side effects
//! - Audit log queries
//! - Manual Zelle payment decisions

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde_json::json;

use super::extract::{ActionJson, ApiJson};
use crate::{
    audit_log,
    auth::AdminOnly,
    error::{ActionError, ApiError},
    fees::parse_amount_to_cents,
    models::{
        AdminOrderDetail, AuditLogResponse, AuditQueryParams, OrderListQuery, OrderListResponse,
        ProductUpsertRequest, SellerUpsertRequest, TransitionResponse, ZelleApproveRequest,
        ZelleRejectRequest,
    },
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, CatalogRepository, DbError,
        OrderRepository, OutboxRepository, PaymentRepository, Seller, TokenRepository,
        VisaProduct, WiseTransferRepository,
    },
    workflow,
};

const DEFAULT_ORDER_LIMIT: usize = 50;
const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 500;

fn storage_error(context: &str, err: DbError) -> ApiError {
    tracing::error!(error = %err, "{context}");
    ApiError::internal(context)
}

// ============================================================================
// Catalog
// ============================================================================

/// Create or replace a product.
#[utoipa::path(
    put,
    path = "/v1/admin/products/{slug}",
    tag = "Admin",
    params(("slug" = String, Path, description = "Product slug")),
    request_body = ProductUpsertRequest,
    responses(
        (status = 200, description = "Product saved", body = VisaProduct),
        (status = 400, description = "Invalid amount or name"),
        (status = 401, description = "Missing or invalid admin token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upsert_product(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ApiJson(request): ApiJson<ProductUpsertRequest>,
) -> Result<Json<VisaProduct>, ApiError> {
    let slug = slug.trim().to_string();
    let name = request.name.trim().to_string();
    if slug.is_empty() || name.is_empty() {
        return Err(ApiError::bad_request("slug and name are required"));
    }
    let product = VisaProduct {
        slug,
        name,
        base_price_cents: parse_amount_to_cents(&request.base_price_usd)
            .map_err(ApiError::bad_request)?,
        extra_unit_price_cents: parse_amount_to_cents(&request.extra_unit_price_usd)
            .map_err(ApiError::bad_request)?,
        calculation_type: request.calculation_type,
        is_active: request.is_active,
        updated_at: Utc::now(),
    };

    state
        .db
        .write(|txn| CatalogRepository::new(txn).upsert_product(&product))
        .map_err(|e| storage_error("Failed to save product", e))?;

    audit_log!(
        &state.db,
        AuditEvent::new(AuditEventType::ProductUpserted)
            .with_actor("admin")
            .with_resource(&product.slug)
            .with_details(json!({
                "base_price_cents": product.base_price_cents,
                "extra_unit_price_cents": product.extra_unit_price_cents,
                "is_active": product.is_active,
            }))
    );
    Ok(Json(product))
}

/// Create or replace a seller.
#[utoipa::path(
    put,
    path = "/v1/admin/sellers/{seller_id}",
    tag = "Admin",
    params(("seller_id" = String, Path, description = "Seller id")),
    request_body = SellerUpsertRequest,
    responses(
        (status = 200, description = "Seller saved", body = Seller),
        (status = 400, description = "Missing display name"),
        (status = 401, description = "Missing or invalid admin token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upsert_seller(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
    ApiJson(request): ApiJson<SellerUpsertRequest>,
) -> Result<Json<Seller>, ApiError> {
    let display_name = request.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(ApiError::bad_request("display_name is required"));
    }
    let seller = Seller {
        seller_id: seller_id.trim().to_string(),
        display_name,
        is_active: request.is_active,
        updated_at: Utc::now(),
    };

    state
        .db
        .write(|txn| CatalogRepository::new(txn).upsert_seller(&seller))
        .map_err(|e| storage_error("Failed to save seller", e))?;

    audit_log!(
        &state.db,
        AuditEvent::new(AuditEventType::SellerUpserted)
            .with_actor("admin")
            .with_resource(&seller.seller_id)
            .with_details(json!({ "is_active": seller.is_active }))
    );
    Ok(Json(seller))
}

// ============================================================================
// Orders
// ============================================================================

/// Get an order with its payment row, Wise transfer, tokens and side effects.
#[utoipa::path(
    get,
    path = "/v1/admin/orders/{order_id}",
    tag = "Admin",
    params(("order_id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = AdminOrderDetail),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_order(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<AdminOrderDetail>, ApiError> {
    let detail = state
        .db
        .read(|txn| {
            let Some(order) = OrderRepository::new(txn).get(&order_id)? else {
                return Ok(None);
            };
            let payment = match order.payment_id.as_deref() {
                Some(id) => PaymentRepository::new(txn).get(id)?,
                None => None,
            };
            let wise_transfer = match order.wise_transfer_id.as_deref() {
                Some(id) => WiseTransferRepository::new(txn).get(id)?,
                None => None,
            };
            Ok::<_, DbError>(Some(AdminOrderDetail {
                tokens: TokenRepository::new(txn).list_for_order(&order.id)?,
                side_effects: OutboxRepository::new(txn).list_for_order(&order.id)?,
                order,
                payment,
                wise_transfer,
            }))
        })
        .map_err(|e| storage_error("Failed to load order", e))?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    Ok(Json(detail))
}

/// List orders, newest first.
#[utoipa::path(
    get,
    path = "/v1/admin/orders",
    tag = "Admin",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders", body = OrderListResponse),
        (status = 401, description = "Missing or invalid admin token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_orders(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ORDER_LIMIT).min(MAX_LIMIT);
    let orders = state
        .db
        .read(|txn| OrderRepository::new(txn).list(query.payment_status, limit))
        .map_err(|e| storage_error("Failed to list orders", e))?;
    Ok(Json(OrderListResponse {
        total: orders.len(),
        orders,
    }))
}

/// Query the audit log, newest first.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 401, description = "Missing or invalid admin token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn query_audit_logs(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_LIMIT);
    let events = AuditRepository::new(&state.db)
        .list(params.order_id.as_deref(), limit)
        .map_err(|e| storage_error("Failed to query audit log", e))?;
    Ok(Json(AuditLogResponse {
        total: events.len(),
        events,
    }))
}

// ============================================================================
// Zelle
// ============================================================================

/// Confirm a Zelle payment after checking the proof.
#[utoipa::path(
    post,
    path = "/v1/admin/zelle/approve",
    tag = "Admin",
    request_body = ZelleApproveRequest,
    responses(
        (status = 200, description = "Order completed", body = TransitionResponse),
        (status = 400, description = "Not a Zelle order or missing reviewed_by"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_zelle(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ActionJson(request): ActionJson<ZelleApproveRequest>,
) -> Result<Json<TransitionResponse>, ActionError> {
    let transition =
        workflow::approve_zelle(&state, &request.order_id, request.reviewed_by.as_deref()).await?;
    Ok(Json(transition.into()))
}

/// Reject a Zelle payment and ask the client for a new proof.
#[utoipa::path(
    post,
    path = "/v1/admin/zelle/reject",
    tag = "Admin",
    request_body = ZelleRejectRequest,
    responses(
        (status = 200, description = "Order failed", body = TransitionResponse),
        (status = 400, description = "Not a Zelle order, or missing reviewer or reason"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_zelle(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ActionJson(request): ActionJson<ZelleRejectRequest>,
) -> Result<Json<TransitionResponse>, ActionError> {
    let transition = workflow::reject_zelle(
        &state,
        &request.order_id,
        request.reviewed_by.as_deref(),
        request.rejection_reason.as_deref(),
        request.app_url.as_deref(),
    )
    .await?;
    Ok(Json(transition.into()))
}
