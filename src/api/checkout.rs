// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public checkout endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::extract::ApiJson;
use crate::{
    error::ApiError,
    models::{
        CheckoutRequest, CheckoutSessionResponse, LinkWiseTransferRequest, ManualOrderResponse,
        ProductResponse,
    },
    state::AppState,
    storage::{CatalogRepository, WiseTransferRecord},
    workflow,
};

/// First address of `X-Forwarded-For`, if present.
pub(crate) fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Create an order and a hosted Stripe session (card or PIX).
#[utoipa::path(
    post,
    path = "/v1/checkout/session",
    tag = "Checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Session created", body = CheckoutSessionResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown product or seller"),
        (status = 500, description = "Payment provider error"),
        (status = 503, description = "Stripe not configured")
    )
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutSessionResponse>, ApiError> {
    let caller_rate = request.exchange_rate;
    let input = request.into_new_order(forwarded_ip(&headers));
    let outcome = workflow::start_checkout(&state, input, caller_rate).await?;

    Ok(Json(CheckoutSessionResponse {
        success: true,
        checkout_url: outcome.session.url,
        session_id: outcome.session.id,
        order_id: outcome.order.id,
        order_number: outcome.order.order_number,
    }))
}

/// Create an order paid offline through Wise or Zelle.
#[utoipa::path(
    post,
    path = "/v1/checkout/manual",
    tag = "Checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = ManualOrderResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown product or seller")
    )
)]
pub async fn create_manual_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<ManualOrderResponse>), ApiError> {
    let input = request.into_new_order(forwarded_ip(&headers));
    let order = workflow::create_manual_order(&state, input)?;
    Ok((StatusCode::CREATED, Json(ManualOrderResponse::from(&order))))
}

/// Attach the client's Wise transfer to a Wise order.
#[utoipa::path(
    post,
    path = "/v1/orders/{order_id}/wise-transfer",
    tag = "Checkout",
    params(("order_id" = String, Path, description = "Order id")),
    request_body = LinkWiseTransferRequest,
    responses(
        (status = 200, description = "Transfer linked", body = WiseTransferRecord),
        (status = 400, description = "Not a Wise order"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transfer already linked elsewhere")
    )
)]
pub async fn link_wise_transfer(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(request): ApiJson<LinkWiseTransferRequest>,
) -> Result<Json<WiseTransferRecord>, ApiError> {
    let record = workflow::link_wise_transfer(&state.db, &order_id, &request.transfer_id)?;
    Ok(Json(record))
}

/// Get an active product.
#[utoipa::path(
    get,
    path = "/v1/products/{slug}",
    tag = "Checkout",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Product", body = ProductResponse),
        (status = 404, description = "Product not found or inactive")
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .db
        .read(|txn| CatalogRepository::new(txn).active_product(&slug))
        .map_err(|e| ApiError::internal(format!("Failed to load product: {e}")))?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(product.into()))
}
