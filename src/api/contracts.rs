// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract review endpoints.
//!
//! Approve/reject are admin actions answering `{success, message}`. The view
//! and resubmission endpoints are reached from emailed links and are
//! authorized by the token alone.

use axum::{
    extract::{Query, State},
    Json,
};

use super::extract::{ActionJson, ApiJson};
use crate::{
    auth::AdminOnly,
    error::{ActionError, ApiError},
    models::{
        ActionResponse, ContractViewResponse, ResubmissionDetailsResponse, ResubmitRequest,
        ReviewRequest, TokenQuery,
    },
    state::AppState,
    workflow,
};

/// Approve the contract or annex and email a permanent view link.
#[utoipa::path(
    post,
    path = "/v1/contracts/approve",
    tag = "Contracts",
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Document approved", body = ActionResponse),
        (status = 400, description = "Missing reviewed_by"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_contract(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ActionJson(request): ActionJson<ReviewRequest>,
) -> Result<Json<ActionResponse>, ActionError> {
    let document = request.contract_type.unwrap_or_default();
    let outcome = workflow::approve_document(
        &state,
        &request.order_id,
        request.reviewed_by.as_deref(),
        document,
        request.app_url.as_deref(),
    )
    .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: format!(
            "{} approved for order {}",
            document.as_str(),
            outcome.order_id
        ),
    }))
}

/// Reject the contract or annex and email a 30-day resubmission link.
#[utoipa::path(
    post,
    path = "/v1/contracts/reject",
    tag = "Contracts",
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Document rejected", body = ActionResponse),
        (status = 400, description = "Missing reviewed_by or rejection_reason"),
        (status = 401, description = "Missing or invalid admin token"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_contract(
    _admin: AdminOnly,
    State(state): State<AppState>,
    ActionJson(request): ActionJson<ReviewRequest>,
) -> Result<Json<ActionResponse>, ActionError> {
    let document = request.contract_type.unwrap_or_default();
    let outcome = workflow::reject_document(
        &state,
        &request.order_id,
        request.reviewed_by.as_deref(),
        document,
        request.rejection_reason.as_deref(),
        request.app_url.as_deref(),
    )
    .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: format!(
            "{} rejected for order {}; resubmission link sent",
            document.as_str(),
            outcome.order_id
        ),
    }))
}

/// Resolve a permanent view link.
#[utoipa::path(
    get,
    path = "/v1/contracts/view",
    tag = "Contracts",
    params(TokenQuery),
    responses(
        (status = 200, description = "Order summary", body = ContractViewResponse),
        (status = 404, description = "Unknown token"),
        (status = 410, description = "Token expired")
    )
)]
pub async fn view_contract(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ContractViewResponse>, ApiError> {
    let lookup = workflow::view_contract(&state.db, &query.token)?;
    Ok(Json(lookup.order.into()))
}

/// Resolve a resubmission link.
#[utoipa::path(
    get,
    path = "/v1/contracts/resubmit",
    tag = "Contracts",
    params(TokenQuery),
    responses(
        (status = 200, description = "Rejected document details", body = ResubmissionDetailsResponse),
        (status = 404, description = "Unknown token"),
        (status = 410, description = "Token used or expired")
    )
)]
pub async fn resubmission_details(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ResubmissionDetailsResponse>, ApiError> {
    let lookup = workflow::resubmission_details(&state.db, &query.token)?;
    let document = lookup.token.document;
    Ok(Json(ResubmissionDetailsResponse {
        rejection_reason: lookup.order.review(document).rejection_reason.clone(),
        order_number: lookup.order.order_number,
        client_name: lookup.order.client.name,
        document,
        expires_at: lookup.token.expires_at,
    }))
}

/// Upload replacement documents, consuming the resubmission token.
#[utoipa::path(
    post,
    path = "/v1/contracts/resubmit",
    tag = "Contracts",
    request_body = ResubmitRequest,
    responses(
        (status = 200, description = "Documents replaced", body = ContractViewResponse),
        (status = 400, description = "No document URL given"),
        (status = 404, description = "Unknown token"),
        (status = 410, description = "Token used or expired")
    )
)]
pub async fn resubmit_documents(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResubmitRequest>,
) -> Result<Json<ContractViewResponse>, ApiError> {
    let order = workflow::resubmit_documents(
        &state.db,
        &request.token,
        request.contract_document_url,
        request.contract_selfie_url,
    )?;
    Ok(Json(order.into()))
}
