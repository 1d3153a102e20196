// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Contract Review
//!
//! Approval and rejection of the signed contract and its annex, each with its
//! own review state, plus the client-facing token flows:
//!
//! - Approve: one permanent view token per order, reused on re-approval
//! - Reject: a fresh 30-day resubmission token on every rejection
//! - Resubmit: one-time use of a resubmission token, resetting the review
//!
//! Review is independent of payment status.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use super::{link_base, required};
use crate::audit_log;
use crate::error::WorkflowError;
use crate::mail::templates;
use crate::state::AppState;
use crate::storage::{
    ApprovalStatus, AuditEvent, AuditEventType, ContractToken, DocumentKind, DocumentReview,
    OrderDatabase, OrderRepository, OutboxEffect, OutboxRepository, StoredOrder, TokenKind,
    TokenRepository,
};

/// Result of an approve or reject action.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub order_id: String,
    pub document: DocumentKind,
    pub status: ApprovalStatus,
    pub token: String,
    /// Link emailed to the client
    pub link: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether an existing view token was reused.
    pub token_reused: bool,
}

/// A valid token and the order it belongs to.
#[derive(Debug, Clone)]
pub struct TokenLookup {
    pub token: ContractToken,
    pub order: StoredOrder,
}

fn mint_error(_: ring::error::Unspecified) -> WorkflowError {
    WorkflowError::Internal("token generation failed".to_string())
}

/// Approve a document and email the client a permanent view link.
pub async fn approve_document(
    state: &AppState,
    order_id: &str,
    reviewed_by: Option<&str>,
    document: DocumentKind,
    app_url: Option<&str>,
) -> Result<ReviewOutcome, WorkflowError> {
    let reviewer = required(reviewed_by, "reviewed_by")?;
    let base = link_base(&state.config, app_url)?;
    let now = Utc::now();

    let outcome = state.db.write(|txn| {
        let orders = OrderRepository::new(txn);
        let tokens = TokenRepository::new(txn);

        let mut order = orders.require(order_id)?;
        *order.review_mut(document) = DocumentReview {
            status: ApprovalStatus::Approved,
            reviewed_by: Some(reviewer.to_string()),
            reviewed_at: Some(now),
            rejection_reason: None,
        };
        order.updated_at = now;
        orders.update(&order)?;

        let (token, token_reused) = match tokens.active_view_token(&order.id, now)? {
            Some(token) => (token, true),
            None => {
                let token = ContractToken::view(&order.id, document, now).map_err(mint_error)?;
                tokens.insert(&token)?;
                (token, false)
            }
        };

        let link = format!("{base}/view-visa-contract?token={}", token.token);
        let message = templates::contract_approved(
            &order.client.email,
            &order.client.name,
            &order.order_number,
            document,
            &link,
        );
        OutboxRepository::new(txn).enqueue(
            &format!(
                "{}:approved:{}:{}",
                order.id,
                document.as_str(),
                uuid::Uuid::new_v4()
            ),
            &order.id,
            OutboxEffect::SendEmail { message },
            now,
        )?;

        Ok::<_, WorkflowError>(ReviewOutcome {
            order_id: order.id,
            document,
            status: ApprovalStatus::Approved,
            expires_at: token.expires_at,
            token: token.token,
            link,
            token_reused,
        })
    })?;

    info!(
        order_id,
        document = document.as_str(),
        reviewed_by = reviewer,
        token_reused = outcome.token_reused,
        "Document approved"
    );
    state.outbox.dispatch_for_order(order_id).await;
    audit_log!(
        &state.db,
        AuditEvent::new(AuditEventType::ContractApproved)
            .with_actor(reviewer)
            .with_order(order_id)
            .with_details(json!({
                "document": document.as_str(),
                "token_reused": outcome.token_reused,
            }))
    );
    Ok(outcome)
}

/// Reject a document and email the client a 30-day resubmission link.
pub async fn reject_document(
    state: &AppState,
    order_id: &str,
    reviewed_by: Option<&str>,
    document: DocumentKind,
    rejection_reason: Option<&str>,
    app_url: Option<&str>,
) -> Result<ReviewOutcome, WorkflowError> {
    let reviewer = required(reviewed_by, "reviewed_by")?;
    let reason = required(rejection_reason, "rejection_reason")?;
    let base = link_base(&state.config, app_url)?;
    let now = Utc::now();

    let outcome = state.db.write(|txn| {
        let orders = OrderRepository::new(txn);

        let mut order = orders.require(order_id)?;
        *order.review_mut(document) = DocumentReview {
            status: ApprovalStatus::Rejected,
            reviewed_by: Some(reviewer.to_string()),
            reviewed_at: Some(now),
            rejection_reason: Some(reason.to_string()),
        };
        order.updated_at = now;
        orders.update(&order)?;

        let token = ContractToken::resubmission(&order.id, document, now).map_err(mint_error)?;
        TokenRepository::new(txn).insert(&token)?;

        let link = format!("{base}/checkout/visa/resubmit?token={}", token.token);
        let message = templates::contract_rejected(
            &order.client.email,
            &order.client.name,
            &order.order_number,
            document,
            reason,
            &link,
        );
        OutboxRepository::new(txn).enqueue(
            &format!("{}:rejected:{}:{}", order.id, document.as_str(), token.token),
            &order.id,
            OutboxEffect::SendEmail { message },
            now,
        )?;

        Ok::<_, WorkflowError>(ReviewOutcome {
            order_id: order.id,
            document,
            status: ApprovalStatus::Rejected,
            expires_at: token.expires_at,
            token: token.token,
            link,
            token_reused: false,
        })
    })?;

    info!(
        order_id,
        document = document.as_str(),
        reviewed_by = reviewer,
        "Document rejected"
    );
    state.outbox.dispatch_for_order(order_id).await;
    audit_log!(
        &state.db,
        AuditEvent::new(AuditEventType::ContractRejected)
            .with_actor(reviewer)
            .with_order(order_id)
            .with_details(json!({
                "document": document.as_str(),
                "rejection_reason": reason,
            }))
    );
    Ok(outcome)
}

/// Resolve a permanent view link.
pub fn view_contract(db: &OrderDatabase, token: &str) -> Result<TokenLookup, WorkflowError> {
    let now = Utc::now();
    db.read(|txn| {
        let token = TokenRepository::new(txn)
            .get(token.trim())?
            .filter(|t| t.kind == TokenKind::View)
            .ok_or_else(|| WorkflowError::NotFound("Contract link not found".to_string()))?;
        if token.is_expired(now) {
            return Err(WorkflowError::Gone("Contract link has expired".to_string()));
        }
        let order = OrderRepository::new(txn).require(&token.order_id)?;
        Ok(TokenLookup { token, order })
    })
}

fn check_resubmission(token: &ContractToken, now: DateTime<Utc>) -> Result<(), WorkflowError> {
    if token.used_at.is_some() {
        return Err(WorkflowError::Gone(
            "Resubmission link has already been used".to_string(),
        ));
    }
    if token.is_expired(now) {
        return Err(WorkflowError::Gone("Resubmission link has expired".to_string()));
    }
    Ok(())
}

/// A later approval supersedes outstanding resubmission links.
fn check_still_rejected(order: &StoredOrder, document: DocumentKind) -> Result<(), WorkflowError> {
    if order.review(document).status != ApprovalStatus::Rejected {
        return Err(WorkflowError::Gone(format!(
            "Resubmission link is no longer valid: the {} is not rejected",
            document.as_str()
        )));
    }
    Ok(())
}

/// Resolve an unused resubmission link.
pub fn resubmission_details(db: &OrderDatabase, token: &str) -> Result<TokenLookup, WorkflowError> {
    let now = Utc::now();
    db.read(|txn| {
        let token = TokenRepository::new(txn)
            .get(token.trim())?
            .filter(|t| t.kind == TokenKind::Resubmission)
            .ok_or_else(|| WorkflowError::NotFound("Resubmission link not found".to_string()))?;
        check_resubmission(&token, now)?;
        let order = OrderRepository::new(txn).require(&token.order_id)?;
        check_still_rejected(&order, token.document)?;
        Ok(TokenLookup { token, order })
    })
}

/// Replace the rejected documents and consume the token.
///
/// The document's review goes back to pending. Only valid while the document
/// is still rejected.
pub fn resubmit_documents(
    db: &OrderDatabase,
    token: &str,
    contract_document_url: Option<String>,
    contract_selfie_url: Option<String>,
) -> Result<StoredOrder, WorkflowError> {
    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let document_url = clean(contract_document_url);
    let selfie_url = clean(contract_selfie_url);
    if document_url.is_none() && selfie_url.is_none() {
        return Err(WorkflowError::Validation(
            "contract_document_url or contract_selfie_url is required".to_string(),
        ));
    }
    let now = Utc::now();

    let (order, document) = db.write(|txn| {
        let tokens = TokenRepository::new(txn);
        let orders = OrderRepository::new(txn);

        let found = tokens
            .get(token.trim())?
            .filter(|t| t.kind == TokenKind::Resubmission)
            .ok_or_else(|| WorkflowError::NotFound("Resubmission link not found".to_string()))?;
        check_resubmission(&found, now)?;

        let mut order = orders.require(&found.order_id)?;
        check_still_rejected(&order, found.document)?;
        if let Some(url) = document_url {
            order.contract_document_url = Some(url);
        }
        if let Some(url) = selfie_url {
            order.contract_selfie_url = Some(url);
        }
        *order.review_mut(found.document) = DocumentReview::default();
        order.updated_at = now;
        orders.update(&order)?;
        tokens.mark_used(&found, now)?;
        Ok::<_, WorkflowError>((order, found.document))
    })?;

    info!(order_id = %order.id, document = document.as_str(), "Documents resubmitted");
    audit_log!(
        db,
        AuditEvent::new(AuditEventType::DocumentsResubmitted)
            .with_actor("client")
            .with_order(&order.id)
            .with_details(json!({ "document": document.as_str() }))
    );
    Ok(order)
}
