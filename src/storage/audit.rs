// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for order lifecycle and admin actions.
//!
//! Events are append-only and keyed by a sortable timestamp, so a reverse
//! scan yields newest first. Failing to record an event never fails the
//! operation being audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{DbResult, OrderDatabase, TableReader, TableWriter, AUDIT_EVENTS};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Checkout events
    OrderCreated,
    CheckoutSessionCreated,

    // Reconciliation events
    PaymentReconciled,
    ZelleApproved,
    ZelleRejected,
    WiseTransferLinked,

    // Review events
    ContractApproved,
    ContractRejected,
    DocumentsResubmitted,

    // Catalog events
    ProductUpserted,
    SellerUpserted,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Reviewer, provider or `client` that caused the event.
    pub actor: Option<String>,
    /// Order affected, if any.
    pub order_id: Option<String>,
    /// Catalog entity affected (product slug, seller id).
    pub resource_id: Option<String>,
    /// IP address of the request (if available).
    pub ip_address: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            order_id: None,
            resource_id: None,
            ip_address: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    fn storage_key(&self) -> String {
        format!(
            "{}|{}",
            self.timestamp.format("%Y%m%dT%H%M%S%.9fZ"),
            self.event_id
        )
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    db: &'a OrderDatabase,
}

impl<'a> AuditRepository<'a> {
    pub fn new(db: &'a OrderDatabase) -> Self {
        Self { db }
    }

    /// Append an event in its own transaction.
    pub fn log(&self, event: &AuditEvent) -> DbResult<()> {
        self.db
            .write(|txn| txn.write_json(AUDIT_EVENTS, &event.storage_key(), event))
    }

    /// Newest first, optionally restricted to one order.
    pub fn list(&self, order_id: Option<&str>, limit: usize) -> DbResult<Vec<AuditEvent>> {
        let events: Vec<AuditEvent> = self.db.read(|txn| txn.all_json(AUDIT_EVENTS))?;
        Ok(events
            .into_iter()
            .rev()
            .filter(|e| order_id.map_or(true, |id| e.order_id.as_deref() == Some(id)))
            .take(limit)
            .collect())
    }
}

/// Record an audit event, logging instead of failing when storage errors.
#[macro_export]
macro_rules! audit_log {
    ($db:expr, $event:expr) => {{
        let event: $crate::storage::AuditEvent = $event;
        if let Err(e) = $crate::storage::AuditRepository::new($db).log(&event) {
            tracing::warn!(
                event_type = ?event.event_type,
                order_id = ?event.order_id,
                error = %e,
                "Failed to record audit event"
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::ContractApproved)
            .with_actor("admin-7")
            .with_order("order-1")
            .with_ip(Some("192.168.1.1".to_string()));

        assert_eq!(event.event_type, AuditEventType::ContractApproved);
        assert_eq!(event.actor.as_deref(), Some("admin-7"));
        assert_eq!(event.order_id.as_deref(), Some("order-1"));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::PaymentReconciled)
            .with_actor("wise")
            .failed("order not found");

        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("order not found"));
    }

    #[test]
    fn list_is_newest_first_and_filters_by_order() {
        let (db, _dir) = temp_db();
        let repo = AuditRepository::new(&db);

        let mut first = AuditEvent::new(AuditEventType::OrderCreated).with_order("order-1");
        first.timestamp = Utc::now() - chrono::Duration::seconds(5);
        let second = AuditEvent::new(AuditEventType::ContractApproved).with_order("order-1");
        let other = AuditEvent::new(AuditEventType::OrderCreated).with_order("order-2");

        repo.log(&first).unwrap();
        repo.log(&second).unwrap();
        repo.log(&other).unwrap();

        let events = repo.list(Some("order-1"), 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::ContractApproved);
        assert_eq!(events[1].event_type, AuditEventType::OrderCreated);

        assert_eq!(repo.list(None, 2).unwrap().len(), 2);
    }

    #[test]
    fn audit_macro_records_event() {
        let (db, _dir) = temp_db();
        crate::audit_log!(
            &db,
            AuditEvent::new(AuditEventType::SellerUpserted).with_resource("s-1")
        );
        let events = AuditRepository::new(&db).list(None, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id.as_deref(), Some("s-1"));
    }
}
