// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Order Storage
//!
//! Persistent storage for orders, payments, tokens and side effects, on an
//! embedded redb database (`$DATA_DIR/visa-orders.redb`).
//!
//! ## Consistency Model
//!
//! - A state transition and everything it implies (tokens issued, payment
//!   mirror, Wise mirror, outbox entries) commit in one write transaction
//! - Side effects run only after commit, from the outbox
//! - Orders, payments and audit events are never deleted

pub mod audit;
pub mod database;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use database::{DbError, DbResult, OrderDatabase, TableReader, TableWriter};
pub use repository::{
    AntiFraudRecord, ApprovalStatus, CalculationType, CatalogRepository, ClientContact,
    ContractToken, DocumentKind, DocumentReview, OrderMetadata, OrderRepository, OutboxEffect,
    OutboxEntry, OutboxRepository, PaymentMethod, PaymentRepository, PaymentStatus, ProviderRef,
    Seller, StoredOrder, StoredPayment, TokenKind, TokenRepository, VisaProduct,
    WiseTransferRecord, WiseTransferRepository, RESUBMISSION_TOKEN_TTL_DAYS,
};
