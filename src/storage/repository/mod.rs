// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the order database.
//!
//! Repositories borrow a transaction, so several of them can take part in
//! one atomic unit of work. Read methods work on any transaction, write
//! methods only on a write transaction.

pub mod catalog;
pub mod orders;
pub mod outbox;
pub mod payments;
pub mod tokens;
pub mod wise;

pub use catalog::{CalculationType, CatalogRepository, Seller, VisaProduct};
pub use orders::{
    generate_order_number, AntiFraudRecord, ApprovalStatus, ClientContact, DocumentKind,
    DocumentReview, OrderMetadata, OrderRepository, PaymentMethod, PaymentStatus, ProviderRef,
    StoredOrder,
};
pub use outbox::{OutboxEffect, OutboxEntry, OutboxRepository, MAX_OUTBOX_ATTEMPTS};
pub use payments::{PaymentRepository, StoredPayment};
pub use tokens::{
    generate_token, ContractToken, TokenKind, TokenRepository, RESUBMISSION_TOKEN_TTL_DAYS,
};
pub use wise::{WiseStateChange, WiseTransferRecord, WiseTransferRepository};
