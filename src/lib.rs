// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Visa Checkout Server - Order Payment Reconciliation Service
//!
//! This crate runs the payment side of a visa-services checkout: it prices
//! orders, opens hosted Stripe sessions, reconciles Stripe, Wise and Zelle
//! payments into a single order status, and drives the contract review
//! workflow with its client-facing view and resubmission links.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Admin bearer-token authentication
//! - `catalog` - Product/seller seeding at start-up
//! - `fees` - Per-method fee calculation in integer cents
//! - `fx` - USD to BRL quotes for PIX
//! - `mail` - Email templates and SMTP delivery
//! - `providers` - Stripe, Wise and contract PDF integrations
//! - `storage` - Embedded order database (redb)
//! - `workflow` - Order state transitions and side-effect outbox

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fees;
pub mod fx;
pub mod mail;
pub mod models;
pub mod providers;
pub mod state;
pub mod storage;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
