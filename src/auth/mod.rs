// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Admin endpoints (catalog maintenance, order reads, Zelle decisions and
//! contract review) require a static bearer token:
//!
//! ```text
//! Authorization: Bearer $ADMIN_API_TOKEN
//! ```
//!
//! The token proves the caller is the back-office. The reviewer identity
//! recorded on an order still comes from the request body's `reviewed_by`.
//!
//! Client-facing token links and provider webhooks are unauthenticated at
//! this layer; they carry their own opaque token or signature.

pub mod error;
pub mod extractor;

pub use error::AuthError;
pub use extractor::AdminOnly;
