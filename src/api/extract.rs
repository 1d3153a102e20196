// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON request bodies that reject with this service's error bodies instead
//! of axum's plain-text 422.

use axum::extract::FromRequest;

use crate::error::{ActionError, ApiError};

/// Body for endpoints answering `{"error": …}` on failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Body for admin actions answering `{"success": false, "error": …}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ActionError))]
pub struct ActionJson<T>(pub T);
