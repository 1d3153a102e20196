// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for admin requests.
//!
//! Add `AdminOnly` to a handler's arguments to require the admin token:
//!
//! ```rust,ignore
//! async fn my_handler(_admin: AdminOnly, State(state): State<AppState>) -> impl IntoResponse {
//!     // caller presented ADMIN_API_TOKEN
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use sha2::{Digest, Sha256};

use super::AuthError;
use crate::state::AppState;

/// Extractor that admits only callers presenting the configured admin token.
///
/// Both sides are hashed before comparison so the comparison time does not
/// depend on where the presented token first differs.
pub struct AdminOnly;

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin_api_token
            .as_deref()
            .ok_or(AuthError::NotConfigured)?;

        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        // Extract Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        if Sha256::digest(token.trim().as_bytes()) != Sha256::digest(expected.as_bytes()) {
            tracing::warn!("Rejected admin request with invalid token");
            return Err(AuthError::InvalidToken);
        }

        Ok(AdminOnly)
    }
}
