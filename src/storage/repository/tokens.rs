// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contract view and resubmission tokens.
//!
//! Tokens are opaque 32-byte random values, hex encoded. Each token belongs
//! to exactly one order; `order_tokens` indexes them per order.

use chrono::{DateTime, Duration, Utc};
use redb::WriteTransaction;
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::orders::DocumentKind;
use crate::storage::database::{
    child_key, child_range, DbError, DbResult, TableReader, TableWriter, CONTRACT_TOKENS,
    ORDER_TOKENS,
};

/// Lifetime of a resubmission token.
pub const RESUBMISSION_TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Permanent link to an approved contract.
    View,
    /// One-time, time-boxed document re-upload link.
    Resubmission,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::View => "view",
            TokenKind::Resubmission => "resubmission",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ContractToken {
    pub token: String,
    pub order_id: String,
    pub kind: TokenKind,
    /// Document the token was issued for
    pub document: DocumentKind,
    /// `None` means the token never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl ContractToken {
    /// A permanent view token.
    pub fn view(order_id: &str, document: DocumentKind, now: DateTime<Utc>) -> Result<Self, Unspecified> {
        Ok(Self {
            token: generate_token()?,
            order_id: order_id.to_string(),
            kind: TokenKind::View,
            document,
            expires_at: None,
            created_at: now,
            used_at: None,
        })
    }

    /// A resubmission token valid for [`RESUBMISSION_TOKEN_TTL_DAYS`].
    pub fn resubmission(
        order_id: &str,
        document: DocumentKind,
        now: DateTime<Utc>,
    ) -> Result<Self, Unspecified> {
        Ok(Self {
            token: generate_token()?,
            order_id: order_id.to_string(),
            kind: TokenKind::Resubmission,
            document,
            expires_at: Some(now + Duration::days(RESUBMISSION_TOKEN_TTL_DAYS)),
            created_at: now,
            used_at: None,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> Result<String, Unspecified> {
    let mut bytes = [0u8; 32];
    SystemRandom::new().fill(&mut bytes)?;
    Ok(hex::encode(bytes))
}

pub struct TokenRepository<'t, T> {
    txn: &'t T,
}

impl<'t, T: TableReader> TokenRepository<'t, T> {
    pub fn new(txn: &'t T) -> Self {
        Self { txn }
    }

    pub fn get(&self, token: &str) -> DbResult<Option<ContractToken>> {
        self.txn.read_json(CONTRACT_TOKENS, token)
    }

    /// Every token issued for an order, oldest first.
    pub fn list_for_order(&self, order_id: &str) -> DbResult<Vec<ContractToken>> {
        let (start, end) = child_range(order_id);
        let mut tokens = Vec::new();
        for (key, _) in self.txn.scan_index(ORDER_TOKENS, &start, &end)? {
            let Some((_, token)) = key.split_once('|') else {
                continue;
            };
            if let Some(found) = self.get(token)? {
                tokens.push(found);
            }
        }
        tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tokens)
    }

    /// The order's unexpired view token, if one exists.
    pub fn active_view_token(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<ContractToken>> {
        Ok(self
            .list_for_order(order_id)?
            .into_iter()
            .find(|t| t.kind == TokenKind::View && !t.is_expired(now)))
    }
}

impl<'t> TokenRepository<'t, WriteTransaction> {
    pub fn insert(&self, token: &ContractToken) -> DbResult<()> {
        if self.get(&token.token)?.is_some() {
            return Err(DbError::AlreadyExists("Token".to_string()));
        }
        self.txn.write_json(CONTRACT_TOKENS, &token.token, token)?;
        self.txn.write_index(
            ORDER_TOKENS,
            &child_key(&token.order_id, &token.token),
            token.kind.as_str(),
        )
    }

    /// Stamp `used_at` on a token.
    pub fn mark_used(&self, token: &ContractToken, now: DateTime<Utc>) -> DbResult<ContractToken> {
        let mut used = token.clone();
        used.used_at = Some(now);
        self.txn.write_json(CONTRACT_TOKENS, &used.token, &used)?;
        Ok(used)
    }
}
