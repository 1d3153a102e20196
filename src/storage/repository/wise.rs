// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mirror of Wise transfer lifecycles, keyed by Wise transfer id.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::database::{DbError, DbResult, TableReader, TableWriter, WISE_TRANSFERS};

/// State a freshly linked transfer starts in.
pub const INITIAL_WISE_STATE: &str = "incoming_payment_waiting";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WiseStateChange {
    pub state: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WiseTransferRecord {
    pub transfer_id: String,
    pub order_id: String,
    pub current_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
    pub state_history: Vec<WiseStateChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WiseTransferRecord {
    pub fn new(transfer_id: &str, order_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            transfer_id: transfer_id.to_string(),
            order_id: order_id.to_string(),
            current_state: INITIAL_WISE_STATE.to_string(),
            previous_state: None,
            state_history: vec![WiseStateChange {
                state: INITIAL_WISE_STATE.to_string(),
                at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `state`. Re-reporting the current state is a no-op.
    pub fn advance(&mut self, state: &str, now: DateTime<Utc>) -> bool {
        if self.current_state == state {
            return false;
        }
        self.previous_state = Some(std::mem::replace(
            &mut self.current_state,
            state.to_string(),
        ));
        self.state_history.push(WiseStateChange {
            state: state.to_string(),
            at: now,
        });
        self.updated_at = now;
        true
    }
}

pub struct WiseTransferRepository<'t, T> {
    txn: &'t T,
}

impl<'t, T: TableReader> WiseTransferRepository<'t, T> {
    pub fn new(txn: &'t T) -> Self {
        Self { txn }
    }

    pub fn get(&self, transfer_id: &str) -> DbResult<Option<WiseTransferRecord>> {
        self.txn.read_json(WISE_TRANSFERS, transfer_id)
    }
}

impl<'t> WiseTransferRepository<'t, WriteTransaction> {
    pub fn insert(&self, record: &WiseTransferRecord) -> DbResult<()> {
        if self.get(&record.transfer_id)?.is_some() {
            return Err(DbError::AlreadyExists(format!(
                "Wise transfer {}",
                record.transfer_id
            )));
        }
        self.txn
            .write_json(WISE_TRANSFERS, &record.transfer_id, record)
    }

    /// Record a reported state, creating the mirror if it is missing.
    pub fn record_state(
        &self,
        transfer_id: &str,
        order_id: &str,
        state: &str,
        now: DateTime<Utc>,
    ) -> DbResult<WiseTransferRecord> {
        let mut record = self
            .get(transfer_id)?
            .unwrap_or_else(|| WiseTransferRecord::new(transfer_id, order_id, now));
        record.advance(state, now);
        self.txn.write_json(WISE_TRANSFERS, transfer_id, &record)?;
        Ok(record)
    }
}
