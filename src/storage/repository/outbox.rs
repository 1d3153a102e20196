// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Side-effect outbox.
//!
//! Entries are written in the same transaction as the state change that
//! caused them and delivered after commit. The idempotency key makes a
//! repeated enqueue a no-op, so duplicate webhook deliveries never produce
//! duplicate emails.

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::mail::EmailMessage;
use crate::storage::database::{
    child_key, child_range, DbError, DbResult, TableReader, TableWriter, OUTBOX, OUTBOX_PENDING,
};

/// Deliveries are abandoned after this many failed attempts.
pub const MAX_OUTBOX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxEffect {
    /// Ask the PDF service to render the order's contract.
    GenerateContract { order_id: String },
    SendEmail { message: EmailMessage },
}

impl OutboxEffect {
    pub fn name(&self) -> &'static str {
        match self {
            OutboxEffect::GenerateContract { .. } => "generate_contract",
            OutboxEffect::SendEmail { .. } => "send_email",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Idempotency key
    pub key: String,
    pub order_id: String,
    pub effect: OutboxEffect,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn is_pending(&self) -> bool {
        self.delivered_at.is_none() && self.attempts < MAX_OUTBOX_ATTEMPTS
    }
}

pub struct OutboxRepository<'t, T> {
    txn: &'t T,
}

impl<'t, T: TableReader> OutboxRepository<'t, T> {
    pub fn new(txn: &'t T) -> Self {
        Self { txn }
    }

    pub fn get(&self, key: &str) -> DbResult<Option<OutboxEntry>> {
        self.txn.read_json(OUTBOX, key)
    }

    /// Undelivered entries for one order, oldest first.
    pub fn pending_for_order(&self, order_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let (start, end) = child_range(order_id);
        let keys = self.txn.scan_index(OUTBOX_PENDING, &start, &end)?;
        self.load_sorted(keys.into_iter().map(|(_, key)| key))
    }

    /// Every undelivered entry, oldest first.
    pub fn pending(&self) -> DbResult<Vec<OutboxEntry>> {
        let keys = self.txn.all_index(OUTBOX_PENDING)?;
        self.load_sorted(keys.into_iter().map(|(_, key)| key))
    }

    /// All entries, delivered or not, for one order.
    pub fn list_for_order(&self, order_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let mut entries: Vec<OutboxEntry> = self
            .txn
            .all_json::<OutboxEntry>(OUTBOX)?
            .into_iter()
            .filter(|e| e.order_id == order_id)
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    fn load_sorted(&self, keys: impl Iterator<Item = String>) -> DbResult<Vec<OutboxEntry>> {
        let mut entries = Vec::new();
        for key in keys {
            if let Some(entry) = self.get(&key)? {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }
}

impl<'t> OutboxRepository<'t, WriteTransaction> {
    /// Enqueue an effect. Returns false when `key` was already enqueued.
    pub fn enqueue(
        &self,
        key: &str,
        order_id: &str,
        effect: OutboxEffect,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        if self.get(key)?.is_some() {
            return Ok(false);
        }
        let entry = OutboxEntry {
            key: key.to_string(),
            order_id: order_id.to_string(),
            effect,
            attempts: 0,
            last_error: None,
            created_at: now,
            delivered_at: None,
        };
        self.txn.write_json(OUTBOX, key, &entry)?;
        self.txn
            .write_index(OUTBOX_PENDING, &child_key(order_id, key), key)?;
        Ok(true)
    }

    pub fn mark_delivered(&self, key: &str, now: DateTime<Utc>) -> DbResult<OutboxEntry> {
        let mut entry = self
            .get(key)?
            .ok_or_else(|| DbError::NotFound(format!("Outbox entry {key}")))?;
        entry.attempts += 1;
        entry.delivered_at = Some(now);
        entry.last_error = None;
        self.txn.write_json(OUTBOX, key, &entry)?;
        self.txn
            .remove_index(OUTBOX_PENDING, &child_key(&entry.order_id, key))?;
        Ok(entry)
    }

    /// Count a failed attempt; drops the entry from the pending set once it
    /// reaches [`MAX_OUTBOX_ATTEMPTS`].
    pub fn record_failure(&self, key: &str, error: &str) -> DbResult<OutboxEntry> {
        let mut entry = self
            .get(key)?
            .ok_or_else(|| DbError::NotFound(format!("Outbox entry {key}")))?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        self.txn.write_json(OUTBOX, key, &entry)?;
        if !entry.is_pending() {
            self.txn
                .remove_index(OUTBOX_PENDING, &child_key(&entry.order_id, key))?;
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::tests::temp_db;

    fn contract(order_id: &str) -> OutboxEffect {
        OutboxEffect::GenerateContract {
            order_id: order_id.to_string(),
        }
    }

    #[test]
    fn enqueue_is_idempotent_per_key() {
        let (db, _dir) = temp_db();
        let now = Utc::now();
        let (first, second) = db
            .write(|txn| {
                let repo = OutboxRepository::new(txn);
                Ok::<_, DbError>((
                    repo.enqueue("order-1:contract", "order-1", contract("order-1"), now)?,
                    repo.enqueue("order-1:contract", "order-1", contract("order-1"), now)?,
                ))
            })
            .unwrap();
        assert!(first);
        assert!(!second);

        let pending = db
            .read(|txn| OutboxRepository::new(txn).pending_for_order("order-1"))
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn delivered_entries_leave_pending_set() {
        let (db, _dir) = temp_db();
        let now = Utc::now();
        db.write(|txn| {
            let repo = OutboxRepository::new(txn);
            repo.enqueue("a", "order-1", contract("order-1"), now)?;
            repo.enqueue("b", "order-2", contract("order-2"), now)?;
            repo.mark_delivered("a", now)
        })
        .unwrap();

        let (pending, history) = db
            .read(|txn| {
                let repo = OutboxRepository::new(txn);
                Ok::<_, DbError>((repo.pending()?, repo.list_for_order("order-1")?))
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, "b");
        assert_eq!(history.len(), 1);
        assert!(history[0].delivered_at.is_some());
    }

    #[test]
    fn failures_are_abandoned_after_max_attempts() {
        let (db, _dir) = temp_db();
        db.write(|txn| {
            OutboxRepository::new(txn).enqueue("a", "order-1", contract("order-1"), Utc::now())
        })
        .unwrap();

        for attempt in 1..=MAX_OUTBOX_ATTEMPTS {
            let entry = db
                .write(|txn| OutboxRepository::new(txn).record_failure("a", "smtp down"))
                .unwrap();
            assert_eq!(entry.attempts, attempt);
        }

        let pending = db
            .read(|txn| OutboxRepository::new(txn).pending())
            .unwrap();
        assert!(pending.is_empty());
        let entry = db
            .read(|txn| OutboxRepository::new(txn).get("a"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.last_error.as_deref(), Some("smtp down"));
    }
}
