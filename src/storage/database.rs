// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded order database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `products`: slug → serialized VisaProduct
//! - `sellers`: seller_id → serialized Seller
//! - `orders`: order_id → serialized StoredOrder
//! - `order_numbers`: order_number → order_id (uniqueness constraint)
//! - `provider_refs`: `stripe:{session_id}` / `wise:{transfer_id}` → order_id
//! - `payments`: payment_id → serialized StoredPayment
//! - `contract_tokens`: token → serialized ContractToken
//! - `order_tokens`: composite key (order_id|token) → token kind
//! - `wise_transfers`: transfer_id → serialized WiseTransferRecord
//! - `outbox`: idempotency key → serialized OutboxEntry
//! - `outbox_pending`: composite key (order_id|idempotency key) → idempotency key,
//!   undelivered entries only
//! - `audit_events`: sortable timestamp|event_id → serialized AuditEvent
//!
//! Every multi-record state change goes through [`OrderDatabase::write`], so
//! a status transition, the tokens it issues and the side effects it enqueues
//! commit or abort together.

use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// Table holding JSON-serialized records.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Table mapping one string key to another (indexes, constraints).
pub type IndexTable = TableDefinition<'static, &'static str, &'static str>;

pub const PRODUCTS: JsonTable = TableDefinition::new("products");
pub const SELLERS: JsonTable = TableDefinition::new("sellers");
pub const ORDERS: JsonTable = TableDefinition::new("orders");
pub const ORDER_NUMBERS: IndexTable = TableDefinition::new("order_numbers");
pub const PROVIDER_REFS: IndexTable = TableDefinition::new("provider_refs");
pub const PAYMENTS: JsonTable = TableDefinition::new("payments");
pub const CONTRACT_TOKENS: JsonTable = TableDefinition::new("contract_tokens");
pub const ORDER_TOKENS: IndexTable = TableDefinition::new("order_tokens");
pub const WISE_TRANSFERS: JsonTable = TableDefinition::new("wise_transfers");
pub const OUTBOX: JsonTable = TableDefinition::new("outbox");
pub const OUTBOX_PENDING: IndexTable = TableDefinition::new("outbox_pending");
pub const AUDIT_EVENTS: JsonTable = TableDefinition::new("audit_events");

const JSON_TABLES: [JsonTable; 8] = [
    PRODUCTS,
    SELLERS,
    ORDERS,
    PAYMENTS,
    CONTRACT_TOKENS,
    WISE_TRANSFERS,
    OUTBOX,
    AUDIT_EVENTS,
];

const INDEX_TABLES: [IndexTable; 4] = [ORDER_NUMBERS, PROVIDER_REFS, ORDER_TOKENS, OUTBOX_PENDING];

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Composite Key Helpers
// =============================================================================

/// Build a composite key `parent|child` for per-parent index tables.
pub fn child_key(parent: &str, child: &str) -> String {
    format!("{parent}|{child}")
}

/// Half-open range covering every `parent|…` key.
///
/// `}` is the byte right after `|`, so the upper bound sorts past any child.
pub fn child_range(parent: &str) -> (String, String) {
    (format!("{parent}|"), format!("{parent}}}"))
}

// =============================================================================
// Table access shared by read and write transactions
// =============================================================================

/// Read helpers usable from both read-only and write transactions.
pub trait TableReader {
    /// Load and deserialize one record.
    fn read_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> DbResult<Option<T>>;

    /// Load and deserialize every record with a key in `[start, end)`.
    fn scan_json<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        start: &str,
        end: &str,
    ) -> DbResult<Vec<T>>;

    /// Load and deserialize every record in a table.
    fn all_json<T: DeserializeOwned>(&self, table: JsonTable) -> DbResult<Vec<T>>;

    /// Look up an index entry.
    fn read_index(&self, table: IndexTable, key: &str) -> DbResult<Option<String>>;

    /// List `(key, value)` index entries with a key in `[start, end)`.
    fn scan_index(&self, table: IndexTable, start: &str, end: &str)
        -> DbResult<Vec<(String, String)>>;

    /// List every `(key, value)` entry of an index table.
    fn all_index(&self, table: IndexTable) -> DbResult<Vec<(String, String)>>;
}

fn get_json<T, Tbl>(table: &Tbl, key: &str) -> DbResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn range_json<T, Tbl>(table: &Tbl, start: &str, end: &str) -> DbResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.range(start..end)? {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

fn iter_json<T, Tbl>(table: &Tbl) -> DbResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

fn get_index<Tbl>(table: &Tbl, key: &str) -> DbResult<Option<String>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key)?.map(|v| v.value().to_string()))
}

fn iter_index<Tbl>(table: &Tbl) -> DbResult<Vec<(String, String)>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        out.push((key.value().to_string(), value.value().to_string()));
    }
    Ok(out)
}

fn range_index<Tbl>(table: &Tbl, start: &str, end: &str) -> DbResult<Vec<(String, String)>>
where
    Tbl: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    for entry in table.range(start..end)? {
        let (key, value) = entry?;
        out.push((key.value().to_string(), value.value().to_string()));
    }
    Ok(out)
}

impl TableReader for ReadTransaction {
    fn read_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> DbResult<Option<T>> {
        get_json(&self.open_table(table)?, key)
    }

    fn scan_json<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        start: &str,
        end: &str,
    ) -> DbResult<Vec<T>> {
        range_json(&self.open_table(table)?, start, end)
    }

    fn all_json<T: DeserializeOwned>(&self, table: JsonTable) -> DbResult<Vec<T>> {
        iter_json(&self.open_table(table)?)
    }

    fn read_index(&self, table: IndexTable, key: &str) -> DbResult<Option<String>> {
        get_index(&self.open_table(table)?, key)
    }

    fn scan_index(
        &self,
        table: IndexTable,
        start: &str,
        end: &str,
    ) -> DbResult<Vec<(String, String)>> {
        range_index(&self.open_table(table)?, start, end)
    }

    fn all_index(&self, table: IndexTable) -> DbResult<Vec<(String, String)>> {
        iter_index(&self.open_table(table)?)
    }
}

impl TableReader for WriteTransaction {
    fn read_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> DbResult<Option<T>> {
        get_json(&self.open_table(table)?, key)
    }

    fn scan_json<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        start: &str,
        end: &str,
    ) -> DbResult<Vec<T>> {
        range_json(&self.open_table(table)?, start, end)
    }

    fn all_json<T: DeserializeOwned>(&self, table: JsonTable) -> DbResult<Vec<T>> {
        iter_json(&self.open_table(table)?)
    }

    fn read_index(&self, table: IndexTable, key: &str) -> DbResult<Option<String>> {
        get_index(&self.open_table(table)?, key)
    }

    fn scan_index(
        &self,
        table: IndexTable,
        start: &str,
        end: &str,
    ) -> DbResult<Vec<(String, String)>> {
        range_index(&self.open_table(table)?, start, end)
    }

    fn all_index(&self, table: IndexTable) -> DbResult<Vec<(String, String)>> {
        iter_index(&self.open_table(table)?)
    }
}

/// Write helpers for use inside [`OrderDatabase::write`].
pub trait TableWriter {
    /// Serialize and insert (or replace) a record.
    fn write_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> DbResult<()>;

    /// Insert (or replace) an index entry.
    fn write_index(&self, table: IndexTable, key: &str, value: &str) -> DbResult<()>;

    /// Remove an index entry. Returns whether it existed.
    fn remove_index(&self, table: IndexTable, key: &str) -> DbResult<bool>;
}

impl TableWriter for WriteTransaction {
    fn write_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> DbResult<()> {
        let json = serde_json::to_vec(value)?;
        let mut table = self.open_table(table)?;
        table.insert(key, json.as_slice())?;
        Ok(())
    }

    fn write_index(&self, table: IndexTable, key: &str, value: &str) -> DbResult<()> {
        let mut table = self.open_table(table)?;
        table.insert(key, value)?;
        Ok(())
    }

    fn remove_index(&self, table: IndexTable, key: &str) -> DbResult<bool> {
        let mut table = self.open_table(table)?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }
}

// =============================================================================
// OrderDatabase
// =============================================================================

/// Embedded ACID order database.
pub struct OrderDatabase {
    db: Database,
}

impl OrderDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in JSON_TABLES {
                let _ = write_txn.open_table(table)?;
            }
            for table in INDEX_TABLES {
                let _ = write_txn.open_table(table)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// aborts every write made inside it.
    pub fn write<T, E>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let txn = self.db.begin_write().map_err(DbError::from)?;
        let value = f(&txn)?;
        txn.commit().map_err(DbError::from)?;
        Ok(value)
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T, E>(&self, f: impl FnOnce(&ReadTransaction) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let txn = self.db.begin_read().map_err(DbError::from)?;
        f(&txn)
    }

    /// Verify the database can serve a read snapshot.
    pub fn health_check(&self) -> DbResult<()> {
        let txn = self.db.begin_read()?;
        let _ = txn.open_table(ORDERS)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
