// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Side-Effect Delivery
//!
//! Delivers outbox entries (contract PDF generation, client emails) after the
//! transaction that enqueued them has committed.
//!
//! ## Strategy
//!
//! 1. Handlers call [`Outbox::dispatch_for_order`] right after commit, so the
//!    common path delivers immediately.
//! 2. A failed delivery stays pending with its attempt count and last error.
//! 3. [`OutboxDispatcher`] sweeps every pending entry each `poll_interval`
//!    until delivery succeeds or [`MAX_OUTBOX_ATTEMPTS`] is reached.
//!
//! An in-process claim set keeps the inline path and the sweep from
//! delivering the same entry twice.
//!
//! ## Shutdown
//!
//! The dispatcher stops on a `tokio_util::sync::CancellationToken`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::mail::DynEmailSender;
use crate::providers::DynContractGenerator;
use crate::storage::repository::MAX_OUTBOX_ATTEMPTS;
use crate::storage::{DbError, OrderDatabase, OutboxEffect, OutboxEntry, OutboxRepository};

/// Result of one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers outbox entries through the configured email and PDF seams.
pub struct Outbox {
    db: Arc<OrderDatabase>,
    mailer: DynEmailSender,
    contracts: DynContractGenerator,
    in_flight: Mutex<HashSet<String>>,
}

impl Outbox {
    pub fn new(
        db: Arc<OrderDatabase>,
        mailer: DynEmailSender,
        contracts: DynContractGenerator,
    ) -> Self {
        Self {
            db,
            mailer,
            contracts,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Deliver every pending entry of one order. Never fails: problems are
    /// logged and left for the background sweep.
    pub async fn dispatch_for_order(&self, order_id: &str) -> DispatchReport {
        match self
            .db
            .read(|txn| OutboxRepository::new(txn).pending_for_order(order_id))
        {
            Ok(entries) => self.deliver_all(entries).await,
            Err(e) => {
                warn!(order_id, error = %e, "Failed to load pending side effects");
                DispatchReport::default()
            }
        }
    }

    /// Deliver every pending entry.
    pub async fn dispatch_pending(&self) -> DispatchReport {
        match self.db.read(|txn| OutboxRepository::new(txn).pending()) {
            Ok(entries) => self.deliver_all(entries).await,
            Err(e) => {
                warn!(error = %e, "Failed to load pending side effects");
                DispatchReport::default()
            }
        }
    }

    async fn deliver_all(&self, entries: Vec<OutboxEntry>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for entry in entries {
            match self.deliver(&entry).await {
                Some(true) => report.delivered += 1,
                Some(false) => report.failed += 1,
                None => {}
            }
        }
        report
    }

    /// `None` when another task holds the entry.
    async fn deliver(&self, entry: &OutboxEntry) -> Option<bool> {
        let _claim = self.claim(&entry.key)?;

        // Re-check under the claim: another pass may have just finished it.
        match self.db.read(|txn| OutboxRepository::new(txn).get(&entry.key)) {
            Ok(Some(current)) if current.is_pending() => {}
            Ok(_) => return None,
            Err(e) => {
                warn!(key = %entry.key, error = %e, "Failed to reload side effect");
                return None;
            }
        }

        let result = match &entry.effect {
            OutboxEffect::GenerateContract { order_id } => self
                .contracts
                .generate(order_id)
                .await
                .map_err(|e| e.to_string()),
            OutboxEffect::SendEmail { message } => {
                self.mailer.send(message).await.map_err(|e| e.to_string())
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.db.write(|txn| {
                    OutboxRepository::new(txn).mark_delivered(&entry.key, Utc::now())
                }) {
                    warn!(key = %entry.key, error = %e, "Side effect delivered but not recorded");
                }
                info!(
                    key = %entry.key,
                    order_id = %entry.order_id,
                    effect = entry.effect.name(),
                    "Side effect delivered"
                );
                Some(true)
            }
            Err(error) => {
                let recorded = self
                    .db
                    .write(|txn| OutboxRepository::new(txn).record_failure(&entry.key, &error));
                match recorded {
                    Ok(updated) => warn!(
                        key = %entry.key,
                        order_id = %entry.order_id,
                        effect = entry.effect.name(),
                        attempts = updated.attempts,
                        max_attempts = MAX_OUTBOX_ATTEMPTS,
                        error = %error,
                        "Side effect failed"
                    ),
                    Err(e) => warn!(
                        key = %entry.key,
                        error = %error,
                        record_error = %e,
                        "Side effect failed and the failure was not recorded"
                    ),
                }
                Some(false)
            }
        }
    }

    fn claim(&self, key: &str) -> Option<Claim<'_>> {
        let mut in_flight = self.in_flight.lock().ok()?;
        if !in_flight.insert(key.to_string()) {
            return None;
        }
        Some(Claim {
            set: &self.in_flight,
            key: key.to_string(),
        })
    }

    /// Pending entries for an order, for inspection.
    pub fn pending_for_order(&self, order_id: &str) -> Result<Vec<OutboxEntry>, DbError> {
        self.db
            .read(|txn| OutboxRepository::new(txn).pending_for_order(order_id))
    }

    /// Number of entries not yet delivered, across all orders.
    pub fn pending_count(&self) -> Result<usize, DbError> {
        self.db
            .read(|txn| OutboxRepository::new(txn).pending().map(|p| p.len()))
    }
}

struct Claim<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

/// Background retry loop for undelivered side effects.
pub struct OutboxDispatcher {
    outbox: Arc<Outbox>,
    poll_interval: Duration,
}

impl OutboxDispatcher {
    pub fn new(outbox: Arc<Outbox>, poll_interval: Duration) -> Self {
        Self {
            outbox,
            poll_interval,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(dispatcher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Outbox dispatcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Outbox dispatcher shutting down");
                return;
            }

            let report = self.outbox.dispatch_pending().await;
            if report.delivered + report.failed > 0 {
                info!(
                    delivered = report.delivered,
                    failed = report.failed,
                    "Outbox sweep finished"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Outbox dispatcher shutting down");
                    return;
                }
            }
        }
    }
}
