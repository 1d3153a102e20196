// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound email.
//!
//! Every send is best effort: callers get an error back but never fail the
//! operation that triggered the email because of it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::SmtpConfig;

mod smtp;
pub mod templates;

pub use smtp::SmtpEmailSender;

/// A prebuilt HTML email.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Overrides the configured sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address `{address}`: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build email: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

pub type DynEmailSender = Arc<dyn EmailSender>;

/// Sender used when SMTP is not configured: logs and drops every message.
pub struct LogOnlyEmailSender;

#[async_trait::async_trait]
impl EmailSender for LogOnlyEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        tracing::warn!(
            to = %message.to,
            subject = %message.subject,
            "SMTP not configured, email dropped"
        );
        Ok(())
    }
}

/// Build the sender for the given configuration.
pub fn create_email_sender(config: Option<&SmtpConfig>) -> Result<DynEmailSender, MailError> {
    match config {
        Some(smtp) => Ok(Arc::new(SmtpEmailSender::new(smtp)?)),
        None => Ok(Arc::new(LogOnlyEmailSender)),
    }
}
