// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{EmailMessage, EmailSender, MailError};
use crate::config::SmtpConfig;

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::Transport(format!("failed to create SMTP transport: {e}")))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: parse_mailbox(&config.from)?,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait::async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let from = match &message.from {
            Some(from) => parse_mailbox(from)?,
            None => self.from.clone(),
        };

        let email = Message::builder()
            .from(from)
            .to(parse_mailbox(&message.to)?)
            .subject(&message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_mailbox() {
        let mailbox = parse_mailbox("Visa Orders <orders@example.com>").unwrap();
        assert_eq!(mailbox.email.to_string(), "orders@example.com");
    }

    #[test]
    fn rejects_invalid_address() {
        assert!(matches!(
            parse_mailbox("not an address"),
            Err(MailError::Address { .. })
        ));
    }
}
