// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wise transfer webhooks: signature check, payload parsing, state mapping.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use super::SignatureError;
use crate::storage::PaymentStatus;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Signature-SHA256";

/// Verify the body's HMAC against the shared secret.
pub fn verify_signature(
    secret: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    let secret = secret.ok_or(SignatureError::MissingSecret)?;
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingHeader)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MissingSecret)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Transfer state change reported by Wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiseEvent {
    pub event_type: String,
    pub transfer_id: String,
    pub current_state: String,
    pub previous_state: Option<String>,
    pub occurred_at: Option<String>,
}

/// Parse a webhook body.
///
/// The transfer id comes from `data.transfer_id`, falling back to
/// `data.resource.id`; either may be a string or a number.
pub fn parse_event(payload: &Value) -> Option<WiseEvent> {
    let data = payload.get("data")?;
    let transfer_id = data
        .get("transfer_id")
        .and_then(id_string)
        .or_else(|| data.pointer("/resource/id").and_then(id_string))?;
    let current_state = data.get("current_state")?.as_str()?.trim().to_string();
    if current_state.is_empty() {
        return None;
    }

    Some(WiseEvent {
        event_type: payload
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or("transfers#state-change")
            .to_string(),
        transfer_id,
        current_state,
        previous_state: data
            .get("previous_state")
            .and_then(Value::as_str)
            .map(str::to_string),
        occurred_at: data
            .get("occurred_at")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// What a Wise transfer state means for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiseStateClass {
    /// Money reached us.
    Completed,
    /// Still moving; order stays as it is.
    InProgress,
    Failed,
    Cancelled,
    /// Not a state we know; order stays as it is.
    Unknown,
}

impl WiseStateClass {
    /// Order status to set, `None` to leave it unchanged.
    pub fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            WiseStateClass::Completed => Some(PaymentStatus::Completed),
            WiseStateClass::Failed => Some(PaymentStatus::Failed),
            WiseStateClass::Cancelled => Some(PaymentStatus::Cancelled),
            WiseStateClass::InProgress | WiseStateClass::Unknown => None,
        }
    }
}

pub fn classify_state(state: &str) -> WiseStateClass {
    match state.trim().to_ascii_lowercase().as_str() {
        "outgoing_payment_sent" | "funds_sent" => WiseStateClass::Completed,
        "incoming_payment_waiting"
        | "incoming_payment_initiated"
        | "processing"
        | "funds_converted" => WiseStateClass::InProgress,
        "bounced_back" | "funds_refunded" | "charged_back" => WiseStateClass::Failed,
        "cancelled" => WiseStateClass::Cancelled,
        _ => WiseStateClass::Unknown,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"data":{}}"#;
        let signature = sign("secret", body);
        assert_eq!(verify_signature(Some("secret"), Some(&signature), body), Ok(()));
        assert_eq!(
            verify_signature(Some("secret"), Some(&signature.to_uppercase()), body),
            Ok(())
        );
    }

    #[test]
    fn signature_failures() {
        let body = b"{}";
        let signature = sign("secret", body);
        assert_eq!(
            verify_signature(None, Some(&signature), body),
            Err(SignatureError::MissingSecret)
        );
        assert_eq!(
            verify_signature(Some("secret"), None, body),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify_signature(Some("secret"), Some("zz"), body),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(Some("other"), Some(&signature), body),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn parses_transfer_id_variants() {
        let direct = json!({
            "event_type": "transfers#state-change",
            "data": {"transfer_id": "123", "current_state": "funds_converted"}
        });
        let event = parse_event(&direct).unwrap();
        assert_eq!(event.transfer_id, "123");
        assert_eq!(event.current_state, "funds_converted");

        let nested = json!({
            "data": {"resource": {"id": 456, "type": "transfer"}, "current_state": "outgoing_payment_sent"}
        });
        let event = parse_event(&nested).unwrap();
        assert_eq!(event.transfer_id, "456");
        assert_eq!(event.event_type, "transfers#state-change");

        assert!(parse_event(&json!({"data": {"current_state": "processing"}})).is_none());
        assert!(parse_event(&json!({"data": {"transfer_id": "1"}})).is_none());
    }

    #[test]
    fn state_mapping() {
        assert_eq!(
            classify_state("outgoing_payment_sent").target_status(),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(classify_state("funds_sent"), WiseStateClass::Completed);
        assert_eq!(classify_state("funds_converted").target_status(), None);
        assert_eq!(classify_state("processing"), WiseStateClass::InProgress);
        assert_eq!(
            classify_state("bounced_back").target_status(),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(classify_state("charged_back"), WiseStateClass::Failed);
        assert_eq!(
            classify_state("cancelled").target_status(),
            Some(PaymentStatus::Cancelled)
        );
        assert_eq!(classify_state("something_new"), WiseStateClass::Unknown);
        assert_eq!(classify_state("something_new").target_status(), None);
    }
}
