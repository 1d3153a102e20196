// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTML email bodies sent to clients.
//!
//! Anything a client typed (name, rejection reason echoed back) goes through
//! [`escape_html`] before being placed in markup.

use super::EmailMessage;
use crate::storage::DocumentKind;

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn document_label(document: DocumentKind) -> &'static str {
    match document {
        DocumentKind::Contract => "service contract",
        DocumentKind::Annex => "Annex I",
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f5f5f5; color: #1f2937;">
    <table role="presentation" style="width: 100%; border-collapse: collapse;">
        <tr>
            <td style="padding: 32px 16px;">
                <table role="presentation" style="max-width: 600px; margin: 0 auto; background: #ffffff; border-radius: 12px; border: 1px solid #e5e7eb;">
                    <tr>
                        <td style="padding: 32px;">
                            <h1 style="margin: 0 0 24px; font-size: 22px;">{title}</h1>
{body}
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>"#
    )
}

fn paragraph(text: &str) -> String {
    format!(
        r#"                            <p style="margin: 0 0 16px; font-size: 15px; line-height: 1.6;">{text}</p>"#
    )
}

fn button(href: &str, label: &str) -> String {
    format!(
        r#"                            <p style="margin: 24px 0;"><a href="{}" style="display: inline-block; background: #2563eb; color: #ffffff; padding: 12px 24px; border-radius: 8px; text-decoration: none; font-weight: 600;">{label}</a></p>"#,
        escape_html(href)
    )
}

fn message(to: &str, subject: String, html: String) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject,
        html,
        from: None,
    }
}

/// Sent once when an order's payment completes.
pub fn payment_confirmed(
    to: &str,
    client_name: &str,
    order_number: &str,
    amount: &str,
    currency: &str,
) -> EmailMessage {
    let body = [
        paragraph(&format!("Hello {},", escape_html(client_name))),
        paragraph(&format!(
            "We received your payment of <strong>{} {}</strong> for order <strong>{}</strong>.",
            escape_html(currency),
            escape_html(amount),
            escape_html(order_number)
        )),
        paragraph("Your contract is being prepared and our team will review your documents shortly."),
    ]
    .join("\n");

    message(
        to,
        format!("Payment confirmed - order {order_number}"),
        layout("Payment confirmed", &body),
    )
}

/// Sent on approval with the permanent view link.
pub fn contract_approved(
    to: &str,
    client_name: &str,
    order_number: &str,
    document: DocumentKind,
    view_url: &str,
) -> EmailMessage {
    let label = document_label(document);
    let body = [
        paragraph(&format!("Hello {},", escape_html(client_name))),
        paragraph(&format!(
            "Your {label} for order <strong>{}</strong> has been approved.",
            escape_html(order_number)
        )),
        paragraph("You can view it at any time using the link below. Keep this email."),
        button(view_url, "View contract"),
    ]
    .join("\n");

    message(
        to,
        format!("Your {label} was approved - order {order_number}"),
        layout("Documents approved", &body),
    )
}

/// Sent on rejection with the 30-day resubmission link.
pub fn contract_rejected(
    to: &str,
    client_name: &str,
    order_number: &str,
    document: DocumentKind,
    reason: &str,
    resubmit_url: &str,
) -> EmailMessage {
    let label = document_label(document);
    let body = [
        paragraph(&format!("Hello {},", escape_html(client_name))),
        paragraph(&format!(
            "We could not approve the documents for your {label} (order <strong>{}</strong>).",
            escape_html(order_number)
        )),
        paragraph(&format!("<strong>Reason:</strong> {}", escape_html(reason))),
        paragraph("Please upload new documents using the link below. The link is valid for 30 days and can be used once."),
        button(resubmit_url, "Resubmit documents"),
    ]
    .join("\n");

    message(
        to,
        format!("Action needed: resubmit documents - order {order_number}"),
        layout("Documents need attention", &body),
    )
}

/// Sent when an admin rejects a Zelle proof of payment.
pub fn zelle_payment_rejected(
    to: &str,
    client_name: &str,
    order_number: &str,
    reason: &str,
    proof_url: &str,
) -> EmailMessage {
    let body = [
        paragraph(&format!("Hello {},", escape_html(client_name))),
        paragraph(&format!(
            "We could not confirm your Zelle payment for order <strong>{}</strong>.",
            escape_html(order_number)
        )),
        paragraph(&format!("<strong>Reason:</strong> {}", escape_html(reason))),
        paragraph("If you already paid, please send a new proof of payment."),
        button(proof_url, "Send proof of payment"),
    ]
    .join("\n");

    message(
        to,
        format!("Zelle payment not confirmed - order {order_number}"),
        layout("Payment not confirmed", &body),
    )
}
