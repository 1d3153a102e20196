// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Processing-fee gross-up per payment method.
//!
//! All functions here are pure. The PIX exchange rate is resolved by the
//! caller (see [`crate::fx`]) and passed in, so results are deterministic.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::PaymentMethod;

/// Card percentage fee in basis points (3.9%).
pub const CARD_PERCENT_FEE_BPS: u64 = 390;

/// Card fixed fee in cents ($0.30).
pub const CARD_FIXED_FEE_CENTS: u64 = 30;

/// Combined PIX processing fee, charged on the gross amount.
pub const PIX_FEE_RATE: f64 = 0.0179;

/// Where the USD→BRL rate used for a PIX charge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Supplied by the checkout caller.
    Caller,
    /// Live quote from the FX API with margin applied.
    FxApi,
    /// Hardcoded fallback when no quote is available.
    Fallback,
}

/// Exchange rate plus provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExchangeRate {
    pub rate: f64,
    pub source: RateSource,
}

/// Fee breakdown persisted with each order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FeeBreakdown {
    Card {
        net_cents: u64,
        fee_cents: u64,
        gross_cents: u64,
        percent_fee_bps: u64,
        fixed_fee_cents: u64,
    },
    Pix {
        net_usd_cents: u64,
        exchange_rate: f64,
        rate_source: RateSource,
        net_brl_cents: u64,
        gross_brl_cents: u64,
        fee_rate: f64,
    },
    /// Wise and Zelle: the client pays the net amount, any fee is informational.
    Manual {
        payment_method: PaymentMethod,
        net_cents: u64,
        informational_fee_cents: u64,
    },
}

impl FeeBreakdown {
    /// Amount actually charged, in minor units of [`FeeBreakdown::currency`].
    pub fn gross_cents(&self) -> u64 {
        match self {
            FeeBreakdown::Card { gross_cents, .. } => *gross_cents,
            FeeBreakdown::Pix { gross_brl_cents, .. } => *gross_brl_cents,
            FeeBreakdown::Manual { net_cents, .. } => *net_cents,
        }
    }

    /// ISO currency of the charged amount.
    pub fn currency(&self) -> &'static str {
        match self {
            FeeBreakdown::Pix { .. } => "BRL",
            _ => "USD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeeError {
    #[error("PIX charges require an exchange rate")]
    MissingExchangeRate,

    #[error("exchange rate must be a positive finite number, got {0}")]
    InvalidExchangeRate(f64),

    #[error("amount is too large")]
    Overflow,
}

/// Card gross: `round(net + net * 3.9% + 30)`, half-up in integer math.
pub fn card_gross(net_cents: u64) -> Result<FeeBreakdown, FeeError> {
    let percent_fee = net_cents
        .checked_mul(CARD_PERCENT_FEE_BPS)
        .and_then(|v| v.checked_add(5_000))
        .map(|v| v / 10_000)
        .ok_or(FeeError::Overflow)?;
    let fee_cents = percent_fee + CARD_FIXED_FEE_CENTS;
    let gross_cents = net_cents.checked_add(fee_cents).ok_or(FeeError::Overflow)?;

    Ok(FeeBreakdown::Card {
        net_cents,
        fee_cents,
        gross_cents,
        percent_fee_bps: CARD_PERCENT_FEE_BPS,
        fixed_fee_cents: CARD_FIXED_FEE_CENTS,
    })
}

/// PIX gross: convert to BRL, then divide by `1 - 1.79%` so the net survives
/// the processor fee.
pub fn pix_gross(net_usd_cents: u64, rate: ExchangeRate) -> Result<FeeBreakdown, FeeError> {
    validate_rate(rate.rate)?;

    let net_brl = net_usd_cents as f64 * rate.rate;
    let gross_brl = net_brl / (1.0 - PIX_FEE_RATE);
    if !gross_brl.is_finite() || gross_brl > u64::MAX as f64 {
        return Err(FeeError::Overflow);
    }

    Ok(FeeBreakdown::Pix {
        net_usd_cents,
        exchange_rate: rate.rate,
        rate_source: rate.source,
        net_brl_cents: net_brl.round() as u64,
        gross_brl_cents: gross_brl.round() as u64,
        fee_rate: PIX_FEE_RATE,
    })
}

/// Wise/Zelle: gross equals net.
pub fn manual_gross(payment_method: PaymentMethod, net_cents: u64) -> FeeBreakdown {
    FeeBreakdown::Manual {
        payment_method,
        net_cents,
        informational_fee_cents: 0,
    }
}

/// Dispatch on payment method. `rate` is only consulted for PIX.
pub fn gross_for(
    payment_method: PaymentMethod,
    net_cents: u64,
    rate: Option<ExchangeRate>,
) -> Result<FeeBreakdown, FeeError> {
    match payment_method {
        PaymentMethod::Card => card_gross(net_cents),
        PaymentMethod::Pix => pix_gross(net_cents, rate.ok_or(FeeError::MissingExchangeRate)?),
        PaymentMethod::Wise | PaymentMethod::Zelle => Ok(manual_gross(payment_method, net_cents)),
    }
}

pub fn validate_rate(rate: f64) -> Result<(), FeeError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(FeeError::InvalidExchangeRate(rate))
    }
}

/// Render cents as a decimal string (`14576` → `"145.76"`).
pub fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Parse a decimal amount (at most two decimals) into cents.
///
/// Zero is accepted: `units_only` products legitimately price at zero.
pub fn parse_amount_to_cents(amount: &str) -> Result<u64, String> {
    let trimmed = amount.trim();
    let invalid = || format!("`{amount}` is not a valid non-negative amount");

    let (whole_part, fraction_part) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) || fraction_part.len() > 2 {
        return Err(format!("`{amount}` must have at most 2 decimal places"));
    }

    let whole = whole_part
        .parse::<u64>()
        .map_err(|_| format!("`{amount}` is too large"))?;
    let fraction = match fraction_part.len() {
        0 => 0,
        1 => fraction_part.parse::<u64>().map_err(|_| invalid())? * 10,
        _ => fraction_part.parse::<u64>().map_err(|_| invalid())?,
    };

    whole
        .checked_mul(100)
        .and_then(|base| base.checked_add(fraction))
        .ok_or_else(|| format!("`{amount}` is too large"))
}
