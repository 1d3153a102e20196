// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! USD→BRL exchange rates for PIX charges.
//!
//! Priority: rate supplied by the caller, then a live quote with a 4%
//! margin, then a hardcoded fallback. Live quotes are cached briefly.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use reqwest::Client;
use serde::Deserialize;

use crate::fees::{validate_rate, ExchangeRate, FeeError, RateSource};
use crate::providers::{ensure_success, http_client, ProviderError};

/// Margin applied on top of a live quote.
pub const FX_MARGIN: f64 = 1.04;

/// Used when no live quote is available.
pub const FALLBACK_BRL_RATE: f64 = 5.6;

const QUOTE_TTL: Duration = Duration::from_secs(300);
const QUOTE_CURRENCY: &str = "BRL";

#[async_trait::async_trait]
pub trait FxRateSource: Send + Sync {
    /// Mid-market BRL per USD, without margin.
    async fn usd_to_brl(&self) -> Result<f64, ProviderError>;
}

pub type DynFxRateSource = Arc<dyn FxRateSource>;

/// Pick the rate for a PIX charge.
///
/// An invalid caller-supplied rate is an error; an unavailable live quote
/// falls back silently (with a warning).
pub async fn resolve_brl_rate(
    caller_rate: Option<f64>,
    source: &dyn FxRateSource,
) -> Result<ExchangeRate, FeeError> {
    if let Some(rate) = caller_rate {
        validate_rate(rate)?;
        return Ok(ExchangeRate {
            rate,
            source: RateSource::Caller,
        });
    }

    match source.usd_to_brl().await {
        Ok(quote) if validate_rate(quote).is_ok() => Ok(ExchangeRate {
            rate: quote * FX_MARGIN,
            source: RateSource::FxApi,
        }),
        Ok(quote) => {
            tracing::warn!(quote, "FX API returned an unusable rate, using fallback");
            Ok(fallback())
        }
        Err(e) => {
            tracing::warn!(error = %e, "FX API unavailable, using fallback rate");
            Ok(fallback())
        }
    }
}

fn fallback() -> ExchangeRate {
    ExchangeRate {
        rate: FALLBACK_BRL_RATE,
        source: RateSource::Fallback,
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    rates: std::collections::HashMap<String, f64>,
}

struct CachedQuote {
    rate: f64,
    fetched_at: Instant,
}

/// Quotes from an exchangerate-api style endpoint (`{"rates": {"BRL": …}}`).
pub struct HttpFxRateSource {
    http: Client,
    url: String,
    cache: Mutex<LruCache<&'static str, CachedQuote>>,
    ttl: Duration,
}

impl HttpFxRateSource {
    pub fn new(url: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client()?,
            url: url.into(),
            cache: Mutex::new(LruCache::new(NonZeroUsize::MIN)),
            ttl: QUOTE_TTL,
        })
    }

    fn cached(&self) -> Option<f64> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(QUOTE_CURRENCY) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.rate);
            }
            cache.pop(QUOTE_CURRENCY);
        }
        None
    }

    fn store(&self, rate: f64) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                QUOTE_CURRENCY,
                CachedQuote {
                    rate,
                    fetched_at: Instant::now(),
                },
            );
        }
    }
}

#[async_trait::async_trait]
impl FxRateSource for HttpFxRateSource {
    async fn usd_to_brl(&self) -> Result<f64, ProviderError> {
        if let Some(rate) = self.cached() {
            return Ok(rate);
        }

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("GET {} failed: {e}", self.url)))?;
        let quote: QuoteResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("FX quote: {e}")))?;

        let rate = quote
            .rates
            .get(QUOTE_CURRENCY)
            .copied()
            .ok_or_else(|| ProviderError::InvalidResponse("FX quote has no BRL rate".to_string()))?;
        self.store(rate);
        Ok(rate)
    }
}
