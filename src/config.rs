// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into an
//! immutable [`AppConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `visa-orders.redb` | `./data` |
//! | `APP_URL` | Public web app base URL used in emailed links | `http://localhost:5173` |
//! | `ADMIN_API_TOKEN` | Bearer token for admin endpoints | unset (admin disabled) |
//! | `STRIPE_MODE` | `test` or `live` | `test` |
//! | `STRIPE_SECRET_KEY_TEST` / `STRIPE_SECRET_KEY_LIVE` | Stripe API key per mode | unset (checkout disabled) |
//! | `STRIPE_WEBHOOK_SECRET_TEST` / `STRIPE_WEBHOOK_SECRET_LIVE` | Stripe signing secret per mode | unset (ack only) |
//! | `STRIPE_API_BASE_URL` | Stripe API base | `https://api.stripe.com` |
//! | `WISE_WEBHOOK_SECRET` | Wise webhook HMAC secret | unset (ack only) |
//! | `FX_API_URL` | USD based exchange rate endpoint | `https://api.exchangerate-api.com/v4/latest/USD` |
//! | `SMTP_HOST` / `SMTP_PORT` / `SMTP_USERNAME` / `SMTP_PASSWORD` / `SMTP_FROM` | SMTP relay | unset (emails logged) |
//! | `CONTRACT_PDF_URL` / `CONTRACT_PDF_TOKEN` | Contract PDF service | unset (generation skipped) |
//! | `PRODUCT_CATALOG_PATH` | JSON catalog seeded at startup | unset |
//! | `OUTBOX_POLL_SECS` | Outbox retry interval | `30` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files enabling TLS | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Directory for the embedded database.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "visa-orders.redb";

pub const APP_URL_ENV: &str = "APP_URL";
pub const ADMIN_API_TOKEN_ENV: &str = "ADMIN_API_TOKEN";

/// Selects which Stripe key pair is used. Never inferred from request headers.
pub const STRIPE_MODE_ENV: &str = "STRIPE_MODE";
pub const STRIPE_API_BASE_URL_ENV: &str = "STRIPE_API_BASE_URL";
pub const WISE_WEBHOOK_SECRET_ENV: &str = "WISE_WEBHOOK_SECRET";
pub const FX_API_URL_ENV: &str = "FX_API_URL";

pub const SMTP_HOST_ENV: &str = "SMTP_HOST";
pub const SMTP_PORT_ENV: &str = "SMTP_PORT";
pub const SMTP_USERNAME_ENV: &str = "SMTP_USERNAME";
pub const SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";
pub const SMTP_FROM_ENV: &str = "SMTP_FROM";

pub const CONTRACT_PDF_URL_ENV: &str = "CONTRACT_PDF_URL";
pub const CONTRACT_PDF_TOKEN_ENV: &str = "CONTRACT_PDF_TOKEN";

pub const PRODUCT_CATALOG_PATH_ENV: &str = "PRODUCT_CATALOG_PATH";
pub const OUTBOX_POLL_SECS_ENV: &str = "OUTBOX_POLL_SECS";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// Logging format: `json` or `pretty`.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_APP_URL: &str = "http://localhost:5173";
const DEFAULT_STRIPE_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_FX_API_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_OUTBOX_POLL_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{name} is required when {because} is set")]
    Missing {
        name: &'static str,
        because: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StripeMode {
    #[default]
    Test,
    Live,
}

impl StripeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StripeMode::Test => "test",
            StripeMode::Live => "live",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub mode: StripeMode,
    /// Secret key for the selected mode
    pub secret_key: Option<String>,
    /// Webhook signing secret for the selected mode
    pub webhook_secret: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct ContractPdfConfig {
    pub url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL for links sent to clients, without trailing slash
    pub app_url: String,
    pub admin_api_token: Option<String>,
    pub stripe: StripeConfig,
    pub wise_webhook_secret: Option<String>,
    pub fx_api_url: String,
    pub smtp: Option<SmtpConfig>,
    pub contract_pdf: Option<ContractPdfConfig>,
    pub product_catalog_path: Option<PathBuf>,
    pub outbox_poll_interval: Duration,
    pub tls: Option<TlsConfig>,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or_default = |name: &str, default: &str| {
            optional(name).unwrap_or_else(|| default.to_string())
        };

        let port = parse_or(optional(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;

        let mode = match optional(STRIPE_MODE_ENV).as_deref() {
            None | Some("test") => StripeMode::Test,
            Some("live") => StripeMode::Live,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: STRIPE_MODE_ENV,
                    value: other.to_string(),
                    reason: "expected `test` or `live`",
                })
            }
        };
        let (key_env, secret_env) = match mode {
            StripeMode::Test => ("STRIPE_SECRET_KEY_TEST", "STRIPE_WEBHOOK_SECRET_TEST"),
            StripeMode::Live => ("STRIPE_SECRET_KEY_LIVE", "STRIPE_WEBHOOK_SECRET_LIVE"),
        };
        let stripe = StripeConfig {
            mode,
            secret_key: optional(key_env),
            webhook_secret: optional(secret_env),
            api_base_url: or_default(STRIPE_API_BASE_URL_ENV, DEFAULT_STRIPE_API_BASE_URL),
        };

        let smtp = match optional(SMTP_HOST_ENV) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(optional(SMTP_PORT_ENV), SMTP_PORT_ENV, DEFAULT_SMTP_PORT)?,
                username: optional(SMTP_USERNAME_ENV),
                password: optional(SMTP_PASSWORD_ENV),
                from: optional(SMTP_FROM_ENV).ok_or(ConfigError::Missing {
                    name: SMTP_FROM_ENV,
                    because: SMTP_HOST_ENV,
                })?,
            }),
            None => None,
        };

        let contract_pdf = optional(CONTRACT_PDF_URL_ENV).map(|url| ContractPdfConfig {
            url,
            token: optional(CONTRACT_PDF_TOKEN_ENV),
        });

        let tls = match (optional(TLS_CERT_PATH_ENV), optional(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    name: TLS_KEY_PATH_ENV,
                    because: TLS_CERT_PATH_ENV,
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    name: TLS_CERT_PATH_ENV,
                    because: TLS_KEY_PATH_ENV,
                })
            }
            (None, None) => None,
        };

        let poll_secs = parse_or(
            optional(OUTBOX_POLL_SECS_ENV),
            OUTBOX_POLL_SECS_ENV,
            DEFAULT_OUTBOX_POLL_SECS,
        )?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                name: OUTBOX_POLL_SECS_ENV,
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            host: or_default(HOST_ENV, DEFAULT_HOST),
            port,
            data_dir: PathBuf::from(or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            app_url: or_default(APP_URL_ENV, DEFAULT_APP_URL)
                .trim_end_matches('/')
                .to_string(),
            admin_api_token: optional(ADMIN_API_TOKEN_ENV),
            stripe,
            wise_webhook_secret: optional(WISE_WEBHOOK_SECRET_ENV),
            fx_api_url: or_default(FX_API_URL_ENV, DEFAULT_FX_API_URL),
            smtp,
            contract_pdf,
            product_catalog_path: optional(PRODUCT_CATALOG_PATH_ENV).map(PathBuf::from),
            outbox_poll_interval: Duration::from_secs(poll_secs),
            tls,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
            reason: "not a valid number",
        }),
        None => Ok(default),
    }
}
