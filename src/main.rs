// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use visa_checkout::{
    api::router,
    catalog::seed_catalog,
    config::{AppConfig, LOG_FORMAT_ENV},
    state::AppState,
    storage::OrderDatabase,
    workflow::OutboxDispatcher,
};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken, handle: Handle<SocketAddr>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}

async fn run() -> Result<(), BoxError> {
    let config = AppConfig::from_env()?;

    let db_path = config.database_path();
    let db = OrderDatabase::open(&db_path)?;
    info!(path = %db_path.display(), "Order database opened");

    if let Some(path) = config.product_catalog_path.as_deref() {
        seed_catalog(&db, path)?;
    }

    let addr: SocketAddr = config.bind_address().parse()?;
    let tls = config.tls.clone();
    let poll_interval = config.outbox_poll_interval;
    info!(
        stripe_mode = config.stripe.mode.as_str(),
        app_url = %config.app_url,
        admin_enabled = config.admin_api_token.is_some(),
        "Configuration loaded"
    );

    let state = AppState::from_config(config, db)?;

    let shutdown = CancellationToken::new();
    let dispatcher = OutboxDispatcher::new(state.outbox.clone(), poll_interval);
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));

    let app = router(state);
    let handle: Handle<SocketAddr> = Handle::new();
    tokio::spawn(shutdown_signal(shutdown.clone(), handle.clone()));

    match tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
            info!("Visa checkout server listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!("Visa checkout server listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    shutdown.cancel();
    if let Err(e) = dispatcher_task.await {
        warn!(error = %e, "Outbox dispatcher task ended abnormally");
    }
    info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
