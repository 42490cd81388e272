//! Spoti Boost panel - reseller panel with ZenoPay balance top-ups.
//!
//! This binary serves the panel on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework with HTMX fragments for the top-up form
//! - Askama templates for server-side rendering
//! - ZenoPay mobile-money API for push payments and status queries
//! - `PostgreSQL` for accounts, the balance ledger and payment staging
//!
//! Gateway webhooks are acknowledged immediately and reconciled on a
//! background task; a periodic sweeper purges expired staging records.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Request, middleware::from_fn};
use sentry::integrations::tracing as sentry_tracing;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spoti_boost_panel::config::PanelConfig;
use spoti_boost_panel::db::{self, LedgerRepository, PaymentBinRepository, UserRepository};
use spoti_boost_panel::middleware;
use spoti_boost_panel::routes;
use spoti_boost_panel::services::{ReconciliationService, housekeeping};
use spoti_boost_panel::state::AppState;
use spoti_boost_panel::zenopay::ZenoPayClient;

/// Extra time, beyond one status query, given to webhook work on shutdown.
const BACKGROUND_GRACE_MARGIN: Duration = Duration::from_secs(30);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &PanelConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = PanelConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "spoti_boost_panel=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p spoti-boost-cli -- migrate

    let gateway = ZenoPayClient::new(&config.zenopay).expect("Failed to build ZenoPay client");
    let bins = Arc::new(PaymentBinRepository::new(pool.clone()));
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let reconciliation = ReconciliationService::new(
        Arc::new(gateway),
        bins.clone(),
        ledger.clone(),
        Arc::new(UserRepository::new(pool.clone())),
        config.payments.clone(),
    );

    let _sweeper =
        housekeeping::spawn_payment_bin_sweeper(bins, config.payments.bin_sweep_interval);
    tracing::info!(
        every_secs = config.payments.bin_sweep_interval.as_secs(),
        "Payment bin sweeper started"
    );

    let state = AppState::new(config.clone(), pool, Arc::new(reconciliation), ledger);

    let session_layer = middleware::create_session_layer(state.pool(), state.config())
        .expect("Failed to configure session store");

    let app = routes::routes()
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state.clone())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!(webhook_url = %config.payments.webhook_url, "panel listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Webhooks were acknowledged before reconciling; finish them before exit.
    let grace = config.zenopay.status_timeout + BACKGROUND_GRACE_MARGIN;
    tracing::info!(
        pending = state.background().len(),
        grace_secs = grace.as_secs(),
        "Draining background tasks"
    );
    if state.drain_background(grace).await {
        tracing::info!("Background tasks finished");
    } else {
        tracing::error!(
            pending = state.background().len(),
            "Background tasks still running at shutdown; affected orders need manual review"
        );
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
