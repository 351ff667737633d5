//! MarketPulse web application.
//!
//! Serves the marketplace on port 3000: public product pages, the shopper's
//! cart, wishlist and checkout, and the vendor and admin dashboards.
//!
//! # Architecture
//!
//! - Axum web framework with HTMX for cart and wishlist fragments
//! - Askama templates for server-side rendering
//! - MarketPulse backend REST API for all marketplace data
//! - Firebase Auth REST API for identities
//! - Stripe.js in the browser for card payments
//!
//! The backend owns all data. This process holds only per-browser sessions
//! and caches (roles, carts, wishlists, notices), all rebuilt on demand.

#![cfg_attr(not(test), forbid(unsafe_code))]

use market_pulse_web::config::MarketPulseConfig;
use market_pulse_web::state::AppState;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &MarketPulseConfig) -> Option<sentry::ClientInitGuard> {
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
    let config = MarketPulseConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "market_pulse_web=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let state = AppState::new(config.clone());

    let app = market_pulse_web::app(state.clone())
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!(api = %config.api.base_url, "web listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    state.shutdown();
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
