//! AMQP Lifecycle Service - Main Entry Point
//!
//! Hosts a publishing and a consuming trigger over HTTP.

use anyhow::{bail, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amqp_lifecycle::api::handlers::{self, AppState};
use amqp_lifecycle::roles::{ConsumeStep, PublishStep};
use amqp_lifecycle::types::ServiceConfig;
use amqp_lifecycle::validation::{validate, validate_consumer};
use amqp_lifecycle::{LapinConnectionFactory, LifecycleController};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "amqp_lifecycle=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = ServiceConfig::load()?;

    info!("Starting AMQP Lifecycle Service v{}", env!("CARGO_PKG_VERSION"));
    info!(broker = %config.amqp.target(), "Broker configured");

    let mut failures = validate(&config.amqp);
    failures.extend(validate_consumer(&config.consume));
    if !failures.is_empty() {
        for failure in &failures {
            error!(subject = %failure.subject, "{}", failure.explanation);
        }
        bail!("refusing to start with {} configuration problem(s)", failures.len());
    }

    let publisher = LifecycleController::new(
        config.amqp.clone(),
        LapinConnectionFactory::new(),
        PublishStep::new(config.publish.clone()),
    )?;
    let consumer = LifecycleController::new(
        config.amqp.clone(),
        LapinConnectionFactory::new(),
        ConsumeStep::new(config.consume.clone()),
    )?;

    let state = Arc::new(AppState {
        publisher,
        consumer,
    });

    // Build HTTP routes
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/publish", post(handlers::publish))
        .route("/consume", post(handlers::consume))
        .route("/pool", get(handlers::pool_status))
        .with_state(Arc::clone(&state))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release pooled broker connections
    let published = state.publisher.shutdown().await;
    let consumed = state.consumer.shutdown().await;
    let failed = published.failures.len() + consumed.failures.len();
    if failed > 0 {
        warn!(failed, "Some AMQP resources failed to close");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
