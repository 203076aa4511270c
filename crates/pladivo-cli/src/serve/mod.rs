//! `pladivo serve`: the HTTP API, the Sepay webhook receiver and the email
//! outbox worker in one process.

mod auth;
mod contracts;
mod error;
mod plans;
mod webhook;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, patch, post, put};
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pladivo_core::auth::TokenConfig;
use pladivo_core::contract::ContractSettings;
use pladivo_core::notify::{EmailSender, HttpEmailSender, LogEmailSender, OutboxWorker};

use crate::config::{EmailSection, PladivoConfig};

pub use error::{ApiResponse, ApiResult, AppError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tokens: Arc<TokenConfig>,
    pub sepay_api_key: Arc<str>,
    pub settings: Arc<ContractSettings>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let plan_routes = Router::new()
        .route("/", post(plans::create_plan).get(plans::list_plans))
        .route("/{id}", get(plans::get_plan))
        .route("/by-booking/{booking_id}", get(plans::get_plan_by_booking))
        .route("/{id}/steps", put(plans::update_steps))
        .route("/{id}/submit-for-approval", post(plans::submit_for_approval))
        .route("/{id}/manager-approve", post(plans::manager_approve))
        .route("/{id}/submit-to-customer", post(plans::submit_to_customer))
        .route("/{id}/customer-approve", post(plans::customer_approve))
        .route("/{id}/create-tasks", post(plans::create_tasks))
        .route("/{id}/complete", post(plans::complete))
        .route("/{id}/cancel", post(plans::cancel))
        .route("/{id}/status", patch(plans::override_status))
        .route("/{id}/tasks", get(plans::list_tasks));

    let contract_routes = Router::new()
        .route("/", post(contracts::upsert_contract))
        .route("/{id}", get(contracts::get_contract))
        .route("/{id}/payments", get(contracts::list_payments))
        .route("/by-booking/{booking_id}", get(contracts::get_by_booking))
        .route(
            "/regenerate-payment-links",
            post(contracts::regenerate_payment_links),
        )
        .route("/resend-email", post(contracts::resend_email));

    Router::new()
        .route("/health", get(health))
        .nest("/api/event-plans", plan_routes)
        .route("/api/tasks", get(plans::list_staff_tasks))
        .route("/api/tasks/{id}/status", patch(plans::update_task_status))
        .nest("/api/event-contracts", contract_routes)
        .route(
            "/sepay/webhook",
            post(webhook::receive).get(webhook::reachability),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn email_sender(email: &EmailSection) -> Result<Arc<dyn EmailSender>> {
    match (&email.endpoint, &email.api_key) {
        (Some(endpoint), Some(api_key)) => {
            tracing::info!(endpoint = %endpoint, "emails delivered over HTTP");
            Ok(Arc::new(HttpEmailSender::new(endpoint, api_key, &email.from)?))
        }
        _ => {
            tracing::warn!("no email provider configured, emails will only be logged");
            Ok(Arc::new(LogEmailSender))
        }
    }
}

pub async fn run_serve(
    pool: PgPool,
    config: PladivoConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let sepay_api_key = config.sepay_api_key.clone().context(
        "Sepay API key not configured; set PLADIVO_SEPAY_API_KEY or sepay.api_key in the config file",
    )?;

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {bind}:{port}"))?;

    let cancel = CancellationToken::new();
    let worker = OutboxWorker::new(pool.clone(), email_sender(&config.email)?, config.outbox.clone());
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));

    let app = build_router(AppState {
        pool,
        tokens: Arc::new(config.token_config),
        sepay_api_key: Arc::from(sepay_api_key),
        settings: Arc::new(config.contract),
    });

    tracing::info!("pladivo serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "outbox worker task panicked");
    }
    served?;

    tracing::info!("pladivo serve shut down");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
            }
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
