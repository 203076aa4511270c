//! Sepay webhook receiver.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::Utc;
use serde_json::{Value, json};

use pladivo_core::auth::guard::{self, GuardError};
use pladivo_core::payment::{ReconcileOutcome, SepayWebhookPayload, reconcile_payment};

use super::AppState;
use super::error::{ApiResponse, ApiResult, AppError};

/// `GET /sepay/webhook`: lets the gateway check the endpoint is reachable.
pub async fn reachability() -> ApiResponse<Value> {
    ApiResponse::ok_with_message(json!({ "service": "sepay-webhook" }), "Webhook đang hoạt động")
}

/// `POST /sepay/webhook`: reconcile one transfer notification.
///
/// The API key is checked before the body is looked at.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<ReconcileOutcome> {
    let header = headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().map_err(|_| GuardError::WrongScheme))
        .transpose()?;
    guard::require_api_key(&state.sepay_api_key, header)?;

    let Json(raw) = payload?;
    let parsed: SepayWebhookPayload = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::bad_request(format!("Dữ liệu webhook không hợp lệ: {e}")))?;

    tracing::info!(
        transaction_id = %parsed.id,
        gateway = %parsed.gateway,
        transfer_type = %parsed.transfer_type,
        amount = parsed.amount_in,
        "sepay webhook received"
    );

    let outcome = reconcile_payment(&state.pool, &state.settings, &parsed, &raw, Utc::now()).await?;
    let message = match &outcome {
        ReconcileOutcome::Ignored { .. } => "Bỏ qua giao dịch không phải tiền vào",
        ReconcileOutcome::AlreadyPaid { .. } => "Đợt thanh toán đã được ghi nhận trước đó",
        ReconcileOutcome::Paid { .. } => "Đã ghi nhận thanh toán",
    };
    Ok(ApiResponse::ok_with_message(outcome, message))
}
