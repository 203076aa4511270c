//! Contract handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pladivo_core::contract::{self, ContractInput};
use pladivo_db::models::{EventContract, Payment};

use super::AppState;
use super::auth::{BACK_OFFICE, Caller};
use super::error::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRef {
    #[serde(alias = "contract_id")]
    pub contract_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SavedContract {
    #[serde(flatten)]
    pub contract: EventContract,
    pub created: bool,
}

/// Create or update the contract of a booking. The caller is recorded as
/// creator unless the body names one.
pub async fn upsert_contract(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ContractInput>, JsonRejection>,
) -> ApiResult<SavedContract> {
    caller.require(BACK_OFFICE)?;
    let Json(mut input) = payload?;
    if input.created_by.is_none() {
        input.created_by = Some(caller.subject().to_string());
    }

    let saved = contract::upsert_contract(&state.pool, &state.settings, &input).await?;
    let message = if saved.created {
        "Đã tạo hợp đồng"
    } else {
        "Đã cập nhật hợp đồng"
    };
    Ok(ApiResponse::ok_with_message(
        SavedContract {
            contract: saved.contract,
            created: saved.created,
        },
        message,
    ))
}

pub async fn get_contract(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<EventContract> {
    Ok(ApiResponse::ok(contract::get_contract(&state.pool, id).await?))
}

pub async fn get_by_booking(
    State(state): State<AppState>,
    _caller: Caller,
    Path(booking_id): Path<String>,
) -> ApiResult<EventContract> {
    Ok(ApiResponse::ok(
        contract::get_contract_by_booking(&state.pool, &booking_id).await?,
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Payment>> {
    Ok(ApiResponse::ok(contract::list_payments(&state.pool, id).await?))
}

pub async fn regenerate_payment_links(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ContractRef>, JsonRejection>,
) -> ApiResult<EventContract> {
    caller.require(BACK_OFFICE)?;
    let Json(body) = payload?;
    let contract =
        contract::regenerate_payment_links(&state.pool, &state.settings, body.contract_id).await?;
    Ok(ApiResponse::ok_with_message(
        contract,
        "Đã tạo lại mã thanh toán cho các đợt chưa thanh toán",
    ))
}

pub async fn resend_email(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ContractRef>, JsonRejection>,
) -> ApiResult<EventContract> {
    caller.require(BACK_OFFICE)?;
    let Json(body) = payload?;
    let contract =
        contract::resend_contract_email(&state.pool, &state.settings, body.contract_id).await?;
    Ok(ApiResponse::ok_with_message(
        contract,
        "Email hợp đồng đã được đưa vào hàng đợi gửi",
    ))
}
