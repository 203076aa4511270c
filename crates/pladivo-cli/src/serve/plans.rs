//! Event plan and task handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pladivo_core::fanout::tasks;
use pladivo_core::workflow::dispatch;
use pladivo_core::workflow::plans::{self, NewPlan, PlanEdit};
use pladivo_db::models::{EventPlan, EventPlanStatus, Task, TaskStatus};

use super::AppState;
use super::auth::{BACK_OFFICE, CUSTOMER_SIDE, Caller, MANAGER};
use super::error::{ApiResponse, ApiResult, AppError};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmitBody {
    /// Submit on the demo track.
    pub demo: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerDecisionBody {
    pub approved: bool,
    #[serde(default)]
    pub comment: Option<String>,
    /// Defaults to the caller's token subject.
    #[serde(default, alias = "manager_id")]
    pub manager_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerDecisionBody {
    pub approved: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTasksBody {
    /// Defaults to the caller's token subject.
    #[serde(alias = "staff_id")]
    pub staff_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody<S> {
    pub status: S,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<EventPlanStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskQuery {
    /// Defaults to the caller's token subject.
    #[serde(alias = "staff_id")]
    pub staff_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTasks {
    pub plan: EventPlan,
    pub created_task_ids: Vec<Uuid>,
    pub count: usize,
}

/// Parse an optional JSON body: an empty body yields the default.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Dữ liệu không hợp lệ: {e}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

pub async fn create_plan(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<NewPlan>, JsonRejection>,
) -> ApiResult<EventPlan> {
    caller.require(BACK_OFFICE)?;
    let Json(input) = payload?;
    let plan = plans::create_plan(&state.pool, &input).await?;
    Ok(ApiResponse::ok_with_message(plan, "Đã tạo kế hoạch sự kiện"))
}

pub async fn list_plans(
    State(state): State<AppState>,
    _caller: Caller,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<EventPlan>> {
    Ok(ApiResponse::ok(plans::list_plans(&state.pool, query.status).await?))
}

pub async fn get_plan(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<EventPlan> {
    Ok(ApiResponse::ok(plans::get_plan(&state.pool, id).await?))
}

pub async fn get_plan_by_booking(
    State(state): State<AppState>,
    _caller: Caller,
    Path(booking_id): Path<String>,
) -> ApiResult<EventPlan> {
    Ok(ApiResponse::ok(
        plans::get_plan_by_booking(&state.pool, &booking_id).await?,
    ))
}

pub async fn update_steps(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<PlanEdit>, JsonRejection>,
) -> ApiResult<EventPlan> {
    caller.require(BACK_OFFICE)?;
    let Json(edit) = payload?;
    let plan = plans::update_plan(&state.pool, id, &edit).await?;
    Ok(ApiResponse::ok_with_message(plan, "Đã cập nhật kế hoạch"))
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

pub async fn submit_for_approval(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<EventPlan> {
    caller.require(BACK_OFFICE)?;
    let body: SubmitBody = optional_body(&body)?;
    let plan = if body.demo {
        dispatch::submit_demo(&state.pool, id).await?
    } else {
        dispatch::submit_for_approval(&state.pool, id).await?
    };
    Ok(ApiResponse::ok_with_message(plan, "Đã gửi kế hoạch cho quản lý duyệt"))
}

pub async fn manager_approve(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<ManagerDecisionBody>, JsonRejection>,
) -> ApiResult<EventPlan> {
    caller.require(MANAGER)?;
    let Json(body) = payload?;
    let manager_id = non_empty(body.manager_id).unwrap_or_else(|| caller.subject().to_string());

    let plan = dispatch::manager_approve(
        &state.pool,
        id,
        body.approved,
        non_empty(body.comment),
        Some(manager_id),
    )
    .await?;
    let message = if body.approved {
        "Quản lý đã duyệt kế hoạch"
    } else {
        "Quản lý đã từ chối kế hoạch"
    };
    Ok(ApiResponse::ok_with_message(plan, message))
}

pub async fn submit_to_customer(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<EventPlan> {
    caller.require(BACK_OFFICE)?;
    let plan = dispatch::submit_to_customer(&state.pool, id).await?;
    Ok(ApiResponse::ok_with_message(plan, "Đã gửi kế hoạch cho khách hàng"))
}

pub async fn customer_approve(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<CustomerDecisionBody>, JsonRejection>,
) -> ApiResult<EventPlan> {
    caller.require(CUSTOMER_SIDE)?;
    let Json(body) = payload?;
    let plan = dispatch::customer_approve(
        &state.pool,
        id,
        body.approved,
        non_empty(body.comment),
        Some(caller.subject().to_string()),
    )
    .await?;
    let message = if body.approved {
        "Khách hàng đã duyệt kế hoạch"
    } else {
        "Khách hàng đã yêu cầu chỉnh sửa kế hoạch"
    };
    Ok(ApiResponse::ok_with_message(plan, message))
}

pub async fn create_tasks(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<CreatedTasks> {
    caller.require(BACK_OFFICE)?;
    let body: CreateTasksBody = optional_body(&body)?;
    let staff_id = non_empty(body.staff_id).unwrap_or_else(|| caller.subject().to_string());

    let (plan, created_task_ids) = dispatch::create_tasks(&state.pool, id, &staff_id).await?;
    let count = created_task_ids.len();
    Ok(ApiResponse::ok_with_message(
        CreatedTasks {
            plan,
            created_task_ids,
            count,
        },
        format!("Đã tạo {count} công việc"),
    ))
}

pub async fn complete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<EventPlan> {
    caller.require(BACK_OFFICE)?;
    Ok(ApiResponse::ok(dispatch::complete(&state.pool, id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<EventPlan> {
    caller.require(BACK_OFFICE)?;
    Ok(ApiResponse::ok(dispatch::cancel(&state.pool, id).await?))
}

pub async fn override_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusBody<EventPlanStatus>>, JsonRejection>,
) -> ApiResult<EventPlan> {
    caller.require(MANAGER)?;
    let Json(body) = payload?;
    tracing::warn!(
        plan_id = %id,
        actor = caller.subject(),
        role = %caller.0.role,
        status = %body.status,
        "status override requested"
    );
    let plan = dispatch::override_status(&state.pool, id, body.status).await?;
    Ok(ApiResponse::ok(plan))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

pub async fn list_tasks(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Task>> {
    Ok(ApiResponse::ok(tasks::list_tasks(&state.pool, id).await?))
}

pub async fn update_task_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusBody<TaskStatus>>, JsonRejection>,
) -> ApiResult<Task> {
    caller.require(BACK_OFFICE)?;
    let Json(body) = payload?;
    let task = tasks::update_task_status(&state.pool, id, body.status).await?;
    Ok(ApiResponse::ok(task))
}

/// `GET /api/tasks?staffId=`: tasks assigned to one staff member, the
/// caller by default.
pub async fn list_staff_tasks(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Vec<Task>> {
    caller.require(BACK_OFFICE)?;
    let staff_id = non_empty(query.staff_id).unwrap_or_else(|| caller.subject().to_string());
    Ok(ApiResponse::ok(
        tasks::list_tasks_for_staff(&state.pool, &staff_id).await?,
    ))
}
