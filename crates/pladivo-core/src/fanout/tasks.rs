//! Status tracking for fanned-out tasks.

use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::{Task, TaskStatus};
use pladivo_db::queries::event_plans as plan_db;
use pladivo_db::queries::tasks as db;

use crate::error::{DomainError, DomainResult};

/// Check whether `from -> to` is a valid task status edge.
///
/// ```text
/// pending     -> in_progress
/// in_progress -> completed
/// pending     -> cancelled
/// in_progress -> cancelled
/// ```
pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
    matches!(
        (from, to),
        (TaskStatus::Pending, TaskStatus::InProgress)
            | (TaskStatus::InProgress, TaskStatus::Completed)
            | (TaskStatus::Pending, TaskStatus::Cancelled)
            | (TaskStatus::InProgress, TaskStatus::Cancelled)
    )
}

/// List a plan's tasks in fan-out order.
pub async fn list_tasks(pool: &PgPool, plan_id: Uuid) -> DomainResult<Vec<Task>> {
    if plan_db::get_plan(pool, plan_id).await?.is_none() {
        return Err(DomainError::not_found("Không tìm thấy kế hoạch sự kiện"));
    }
    Ok(db::list_tasks_for_plan(pool, plan_id).await?)
}

/// List the tasks assigned to a staff member.
pub async fn list_tasks_for_staff(pool: &PgPool, staff_id: &str) -> DomainResult<Vec<Task>> {
    Ok(db::list_tasks_for_staff(pool, staff_id).await?)
}

/// Move a task to `to`, conditional on the status that was read.
pub async fn update_task_status(pool: &PgPool, task_id: Uuid, to: TaskStatus) -> DomainResult<Task> {
    let task = db::get_task(pool, task_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy công việc"))?;

    if !is_valid_transition(task.status, to) {
        return Err(DomainError::invalid_state(format!(
            "Không thể chuyển công việc từ '{}' sang '{to}'",
            task.status
        )));
    }

    let rows = db::transition_task_status(pool, task_id, task.status, to).await?;
    if rows == 0 {
        return Err(DomainError::conflict(
            "Công việc đã được cập nhật bởi người khác, vui lòng tải lại",
        ));
    }

    tracing::info!(task_id = %task_id, from = %task.status, to = %to, "task status updated");

    db::get_task(pool, task_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy công việc"))
}
