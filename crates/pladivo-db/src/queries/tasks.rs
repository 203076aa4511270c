//! Database query functions for the `tasks` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{Task, TaskStatus};

/// Parameters for inserting a fanned-out task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub event_plan_id: Uuid,
    pub booking_id: String,
    pub position: i32,
    pub category: String,
    pub description: String,
    pub staff_id: Option<String>,
    pub custom_owner: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub created_by: Option<String>,
}

/// Insert a new task row. Returns the inserted task with server-generated
/// defaults (id, status, timestamps).
pub async fn insert_task<'e, E>(executor: E, new: &NewTask) -> Result<Task>
where
    E: PgExecutor<'e>,
{
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks \
             (event_plan_id, booking_id, position, category, description, \
              staff_id, custom_owner, deadline, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(new.event_plan_id)
    .bind(&new.booking_id)
    .bind(new.position)
    .bind(&new.category)
    .bind(&new.description)
    .bind(&new.staff_id)
    .bind(&new.custom_owner)
    .bind(new.deadline)
    .bind(&new.created_by)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert task {} for event plan {}",
            new.position, new.event_plan_id
        )
    })?;

    Ok(task)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// List all tasks for a plan in fan-out order.
pub async fn list_tasks_for_plan(pool: &PgPool, event_plan_id: Uuid) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE event_plan_id = $1 ORDER BY position ASC",
    )
    .bind(event_plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list tasks for event plan")?;

    Ok(tasks)
}

/// List the tasks owned by a staff member, earliest deadline first.
pub async fn list_tasks_for_staff(pool: &PgPool, staff_id: &str) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE staff_id = $1 \
         ORDER BY deadline ASC NULLS LAST, created_at ASC",
    )
    .bind(staff_id)
    .fetch_all(pool)
    .await
    .context("failed to list tasks for staff member")?;

    Ok(tasks)
}

/// Count the tasks created for a plan.
pub async fn count_tasks_for_plan(pool: &PgPool, event_plan_id: Uuid) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE event_plan_id = $1")
        .bind(event_plan_id)
        .fetch_one(pool)
        .await
        .context("failed to count tasks for event plan")?;

    Ok(row.0)
}

/// Atomically move a task from one status to another.
///
/// The WHERE clause includes `status = $from`, so the row only changes if
/// nobody moved it in the meantime. Returns the number of rows affected.
pub async fn transition_task_status(
    pool: &PgPool,
    task_id: Uuid,
    from: TaskStatus,
    to: TaskStatus,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = $3",
    )
    .bind(to)
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition task status")?;

    Ok(result.rows_affected())
}
