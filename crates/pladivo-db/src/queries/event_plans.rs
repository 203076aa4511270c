//! Database query functions for the `event_plans` table.
//!
//! Every write is conditional on the `version` the caller read and bumps it,
//! so two racing writers cannot both succeed. Functions return `None` when
//! the version guard did not match.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::{EventPlan, EventPlanStatus, PlanApprovals};

/// The seven free-form planning sections. `None` means "empty" on insert
/// and "leave unchanged" on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSections {
    pub step1: Option<Value>,
    pub step2: Option<Value>,
    pub step3: Option<Value>,
    pub step4: Option<Value>,
    pub step5: Option<Value>,
    pub step6: Option<Value>,
    pub step7: Option<Value>,
}

impl StepSections {
    fn as_array(&self) -> [&Option<Value>; 7] {
        [
            &self.step1,
            &self.step2,
            &self.step3,
            &self.step4,
            &self.step5,
            &self.step6,
            &self.step7,
        ]
    }

    /// True when no section is set.
    pub fn is_empty(&self) -> bool {
        self.as_array().iter().all(|s| s.is_none())
    }
}

/// Insert a new plan in `draft`. Returns the inserted row.
pub async fn insert_plan(
    pool: &PgPool,
    booking_id: &str,
    title: &str,
    steps: &StepSections,
) -> Result<EventPlan> {
    let empty = Value::Object(Default::default());
    let mut query = sqlx::query_as::<_, EventPlan>(
        "INSERT INTO event_plans \
             (booking_id, title, step1, step2, step3, step4, step5, step6, step7) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(booking_id)
    .bind(title);
    for step in steps.as_array() {
        query = query.bind(Json(step.as_ref().unwrap_or(&empty)));
    }

    let plan = query
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to insert event plan for booking {booking_id}"))?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan<'e, E>(executor: E, id: Uuid) -> Result<Option<EventPlan>>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, EventPlan>("SELECT * FROM event_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch event plan")?;

    Ok(plan)
}

/// Fetch the plan belonging to a booking.
pub async fn get_plan_by_booking(pool: &PgPool, booking_id: &str) -> Result<Option<EventPlan>> {
    let plan = sqlx::query_as::<_, EventPlan>("SELECT * FROM event_plans WHERE booking_id = $1")
        .bind(booking_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch event plan by booking")?;

    Ok(plan)
}

/// List plans, newest first, optionally filtered by status.
pub async fn list_plans(pool: &PgPool, status: Option<EventPlanStatus>) -> Result<Vec<EventPlan>> {
    let plans = sqlx::query_as::<_, EventPlan>(
        "SELECT * FROM event_plans \
         WHERE ($1::text IS NULL OR status = $1) \
         ORDER BY created_at DESC",
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list event plans")?;

    Ok(plans)
}

/// Move a plan to `status`, optionally replacing the approvals document.
pub async fn update_plan_status<'e, E>(
    executor: E,
    id: Uuid,
    expected_version: i32,
    status: EventPlanStatus,
    approvals: Option<&PlanApprovals>,
) -> Result<Option<EventPlan>>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, EventPlan>(
        "UPDATE event_plans \
         SET status = $1, \
             approvals = COALESCE($2, approvals), \
             version = version + 1, \
             updated_at = now() \
         WHERE id = $3 AND version = $4 \
         RETURNING *",
    )
    .bind(status)
    .bind(approvals.map(Json))
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update status of event plan {id}"))?;

    Ok(plan)
}

/// Record the one-time task fan-out and move the plan to `in_progress`.
///
/// Only matches a `customer_approved` plan whose tasks were not created yet.
pub async fn mark_tasks_created<'e, E>(
    executor: E,
    id: Uuid,
    expected_version: i32,
    created_by: &str,
) -> Result<Option<EventPlan>>
where
    E: PgExecutor<'e>,
{
    let plan = sqlx::query_as::<_, EventPlan>(
        "UPDATE event_plans \
         SET tasks_created = TRUE, \
             tasks_created_at = now(), \
             tasks_created_by = $1, \
             status = 'in_progress', \
             version = version + 1, \
             updated_at = now() \
         WHERE id = $2 AND version = $3 \
           AND status = 'customer_approved' AND tasks_created = FALSE \
         RETURNING *",
    )
    .bind(created_by)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to mark tasks created on event plan {id}"))?;

    Ok(plan)
}

/// Replace the step sections that are `Some` in `steps`.
pub async fn update_plan_steps(
    pool: &PgPool,
    id: Uuid,
    expected_version: i32,
    title: Option<&str>,
    steps: &StepSections,
) -> Result<Option<EventPlan>> {
    let mut query = sqlx::query_as::<_, EventPlan>(
        "UPDATE event_plans \
         SET title = COALESCE($1, title), \
             step1 = COALESCE($2, step1), \
             step2 = COALESCE($3, step2), \
             step3 = COALESCE($4, step3), \
             step4 = COALESCE($5, step4), \
             step5 = COALESCE($6, step5), \
             step6 = COALESCE($7, step6), \
             step7 = COALESCE($8, step7), \
             version = version + 1, \
             updated_at = now() \
         WHERE id = $9 AND version = $10 \
         RETURNING *",
    )
    .bind(title);
    for step in steps.as_array() {
        query = query.bind(step.as_ref().map(Json));
    }

    let plan = query
        .bind(id)
        .bind(expected_version)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to update steps of event plan {id}"))?;

    Ok(plan)
}
