//! Convenience dispatch helpers that wrap [`super::EventPlanStateMachine`]
//! transitions with semantic names.

use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::{EventPlan, EventPlanStatus};

use super::{Decision, EventPlanStateMachine, PlanAction};
use crate::error::DomainResult;

async fn run(pool: &PgPool, plan_id: Uuid, action: PlanAction) -> DomainResult<EventPlan> {
    Ok(EventPlanStateMachine::transition(pool, plan_id, action)
        .await?
        .plan)
}

/// Submit a draft for manager review: `draft -> pending_manager`.
pub async fn submit_for_approval(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    run(pool, plan_id, PlanAction::SubmitForApproval).await
}

/// Submit a draft on the demo track: `draft -> pending_manager_demo`.
pub async fn submit_demo(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    run(pool, plan_id, PlanAction::SubmitDemo).await
}

/// Record the manager's decision. Approval moves the plan forward,
/// rejection sends it back to `draft`.
pub async fn manager_approve(
    pool: &PgPool,
    plan_id: Uuid,
    approved: bool,
    comment: Option<String>,
    manager_id: Option<String>,
) -> DomainResult<EventPlan> {
    let decision = Decision {
        approved,
        actor_id: manager_id,
        comment,
    };
    run(pool, plan_id, PlanAction::ManagerDecision(decision)).await
}

/// Send a manager-approved plan to the customer.
pub async fn submit_to_customer(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    run(pool, plan_id, PlanAction::SubmitToCustomer).await
}

/// Record the customer's decision. Rejection returns the plan to
/// `manager_approved` for rework.
pub async fn customer_approve(
    pool: &PgPool,
    plan_id: Uuid,
    approved: bool,
    comment: Option<String>,
    customer_id: Option<String>,
) -> DomainResult<EventPlan> {
    let decision = Decision {
        approved,
        actor_id: customer_id,
        comment,
    };
    run(pool, plan_id, PlanAction::CustomerDecision(decision)).await
}

/// Fan the plan's owned checklist items out into tasks and move it to
/// `in_progress`. Returns the plan and the created task ids.
pub async fn create_tasks(
    pool: &PgPool,
    plan_id: Uuid,
    staff_id: &str,
) -> DomainResult<(EventPlan, Vec<Uuid>)> {
    let done = EventPlanStateMachine::transition(
        pool,
        plan_id,
        PlanAction::CreateTasks {
            staff_id: staff_id.to_string(),
        },
    )
    .await?;
    Ok((done.plan, done.created_tasks))
}

/// Close out a running plan: `in_progress -> completed`.
pub async fn complete(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    run(pool, plan_id, PlanAction::Complete).await
}

/// Cancel a plan from any non-terminal status.
pub async fn cancel(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    run(pool, plan_id, PlanAction::Cancel).await
}

/// Overwrite the plan's status unconditionally.
pub async fn override_status(
    pool: &PgPool,
    plan_id: Uuid,
    status: EventPlanStatus,
) -> DomainResult<EventPlan> {
    run(pool, plan_id, PlanAction::Override(status)).await
}
