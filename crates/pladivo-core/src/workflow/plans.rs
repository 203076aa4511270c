//! Plan intake and editing: everything about a plan that is not a status
//! transition.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::{EventPlan, EventPlanStatus};
use pladivo_db::queries::event_plans::{self as db, StepSections};

use crate::error::{DomainError, DomainResult, is_unique_violation};

/// Input for a new plan. Accepts `bookingId` or `booking_id`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    #[serde(alias = "booking_id")]
    pub booking_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(flatten)]
    pub steps: StepSections,
}

/// Input for editing a plan's content.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEdit {
    pub title: Option<String>,
    /// Version the client edited; defaults to the current one.
    pub version: Option<i32>,
    #[serde(flatten)]
    pub steps: StepSections,
}

/// Statuses in which step sections may be edited.
pub fn is_editable(status: EventPlanStatus) -> bool {
    matches!(
        status,
        EventPlanStatus::Draft
            | EventPlanStatus::ManagerApproved
            | EventPlanStatus::ManagerApprovedDemo
    )
}

/// Create a draft plan for a booking. A booking has at most one plan.
pub async fn create_plan(pool: &PgPool, input: &NewPlan) -> DomainResult<EventPlan> {
    let booking_id = input.booking_id.trim();
    if booking_id.is_empty() {
        return Err(DomainError::validation("Thiếu mã booking"));
    }

    match db::insert_plan(pool, booking_id, input.title.trim(), &input.steps).await {
        Ok(plan) => {
            tracing::info!(plan_id = %plan.id, booking_id, "event plan created");
            Ok(plan)
        }
        Err(e) if is_unique_violation(&e) => Err(DomainError::conflict(
            "Booking này đã có kế hoạch sự kiện",
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_plan(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    db::get_plan(pool, plan_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy kế hoạch sự kiện"))
}

pub async fn get_plan_by_booking(pool: &PgPool, booking_id: &str) -> DomainResult<EventPlan> {
    db::get_plan_by_booking(pool, booking_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy kế hoạch sự kiện"))
}

pub async fn list_plans(
    pool: &PgPool,
    status: Option<EventPlanStatus>,
) -> DomainResult<Vec<EventPlan>> {
    Ok(db::list_plans(pool, status).await?)
}

/// Replace the title and/or step sections of an editable plan.
pub async fn update_plan(pool: &PgPool, plan_id: Uuid, edit: &PlanEdit) -> DomainResult<EventPlan> {
    let plan = get_plan(pool, plan_id).await?;

    if !is_editable(plan.status) {
        return Err(DomainError::wrong_plan_state("update-steps", plan.status));
    }
    if edit.title.is_none() && edit.steps.is_empty() {
        return Ok(plan);
    }

    let expected = edit.version.unwrap_or(plan.version);
    let title = edit.title.as_deref().map(str::trim);

    match db::update_plan_steps(pool, plan.id, expected, title, &edit.steps).await? {
        Some(updated) => {
            tracing::info!(plan_id = %plan.id, version = updated.version, "event plan edited");
            Ok(updated)
        }
        None => Err(DomainError::conflict(
            "Kế hoạch đã được cập nhật bởi người khác, vui lòng tải lại",
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_plan_accepts_both_key_styles() {
        for body in [
            json!({"bookingId": "bk-1", "title": "T", "step4": {"checklist": []}}),
            json!({"booking_id": "bk-1", "title": "T", "step4": {"checklist": []}}),
        ] {
            let plan: NewPlan = serde_json::from_value(body).unwrap();
            assert_eq!(plan.booking_id, "bk-1");
            assert_eq!(plan.steps.step4, Some(json!({"checklist": []})));
        }
    }

    #[test]
    fn editable_statuses() {
        let editable: Vec<_> = EventPlanStatus::ALL
            .into_iter()
            .filter(|s| is_editable(*s))
            .collect();
        assert_eq!(
            editable,
            vec![
                EventPlanStatus::Draft,
                EventPlanStatus::ManagerApproved,
                EventPlanStatus::ManagerApprovedDemo,
            ]
        );
    }

    #[test]
    fn new_plan_accepts_camel_case_and_flattened_steps() {
        let input: NewPlan = serde_json::from_value(json!({
            "bookingId": "bk-7",
            "title": "Tiệc cưới",
            "step4": { "checklist": [] }
        }))
        .unwrap();
        assert_eq!(input.booking_id, "bk-7");
        assert_eq!(input.steps.step4, Some(json!({ "checklist": [] })));
        assert!(input.steps.step1.is_none());
    }

    #[test]
    fn empty_edit_has_no_steps() {
        let edit: PlanEdit = serde_json::from_value(json!({})).unwrap();
        assert!(edit.title.is_none());
        assert!(edit.steps.is_empty());
    }
}
