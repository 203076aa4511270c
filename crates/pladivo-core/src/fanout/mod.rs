//! Task fan-out: expands the owned checklist items of an approved plan into
//! individually tracked task rows.
//!
//! Sources, in order:
//!
//! ```text
//! step4.checklist           -> [Pre-event]
//! step5.marketingChecklist  -> [Marketing]
//! step6.eventDayChecklist   -> [Event Day]
//! step7.postEvent           -> [Post-event]
//! ```
//!
//! Only items with a non-empty `owner` become tasks. The fan-out is one-shot:
//! the plan's `tasks_created` flag is flipped in the same transaction as the
//! inserts.

pub mod tasks;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::EventPlan;
use pladivo_db::queries::event_plans as plan_db;
use pladivo_db::queries::tasks::{self as task_db, NewTask};

use crate::error::DomainResult;

/// One checklist source: which step section, which array inside it, and
/// the stage tag prefixed to each task category.
#[derive(Debug, Clone, Copy)]
pub struct ChecklistSource {
    pub step: u8,
    pub field: &'static str,
    pub tag: &'static str,
}

pub const CHECKLIST_SOURCES: [ChecklistSource; 4] = [
    ChecklistSource {
        step: 4,
        field: "checklist",
        tag: "[Pre-event]",
    },
    ChecklistSource {
        step: 5,
        field: "marketingChecklist",
        tag: "[Marketing]",
    },
    ChecklistSource {
        step: 6,
        field: "eventDayChecklist",
        tag: "[Event Day]",
    },
    ChecklistSource {
        step: 7,
        field: "postEvent",
        tag: "[Post-event]",
    },
];

/// A checklist item as stored in a step section. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ChecklistItem {
    category: Option<String>,
    description: Option<String>,
    owner: Option<String>,
    deadline: Option<String>,
    #[serde(alias = "customOwner")]
    custom_owner: Option<String>,
}

fn step_section(plan: &EventPlan, step: u8) -> &Value {
    match step {
        1 => &plan.step1.0,
        2 => &plan.step2.0,
        3 => &plan.step3.0,
        4 => &plan.step4.0,
        5 => &plan.step5.0,
        6 => &plan.step6.0,
        _ => &plan.step7.0,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a checklist deadline. Accepts `YYYY-MM-DD`, `DD/MM/YYYY` and
/// RFC 3339 timestamps (the local date of the timestamp is kept).
pub fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    tracing::warn!(deadline = raw, "ignoring unparseable checklist deadline");
    None
}

fn stage_category(tag: &str, category: Option<String>) -> String {
    match non_empty(category) {
        Some(category) => format!("{tag} {category}"),
        None => tag.to_string(),
    }
}

/// Build the task rows for every owned checklist item of `plan`, in source
/// order. Pure: performs no I/O.
pub fn collect_tasks(plan: &EventPlan, created_by: &str) -> Vec<NewTask> {
    let mut tasks = Vec::new();

    for source in &CHECKLIST_SOURCES {
        let Some(items) = step_section(plan, source.step)
            .get(source.field)
            .and_then(Value::as_array)
        else {
            continue;
        };

        for (index, raw) in items.iter().enumerate() {
            let item: ChecklistItem = match serde_json::from_value(raw.clone()) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(
                        plan_id = %plan.id,
                        step = source.step,
                        index,
                        error = %e,
                        "skipping malformed checklist item"
                    );
                    continue;
                }
            };

            let Some(owner) = non_empty(item.owner) else {
                continue;
            };

            tasks.push(NewTask {
                event_plan_id: plan.id,
                booking_id: plan.booking_id.clone(),
                position: tasks.len() as i32,
                category: stage_category(source.tag, item.category),
                description: item.description.unwrap_or_default().trim().to_string(),
                staff_id: Some(owner),
                custom_owner: non_empty(item.custom_owner),
                deadline: item.deadline.as_deref().and_then(parse_deadline),
                created_by: Some(created_by.to_string()),
            });
        }
    }

    tasks
}

/// Flip the plan to `in_progress` and insert its tasks in one transaction.
///
/// Returns `None` when the plan's version (or state) changed since `plan`
/// was read; nothing is written in that case.
pub(crate) async fn apply(
    pool: &PgPool,
    plan: &EventPlan,
    created_by: &str,
) -> DomainResult<Option<(EventPlan, Vec<Uuid>)>> {
    let new_tasks = collect_tasks(plan, created_by);

    let mut tx = pool.begin().await?;

    let Some(updated) =
        plan_db::mark_tasks_created(&mut *tx, plan.id, plan.version, created_by).await?
    else {
        tx.rollback().await?;
        return Ok(None);
    };

    let mut ids = Vec::with_capacity(new_tasks.len());
    for new in &new_tasks {
        let task = task_db::insert_task(&mut *tx, new).await?;
        ids.push(task.id);
    }

    tx.commit().await?;

    tracing::info!(
        plan_id = %plan.id,
        booking_id = %plan.booking_id,
        created_by,
        task_count = ids.len(),
        "tasks created from plan checklists"
    );

    Ok(Some((updated, ids)))
}
