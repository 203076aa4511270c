//! Event plan state machine.
//!
//! Every status change of a plan goes through [`EventPlanStateMachine`],
//! which owns the `(status, action) -> status` table, records approval
//! decisions and performs the version-guarded write.

pub mod dispatch;
pub mod plans;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use pladivo_db::models::{ApprovalRecord, EventPlan, EventPlanStatus, PlanApprovals};
use pladivo_db::queries::event_plans as db;

use crate::error::{DomainError, DomainResult};
use crate::fanout;

/// A manager or customer decision on a pending plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,
    pub actor_id: Option<String>,
    pub comment: Option<String>,
}

impl Decision {
    fn record(&self) -> ApprovalRecord {
        ApprovalRecord {
            approved: self.approved,
            approver_id: self.actor_id.clone(),
            at: Utc::now(),
            comment: self.comment.clone(),
        }
    }
}

/// Something a user asks to do to a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    SubmitForApproval,
    SubmitDemo,
    ManagerDecision(Decision),
    SubmitToCustomer,
    CustomerDecision(Decision),
    CreateTasks { staff_id: String },
    Complete,
    Cancel,
    /// Direct status overwrite; bypasses the table.
    Override(EventPlanStatus),
}

impl PlanAction {
    /// The action's name as exposed on the HTTP surface.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitForApproval => "submit-for-approval",
            Self::SubmitDemo => "submit-demo",
            Self::ManagerDecision(_) => "manager-approve",
            Self::SubmitToCustomer => "submit-to-customer",
            Self::CustomerDecision(_) => "customer-approve",
            Self::CreateTasks { .. } => "create-tasks",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Override(_) => "override-status",
        }
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone)]
pub struct Transitioned {
    pub plan: EventPlan,
    /// Ids of the tasks created by a `CreateTasks` action, in source order.
    pub created_tasks: Vec<Uuid>,
}

/// The event plan state machine.
///
/// ```text
/// draft                 -> pending_manager        (submit-for-approval)
/// draft                 -> pending_manager_demo   (submit-demo)
/// pending_manager       -> manager_approved       (manager approves)
/// pending_manager       -> draft                  (manager rejects)
/// manager_approved      -> pending_customer       (submit-to-customer)
/// pending_customer      -> customer_approved      (customer approves)
/// pending_customer      -> manager_approved       (customer rejects)
/// customer_approved     -> in_progress            (create-tasks, once)
/// in_progress           -> completed              (complete)
/// <non-terminal>        -> cancelled              (cancel)
/// <any>                 -> <any>                  (override)
/// ```
///
/// The `*_demo` states mirror the main track up to `customer_approved_demo`
/// and never fan out into tasks.
pub struct EventPlanStateMachine;

impl EventPlanStateMachine {
    /// Look up the status `action` leads to from `from`, or `None` when the
    /// pair is not in the table.
    pub fn next_status(from: EventPlanStatus, action: &PlanAction) -> Option<EventPlanStatus> {
        use EventPlanStatus as S;

        match (from, action) {
            (S::Draft, PlanAction::SubmitForApproval) => Some(S::PendingManager),
            (S::Draft, PlanAction::SubmitDemo) => Some(S::PendingManagerDemo),

            (S::PendingManager, PlanAction::ManagerDecision(d)) => Some(if d.approved {
                S::ManagerApproved
            } else {
                S::Draft
            }),
            (S::PendingManagerDemo, PlanAction::ManagerDecision(d)) => Some(if d.approved {
                S::ManagerApprovedDemo
            } else {
                S::Draft
            }),

            (S::ManagerApproved, PlanAction::SubmitToCustomer) => Some(S::PendingCustomer),
            (S::ManagerApprovedDemo, PlanAction::SubmitToCustomer) => {
                Some(S::PendingCustomerDemo)
            }

            (S::PendingCustomer, PlanAction::CustomerDecision(d)) => Some(if d.approved {
                S::CustomerApproved
            } else {
                S::ManagerApproved
            }),
            (S::PendingCustomerDemo, PlanAction::CustomerDecision(d)) => Some(if d.approved {
                S::CustomerApprovedDemo
            } else {
                S::ManagerApprovedDemo
            }),

            (S::CustomerApproved, PlanAction::CreateTasks { .. }) => Some(S::InProgress),
            (S::InProgress, PlanAction::Complete) => Some(S::Completed),

            (s, PlanAction::Cancel) if !s.is_terminal() => Some(S::Cancelled),
            (_, PlanAction::Override(to)) => Some(*to),

            _ => None,
        }
    }

    /// Names of the table actions accepted from `from` (override excluded).
    pub fn allowed_actions(from: EventPlanStatus) -> Vec<&'static str> {
        let decision = PlanAction::ManagerDecision(Decision {
            approved: true,
            actor_id: None,
            comment: None,
        });
        let customer = PlanAction::CustomerDecision(Decision {
            approved: true,
            actor_id: None,
            comment: None,
        });
        let candidates = [
            PlanAction::SubmitForApproval,
            PlanAction::SubmitDemo,
            decision,
            PlanAction::SubmitToCustomer,
            customer,
            PlanAction::CreateTasks {
                staff_id: String::new(),
            },
            PlanAction::Complete,
            PlanAction::Cancel,
        ];

        candidates
            .iter()
            .filter(|a| Self::next_status(from, a).is_some())
            .map(PlanAction::name)
            .collect()
    }

    /// Validate `action` against an already loaded plan and return the
    /// target status.
    pub fn check(plan: &EventPlan, action: &PlanAction) -> DomainResult<EventPlanStatus> {
        if matches!(action, PlanAction::CreateTasks { .. }) && plan.tasks_created {
            return Err(DomainError::invalid_state(
                "Công việc đã được tạo cho kế hoạch này",
            ));
        }

        Self::next_status(plan.status, action)
            .ok_or_else(|| DomainError::wrong_plan_state(action.name(), plan.status))
    }

    /// Apply `action` to the plan with id `plan_id`.
    ///
    /// Loads the plan, validates the action, records the approval for
    /// decisions and writes the new status conditional on the version that
    /// was read. `CreateTasks` also inserts the fanned-out tasks in the same
    /// transaction.
    ///
    /// Errors:
    /// - `NotFound` when the plan does not exist.
    /// - `InvalidState` when the action is not allowed from the current
    ///   status (including after losing a race to a writer that moved it).
    /// - `Conflict` when another writer bumped the version but the action
    ///   would still be valid.
    pub async fn transition(
        pool: &PgPool,
        plan_id: Uuid,
        action: PlanAction,
    ) -> DomainResult<Transitioned> {
        let plan = load(pool, plan_id).await?;
        let to = Self::check(&plan, &action)?;

        if let PlanAction::Override(_) = action {
            tracing::warn!(
                plan_id = %plan.id,
                from = %plan.status,
                to = %to,
                "event plan status overridden"
            );
        }

        let written = match &action {
            PlanAction::CreateTasks { staff_id } => fanout::apply(pool, &plan, staff_id)
                .await?
                .map(|(plan, created_tasks)| Transitioned {
                    plan,
                    created_tasks,
                }),
            _ => {
                let approvals = updated_approvals(&plan, &action);
                db::update_plan_status(pool, plan.id, plan.version, to, approvals.as_ref())
                    .await?
                    .map(|plan| Transitioned {
                        plan,
                        created_tasks: Vec::new(),
                    })
            }
        };

        match written {
            Some(done) => {
                tracing::info!(
                    plan_id = %plan.id,
                    action = action.name(),
                    from = %plan.status,
                    to = %done.plan.status,
                    version = done.plan.version,
                    "event plan transitioned"
                );
                Ok(done)
            }
            None => Err(lost_race(pool, &plan, &action).await),
        }
    }
}

/// The approvals document after recording `action`, or `None` when the
/// action does not touch approvals.
fn updated_approvals(plan: &EventPlan, action: &PlanAction) -> Option<PlanApprovals> {
    let mut approvals = plan.approvals.0.clone();
    match action {
        PlanAction::ManagerDecision(d) => approvals.manager = Some(d.record()),
        PlanAction::CustomerDecision(d) => approvals.customer = Some(d.record()),
        _ => return None,
    }
    Some(approvals)
}

async fn load(pool: &PgPool, plan_id: Uuid) -> DomainResult<EventPlan> {
    db::get_plan(pool, plan_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Không tìm thấy kế hoạch sự kiện"))
}

/// Work out why a guarded write matched no row.
async fn lost_race(pool: &PgPool, read: &EventPlan, action: &PlanAction) -> DomainError {
    let current = match db::get_plan(pool, read.id).await {
        Ok(Some(current)) => current,
        Ok(None) => return DomainError::not_found("Không tìm thấy kế hoạch sự kiện"),
        Err(e) => return e.into(),
    };

    if let Err(e) = EventPlanStateMachine::check(&current, action) {
        return e;
    }

    tracing::warn!(
        plan_id = %read.id,
        read_version = read.version,
        current_version = current.version,
        action = action.name(),
        "event plan write lost optimistic lock"
    );
    DomainError::conflict("Kế hoạch đã được cập nhật bởi người khác, vui lòng tải lại")
}

#[cfg(test)]
mod tests {
    use super::*;

    use EventPlanStatus as S;

    fn decision(approved: bool) -> Decision {
        Decision {
            approved,
            actor_id: Some("mgr-1".to_string()),
            comment: None,
        }
    }

    fn next(from: S, action: PlanAction) -> Option<S> {
        EventPlanStateMachine::next_status(from, &action)
    }

    #[test]
    fn main_track() {
        assert_eq!(next(S::Draft, PlanAction::SubmitForApproval), Some(S::PendingManager));
        assert_eq!(
            next(S::PendingManager, PlanAction::ManagerDecision(decision(true))),
            Some(S::ManagerApproved)
        );
        assert_eq!(
            next(S::ManagerApproved, PlanAction::SubmitToCustomer),
            Some(S::PendingCustomer)
        );
        assert_eq!(
            next(S::PendingCustomer, PlanAction::CustomerDecision(decision(true))),
            Some(S::CustomerApproved)
        );
        assert_eq!(
            next(
                S::CustomerApproved,
                PlanAction::CreateTasks {
                    staff_id: "s".into()
                }
            ),
            Some(S::InProgress)
        );
        assert_eq!(next(S::InProgress, PlanAction::Complete), Some(S::Completed));
    }

    #[test]
    fn demo_track_mirrors_main_track() {
        assert_eq!(next(S::Draft, PlanAction::SubmitDemo), Some(S::PendingManagerDemo));
        assert_eq!(
            next(S::PendingManagerDemo, PlanAction::ManagerDecision(decision(true))),
            Some(S::ManagerApprovedDemo)
        );
        assert_eq!(
            next(S::ManagerApprovedDemo, PlanAction::SubmitToCustomer),
            Some(S::PendingCustomerDemo)
        );
        assert_eq!(
            next(S::PendingCustomerDemo, PlanAction::CustomerDecision(decision(false))),
            Some(S::ManagerApprovedDemo)
        );
        assert_eq!(
            next(
                S::CustomerApprovedDemo,
                PlanAction::CreateTasks {
                    staff_id: "s".into()
                }
            ),
            None,
            "demo plans never fan out"
        );
    }

    #[test]
    fn rejections_step_back() {
        assert_eq!(
            next(S::PendingManager, PlanAction::ManagerDecision(decision(false))),
            Some(S::Draft)
        );
        assert_eq!(
            next(S::PendingManagerDemo, PlanAction::ManagerDecision(decision(false))),
            Some(S::Draft)
        );
        assert_eq!(
            next(S::PendingCustomer, PlanAction::CustomerDecision(decision(false))),
            Some(S::ManagerApproved)
        );
    }

    #[test]
    fn manager_decision_on_draft_is_rejected() {
        // After a rejection the plan is draft again; a second decision must
        // wait for a fresh submit.
        assert_eq!(next(S::Draft, PlanAction::ManagerDecision(decision(true))), None);
        assert_eq!(next(S::Draft, PlanAction::ManagerDecision(decision(false))), None);
    }

    #[test]
    fn cancel_from_every_non_terminal_state() {
        for from in S::ALL {
            let to = next(from, PlanAction::Cancel);
            if from.is_terminal() {
                assert_eq!(to, None, "{from} is terminal");
            } else {
                assert_eq!(to, Some(S::Cancelled), "{from} should cancel");
            }
        }
    }

    #[test]
    fn override_reaches_any_status_from_any_status() {
        for from in S::ALL {
            for to in S::ALL {
                assert_eq!(next(from, PlanAction::Override(to)), Some(to));
            }
        }
    }

    #[test]
    fn terminal_states_accept_only_override() {
        for from in [S::Completed, S::Cancelled] {
            assert!(EventPlanStateMachine::allowed_actions(from).is_empty());
        }
    }

    #[test]
    fn allowed_actions_for_draft() {
        assert_eq!(
            EventPlanStateMachine::allowed_actions(S::Draft),
            vec!["submit-for-approval", "submit-demo", "cancel"]
        );
        assert_eq!(
            EventPlanStateMachine::allowed_actions(S::CustomerApproved),
            vec!["create-tasks", "cancel"]
        );
    }

    #[test]
    fn decisions_update_the_matching_approval_only() {
        use chrono::Utc;
        use serde_json::json;
        use sqlx::types::Json;

        let now = Utc::now();
        let plan = EventPlan {
            id: Uuid::new_v4(),
            booking_id: "b".into(),
            title: String::new(),
            status: S::PendingCustomer,
            approvals: Json(PlanApprovals::default()),
            step1: Json(json!({})),
            step2: Json(json!({})),
            step3: Json(json!({})),
            step4: Json(json!({})),
            step5: Json(json!({})),
            step6: Json(json!({})),
            step7: Json(json!({})),
            tasks_created: false,
            tasks_created_at: None,
            tasks_created_by: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let action = PlanAction::CustomerDecision(Decision {
            approved: false,
            actor_id: Some("cust-1".into()),
            comment: Some("Đổi thực đơn".into()),
        });
        let approvals = updated_approvals(&plan, &action).expect("decision records approval");
        assert!(approvals.manager.is_none());
        let customer = approvals.customer.expect("customer approval recorded");
        assert!(!customer.approved);
        assert_eq!(customer.approver_id.as_deref(), Some("cust-1"));
        assert_eq!(customer.comment.as_deref(), Some("Đổi thực đơn"));

        assert!(updated_approvals(&plan, &PlanAction::Cancel).is_none());
    }

    #[test]
    fn create_tasks_rejected_once_flag_is_set() {
        use chrono::Utc;
        use serde_json::json;
        use sqlx::types::Json;

        let now = Utc::now();
        let plan = EventPlan {
            id: Uuid::new_v4(),
            booking_id: "b".into(),
            title: String::new(),
            status: S::CustomerApproved,
            approvals: Json(PlanApprovals::default()),
            step1: Json(json!({})),
            step2: Json(json!({})),
            step3: Json(json!({})),
            step4: Json(json!({})),
            step5: Json(json!({})),
            step6: Json(json!({})),
            step7: Json(json!({})),
            tasks_created: true,
            tasks_created_at: Some(now),
            tasks_created_by: Some("s".into()),
            version: 3,
            created_at: now,
            updated_at: now,
        };

        let err = EventPlanStateMachine::check(
            &plan,
            &PlanAction::CreateTasks {
                staff_id: "s".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }
}
