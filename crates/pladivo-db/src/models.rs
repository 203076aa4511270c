use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Workflow status of an event plan.
///
/// The `*Demo` variants form a parallel approval track used for preview
/// plans; they never fan out into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventPlanStatus {
    Draft,
    PendingManager,
    PendingManagerDemo,
    ManagerApproved,
    ManagerApprovedDemo,
    PendingCustomer,
    PendingCustomerDemo,
    CustomerApproved,
    CustomerApprovedDemo,
    InProgress,
    Completed,
    Cancelled,
}

impl EventPlanStatus {
    /// Every status, in workflow order.
    pub const ALL: [EventPlanStatus; 12] = [
        Self::Draft,
        Self::PendingManager,
        Self::PendingManagerDemo,
        Self::ManagerApproved,
        Self::ManagerApprovedDemo,
        Self::PendingCustomer,
        Self::PendingCustomerDemo,
        Self::CustomerApproved,
        Self::CustomerApprovedDemo,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingManager => "pending_manager",
            Self::PendingManagerDemo => "pending_manager_demo",
            Self::ManagerApproved => "manager_approved",
            Self::ManagerApprovedDemo => "manager_approved_demo",
            Self::PendingCustomer => "pending_customer",
            Self::PendingCustomerDemo => "pending_customer_demo",
            Self::CustomerApproved => "customer_approved",
            Self::CustomerApprovedDemo => "customer_approved_demo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// `completed` and `cancelled` accept no further guarded transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for EventPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventPlanStatus {
    type Err = EventPlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EventPlanStatusParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`EventPlanStatus`] string.
#[derive(Debug, Clone)]
pub struct EventPlanStatusParseError(pub String);

impl fmt::Display for EventPlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event plan status: {:?}", self.0)
    }
}

impl std::error::Error for EventPlanStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of a fanned-out task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Sent,
    Signed,
    Completed,
    Cancelled,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Signed => "signed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for ContractStatus {
    type Err = ContractStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "signed" => Ok(Self::Signed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ContractStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ContractStatus`] string.
#[derive(Debug, Clone)]
pub struct ContractStatusParseError(pub String);

impl fmt::Display for ContractStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid contract status: {:?}", self.0)
    }
}

impl std::error::Error for ContractStatusParseError {}

// ---------------------------------------------------------------------------

/// Status of one installment in a contract's payment schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleItemStatus {
    #[default]
    Pending,
    Paid,
}

impl fmt::Display for ScheduleItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Paid => f.write_str("paid"),
        }
    }
}

// ---------------------------------------------------------------------------

/// Delivery status of an outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Dead => "dead",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Embedded documents
// ---------------------------------------------------------------------------

/// One approval decision (manager or customer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approved: bool,
    pub approver_id: Option<String>,
    pub at: DateTime<Utc>,
    pub comment: Option<String>,
}

/// The `approvals` sub-document of an event plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanApprovals {
    pub manager: Option<ApprovalRecord>,
    pub customer: Option<ApprovalRecord>,
}

/// Customer-side contact on a contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractParty {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub representative: Option<String>,
}

/// One installment of a contract's payment schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentScheduleItem {
    pub amount: i64,
    pub status: ScheduleItemStatus,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub payment_code: Option<String>,
    pub payment_link: Option<String>,
    pub qr_code: Option<String>,
    pub transfer_content: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
}

impl PaymentScheduleItem {
    pub fn is_paid(&self) -> bool {
        self.status == ScheduleItemStatus::Paid
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// An event plan -- the planning document for one booking.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventPlan {
    pub id: Uuid,
    pub booking_id: String,
    pub title: String,
    pub status: EventPlanStatus,
    pub approvals: Json<PlanApprovals>,
    pub step1: Json<serde_json::Value>,
    pub step2: Json<serde_json::Value>,
    pub step3: Json<serde_json::Value>,
    pub step4: Json<serde_json::Value>,
    pub step5: Json<serde_json::Value>,
    pub step6: Json<serde_json::Value>,
    pub step7: Json<serde_json::Value>,
    pub tasks_created: bool,
    pub tasks_created_at: Option<DateTime<Utc>>,
    pub tasks_created_by: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task fanned out from a plan checklist item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub event_plan_id: Uuid,
    pub booking_id: String,
    pub position: i32,
    pub category: String,
    pub description: String,
    pub staff_id: Option<String>,
    pub custom_owner: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub status: TaskStatus,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contract with its embedded payment schedule.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventContract {
    pub id: Uuid,
    pub booking_id: String,
    pub contract_number: String,
    pub title: String,
    pub status: ContractStatus,
    pub party_a: Json<ContractParty>,
    pub total_value: i64,
    pub payment_schedule: Json<Vec<PaymentScheduleItem>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit row for a matched gateway payment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub booking_id: String,
    pub payment_schedule_index: i32,
    pub payment_code: String,
    pub amount: i64,
    pub scheduled_amount: i64,
    pub gateway: String,
    pub gateway_transaction_id: String,
    pub reference_code: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A queued notification awaiting delivery.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
