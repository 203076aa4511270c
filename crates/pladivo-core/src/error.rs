//! Domain error taxonomy shared by every operation in this crate.

use pladivo_db::models::EventPlanStatus;

/// Errors surfaced by workflow, contract and payment operations.
///
/// The HTTP layer maps each variant onto a status code; `Internal` wraps
/// database and runtime failures whose details are logged, not shown.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The referenced entity (or payment code) does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The operation is not allowed from the entity's current state.
    #[error("{0}")]
    InvalidState(String),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// A concurrent writer changed the entity between read and write.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// The standard rejection for an action attempted from the wrong state.
    pub fn wrong_plan_state(action: &str, current: EventPlanStatus) -> Self {
        Self::InvalidState(format!(
            "Không thể thực hiện '{action}' khi kế hoạch đang ở trạng thái '{current}'"
        ))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// True when `err` (or the error it wraps) is a Postgres unique-constraint
/// violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_plan_state_names_action_and_state() {
        let err = DomainError::wrong_plan_state("manager-approve", EventPlanStatus::Draft);
        assert!(matches!(err, DomainError::InvalidState(_)));
        let msg = err.to_string();
        assert!(msg.contains("manager-approve"), "{msg}");
        assert!(msg.contains("draft"), "{msg}");
    }

    #[test]
    fn anyhow_converts_to_internal() {
        let err: DomainError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, DomainError::Internal(_)));
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        let err = anyhow::Error::new(sqlx::Error::RowNotFound).context("lookup failed");
        assert!(!is_unique_violation(&err));
        assert!(!is_unique_violation(&anyhow::anyhow!("boom")));
    }
}
