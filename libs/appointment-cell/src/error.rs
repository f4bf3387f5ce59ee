// libs/appointment-cell/src/error.rs
use thiserror::Error;

use crate::models::AppointmentStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    #[error("Invalid status transition from {current} to {requested}")]
    InvalidTransition {
        current: AppointmentStatus,
        requested: AppointmentStatus,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppointmentError::NotFound { entity, id: id.to_string() }
    }

    pub fn rule(message: impl Into<String>) -> Self {
        AppointmentError::BusinessRuleViolation(message.into())
    }

    /// Domain rule failures, including invalid transitions. Recurrence batches
    /// turn these into skipped dates instead of aborting.
    pub fn is_business_rule_violation(&self) -> bool {
        matches!(
            self,
            AppointmentError::BusinessRuleViolation(_) | AppointmentError::InvalidTransition { .. }
        )
    }
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        AppointmentError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(err: serde_json::Error) -> Self {
        AppointmentError::DatabaseError(format!("Failed to parse record: {}", err))
    }
}

pub type AppointmentResult<T> = Result<T, AppointmentError>;
