use thiserror::Error;
use tracing::error;

use shared_models::AppError;

use crate::models::VisitStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid availability window: {0}")]
    InvalidWindow(String),

    #[error("Day is fully booked ({max_appointments} appointments)")]
    CapacityExceeded { max_appointments: u32 },

    #[error("Patient identity already has a visit booked for this day")]
    DuplicateIdentity,

    #[error("Patient identity is required")]
    MissingIdentity,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No availability window set for this doctor and date")]
    NoWindow,

    #[error("Unknown visit reason: {0}")]
    UnknownReason(String),

    #[error("Visit cannot change status from {0}")]
    InvalidStatusTransition(VisitStatus),

    #[error("Schedule for this day is being updated, retry the request")]
    ScheduleBusy,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Day lock error: {0}")]
    Lock(String),
}

impl ScheduleError {
    /// Errors a caller may fix by retrying or choosing another day.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScheduleError::CapacityExceeded { .. }
                | ScheduleError::DuplicateIdentity
                | ScheduleError::ScheduleBusy
        )
    }
}

impl From<anyhow::Error> for ScheduleError {
    fn from(err: anyhow::Error) -> Self {
        ScheduleError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ScheduleError {
    fn from(err: serde_json::Error) -> Self {
        ScheduleError::Storage(format!("Serialization error: {}", err))
    }
}

impl From<redis::RedisError> for ScheduleError {
    fn from(err: redis::RedisError) -> Self {
        ScheduleError::Lock(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for ScheduleError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        ScheduleError::Lock(format!("Redis pool error: {}", err))
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidWindow(_) | ScheduleError::MissingIdentity => {
                AppError::ValidationError(err.to_string())
            }
            ScheduleError::CapacityExceeded { .. }
            | ScheduleError::DuplicateIdentity
            | ScheduleError::InvalidStatusTransition(_)
            | ScheduleError::ScheduleBusy => AppError::Conflict(err.to_string()),
            ScheduleError::NotFound(_) | ScheduleError::NoWindow => AppError::NotFound(err.to_string()),
            ScheduleError::UnknownReason(reason) => {
                error!("Stored visit carries an unknown reason {:?}", reason);
                AppError::Internal("Schedule operation failed".to_string())
            }
            ScheduleError::Storage(msg) => {
                error!("Schedule storage failure: {}", msg);
                AppError::Database("Schedule storage unavailable".to_string())
            }
            ScheduleError::Lock(msg) => {
                error!("Schedule lock failure: {}", msg);
                AppError::Internal("Schedule operation failed".to_string())
            }
        }
    }
}
