use crate::model::{LocationId, PlanId, SensorId};
use thiserror::Error;

/// Precondition violations detected before the core computations run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("noise level {0} is outside 0-100")]
    InvalidNoise(i64),
    #[error("occupancy {occupancy} is outside 0-{capacity}")]
    InvalidRange { occupancy: i64, capacity: u32 },
    #[error("capacity must be at least 1, got {0}")]
    InvalidCapacity(i64),
    #[error("end time must be after start time")]
    EndBeforeStart,
    #[error("cannot create plan in the past")]
    StartInPast,
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("location {0} not found")]
    LocationNotFound(LocationId),
    #[error("sensor {0} not found")]
    SensorNotFound(SensorId),
    #[error("plan {0} not found")]
    PlanNotFound(PlanId),
    #[error("favorite for location {0} not found")]
    FavoriteNotFound(LocationId),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("state lock poisoned")]
    StateLock,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_passes_domain_message_through() {
        let err = StoreError::from(DomainError::EndBeforeStart);
        assert_eq!(err.to_string(), "end time must be after start time");
    }
}
