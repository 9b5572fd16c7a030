use thiserror::Error;

// capacity pressure is never a rejection cause, placement always finds a shelf slot
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("order id must not be empty")]
    EmptyId,
    #[error("duplicate order id: {0}")]
    DuplicateId(String),
    #[error("freshness budget must be positive, got {0}")]
    NonPositiveFreshness(i64),
    #[error("unknown temperature: {0}")]
    UnknownTemperature(String),
}

// programmer errors / broken invariants, not expected at runtime, halt don't swallow
#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("clock observed to go backwards: {previous} -> {observed}")]
    ClockRegression { previous: f64, observed: f64 },

    #[error("storage capacity starvation: {0}")]
    CapacityStarvation(String),

    #[error("submit failed after {attempts} attempt(s)")]
    SubmitFailed {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}
