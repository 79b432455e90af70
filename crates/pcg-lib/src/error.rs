use thiserror::Error;

/// Errors surfaced by the analysis core.
///
/// Short or empty buffers during a pipeline pass are not errors; passes skip
/// those stages instead. These variants cover the cases a caller must see.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PcgError {
    #[error("insufficient data: need at least {needed} values, have {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("event times must increase strictly ({next} follows {previous})")]
    NonMonotonic { previous: f64, next: f64 },
}

pub type Result<T> = std::result::Result<T, PcgError>;
