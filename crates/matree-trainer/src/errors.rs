//! Error types for the tree learner.

use thiserror::Error;

/// Errors returned by learner configuration and tree construction.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("invalid predictor configuration: {0}")]
    InvalidPredictorConfig(String),

    #[error("property set is empty after mode filtering")]
    EmptyPropertySet,

    #[error("{0} properties configured, the split bitset holds at most 64")]
    TooManyProperties(usize),

    #[error("{0} distinct samples exceed the u32 row-index range")]
    SampleOverflow(usize),
}
