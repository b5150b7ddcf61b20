//! Error types for grid composition

use thiserror::Error;

/// Errors raised while describing charts or composing them into a figure.
///
/// None of these are recovered internally; the caller fixes the input and
/// calls again.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Too many objects added to grid. Maximum calls available is {max}.")]
    TooManyObjects { max: usize },

    #[error("Grid expects exactly {expected} object(s), got {got}")]
    SlotCountMismatch { expected: usize, got: usize },

    #[error("Slot {slot}: more than one type in object collection")]
    MixedChartKinds { slot: usize },

    #[error("Chart '{kind}' cannot be arranged")]
    NotArrangeable { kind: String },

    #[error("Invalid chart description: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Backend(format!("{:#}", err))
    }
}
