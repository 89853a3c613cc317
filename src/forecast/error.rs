//! Error taxonomy for the forecasting core.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors raised by feature building, training and forecasting.
///
/// Unseen categories at prediction time are not an error; the encoder maps
/// them to an all-zero vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// The reading table was empty; no model can be produced.
    #[error("no readings available to train on")]
    EmptyInput,

    /// Too few engineered rows survive lag construction to split and train.
    #[error("insufficient data: need at least {needed} feature rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// The regressor failed to fit or predict.
    #[error("model error: {0}")]
    Model(String),

    /// The caller's cancellation token was tripped.
    #[error("forecast cancelled")]
    Cancelled,
}

impl ForecastError {
    /// `EmptyInput` is a normal "no model" state rather than a failure.
    pub fn is_no_model(&self) -> bool {
        matches!(self, ForecastError::EmptyInput)
    }
}

impl From<smartcore::error::Failed> for ForecastError {
    fn from(err: smartcore::error::Failed) -> Self {
        ForecastError::Model(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        assert_eq!(
            ForecastError::EmptyInput.to_string(),
            "no readings available to train on"
        );
        assert_eq!(
            ForecastError::InsufficientData { needed: 2, got: 0 }.to_string(),
            "insufficient data: need at least 2 feature rows, got 0"
        );
        assert!(ForecastError::EmptyInput.is_no_model());
        assert!(!ForecastError::Cancelled.is_no_model());
    }
}
