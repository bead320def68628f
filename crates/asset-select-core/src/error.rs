use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetSelectError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid budget: {budget} (must be between 1 and {universe_size})")]
    InvalidBudget { budget: usize, universe_size: usize },

    #[error("Invalid risk weight: {0} (must be a finite value >= 0)")]
    InvalidRiskWeight(f64),

    #[error("No feasible solution: {0}")]
    NoFeasibleSolution(String),

    #[error("Solver backend '{backend}' unavailable: {reason}")]
    SolverBackendUnavailable { backend: String, reason: String },

    #[error("Price data provider error: {0}")]
    DataProvider(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AssetSelectError {
    fn from(e: serde_json::Error) -> Self {
        AssetSelectError::SerializationError(e.to_string())
    }
}
