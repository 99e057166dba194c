use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindFinanceError {
    #[error("Invalid distribution parameters for {distribution}: {reason}")]
    InvalidDistributionParameters { distribution: String, reason: String },

    #[error("Invalid {module} parameter: {field} = {value} — {reason}")]
    InvalidModuleParameters {
        module: String,
        field: String,
        value: String,
        reason: String,
    },

    #[error("Simulation diverged: all {attempted} iterations failed (last error: {last_error})")]
    SimulationDivergence { attempted: u32, last_error: String },

    #[error("Responsibility matrix conflict in year {year}: contracts {contracts:?} overlap")]
    ResponsibilityMatrixConflict { year: u32, contracts: Vec<String> },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Simulation cancelled after {completed} iterations")]
    Cancelled { completed: u32 },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl WindFinanceError {
    /// Shorthand for a module parameter violation.
    pub fn module_param(
        module: &str,
        field: &str,
        value: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        WindFinanceError::InvalidModuleParameters {
            module: module.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Numeric failures that only invalidate a single Monte Carlo iteration.
    pub fn is_iteration_local(&self) -> bool {
        matches!(
            self,
            WindFinanceError::ConvergenceFailure { .. }
                | WindFinanceError::DivisionByZero { .. }
                | WindFinanceError::InsufficientData(_)
        )
    }
}

impl From<serde_json::Error> for WindFinanceError {
    fn from(e: serde_json::Error) -> Self {
        WindFinanceError::SerializationError(e.to_string())
    }
}
