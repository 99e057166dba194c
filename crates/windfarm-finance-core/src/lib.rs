pub mod aggregation;
pub mod distributions;
pub mod error;
pub mod modules;
pub mod multipliers;
pub mod oem;
pub mod probabilities;
pub mod settings;
pub mod simulation;
pub mod time_value;
pub mod types;

pub use error::WindFinanceError;
pub use types::*;

/// Standard result type for all wind-farm finance operations
pub type WindFinanceResult<T> = Result<T, WindFinanceError>;
