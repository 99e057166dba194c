pub mod aggregation;
pub mod distributions;
pub mod oem;
pub mod simulation;
