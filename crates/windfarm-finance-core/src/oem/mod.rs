pub mod contract;
pub mod matrix;
pub mod scope;

pub use contract::OemContract;
pub use matrix::{
    build_matrix, build_responsibility_matrix, Allocation, CappedAllocation, MatrixInput,
    OverlapPolicy, ResponsibilityAllocations, YearlyResponsibility,
};
pub use scope::{CorrectiveMajorDetails, OemScope, SitePersonnel};
