use clap::Args;
use serde_json::Value;

use windfarm_finance_core::oem::{self, MatrixInput, OverlapPolicy};

use crate::input;

/// Arguments for building a year-by-year OEM responsibility matrix
#[derive(Args)]
pub struct MatrixArgs {
    /// Path to JSON or YAML matrix input
    #[arg(long)]
    pub input: Option<String>,

    /// Reject overlapping contract years instead of taking the newest
    #[arg(long)]
    pub strict: bool,
}

pub fn run_matrix(args: MatrixArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut matrix_input: MatrixInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for responsibility matrix".into());
    };
    if args.strict {
        matrix_input.overlap_policy = OverlapPolicy::Strict;
    }
    let result = oem::build_responsibility_matrix(&matrix_input)?;
    Ok(serde_json::to_value(result)?)
}
