use clap::Args;
use serde_json::Value;

use windfarm_finance_core::aggregation::{self, AggregationInput, PercentileSelection};

use crate::input;

/// Arguments for aggregating per-source percentile series into cashflow
#[derive(Args)]
pub struct AggregateArgs {
    /// Path to JSON or YAML aggregation input
    #[arg(long)]
    pub input: Option<String>,

    /// Use one percentile for every source, ignoring the input's selection
    #[arg(long)]
    pub percentile: Option<f64>,
}

pub fn run_aggregate(args: AggregateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut agg_input: AggregationInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for cashflow aggregation".into());
    };
    if let Some(percentile) = args.percentile {
        agg_input.selection = PercentileSelection::Unified { percentile };
    }
    let result = aggregation::aggregate_cashflow(&agg_input)?;
    Ok(serde_json::to_value(result)?)
}
