use clap::Args;
use serde_json::Value;

use windfarm_finance_core::distributions::{self, SampleRequest};

use crate::input;

/// Arguments for sampling a single distribution
#[derive(Args)]
pub struct SampleArgs {
    /// Path to JSON or YAML sample request
    #[arg(long)]
    pub input: Option<String>,

    /// Override the number of draws
    #[arg(long)]
    pub samples: Option<u32>,

    /// Override the seed
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_sample(args: SampleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: SampleRequest = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file> or stdin required for distribution sampling".into());
    };
    if let Some(samples) = args.samples {
        request.samples = samples;
    }
    if let Some(seed) = args.seed {
        request.seed = seed;
    }
    let result = distributions::sample_distribution(&request)?;
    Ok(serde_json::to_value(result)?)
}
