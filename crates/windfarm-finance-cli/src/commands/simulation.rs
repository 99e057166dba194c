use clap::Args;
use serde_json::Value;
use tracing::info;

use windfarm_finance_core::settings::{SettingsPatch, SimulationPatch};
use windfarm_finance_core::simulation::{self, SimulationRequest};

use crate::input;

/// Arguments for a full Monte Carlo run
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON or YAML simulation request
    #[arg(long)]
    pub input: Option<String>,

    /// Override the configured iteration count
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Override the configured seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Extra percentile to extract (repeatable)
    #[arg(long = "percentile")]
    pub percentiles: Vec<f64>,

    /// Key percentile metrics by role (Pprimary, Pupper_bound, ...)
    #[arg(long)]
    pub legacy_labels: bool,
}

/// Arguments for validating a request without sampling it
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to JSON or YAML simulation request
    #[arg(long)]
    pub input: Option<String>,
}

fn load_request(path: Option<&str>) -> Result<SimulationRequest, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_input(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(serde_json::from_value(data)?)
    } else {
        Err("--input <file> or stdin required for simulation".into())
    }
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request = load_request(args.input.as_deref())?;

    if args.iterations.is_some() || args.seed.is_some() {
        request.settings.merge(SettingsPatch {
            simulation: Some(SimulationPatch {
                iterations: args.iterations,
                seed: args.seed,
                probabilities: None,
            }),
            ..Default::default()
        });
    }
    request.additional_percentiles.extend(args.percentiles);

    info!(
        iterations = request.settings.simulation.iterations,
        seed = request.settings.simulation.seed,
        "starting simulation"
    );
    let mut result = simulation::simulate(&request)?;

    if args.legacy_labels {
        let set = request.settings.simulation.probabilities;
        let out = &mut result.result.output_sim;
        out.irr = out.irr.to_legacy_labels(&set);
        out.npv = out.npv.to_legacy_labels(&set);
        out.payback_period = out.payback_period.to_legacy_labels(&set);
        out.equity_cashflow = out.equity_cashflow.to_legacy_labels(&set);
        for metric in [&mut out.min_dscr, &mut out.llcr, &mut out.icr, &mut out.dscr]
            .into_iter()
            .flatten()
        {
            *metric = metric.to_legacy_labels(&set);
        }
    }

    Ok(serde_json::to_value(result)?)
}

/// Run every fail-fast check and echo back the effective settings.
pub fn run_validate(args: ValidateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request = load_request(args.input.as_deref())?;
    simulation::validate_request(&request)?;
    Ok(serde_json::json!({
        "valid": true,
        "settings": request.settings,
    }))
}
