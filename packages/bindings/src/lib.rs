use napi::Result as NapiResult;
use napi_derive::napi;

use windfarm_finance_core::{aggregation, distributions, oem, settings, simulation};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[napi]
pub fn run_simulation(input_json: String) -> NapiResult<String> {
    let input: simulation::SimulationRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = simulation::simulate(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Resolves to `"ok"` or rejects with the first fail-fast error.
#[napi]
pub fn validate_simulation(input_json: String) -> NapiResult<String> {
    let input: simulation::SimulationRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    simulation::validate_request(&input).map_err(to_napi_error)?;
    Ok("ok".to_string())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[napi]
pub fn merge_settings(settings_json: String, patch_json: String) -> NapiResult<String> {
    let current: settings::ScenarioSettings =
        serde_json::from_str(&settings_json).map_err(to_napi_error)?;
    let patch: settings::SettingsPatch =
        serde_json::from_str(&patch_json).map_err(to_napi_error)?;
    let merged = current.merged(patch);
    merged.validate().map_err(to_napi_error)?;
    serde_json::to_string(&merged).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// OEM contracts
// ---------------------------------------------------------------------------

#[napi]
pub fn build_responsibility_matrix(input_json: String) -> NapiResult<String> {
    let input: oem::MatrixInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = oem::build_responsibility_matrix(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn normalize_oem_scope(input_json: String) -> NapiResult<String> {
    let scope: oem::OemScope = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let scope = scope.normalize().map_err(to_napi_error)?;
    serde_json::to_string(&scope).map_err(to_napi_error)
}

#[napi]
pub fn normalize_oem_contract(input_json: String) -> NapiResult<String> {
    let contract: oem::OemContract = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let contract = contract.normalize().map_err(to_napi_error)?;
    serde_json::to_string(&contract).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Distributions and aggregation
// ---------------------------------------------------------------------------

#[napi]
pub fn sample_distribution(input_json: String) -> NapiResult<String> {
    let input: distributions::SampleRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = distributions::sample_distribution(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn aggregate_cashflow(input_json: String) -> NapiResult<String> {
    let input: aggregation::AggregationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = aggregation::aggregate_cashflow(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
