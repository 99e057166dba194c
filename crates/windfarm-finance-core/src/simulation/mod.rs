//! Monte Carlo orchestration: validate, sample every iteration, reduce the
//! population to percentiles.

pub mod iteration;
pub mod metrics;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::aggregation::{
    aggregate, AggregatedCashflow, LineCategory, NamedSeries, PercentileSelection,
};
use crate::distributions::{compute_statistics, SampleStatistics};
use crate::error::WindFinanceError;
use crate::modules::financing::{build_schedule, FinancingSchedule};
use crate::oem::{build_matrix, OemContract, OemScope, YearlyResponsibility};
use crate::probabilities::percentile_label;
use crate::settings::ScenarioSettings;
use crate::types::{with_metadata, AnnualSeries, AnnualValue, ComputationOutput};
use crate::WindFinanceResult;

pub use iteration::{IterationMetrics, IterationResult, RunPlan};
pub use metrics::Metric;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub settings: ScenarioSettings,
    /// Overrides `settings.modules.contracts.oemContracts` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oem_contracts: Option<Vec<OemContract>>,
    #[serde(default)]
    pub oem_scopes: Vec<OemScope>,
    /// Extra percentiles beyond the configured set
    #[serde(default)]
    pub additional_percentiles: Vec<f64>,
}

/// Cooperative cancellation, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run lifecycle. `Failed` is reachable from every state before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Validate,
    Sample,
    Aggregate,
    ExtractPercentiles,
    Done,
    Failed,
}

struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        debug!(state = ?RunState::Validate, "simulation run started");
        Self {
            state: RunState::Validate,
        }
    }

    fn advance(&mut self, next: RunState) {
        info!(from = ?self.state, to = ?next, "simulation state transition");
        self.state = next;
    }

    fn fail(&mut self, err: WindFinanceError) -> WindFinanceError {
        warn!(from = ?self.state, error = %err, "simulation failed");
        self.state = RunState::Failed;
        err
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeOutput {
    pub responsibility_matrix: Vec<YearlyResponsibility>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSim {
    /// Cashflow line items, each a percentile → annual series map
    pub cashflow: Vec<NamedSeries>,
    /// Distributions of the sampled drivers (year-averaged per iteration)
    pub risk: Vec<SampleStatistics>,
    pub scope: ScopeOutput,
    pub financing: FinancingSchedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSim {
    #[serde(rename = "IRR")]
    pub irr: Metric,
    #[serde(rename = "NPV")]
    pub npv: Metric,
    #[serde(rename = "paybackPeriod")]
    pub payback_period: Metric,
    #[serde(rename = "minDSCR", skip_serializing_if = "Option::is_none")]
    pub min_dscr: Option<Metric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llcr: Option<Metric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icr: Option<Metric>,
    /// Per-year DSCR over the years debt service falls due
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dscr: Option<Metric>,
    #[serde(rename = "equityCashflow")]
    pub equity_cashflow: Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationCounts {
    pub attempted: u32,
    pub succeeded: u32,
    pub excluded: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    pub input_sim: InputSim,
    pub output_sim: OutputSim,
    /// Share of iterations with DSCR below the covenant, per debt-service year
    pub dscr_breach_probability: AnnualSeries,
    /// Cashflow aggregated at the primary percentile
    pub aggregated: AggregatedCashflow,
    pub iterations: IterationCounts,
    /// Percentiles extracted, ascending
    pub percentiles: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Build the responsibility matrix and financing schedule after validating
/// every input. Nothing is sampled here.
fn prepare<'a>(request: &'a SimulationRequest) -> WindFinanceResult<RunPlan<'a>> {
    let settings = &request.settings;
    settings.validate()?;
    for &p in &request.additional_percentiles {
        if !(0.0..=100.0).contains(&p) {
            return Err(WindFinanceError::InvalidInput {
                field: "additionalPercentiles".into(),
                reason: format!("{p} is outside [0, 100]"),
            });
        }
    }

    let contracts = request
        .oem_contracts
        .as_deref()
        .unwrap_or(&settings.modules.contracts.oem_contracts);
    let matrix = build_matrix(
        settings.general.project_life,
        settings.project.wind_farm.num_wtgs,
        contracts,
        &request.oem_scopes,
        settings.modules.contracts.overlap_policy,
    )?;
    let schedule = build_schedule(
        &settings.modules.financing,
        settings.general.construction_years,
        settings.general.loan_duration,
        settings.general.project_life,
    )?;

    Ok(RunPlan {
        settings,
        matrix,
        schedule,
    })
}

/// Fail-fast checks only: settings, distributions, matrix and financing.
pub fn validate_request(request: &SimulationRequest) -> WindFinanceResult<()> {
    prepare(request).map(|_| ())
}

/// Called with the index of every finished iteration, from worker threads.
pub type ProgressFn<'a> = &'a (dyn Fn(u32) + Sync);

/// Run every iteration, in parallel when enabled. Results stay in iteration order.
fn sample_all(
    plan: &RunPlan<'_>,
    token: &CancellationToken,
    progress: ProgressFn<'_>,
) -> Vec<Option<WindFinanceResult<IterationResult>>> {
    let n = plan.settings.simulation.iterations;
    let run = |i: u32| {
        if token.is_cancelled() {
            return None;
        }
        let outcome = iteration::run_iteration(plan, i);
        progress(i);
        Some(outcome)
    };

    #[cfg(feature = "parallel")]
    {
        (0..n).into_par_iter().map(run).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..n).map(run).collect()
    }
}

/// Line items reported in `inputSim.cashflow`.
const LINE_ITEMS: &[(&str, LineCategory)] = &[
    ("energyRevenue", LineCategory::Revenue),
    ("revenueAdjustments", LineCategory::Revenue),
    ("baseOM", LineCategory::Cost),
    ("oemFee", LineCategory::Cost),
    ("failureEvents", LineCategory::Cost),
    ("majorRepairs", LineCategory::Cost),
    ("crane", LineCategory::Cost),
    ("costAdjustments", LineCategory::Cost),
    ("insurancePremium", LineCategory::Cost),
    ("reserveContribution", LineCategory::Cost),
];

fn line_value(result: &IterationResult, name: &str, i: usize) -> f64 {
    let r = &result.revenue.years[i];
    let c = &result.cost.years[i];
    let k = &result.risk[i];
    match name {
        "energyRevenue" => r.gross_revenue - r.downtime_loss,
        "revenueAdjustments" => r.adjustments,
        "baseOM" => c.base_om,
        "oemFee" => c.oem_fee,
        "failureEvents" => c.failure_events,
        "majorRepairs" => c.major_repairs,
        "crane" => c.crane,
        "costAdjustments" => c.adjustments,
        "insurancePremium" => k.insurance_premium,
        "reserveContribution" => k.reserve_contribution,
        _ => 0.0,
    }
}

fn time_series_map(metric: Metric) -> std::collections::BTreeMap<String, AnnualSeries> {
    match metric {
        Metric::TimeSeries { percentiles } => percentiles,
        Metric::Scalar { .. } => Default::default(),
    }
}

fn cashflow_lines(
    results: &[IterationResult],
    plan: &RunPlan<'_>,
    targets: &[f64],
) -> WindFinanceResult<Vec<NamedSeries>> {
    let years = plan.operating_years();
    let mut lines = Vec::with_capacity(LINE_ITEMS.len() + 1);
    for &(name, category) in LINE_ITEMS {
        let rows: Vec<Vec<f64>> = results
            .iter()
            .map(|r| (0..years.len()).map(|i| line_value(r, name, i)).collect())
            .collect();
        lines.push(NamedSeries {
            name: name.to_string(),
            category,
            percentiles: time_series_map(Metric::time_series(&years, &rows, targets)?),
        });
    }

    // Debt service is deterministic; every percentile carries the schedule.
    if plan.schedule.has_debt() {
        let series: AnnualSeries = plan
            .schedule
            .debt_service()
            .into_iter()
            .filter(|v| v.year >= 1)
            .collect();
        lines.push(NamedSeries {
            name: "debtService".into(),
            category: LineCategory::DebtService,
            percentiles: targets
                .iter()
                .map(|&p| (percentile_label(p), series.clone()))
                .collect(),
        });
    }
    Ok(lines)
}

fn driver_statistics(
    results: &[IterationResult],
    targets: &[f64],
) -> WindFinanceResult<Vec<SampleStatistics>> {
    type Extract = fn(&IterationResult) -> f64;
    let drivers: [(&str, Extract); 4] = [
        ("energyProduction", |r| r.drivers.energy_production),
        ("electricityPrice", |r| r.drivers.electricity_price),
        ("downtimeHours", |r| r.drivers.downtime_hours),
        ("costEscalation", |r| r.drivers.cost_escalation),
    ];
    drivers
        .iter()
        .map(|(name, f)| {
            let mut values: Vec<f64> = results.iter().map(f).collect();
            compute_statistics(&mut values, name, targets)
        })
        .collect()
}

/// Optional scalar metric: `None` when no iteration produced a value.
fn optional_metric(values: Vec<f64>, targets: &[f64]) -> WindFinanceResult<Option<Metric>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Metric::scalar(values, targets).map(Some)
    }
}

/// Run a full Monte Carlo simulation.
pub fn simulate(
    request: &SimulationRequest,
) -> WindFinanceResult<ComputationOutput<SimulationResponse>> {
    simulate_with_cancel(request, &CancellationToken::new())
}

/// [`simulate`] with cooperative cancellation between iterations.
pub fn simulate_with_cancel(
    request: &SimulationRequest,
    token: &CancellationToken,
) -> WindFinanceResult<ComputationOutput<SimulationResponse>> {
    simulate_with_progress(request, token, &|_| {})
}

/// [`simulate_with_cancel`] reporting each finished iteration to `progress`.
pub fn simulate_with_progress(
    request: &SimulationRequest,
    token: &CancellationToken,
    progress: ProgressFn<'_>,
) -> WindFinanceResult<ComputationOutput<SimulationResponse>> {
    let start = Instant::now();
    let mut tracker = RunTracker::new();
    let mut warnings: Vec<String> = Vec::new();

    let plan = prepare(request).map_err(|e| tracker.fail(e))?;
    let settings = plan.settings;
    let probabilities = settings.simulation.probabilities;
    let targets = probabilities.with_additional(&request.additional_percentiles);

    // -- Sample --------------------------------------------------------------
    tracker.advance(RunState::Sample);
    let attempted = settings.simulation.iterations;
    let outcomes = sample_all(&plan, token, progress);

    let completed = outcomes.iter().filter(|o| o.is_some()).count() as u32;
    if token.is_cancelled() && completed < attempted {
        return Err(tracker.fail(WindFinanceError::Cancelled { completed }));
    }

    let mut results = Vec::with_capacity(outcomes.len());
    let mut last_error: Option<WindFinanceError> = None;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(Ok(r)) => results.push(r),
            Some(Err(e)) if e.is_iteration_local() => {
                warn!(iteration = i, error = %e, "iteration excluded");
                last_error = Some(e);
            }
            Some(Err(e)) => return Err(tracker.fail(e)),
            None => {}
        }
    }

    let excluded = attempted - results.len() as u32;
    if results.is_empty() {
        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        return Err(tracker.fail(WindFinanceError::SimulationDivergence {
            attempted,
            last_error,
        }));
    }
    if excluded > 0 {
        warnings.push(format!(
            "{excluded} of {attempted} iterations excluded after numeric failures"
        ));
    }

    // -- Aggregate -----------------------------------------------------------
    tracker.advance(RunState::Aggregate);
    let debt_years: Vec<(usize, i32)> = plan
        .operating_years()
        .into_iter()
        .enumerate()
        .filter(|(_, year)| plan.schedule.year(*year).is_some_and(|y| y.debt_service > 0.0))
        .collect();

    let covenant = settings.modules.financing.minimum_dscr;
    let dscr_breach_probability: AnnualSeries = debt_years
        .iter()
        .map(|&(i, year)| {
            let breaches = results.iter().filter(|r| r.dscr[i] < covenant).count();
            AnnualValue {
                year,
                value: breaches as f64 / results.len() as f64,
            }
        })
        .collect();
    if let Some(worst) = dscr_breach_probability
        .iter()
        .max_by(|a, b| a.value.total_cmp(&b.value))
        .filter(|w| w.value > 0.0)
    {
        warnings.push(format!(
            "DSCR below covenant {covenant:.2} in {:.1}% of iterations in year {}",
            worst.value * 100.0,
            worst.year
        ));
    }

    // -- Extract percentiles -------------------------------------------------
    tracker.advance(RunState::ExtractPercentiles);
    let extract = || -> WindFinanceResult<(InputSim, OutputSim, AggregatedCashflow)> {
        let scalar = |f: fn(&IterationMetrics) -> f64| {
            Metric::scalar(results.iter().map(|r| f(&r.metrics)).collect(), &targets)
        };
        let optional = |f: fn(&IterationMetrics) -> Option<f64>| {
            optional_metric(results.iter().filter_map(|r| f(&r.metrics)).collect(), &targets)
        };

        let dscr = if debt_years.is_empty() {
            None
        } else {
            let years: Vec<i32> = debt_years.iter().map(|&(_, y)| y).collect();
            let rows: Vec<Vec<f64>> = results
                .iter()
                .map(|r| debt_years.iter().map(|&(i, _)| r.dscr[i]).collect())
                .collect();
            Some(Metric::time_series(&years, &rows, &targets)?)
        };

        let equity_rows: Vec<Vec<f64>> =
        results.iter().map(|r| r.equity_cashflow.clone()).collect();
        let output_sim = OutputSim {
            irr: scalar(|m| m.irr)?,
            npv: scalar(|m| m.npv)?,
            payback_period: scalar(|m| m.payback_period)?,
            min_dscr: optional(|m| m.min_dscr)?,
            llcr: optional(|m| m.llcr)?,
            icr: optional(|m| m.min_icr)?,
            dscr,
            equity_cashflow: Metric::time_series(&plan.all_years(), &equity_rows, &targets)?,
        };

        let cashflow = cashflow_lines(&results, &plan, &targets)?;
        let aggregated = aggregate(
            &cashflow,
            &PercentileSelection::Unified {
                percentile: probabilities.primary,
            },
        )?;
        let input_sim = InputSim {
            cashflow,
            risk: driver_statistics(&results, &targets)?,
            scope: ScopeOutput {
                responsibility_matrix: plan.matrix.clone(),
            },
            financing: plan.schedule.clone(),
        };
        Ok((input_sim, output_sim, aggregated))
    };
    let (input_sim, output_sim, aggregated) = extract().map_err(|e| tracker.fail(e))?;

    for entry in plan.matrix.iter().filter(|y| !y.overlapping_contracts.is_empty()) {
        warnings.push(format!(
            "Year {}: contract {} takes precedence over {:?}",
            entry.year,
            entry.contract_id.as_deref().unwrap_or("-"),
            entry.overlapping_contracts
        ));
    }

    tracker.advance(RunState::Done);
    let response = SimulationResponse {
        input_sim,
        output_sim,
        dscr_breach_probability,
        aggregated,
        iterations: IterationCounts {
            attempted,
            succeeded: results.len() as u32,
            excluded,
        },
        percentiles: targets,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    info!(
        iterations = attempted,
        excluded,
        elapsed_us = elapsed,
        "simulation complete"
    );
    Ok(with_metadata(
        "Wind Farm Monte Carlo Simulation (StdRng sub-stream per iteration)",
        &serde_json::json!({
            "iterations": attempted,
            "seed": settings.simulation.seed,
            "project_life": settings.general.project_life,
            "construction_years": settings.general.construction_years,
            "num_wtgs": settings.project.wind_farm.num_wtgs,
            "financing_model": settings.modules.financing.model,
            "probabilities": probabilities,
            "parallel": cfg!(feature = "parallel"),
        }),
        warnings,
        elapsed,
        response,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
