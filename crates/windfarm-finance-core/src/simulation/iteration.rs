use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::modules::cost::{self, CostSeries};
use crate::modules::financing::FinancingSchedule;
use crate::modules::revenue::{self, RevenueSeries};
use crate::modules::risk::{self, RiskYear};
use crate::modules::GenerationContext;
use crate::oem::YearlyResponsibility;
use crate::settings::ScenarioSettings;
use crate::time_value::{irr, npv, payback_period};
use crate::WindFinanceResult;

/// Immutable snapshot shared by every iteration of a run.
#[derive(Debug)]
pub struct RunPlan<'a> {
    pub settings: &'a ScenarioSettings,
    pub matrix: Vec<YearlyResponsibility>,
    pub schedule: FinancingSchedule,
}

impl RunPlan<'_> {
    /// Project years from the first construction year to the end of life.
    pub fn all_years(&self) -> Vec<i32> {
        self.schedule.years.iter().map(|y| y.year).collect()
    }

    pub fn operating_years(&self) -> Vec<i32> {
        (1..=self.settings.general.project_life as i32).collect()
    }
}

/// Financial metrics of a single iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationMetrics {
    pub irr: f64,
    pub npv: f64,
    pub payback_period: f64,
    pub min_dscr: Option<f64>,
    pub min_icr: Option<f64>,
    pub llcr: Option<f64>,
}

/// Sampled drivers averaged over the project years.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledDrivers {
    pub energy_production: f64,
    pub electricity_price: f64,
    pub downtime_hours: f64,
    pub cost_escalation: f64,
}

/// Everything one iteration produced.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub index: u32,
    pub revenue: RevenueSeries,
    pub cost: CostSeries,
    pub risk: Vec<RiskYear>,
    /// CFADS per operating year
    pub cfads: Vec<f64>,
    /// DSCR per operating year (`NaN` where no debt service falls due)
    pub dscr: Vec<f64>,
    /// Levered equity cashflow over all project years
    pub equity_cashflow: Vec<f64>,
    pub drivers: SampledDrivers,
    pub metrics: IterationMetrics,
}

/// Seed of the sub-stream for `index`. Independent of how iterations are scheduled.
pub fn iteration_seed(seed: u64, index: u32) -> u64 {
    seed.wrapping_add(u64::from(index))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Run one Monte Carlo trial.
///
/// Draw order on the iteration stream: cost escalation for every year, then
/// revenue, then cost events.
pub fn run_iteration(plan: &RunPlan<'_>, index: u32) -> WindFinanceResult<IterationResult> {
    let settings = plan.settings;
    let modules = &settings.modules;
    let project_life = settings.general.project_life;
    let mut rng = StdRng::seed_from_u64(iteration_seed(settings.simulation.seed, index));

    let escalation = modules.cost.sample_escalation(project_life, &mut rng)?;
    let ctx = GenerationContext {
        project_life,
        num_wtgs: settings.project.wind_farm.num_wtgs,
        responsibility: &plan.matrix,
        escalation: &escalation,
        insurance_deductible: modules.risk.deductible(),
    };

    let revenue = revenue::generate(&modules.revenue, &ctx, &mut rng)?;
    let cost = cost::generate(&modules.cost, &ctx, &mut rng)?;
    let risk = risk::generate(&modules.risk, &ctx);

    let schedule = &plan.schedule;
    let life = project_life as usize;
    let mut cfads = Vec::with_capacity(life);
    let mut dscr = Vec::with_capacity(life);
    let mut min_dscr: Option<f64> = None;
    let mut min_icr: Option<f64> = None;

    for (i, year) in (1..=project_life as i32).enumerate() {
        let opex = cost.years[i].total + risk[i].total;
        let cf = revenue.years[i].total - opex;
        cfads.push(cf);

        let (debt_service, interest) = schedule
            .year(year)
            .map_or((0.0, 0.0), |y| (y.debt_service, y.interest));
        if debt_service > 0.0 {
            let ratio = cf / debt_service;
            dscr.push(ratio);
            min_dscr = Some(min_dscr.map_or(ratio, |m: f64| m.min(ratio)));
        } else {
            dscr.push(f64::NAN);
        }
        if interest > 0.0 {
            let ratio = cf / interest;
            min_icr = Some(min_icr.map_or(ratio, |m: f64| m.min(ratio)));
        }
    }

    // Equity: drawdowns during construction, CFADS net of debt service after COD.
    let equity_cashflow: Vec<f64> = schedule
        .years
        .iter()
        .map(|y| {
            if y.year <= 0 {
                -y.equity_drawdown
            } else {
                cfads[(y.year - 1) as usize] - y.debt_service
            }
        })
        .collect();

    let cost_of_equity = modules.financing.cost_of_equity / 100.0;
    let equity_irr = irr(&equity_cashflow, cost_of_equity.max(0.01))?;
    let equity_npv = npv(cost_of_equity, &equity_cashflow)?;

    // Payback counted from COD: all pre-COD flows collapse into year 0.
    let pre_cod: f64 = schedule
        .years
        .iter()
        .zip(equity_cashflow.iter())
        .filter(|(y, _)| y.year <= 0)
        .map(|(_, cf)| cf)
        .sum();
    let mut from_cod = Vec::with_capacity(life + 1);
    from_cod.push(pre_cod);
    from_cod.extend(
        schedule
            .years
            .iter()
            .zip(equity_cashflow.iter())
            .filter(|(y, _)| y.year > 0)
            .map(|(_, cf)| *cf),
    );
    let payback = payback_period(&from_cod);

    let llcr = if schedule.has_debt() {
        loan_life_coverage(&cfads, schedule)
    } else {
        None
    };

    let drivers = SampledDrivers {
        energy_production: mean(revenue.years.iter().map(|y| y.energy_production)),
        electricity_price: mean(revenue.years.iter().map(|y| y.electricity_price)),
        downtime_hours: mean(revenue.years.iter().map(|y| y.downtime_hours)),
        cost_escalation: mean(escalation.iter().map(|v| v.value)),
    };

    Ok(IterationResult {
        index,
        revenue,
        cost,
        risk,
        cfads,
        dscr,
        equity_cashflow,
        drivers,
        metrics: IterationMetrics {
            irr: equity_irr,
            npv: equity_npv,
            payback_period: payback,
            min_dscr,
            min_icr,
            llcr,
        },
    })
}

/// PV of CFADS over the loan life at the loan rate, over debt outstanding at COD.
fn loan_life_coverage(cfads: &[f64], schedule: &FinancingSchedule) -> Option<f64> {
    let debt_at_cod = schedule.year(0).map(|y| y.closing_balance)?;
    if debt_at_cod <= 0.0 {
        return None;
    }
    let one_plus_r = 1.0 + schedule.interest_rate;
    let mut discount = 1.0_f64;
    let mut pv = 0.0;
    for cf in cfads.iter().take(schedule.loan_duration as usize) {
        discount *= one_plus_r;
        pv += cf / discount;
    }
    Some(pv / debt_at_cod)
}
