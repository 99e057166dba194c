use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{
    adjustments_for, check_adjustments, check_distribution, check_non_negative, check_percent,
    Adjustment, GenerationContext,
};
use crate::distributions::DistributionSpec;
use crate::error::WindFinanceError;
use crate::multipliers::{
    apply_multipliers, AppliedMultiplier, MultiplierConfig, MultiplierOperation, MultiplierValues,
};
use crate::oem::CappedAllocation;
use crate::types::{series_from_fn, AnnualSeries, Percent};
use crate::WindFinanceResult;

const MODULE: &str = "cost";
pub const COST_ESCALATION_ID: &str = "costEscalation";

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A possible major component replacement in a given operating year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MajorRepairEvent {
    pub year: u32,
    pub cost: f64,
    /// Chance (%) the repair happens in that year
    pub probability: Percent,
    /// Crane mobilisation cost incurred with the repair
    #[serde(default)]
    pub crane_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSettings {
    /// Year-1 O&M cost for the whole farm
    #[serde(rename = "annualBaseOM")]
    pub annual_base_om: f64,
    /// Fixed annual escalation (%) used when no distribution is given
    #[serde(default)]
    pub escalation_rate: Percent,
    /// Per-year escalation (%) distribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_distribution: Option<DistributionSpec>,
    /// Annual chance (%) of an unplanned failure event
    #[serde(default)]
    pub failure_event_probability: Percent,
    #[serde(default)]
    pub failure_event_cost: f64,
    #[serde(default)]
    pub major_repair_events: Vec<MajorRepairEvent>,
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Owner-borne cost lines for one operating year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostYear {
    pub year: i32,
    /// Escalated base O&M (zero while an OEM contract is active)
    pub base_om: f64,
    /// OEM contract fee replacing base O&M
    pub oem_fee: f64,
    pub failure_events: f64,
    pub major_repairs: f64,
    pub crane: f64,
    pub adjustments: f64,
    /// Event cost absorbed by the OEM under contract (informational)
    pub oem_covered: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSeries {
    pub years: Vec<CostYear>,
    pub applied_multipliers: Vec<AppliedMultiplier>,
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

impl CostSettings {
    pub fn validate(&self) -> WindFinanceResult<()> {
        check_non_negative(MODULE, "annualBaseOM", self.annual_base_om)?;
        super::check_finite(MODULE, "escalationRate", self.escalation_rate)?;
        if let Some(spec) = &self.escalation_distribution {
            check_distribution(MODULE, "escalationDistribution", spec)?;
        }
        check_percent(MODULE, "failureEventProbability", self.failure_event_probability)?;
        check_non_negative(MODULE, "failureEventCost", self.failure_event_cost)?;
        for (i, ev) in self.major_repair_events.iter().enumerate() {
            if ev.year == 0 {
                return Err(WindFinanceError::module_param(
                    MODULE,
                    &format!("majorRepairEvents[{i}].year"),
                    ev.year,
                    "operating years start at 1",
                ));
            }
            check_non_negative(MODULE, &format!("majorRepairEvents[{i}].cost"), ev.cost)?;
            check_percent(
                MODULE,
                &format!("majorRepairEvents[{i}].probability"),
                ev.probability,
            )?;
            check_non_negative(
                MODULE,
                &format!("majorRepairEvents[{i}].craneCost"),
                ev.crane_cost,
            )?;
        }
        check_adjustments(MODULE, &self.adjustments)
    }

    /// Escalation rate (%) for each operating year, fixed or sampled.
    pub fn sample_escalation<R: Rng>(
        &self,
        project_life: u32,
        rng: &mut R,
    ) -> WindFinanceResult<AnnualSeries> {
        let mut series = Vec::with_capacity(project_life as usize);
        for year in 1..=project_life as i32 {
            let value = match &self.escalation_distribution {
                Some(spec) => spec.sample(rng)?,
                None => self.escalation_rate,
            };
            series.push(crate::types::AnnualValue { year, value });
        }
        Ok(series)
    }
}

/// Running OEM payouts within one contract year, for cap enforcement.
#[derive(Debug, Default)]
struct CapUsage {
    events: u32,
    paid: f64,
}

/// Split `cost` between OEM and owner, honouring event and money caps.
/// Returns `(oem, owner)`.
fn split_capped(cost: f64, alloc: &CappedAllocation, usage: &mut CapUsage) -> (f64, f64) {
    if alloc.oem <= 0.0 || cost <= 0.0 {
        return (0.0, cost);
    }
    if let Some(cap) = alloc.event_cap {
        if usage.events >= cap {
            return (0.0, cost);
        }
    }
    let mut oem = cost * alloc.oem;
    if let Some(cap) = alloc.financial_cap.and_then(|c| c.to_f64()) {
        oem = oem.min((cap - usage.paid).max(0.0));
    }
    usage.events += 1;
    usage.paid += oem;
    (oem, cost - oem)
}

/// Generate the owner's annual cost lines for one iteration.
///
/// Draw order per year is fixed: failure event, then major repair events in
/// configuration order.
pub fn generate<R: Rng>(
    settings: &CostSettings,
    ctx: &GenerationContext<'_>,
    rng: &mut R,
) -> WindFinanceResult<CostSeries> {
    let base = series_from_fn(ctx.operating_years(), |_| settings.annual_base_om);
    let mut sources = HashMap::new();
    sources.insert(
        COST_ESCALATION_ID.to_string(),
        MultiplierValues::Series(ctx.escalation.to_vec()),
    );
    let escalated = apply_multipliers(
        &base,
        &[MultiplierConfig {
            id: COST_ESCALATION_ID.to_string(),
            operation: MultiplierOperation::Compound,
            base_year: 1,
        }],
        &sources,
    );

    let failure_p = settings.failure_event_probability / 100.0;
    let mut years = Vec::with_capacity(ctx.project_life as usize);

    for point in &escalated.data {
        let year = point.year;
        let responsibility = ctx.responsibility_for(year);
        let under_contract = responsibility.is_some_and(|r| r.has_contract());

        let (base_om, oem_fee) = match responsibility {
            Some(r) if under_contract => (0.0, r.annual_fee.to_f64().unwrap_or(0.0)),
            _ => (point.value, 0.0),
        };

        let mut oem_covered = 0.0;

        let failure_events = if rng.gen_bool(failure_p) {
            let owner_share = responsibility.map_or(1.0, |r| r.allocations.corrective_minor.owner);
            oem_covered += settings.failure_event_cost * (1.0 - owner_share);
            settings.failure_event_cost * owner_share
        } else {
            0.0
        };

        let mut major_repairs = 0.0;
        let mut crane = 0.0;
        let mut component_usage = CapUsage::default();
        let mut crane_usage = CapUsage::default();
        for event in settings
            .major_repair_events
            .iter()
            .filter(|e| e.year as i32 == year)
        {
            if !rng.gen_bool(event.probability / 100.0) {
                continue;
            }
            let (oem_part, mut owner_part) = match responsibility {
                Some(r) => {
                    split_capped(event.cost, &r.allocations.major_component, &mut component_usage)
                }
                None => (0.0, event.cost),
            };
            let (oem_crane, mut owner_crane) = match responsibility {
                Some(r) => split_capped(event.crane_cost, &r.allocations.crane, &mut crane_usage),
                None => (0.0, event.crane_cost),
            };
            if let Some(deductible) = ctx.insurance_deductible {
                // Insurance picks up the owner's share above the deductible.
                let retained = (owner_part + owner_crane).min(deductible);
                let scale = if owner_part + owner_crane > 0.0 {
                    retained / (owner_part + owner_crane)
                } else {
                    0.0
                };
                owner_part *= scale;
                owner_crane *= scale;
            }
            oem_covered += oem_part + oem_crane;
            major_repairs += owner_part;
            crane += owner_crane;
        }

        let adjustments = adjustments_for(&settings.adjustments, year);
        let total = base_om + oem_fee + failure_events + major_repairs + crane + adjustments;

        years.push(CostYear {
            year,
            base_om,
            oem_fee,
            failure_events,
            major_repairs,
            crane,
            adjustments,
            oem_covered,
            total,
        });
    }

    Ok(CostSeries {
        years,
        applied_multipliers: escalated.applied_multipliers,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oem::{build_matrix, OemContract, OemScope, OverlapPolicy};
    use crate::types::AnnualValue;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn settings() -> CostSettings {
        CostSettings {
            annual_base_om: 1_000.0,
            escalation_rate: 0.0,
            escalation_distribution: None,
            failure_event_probability: 0.0,
            failure_event_cost: 0.0,
            major_repair_events: vec![],
            adjustments: vec![],
        }
    }

    fn flat_escalation(rate: f64, life: u32) -> Vec<AnnualValue> {
        series_from_fn(1..=life as i32, |_| rate)
    }

    fn ctx<'a>(
        life: u32,
        esc: &'a [AnnualValue],
        matrix: &'a [crate::oem::YearlyResponsibility],
    ) -> GenerationContext<'a> {
        GenerationContext {
            project_life: life,
            num_wtgs: 10,
            responsibility: matrix,
            escalation: esc,
            insurance_deductible: None,
        }
    }

    fn full_scope() -> OemScope {
        OemScope {
            id: "full".into(),
            corrective_minor: true,
            corrective_major: true,
            corrective_major_details: crate::oem::CorrectiveMajorDetails {
                tooling: true,
                manpower: true,
                parts: true,
                crane: true,
            },
            ..Default::default()
        }
    }

    fn per_turbine_contract(years: Vec<u32>) -> OemContract {
        OemContract {
            id: "c1".into(),
            years,
            start_year: None,
            end_year: None,
            fixed_fee: dec!(100000),
            is_per_turbine: true,
            oem_scope: "full".into(),
            created_at: None,
        }
    }

    #[test]
    fn test_base_om_compound_escalation() {
        let esc = flat_escalation(10.0, 3);
        let mut rng = StdRng::seed_from_u64(1);
        let out = generate(&settings(), &ctx(3, &esc, &[]), &mut rng).unwrap();
        assert!((out.years[0].base_om - 1_000.0).abs() < 1e-9);
        assert!((out.years[2].base_om - 1_210.0).abs() < 1e-9);
        assert_eq!(out.applied_multipliers[0].id, COST_ESCALATION_ID);
    }

    #[test]
    fn test_contract_fee_replaces_base_om() {
        let contracts = [per_turbine_contract(vec![1, 2, 3])];
        let matrix =
            build_matrix(5, 10, &contracts, &[full_scope()], OverlapPolicy::Strict).unwrap();
        let esc = flat_escalation(3.0, 5);
        let mut rng = StdRng::seed_from_u64(2);
        let out = generate(&settings(), &ctx(5, &esc, &matrix), &mut rng).unwrap();
        assert_eq!(out.years[0].oem_fee, 1_000_000.0);
        assert_eq!(out.years[0].base_om, 0.0);
        assert_eq!(out.years[2].oem_fee, 1_000_000.0);
        assert_eq!(out.years[3].oem_fee, 0.0);
        assert!(out.years[3].base_om > 1_000.0);
    }

    #[test]
    fn test_certain_failure_owner_share() {
        let mut s = settings();
        s.failure_event_probability = 100.0;
        s.failure_event_cost = 500.0;
        let contracts = [per_turbine_contract(vec![1])];
        let matrix =
            build_matrix(2, 1, &contracts, &[full_scope()], OverlapPolicy::Strict).unwrap();
        let esc = flat_escalation(0.0, 2);
        let mut rng = StdRng::seed_from_u64(3);
        let out = generate(&s, &ctx(2, &esc, &matrix), &mut rng).unwrap();
        // Year 1 covered by OEM, year 2 on the owner.
        assert_eq!(out.years[0].failure_events, 0.0);
        assert_eq!(out.years[0].oem_covered, 500.0);
        assert_eq!(out.years[1].failure_events, 500.0);
    }

    #[test]
    fn test_major_repair_financial_cap() {
        let mut s = settings();
        s.major_repair_events = vec![
            MajorRepairEvent { year: 1, cost: 300_000.0, probability: 100.0, crane_cost: 50_000.0 },
            MajorRepairEvent { year: 1, cost: 300_000.0, probability: 100.0, crane_cost: 50_000.0 },
        ];
        let mut scope = full_scope();
        scope.major_component_financial_cap = Some(dec!(400000));
        scope.crane_event_cap = Some(1);
        let contracts = [per_turbine_contract(vec![1])];
        let matrix = build_matrix(1, 1, &contracts, &[scope], OverlapPolicy::Strict).unwrap();
        let esc = flat_escalation(0.0, 1);
        let mut rng = StdRng::seed_from_u64(4);
        let out = generate(&s, &ctx(1, &esc, &matrix), &mut rng).unwrap();
        let y = &out.years[0];
        // OEM pays 300k then 100k up to the cap; owner keeps 200k.
        assert!((y.major_repairs - 200_000.0).abs() < 1e-6, "{}", y.major_repairs);
        // Crane covered for the first event only.
        assert!((y.crane - 50_000.0).abs() < 1e-6, "{}", y.crane);
        assert!((y.oem_covered - 450_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_insurance_deductible_limits_owner_share() {
        let mut s = settings();
        s.major_repair_events = vec![MajorRepairEvent {
            year: 1,
            cost: 800_000.0,
            probability: 100.0,
            crane_cost: 200_000.0,
        }];
        let esc = flat_escalation(0.0, 1);
        let mut c = ctx(1, &esc, &[]);
        c.insurance_deductible = Some(100_000.0);
        let mut rng = StdRng::seed_from_u64(5);
        let out = generate(&s, &c, &mut rng).unwrap();
        let y = &out.years[0];
        assert!((y.major_repairs + y.crane - 100_000.0).abs() < 1e-6);
        assert!((y.major_repairs - 80_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_adjustments_added() {
        let mut s = settings();
        s.adjustments = vec![Adjustment {
            description: "grid fee".into(),
            start_year: 2,
            end_year: 2,
            amount: 250.0,
        }];
        let esc = flat_escalation(0.0, 3);
        let mut rng = StdRng::seed_from_u64(6);
        let out = generate(&s, &ctx(3, &esc, &[]), &mut rng).unwrap();
        assert_eq!(out.years[1].total, 1_250.0);
        assert_eq!(out.years[0].total, 1_000.0);
    }

    #[test]
    fn test_validation_errors() {
        let mut s = settings();
        s.failure_event_probability = 150.0;
        assert!(matches!(s.validate(), Err(WindFinanceError::InvalidModuleParameters { .. })));

        let mut s = settings();
        s.annual_base_om = -1.0;
        assert!(s.validate().is_err());

        let mut s = settings();
        s.escalation_distribution = Some(DistributionSpec::Uniform { min: 3.0, max: 1.0 });
        assert!(matches!(
            s.validate(),
            Err(WindFinanceError::InvalidDistributionParameters { .. })
        ));
    }

    #[test]
    fn test_sampled_escalation_reproducible() {
        let mut s = settings();
        s.escalation_distribution = Some(DistributionSpec::Normal { mean: 2.0, std: 0.5 });
        let a = s.sample_escalation(10, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = s.sample_escalation(10, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }
}
