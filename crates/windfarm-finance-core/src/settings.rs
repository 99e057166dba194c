//! Typed scenario settings and the explicit partial-update merge.

use serde::{Deserialize, Serialize};

use crate::distributions::DistributionSpec;
use crate::error::WindFinanceError;
use crate::modules::cost::{CostSettings, MajorRepairEvent};
use crate::modules::financing::{validate_loan_duration, FinancingModel, FinancingSettings};
use crate::modules::revenue::{ElectricityPrice, RevenueSettings};
use crate::modules::risk::RiskSettings;
use crate::modules::Adjustment;
use crate::oem::{OemContract, OverlapPolicy};
use crate::probabilities::PercentileSet;
use crate::types::{Currency, Percent};
use crate::WindFinanceResult;

/// Fewest iterations a run accepts.
pub const MIN_ITERATIONS: u32 = 100;

// ---------------------------------------------------------------------------
// Settings tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    /// Operating years after COD
    pub project_life: u32,
    #[serde(default)]
    pub construction_years: u32,
    #[serde(default = "default_loan_duration")]
    pub loan_duration: u32,
}

fn default_loan_duration() -> u32 {
    15
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindFarm {
    #[serde(rename = "numWTGs")]
    pub num_wtgs: u32,
    #[serde(default, rename = "mwPerWTG")]
    pub mw_per_wtg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wtg_platform: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub wind_farm: WindFarm,
    #[serde(default)]
    pub currency: Currency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSettings {
    #[serde(default)]
    pub oem_contracts: Vec<OemContract>,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSettings {
    pub financing: FinancingSettings,
    pub cost: CostSettings,
    pub revenue: RevenueSettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub contracts: ContractSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSettings {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    pub seed: u64,
    #[serde(default)]
    pub probabilities: PercentileSet,
}

fn default_iterations() -> u32 {
    10_000
}

/// Complete, typed settings of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSettings {
    pub general: GeneralSettings,
    pub project: ProjectSettings,
    pub modules: ModuleSettings,
    pub simulation: SimulationSettings,
}

impl ScenarioSettings {
    /// Structural and module checks. Runs before any sampling.
    pub fn validate(&self) -> WindFinanceResult<()> {
        if self.general.project_life == 0 {
            return Err(WindFinanceError::InvalidInput {
                field: "general.projectLife".into(),
                reason: "project life must be at least 1 year".into(),
            });
        }
        if self.project.wind_farm.num_wtgs == 0 {
            return Err(WindFinanceError::InvalidInput {
                field: "project.windFarm.numWTGs".into(),
                reason: "wind farm must have at least one turbine".into(),
            });
        }
        if self.simulation.iterations < MIN_ITERATIONS {
            return Err(WindFinanceError::InvalidInput {
                field: "simulation.iterations".into(),
                reason: format!(
                    "at least {MIN_ITERATIONS} iterations required, got {}",
                    self.simulation.iterations
                ),
            });
        }
        self.simulation.probabilities.validate()?;

        let modules = &self.modules;
        modules.financing.validate()?;
        if modules.financing.debt_share() > 0.0 {
            validate_loan_duration(self.general.loan_duration, self.general.project_life)?;
        }
        modules.cost.validate()?;
        if let Some(event) = modules
            .cost
            .major_repair_events
            .iter()
            .find(|e| e.year > self.general.project_life)
        {
            return Err(WindFinanceError::module_param(
                "cost",
                "majorRepairEvents.year",
                event.year,
                "falls after projectLife",
            ));
        }
        modules.revenue.validate()?;
        modules.risk.validate()?;
        Ok(())
    }

    /// Apply a partial update in place.
    ///
    /// `None` keeps the current value; nested sections merge field by field and
    /// vectors are replaced wholesale.
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(p) = patch.general {
            set(&mut self.general.project_life, p.project_life);
            set(&mut self.general.construction_years, p.construction_years);
            set(&mut self.general.loan_duration, p.loan_duration);
        }
        if let Some(p) = patch.project {
            if let Some(wf) = p.wind_farm {
                let farm = &mut self.project.wind_farm;
                set(&mut farm.num_wtgs, wf.num_wtgs);
                set(&mut farm.mw_per_wtg, wf.mw_per_wtg);
                set_some(&mut farm.wtg_platform, wf.wtg_platform);
            }
            set(&mut self.project.currency, p.currency);
        }
        if let Some(p) = patch.modules {
            self.modules.merge(p);
        }
        if let Some(p) = patch.simulation {
            set(&mut self.simulation.iterations, p.iterations);
            set(&mut self.simulation.seed, p.seed);
            set(&mut self.simulation.probabilities, p.probabilities);
        }
    }

    pub fn merged(mut self, patch: SettingsPatch) -> Self {
        self.merge(patch);
        self
    }
}

impl ModuleSettings {
    fn merge(&mut self, patch: ModulesPatch) {
        if let Some(p) = patch.financing {
            let f = &mut self.financing;
            set(&mut f.model, p.model);
            set(&mut f.capex, p.capex);
            set(&mut f.devex, p.devex);
            set(&mut f.debt_to_equity_ratio, p.debt_to_equity_ratio);
            set(&mut f.debt_to_capex_ratio, p.debt_to_capex_ratio);
            set(&mut f.loan_interest_rate_bs, p.loan_interest_rate_bs);
            set(&mut f.loan_interest_rate_pf, p.loan_interest_rate_pf);
            set(&mut f.minimum_dscr, p.minimum_dscr);
            set(&mut f.cost_of_equity, p.cost_of_equity);
        }
        if let Some(p) = patch.cost {
            let c = &mut self.cost;
            set(&mut c.annual_base_om, p.annual_base_om);
            set(&mut c.escalation_rate, p.escalation_rate);
            set_some(&mut c.escalation_distribution, p.escalation_distribution);
            set(&mut c.failure_event_probability, p.failure_event_probability);
            set(&mut c.failure_event_cost, p.failure_event_cost);
            set(&mut c.major_repair_events, p.major_repair_events);
            set(&mut c.adjustments, p.adjustments);
        }
        if let Some(p) = patch.revenue {
            let r = &mut self.revenue;
            set(&mut r.energy_production, p.energy_production);
            set(&mut r.electricity_price, p.electricity_price);
            set(&mut r.price_escalation_rate, p.price_escalation_rate);
            set(&mut r.revenue_degradation_rate, p.revenue_degradation_rate);
            set_some(&mut r.downtime_hours, p.downtime_hours);
            set(&mut r.adjustments, p.adjustments);
        }
        if let Some(p) = patch.risk {
            let r = &mut self.risk;
            set(&mut r.insurance_enabled, p.insurance_enabled);
            set(&mut r.insurance_premium, p.insurance_premium);
            set(&mut r.insurance_deductible, p.insurance_deductible);
            set(&mut r.reserve_fund_contribution, p.reserve_fund_contribution);
            set_some(&mut r.reserve_fund_target, p.reserve_fund_target);
            set(&mut r.escalate, p.escalate);
        }
        if let Some(p) = patch.contracts {
            set(&mut self.contracts.oem_contracts, p.oem_contracts);
            set(&mut self.contracts.overlap_policy, p.overlap_policy);
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn set_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// Patch tree
// ---------------------------------------------------------------------------

/// Partial update for [`ScenarioSettings`]. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub general: Option<GeneralPatch>,
    pub project: Option<ProjectPatch>,
    pub modules: Option<ModulesPatch>,
    pub simulation: Option<SimulationPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralPatch {
    pub project_life: Option<u32>,
    pub construction_years: Option<u32>,
    pub loan_duration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindFarmPatch {
    #[serde(rename = "numWTGs")]
    pub num_wtgs: Option<u32>,
    #[serde(rename = "mwPerWTG")]
    pub mw_per_wtg: Option<f64>,
    pub wtg_platform: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectPatch {
    pub wind_farm: Option<WindFarmPatch>,
    pub currency: Option<Currency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModulesPatch {
    pub financing: Option<FinancingPatch>,
    pub cost: Option<CostPatch>,
    pub revenue: Option<RevenuePatch>,
    pub risk: Option<RiskPatch>,
    pub contracts: Option<ContractsPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinancingPatch {
    pub model: Option<FinancingModel>,
    pub capex: Option<f64>,
    pub devex: Option<f64>,
    pub debt_to_equity_ratio: Option<f64>,
    pub debt_to_capex_ratio: Option<Percent>,
    #[serde(rename = "loanInterestRateBS")]
    pub loan_interest_rate_bs: Option<Percent>,
    #[serde(rename = "loanInterestRateFP")]
    pub loan_interest_rate_pf: Option<Percent>,
    #[serde(rename = "minimumDSCR")]
    pub minimum_dscr: Option<f64>,
    pub cost_of_equity: Option<Percent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CostPatch {
    #[serde(rename = "annualBaseOM")]
    pub annual_base_om: Option<f64>,
    pub escalation_rate: Option<Percent>,
    pub escalation_distribution: Option<DistributionSpec>,
    pub failure_event_probability: Option<Percent>,
    pub failure_event_cost: Option<f64>,
    pub major_repair_events: Option<Vec<MajorRepairEvent>>,
    pub adjustments: Option<Vec<Adjustment>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RevenuePatch {
    pub energy_production: Option<DistributionSpec>,
    pub electricity_price: Option<ElectricityPrice>,
    pub price_escalation_rate: Option<Percent>,
    pub revenue_degradation_rate: Option<Percent>,
    pub downtime_hours: Option<DistributionSpec>,
    pub adjustments: Option<Vec<Adjustment>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RiskPatch {
    pub insurance_enabled: Option<bool>,
    pub insurance_premium: Option<f64>,
    pub insurance_deductible: Option<f64>,
    pub reserve_fund_contribution: Option<f64>,
    pub reserve_fund_target: Option<f64>,
    pub escalate: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractsPatch {
    pub oem_contracts: Option<Vec<OemContract>>,
    pub overlap_policy: Option<OverlapPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationPatch {
    pub iterations: Option<u32>,
    pub seed: Option<u64>,
    pub probabilities: Option<PercentileSet>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCENARIO: &str = r#"{
        "general": { "projectLife": 20, "constructionYears": 1, "loanDuration": 12 },
        "project": { "windFarm": { "numWTGs": 10, "mwPerWTG": 4.2 }, "currency": "GBP" },
        "modules": {
            "financing": {
                "model": "Project-Finance",
                "capex": 60000000,
                "debtToCapexRatio": 70,
                "loanInterestRateFP": 5
            },
            "cost": { "annualBaseOM": 1500000, "escalationRate": 2.5 },
            "revenue": {
                "energyProduction": { "type": "normal", "parameters": { "mean": 150000, "std": 12000 } },
                "electricityPrice": { "type": "fixed", "value": 55 }
            }
        },
        "simulation": { "iterations": 500, "seed": 42 }
    }"#;

    fn scenario() -> ScenarioSettings {
        serde_json::from_str(SCENARIO).unwrap()
    }

    #[test]
    fn test_deserialize_defaults() {
        let s = scenario();
        assert_eq!(s.project.wind_farm.num_wtgs, 10);
        assert_eq!(s.project.currency, Currency::GBP);
        assert_eq!(s.modules.financing.minimum_dscr, 1.3);
        assert_eq!(s.simulation.probabilities, PercentileSet::default());
        assert!(s.modules.contracts.oem_contracts.is_empty());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let mut s = scenario();
        let before = s.clone();
        let patch: SettingsPatch = serde_json::from_str(
            r#"{ "modules": { "cost": { "escalationRate": 3.0 } }, "simulation": { "seed": 7 } }"#,
        )
        .unwrap();
        s.merge(patch);
        assert_eq!(s.modules.cost.escalation_rate, 3.0);
        assert_eq!(s.modules.cost.annual_base_om, before.modules.cost.annual_base_om);
        assert_eq!(s.simulation.seed, 7);
        assert_eq!(s.simulation.iterations, 500);
        assert_eq!(s.modules.financing, before.modules.financing);
        assert_eq!(s.general, before.general);
    }

    #[test]
    fn test_merge_replaces_vectors() {
        let mut s = scenario();
        s.modules.cost.adjustments = vec![Adjustment {
            description: "old".into(),
            start_year: 1,
            end_year: 2,
            amount: 1.0,
        }];
        s.merge(SettingsPatch {
            modules: Some(ModulesPatch {
                cost: Some(CostPatch {
                    adjustments: Some(vec![]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(s.modules.cost.adjustments.is_empty());
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let s = scenario();
        assert_eq!(s.clone().merged(SettingsPatch::default()), s);
    }

    #[test]
    fn test_validation_failures() {
        let mut s = scenario();
        s.simulation.iterations = 99;
        assert!(matches!(s.validate(), Err(WindFinanceError::InvalidInput { .. })));

        let mut s = scenario();
        s.general.loan_duration = 25;
        assert!(matches!(
            s.validate(),
            Err(WindFinanceError::InvalidModuleParameters { .. })
        ));

        let mut s = scenario();
        s.modules.cost.major_repair_events = vec![MajorRepairEvent {
            year: 30,
            cost: 1.0,
            probability: 10.0,
            crane_cost: 0.0,
        }];
        assert!(s.validate().is_err());

        let mut s = scenario();
        s.simulation.probabilities.primary = 95.0;
        assert!(s.validate().is_err());
    }
}
