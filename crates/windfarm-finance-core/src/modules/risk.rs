use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{check_non_negative, GenerationContext};
use crate::error::WindFinanceError;
use crate::multipliers::{
    apply_multipliers, MultiplierConfig, MultiplierOperation, MultiplierValues,
};
use crate::types::{series_from_fn, AnnualSeries, AnnualValue};
use crate::WindFinanceResult;

use super::cost::COST_ESCALATION_ID;

const MODULE: &str = "risk";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSettings {
    #[serde(default)]
    pub insurance_enabled: bool,
    /// Annual premium for the whole farm
    #[serde(default)]
    pub insurance_premium: f64,
    /// Owner-retained amount per insured event
    #[serde(default)]
    pub insurance_deductible: f64,
    /// Annual reserve-fund contribution
    #[serde(default)]
    pub reserve_fund_contribution: f64,
    /// Contributions stop once the fund reaches this balance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_fund_target: Option<f64>,
    /// Escalate premium and contribution with the cost escalation series
    #[serde(default)]
    pub escalate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskYear {
    pub year: i32,
    pub insurance_premium: f64,
    pub reserve_contribution: f64,
    pub reserve_balance: f64,
    pub total: f64,
}

impl RiskSettings {
    pub fn validate(&self) -> WindFinanceResult<()> {
        check_non_negative(MODULE, "insurancePremium", self.insurance_premium)?;
        check_non_negative(MODULE, "insuranceDeductible", self.insurance_deductible)?;
        check_non_negative(MODULE, "reserveFundContribution", self.reserve_fund_contribution)?;
        if let Some(target) = self.reserve_fund_target {
            check_non_negative(MODULE, "reserveFundTarget", target)?;
        }
        if self.insurance_enabled && self.insurance_premium == 0.0 {
            return Err(WindFinanceError::module_param(
                MODULE,
                "insurancePremium",
                self.insurance_premium,
                "must be positive when insurance is enabled",
            ));
        }
        Ok(())
    }

    /// Deductible applied to major repairs, if insured.
    pub fn deductible(&self) -> Option<f64> {
        self.insurance_enabled.then_some(self.insurance_deductible)
    }
}

pub fn generate(settings: &RiskSettings, ctx: &GenerationContext<'_>) -> Vec<RiskYear> {
    let premium = if settings.insurance_enabled {
        settings.insurance_premium
    } else {
        0.0
    };
    let premiums = escalate(
        series_from_fn(ctx.operating_years(), |_| premium),
        settings.escalate,
        ctx.escalation,
    );
    let contributions = escalate(
        series_from_fn(ctx.operating_years(), |_| settings.reserve_fund_contribution),
        settings.escalate,
        ctx.escalation,
    );

    let mut balance = 0.0_f64;
    premiums
        .iter()
        .zip(contributions.iter())
        .map(|(p, c)| {
            let contribution = match settings.reserve_fund_target {
                Some(target) => c.value.min((target - balance).max(0.0)),
                None => c.value,
            };
            balance += contribution;
            RiskYear {
                year: p.year,
                insurance_premium: p.value,
                reserve_contribution: contribution,
                reserve_balance: balance,
                total: p.value + contribution,
            }
        })
        .collect()
}

fn escalate(base: AnnualSeries, enabled: bool, escalation: &[AnnualValue]) -> AnnualSeries {
    if !enabled {
        return base;
    }
    let mut sources = HashMap::new();
    sources.insert(
        COST_ESCALATION_ID.to_string(),
        MultiplierValues::Series(escalation.to_vec()),
    );
    apply_multipliers(
        &base,
        &[MultiplierConfig {
            id: COST_ESCALATION_ID.to_string(),
            operation: MultiplierOperation::Compound,
            base_year: 1,
        }],
        &sources,
    )
    .data
}
