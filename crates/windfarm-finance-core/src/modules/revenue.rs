use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{
    adjustments_for, check_adjustments, check_distribution, check_finite, check_percent,
    Adjustment, GenerationContext,
};
use crate::distributions::DistributionSpec;
use crate::multipliers::{
    apply_multipliers, AppliedMultiplier, MultiplierConfig, MultiplierOperation, MultiplierValues,
};
use crate::types::{series_from_fn, Percent};
use crate::WindFinanceResult;

const MODULE: &str = "revenue";
const HOURS_PER_YEAR: f64 = 8760.0;
pub const PRICE_ESCALATION_ID: &str = "priceEscalation";
pub const DEGRADATION_ID: &str = "degradation";

/// Electricity price: a fixed tariff or a per-year sampled market price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElectricityPrice {
    Fixed { value: f64 },
    Variable { distribution: DistributionSpec },
}

impl Default for ElectricityPrice {
    fn default() -> Self {
        Self::Fixed { value: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSettings {
    /// Annual net energy (MWh) for the whole farm
    pub energy_production: DistributionSpec,
    #[serde(default)]
    pub electricity_price: ElectricityPrice,
    #[serde(default)]
    pub price_escalation_rate: Percent,
    #[serde(default)]
    pub revenue_degradation_rate: Percent,
    /// Unplanned downtime (hours per year)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime_hours: Option<DistributionSpec>,
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueYear {
    pub year: i32,
    pub energy_production: f64,
    pub electricity_price: f64,
    pub downtime_hours: f64,
    pub gross_revenue: f64,
    pub downtime_loss: f64,
    pub adjustments: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSeries {
    pub years: Vec<RevenueYear>,
    pub applied_multipliers: Vec<AppliedMultiplier>,
}

impl RevenueSettings {
    pub fn validate(&self) -> WindFinanceResult<()> {
        check_distribution(MODULE, "energyProduction", &self.energy_production)?;
        match &self.electricity_price {
            ElectricityPrice::Fixed { value } => {
                super::check_non_negative(MODULE, "electricityPrice.value", *value)?
            }
            ElectricityPrice::Variable { distribution } => {
                check_distribution(MODULE, "electricityPrice.distribution", distribution)?
            }
        }
        check_finite(MODULE, "priceEscalationRate", self.price_escalation_rate)?;
        check_percent(MODULE, "revenueDegradationRate", self.revenue_degradation_rate)?;
        if let Some(spec) = &self.downtime_hours {
            check_distribution(MODULE, "downtimeHours", spec)?;
        }
        check_adjustments(MODULE, &self.adjustments)
    }
}

/// Generate one iteration of annual revenue.
///
/// Draw order per year: energy, price (if variable), downtime (if configured).
pub fn generate<R: Rng>(
    settings: &RevenueSettings,
    ctx: &GenerationContext<'_>,
    rng: &mut R,
) -> WindFinanceResult<RevenueSeries> {
    let mut energy = Vec::with_capacity(ctx.project_life as usize);
    let mut prices = Vec::with_capacity(ctx.project_life as usize);
    let mut downtime = Vec::with_capacity(ctx.project_life as usize);

    for _ in ctx.operating_years() {
        // Negative draws from unbounded distributions clamp to zero production.
        energy.push(settings.energy_production.sample(rng)?.max(0.0));
        prices.push(match &settings.electricity_price {
            ElectricityPrice::Fixed { value } => *value,
            ElectricityPrice::Variable { distribution } => distribution.sample(rng)?.max(0.0),
        });
        downtime.push(match &settings.downtime_hours {
            Some(spec) => spec.sample(rng)?.clamp(0.0, HOURS_PER_YEAR),
            None => 0.0,
        });
    }

    let gross_base = series_from_fn(ctx.operating_years(), |year| {
        let i = (year - 1) as usize;
        energy[i] * prices[i]
    });

    let mut sources = HashMap::new();
    sources.insert(
        PRICE_ESCALATION_ID.to_string(),
        MultiplierValues::Scalar(settings.price_escalation_rate),
    );
    sources.insert(
        DEGRADATION_ID.to_string(),
        MultiplierValues::Scalar(-settings.revenue_degradation_rate),
    );
    let gross = apply_multipliers(
        &gross_base,
        &[
            MultiplierConfig {
                id: PRICE_ESCALATION_ID.to_string(),
                operation: MultiplierOperation::Compound,
                base_year: 1,
            },
            MultiplierConfig {
                id: DEGRADATION_ID.to_string(),
                operation: MultiplierOperation::Compound,
                base_year: 1,
            },
        ],
        &sources,
    );

    let years = gross
        .data
        .iter()
        .map(|point| {
            let i = (point.year - 1) as usize;
            let gross_revenue = point.value;
            let downtime_loss = (gross_revenue * downtime[i] / HOURS_PER_YEAR).min(gross_revenue);
            let adjustments = adjustments_for(&settings.adjustments, point.year);
            RevenueYear {
                year: point.year,
                energy_production: energy[i],
                electricity_price: prices[i],
                downtime_hours: downtime[i],
                gross_revenue,
                downtime_loss,
                adjustments,
                total: gross_revenue - downtime_loss + adjustments,
            }
        })
        .collect();

    Ok(RevenueSeries {
        years,
        applied_multipliers: gross.applied_multipliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WindFinanceError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings() -> RevenueSettings {
        RevenueSettings {
            energy_production: DistributionSpec::Fixed { value: 100_000.0 },
            electricity_price: ElectricityPrice::Fixed { value: 50.0 },
            price_escalation_rate: 0.0,
            revenue_degradation_rate: 0.0,
            downtime_hours: None,
            adjustments: vec![],
        }
    }

    fn ctx(life: u32) -> GenerationContext<'static> {
        GenerationContext {
            project_life: life,
            num_wtgs: 10,
            responsibility: &[],
            escalation: &[],
            insurance_deductible: None,
        }
    }

    #[test]
    fn test_fixed_inputs_give_flat_revenue() {
        let out = generate(&settings(), &ctx(3), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(out.years.len(), 3);
        for y in &out.years {
            assert!((y.total - 5_000_000.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_degradation_and_escalation() {
        let mut s = settings();
        s.revenue_degradation_rate = 1.0;
        s.price_escalation_rate = 2.0;
        let out = generate(&s, &ctx(3), &mut StdRng::seed_from_u64(1)).unwrap();
        let expected = 5_000_000.0 * 1.02_f64.powi(2) * 0.99_f64.powi(2);
        assert!((out.years[2].gross_revenue - expected).abs() < 1e-6);
        assert_eq!(out.applied_multipliers.len(), 2);
    }

    #[test]
    fn test_downtime_loss_is_pro_rata() {
        let mut s = settings();
        s.downtime_hours = Some(DistributionSpec::Fixed { value: 876.0 });
        let out = generate(&s, &ctx(1), &mut StdRng::seed_from_u64(1)).unwrap();
        assert!((out.years[0].downtime_loss - 500_000.0).abs() < 1e-6);
        assert!((out.years[0].total - 4_500_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_downtime_loss_capped_at_gross() {
        let mut s = settings();
        s.downtime_hours = Some(DistributionSpec::Fixed { value: 20_000.0 });
        let out = generate(&s, &ctx(1), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(out.years[0].total, 0.0);
    }

    #[test]
    fn test_variable_price_reproducible() {
        let mut s = settings();
        s.electricity_price = ElectricityPrice::Variable {
            distribution: DistributionSpec::Normal { mean: 50.0, std: 5.0 },
        };
        s.energy_production = DistributionSpec::Normal { mean: 100_000.0, std: 8_000.0 };
        let a = generate(&s, &ctx(5), &mut StdRng::seed_from_u64(11)).unwrap();
        let b = generate(&s, &ctx(5), &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
        assert!(a.years.iter().any(|y| (y.electricity_price - 50.0).abs() > 1e-9));
    }

    #[test]
    fn test_validation() {
        let mut s = settings();
        s.revenue_degradation_rate = -1.0;
        assert!(matches!(
            s.validate(),
            Err(WindFinanceError::InvalidModuleParameters { .. })
        ));

        let mut s = settings();
        s.energy_production = DistributionSpec::Weibull { scale: 0.0, shape: 2.0 };
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("energyProduction"), "{err}");
    }

    #[test]
    fn test_price_serde_shape() {
        let p: ElectricityPrice = serde_json::from_str(r#"{"type":"fixed","value":42.5}"#).unwrap();
        assert_eq!(p, ElectricityPrice::Fixed { value: 42.5 });
        let v: ElectricityPrice = serde_json::from_str(
            r#"{"type":"variable","distribution":{"type":"uniform","parameters":{"min":30,"max":60}}}"#,
        )
        .unwrap();
        assert!(matches!(v, ElectricityPrice::Variable { .. }));
    }
}
