use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::types::{value_at, AnnualSeries, AnnualValue};

/// How a multiplier combines with the base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplierOperation {
    /// value * m(year)
    Multiply,
    /// value * (1 + r(year)/100)^(year - baseYear)
    Compound,
    /// value * (1 + r(year)/100 * (year - baseYear))
    Simple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplierConfig {
    pub id: String,
    pub operation: MultiplierOperation,
    #[serde(default = "default_base_year")]
    pub base_year: i32,
}

fn default_base_year() -> i32 {
    1
}

/// Source values for a multiplier id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultiplierValues {
    Scalar(f64),
    Series(AnnualSeries),
}

impl MultiplierValues {
    fn at(&self, year: i32) -> Option<f64> {
        match self {
            MultiplierValues::Scalar(v) => Some(*v),
            MultiplierValues::Series(s) => value_at(s, year),
        }
    }
}

/// Audit record for one applied multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMultiplier {
    pub id: String,
    pub operation: MultiplierOperation,
    pub base_year: i32,
    /// Multiplier input actually used per year (rate or factor).
    pub values: AnnualSeries,
}

/// A year the multiplier could not be applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingMultiplierValue {
    pub id: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplierResult {
    pub data: AnnualSeries,
    pub applied_multipliers: Vec<AppliedMultiplier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_values: Vec<MissingMultiplierValue>,
}

/// Factor a single operation contributes for `year`.
pub fn multiplier_factor(
    operation: MultiplierOperation,
    input: f64,
    year: i32,
    base_year: i32,
) -> f64 {
    let elapsed = (year - base_year) as f64;
    match operation {
        MultiplierOperation::Multiply => input,
        MultiplierOperation::Compound => (1.0 + input / 100.0).powf(elapsed),
        MultiplierOperation::Simple => 1.0 + input / 100.0 * elapsed,
    }
}

/// Apply `configs` in order to `base`.
///
/// A year with no multiplier value keeps its running value and is reported in
/// `missing_values`; an id with no registered source is reported for every year.
pub fn apply_multipliers(
    base: &[AnnualValue],
    configs: &[MultiplierConfig],
    multipliers: &HashMap<String, MultiplierValues>,
) -> MultiplierResult {
    let mut data: AnnualSeries = base.to_vec();
    let mut applied = Vec::with_capacity(configs.len());
    let mut missing = Vec::new();

    for config in configs {
        let source = multipliers.get(&config.id);
        if source.is_none() {
            warn!(id = %config.id, "multiplier has no registered values; series left unchanged");
        }

        let mut used = Vec::with_capacity(data.len());
        for point in data.iter_mut() {
            match source.and_then(|s| s.at(point.year)) {
                Some(input) => {
                    point.value *=
                        multiplier_factor(config.operation, input, point.year, config.base_year);
                    used.push(AnnualValue {
                        year: point.year,
                        value: input,
                    });
                }
                None => {
                    if source.is_some() {
                        warn!(id = %config.id, year = point.year, "missing multiplier value");
                    }
                    missing.push(MissingMultiplierValue {
                        id: config.id.clone(),
                        year: point.year,
                    });
                }
            }
        }

        applied.push(AppliedMultiplier {
            id: config.id.clone(),
            operation: config.operation,
            base_year: config.base_year,
            values: used,
        });
    }

    MultiplierResult {
        data,
        applied_multipliers: applied,
        missing_values: missing,
    }
}
