//! Per-module annual series generators (cost, revenue, financing, risk).
//!
//! Every generator validates its settings up front through `validate()` so the
//! orchestrator can fail before any sampling. Generators are pure functions of
//! their settings, a [`GenerationContext`] and the iteration RNG.

pub mod cost;
pub mod financing;
pub mod revenue;
pub mod risk;

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::distributions::DistributionSpec;
use crate::error::WindFinanceError;
use crate::oem::YearlyResponsibility;
use crate::types::AnnualValue;
use crate::WindFinanceResult;

/// Additive amount applied to every year in `startYear..=endYear`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    #[serde(default)]
    pub description: String,
    pub start_year: u32,
    pub end_year: u32,
    pub amount: f64,
}

impl Adjustment {
    pub fn applies_to(&self, year: i32) -> bool {
        year >= self.start_year as i32 && year <= self.end_year as i32
    }
}

/// Sum of all adjustments active in `year`.
pub fn adjustments_for(adjustments: &[Adjustment], year: i32) -> f64 {
    adjustments
        .iter()
        .filter(|a| a.applies_to(year))
        .map(|a| a.amount)
        .sum()
}

/// Read-only per-iteration context shared by the generators.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub project_life: u32,
    pub num_wtgs: u32,
    pub responsibility: &'a [YearlyResponsibility],
    /// Cost escalation rate (%) per operating year, sampled for this iteration.
    pub escalation: &'a [AnnualValue],
    /// Owner's retained amount per insured event when insurance is enabled.
    pub insurance_deductible: Option<f64>,
}

impl GenerationContext<'_> {
    pub fn operating_years(&self) -> RangeInclusive<i32> {
        1..=self.project_life as i32
    }

    pub fn responsibility_for(&self, year: i32) -> Option<&YearlyResponsibility> {
        self.responsibility.iter().find(|r| r.year as i32 == year)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

pub(crate) fn check_finite(module: &str, field: &str, value: f64) -> WindFinanceResult<()> {
    if !value.is_finite() {
        return Err(WindFinanceError::module_param(
            module,
            field,
            value,
            "must be a finite number",
        ));
    }
    Ok(())
}

pub(crate) fn check_non_negative(module: &str, field: &str, value: f64) -> WindFinanceResult<()> {
    check_finite(module, field, value)?;
    if value < 0.0 {
        return Err(WindFinanceError::module_param(
            module,
            field,
            value,
            "cannot be negative",
        ));
    }
    Ok(())
}

pub(crate) fn check_percent(module: &str, field: &str, value: f64) -> WindFinanceResult<()> {
    check_finite(module, field, value)?;
    if !(0.0..=100.0).contains(&value) {
        return Err(WindFinanceError::module_param(
            module,
            field,
            value,
            "percentage must lie within [0, 100]",
        ));
    }
    Ok(())
}

pub(crate) fn check_distribution(
    module: &str,
    field: &str,
    spec: &DistributionSpec,
) -> WindFinanceResult<()> {
    spec.validate().map_err(|e| match e {
        WindFinanceError::InvalidDistributionParameters {
            distribution,
            reason,
        } => WindFinanceError::InvalidDistributionParameters {
            distribution: format!("{module}.{field} ({distribution})"),
            reason,
        },
        other => other,
    })
}

pub(crate) fn check_adjustments(module: &str, adjustments: &[Adjustment]) -> WindFinanceResult<()> {
    for (i, adj) in adjustments.iter().enumerate() {
        check_finite(module, &format!("adjustments[{i}].amount"), adj.amount)?;
        if adj.start_year > adj.end_year {
            return Err(WindFinanceError::module_param(
                module,
                &format!("adjustments[{i}].startYear"),
                adj.start_year,
                "must not be after endYear",
            ));
        }
    }
    Ok(())
}
