use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::distributions::{percentile_sorted, sort_values};
use crate::error::WindFinanceError;
use crate::probabilities::{percentile_label, PercentileSet};
use crate::types::{AnnualSeries, AnnualValue};
use crate::WindFinanceResult;

/// Percentile summary of one output, resolved to its shape once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Metric {
    /// One value per percentile (IRR, NPV, minimum DSCR, ...)
    Scalar { percentiles: BTreeMap<String, f64> },
    /// One annual series per percentile (cashflow lines, per-year DSCR)
    TimeSeries {
        percentiles: BTreeMap<String, AnnualSeries>,
    },
}

impl Metric {
    /// Percentiles of a per-iteration scalar population.
    pub fn scalar(mut values: Vec<f64>, targets: &[f64]) -> WindFinanceResult<Self> {
        if values.is_empty() {
            return Err(WindFinanceError::InsufficientData(
                "no iteration values to summarise".into(),
            ));
        }
        sort_values(&mut values);
        Ok(Metric::Scalar {
            percentiles: targets
                .iter()
                .map(|&p| (percentile_label(p), percentile_sorted(&values, p)))
                .collect(),
        })
    }

    /// Percentiles taken independently for every year.
    ///
    /// `rows[i][j]` is iteration `i`'s value for `years[j]`.
    pub fn time_series(
        years: &[i32],
        rows: &[Vec<f64>],
        targets: &[f64],
    ) -> WindFinanceResult<Self> {
        if rows.is_empty() {
            return Err(WindFinanceError::InsufficientData(
                "no iteration values to summarise".into(),
            ));
        }
        let mut per_label: BTreeMap<String, AnnualSeries> = targets
            .iter()
            .map(|&p| (percentile_label(p), Vec::with_capacity(years.len())))
            .collect();

        let mut column = Vec::with_capacity(rows.len());
        for (j, &year) in years.iter().enumerate() {
            column.clear();
            column.extend(rows.iter().filter_map(|row| row.get(j).copied()));
            sort_values(&mut column);
            for &p in targets {
                if let Some(series) = per_label.get_mut(&percentile_label(p)) {
                    series.push(AnnualValue {
                        year,
                        value: percentile_sorted(&column, p),
                    });
                }
            }
        }
        Ok(Metric::TimeSeries {
            percentiles: per_label,
        })
    }

    pub fn labels(&self) -> Vec<&str> {
        match self {
            Metric::Scalar { percentiles } => percentiles.keys().map(String::as_str).collect(),
            Metric::TimeSeries { percentiles } => percentiles.keys().map(String::as_str).collect(),
        }
    }

    pub fn scalar_at(&self, label: &str) -> Option<f64> {
        match self {
            Metric::Scalar { percentiles } => percentiles.get(label).copied(),
            Metric::TimeSeries { .. } => None,
        }
    }

    pub fn series_at(&self, label: &str) -> Option<&AnnualSeries> {
        match self {
            Metric::TimeSeries { percentiles } => percentiles.get(label),
            Metric::Scalar { .. } => None,
        }
    }

    /// Re-key with legacy role labels (`Pprimary`, ...). Labels without a
    /// role keep their numeric form.
    pub fn to_legacy_labels(&self, set: &PercentileSet) -> Metric {
        let relabel = |label: &String| {
            set.legacy_label(label)
                .map(str::to_string)
                .unwrap_or_else(|| label.clone())
        };
        match self {
            Metric::Scalar { percentiles } => Metric::Scalar {
                percentiles: percentiles.iter().map(|(k, v)| (relabel(k), *v)).collect(),
            },
            Metric::TimeSeries { percentiles } => Metric::TimeSeries {
                percentiles: percentiles
                    .iter()
                    .map(|(k, v)| (relabel(k), v.clone()))
                    .collect(),
            },
        }
    }

    /// Inverse of [`Metric::to_legacy_labels`].
    pub fn from_legacy_labels(&self, set: &PercentileSet) -> Metric {
        let relabel =
            |label: &String| set.from_legacy_label(label).unwrap_or_else(|| label.clone());
        match self {
            Metric::Scalar { percentiles } => Metric::Scalar {
                percentiles: percentiles.iter().map(|(k, v)| (relabel(k), *v)).collect(),
            },
            Metric::TimeSeries { percentiles } => Metric::TimeSeries {
                percentiles: percentiles
                    .iter()
                    .map(|(k, v)| (relabel(k), v.clone()))
                    .collect(),
            },
        }
    }
}
