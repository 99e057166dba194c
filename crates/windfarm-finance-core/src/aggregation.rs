use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::debug;

use crate::error::WindFinanceError;
use crate::probabilities::percentile_label;
use crate::types::{value_at, with_metadata, AnnualSeries, AnnualValue, ComputationOutput};
use crate::WindFinanceResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineCategory {
    Revenue,
    Cost,
    DebtService,
}

/// A cashflow line item with one annual series per percentile label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedSeries {
    pub name: String,
    pub category: LineCategory,
    /// `P50` → annual values
    pub percentiles: BTreeMap<String, AnnualSeries>,
}

/// Which percentile each line item is read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum PercentileSelection {
    /// Same percentile for every line item
    Unified { percentile: f64 },
    /// Per-source percentile, `default` for sources not listed
    #[serde(rename_all = "camelCase")]
    PerSource {
        default: f64,
        #[serde(default)]
        sources: BTreeMap<String, f64>,
    },
}

impl Default for PercentileSelection {
    fn default() -> Self {
        Self::Unified { percentile: 50.0 }
    }
}

impl PercentileSelection {
    pub fn percentile_for(&self, source: &str) -> f64 {
        match self {
            Self::Unified { percentile } => *percentile,
            Self::PerSource { default, sources } => {
                sources.get(source).copied().unwrap_or(*default)
            }
        }
    }

    fn validate(&self) -> WindFinanceResult<()> {
        let check = |field: String, p: f64| {
            if (0.0..=100.0).contains(&p) {
                Ok(())
            } else {
                Err(WindFinanceError::InvalidInput {
                    field,
                    reason: format!("percentile {p} is outside [0, 100]"),
                })
            }
        };
        match self {
            Self::Unified { percentile } => check("selection.percentile".into(), *percentile),
            Self::PerSource { default, sources } => {
                check("selection.default".into(), *default)?;
                for (name, p) in sources {
                    check(format!("selection.sources.{name}"), *p)?;
                }
                Ok(())
            }
        }
    }
}

/// A line item value that was not available and was taken as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationGap {
    pub source: String,
    pub percentile: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedCashflow {
    pub total_revenue: AnnualSeries,
    pub total_cost: AnnualSeries,
    pub net_cashflow: AnnualSeries,
    pub equity_cashflow: AnnualSeries,
    pub gaps: Vec<AggregationGap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationInput {
    pub line_items: Vec<NamedSeries>,
    #[serde(default)]
    pub selection: PercentileSelection,
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Combine line items into revenue, cost, net and equity series.
///
/// The year axis is the union of every year present in any line item. A
/// missing percentile or year counts as zero and is reported in `gaps`.
pub fn aggregate(
    line_items: &[NamedSeries],
    selection: &PercentileSelection,
) -> WindFinanceResult<AggregatedCashflow> {
    selection.validate()?;

    let years: BTreeSet<i32> = line_items
        .iter()
        .flat_map(|item| item.percentiles.values())
        .flat_map(|series| series.iter().map(|v| v.year))
        .collect();

    let mut revenue: BTreeMap<i32, f64> = years.iter().map(|&y| (y, 0.0)).collect();
    let mut cost = revenue.clone();
    let mut debt_service = revenue.clone();
    let mut has_debt_service = false;
    let mut gaps = Vec::new();

    for item in line_items {
        let label = percentile_label(selection.percentile_for(&item.name));
        let series = item.percentiles.get(&label);
        let bucket = match item.category {
            LineCategory::Revenue => &mut revenue,
            LineCategory::Cost => &mut cost,
            LineCategory::DebtService => {
                has_debt_service = true;
                &mut debt_service
            }
        };

        for &year in &years {
            match series.and_then(|s| value_at(s, year)) {
                Some(v) => {
                    if let Some(total) = bucket.get_mut(&year) {
                        *total += v;
                    }
                }
                None => {
                    debug!(
                        source = %item.name,
                        percentile = %label,
                        year,
                        "line item missing; using zero"
                    );
                    gaps.push(AggregationGap {
                        source: item.name.clone(),
                        percentile: label.clone(),
                        year,
                    });
                }
            }
        }
    }

    let to_series = |m: &BTreeMap<i32, f64>| -> AnnualSeries {
        m.iter()
            .map(|(&year, &value)| AnnualValue { year, value })
            .collect()
    };

    let net: BTreeMap<i32, f64> = years
        .iter()
        .map(|y| (*y, revenue[y] - cost[y]))
        .collect();
    let equity: BTreeMap<i32, f64> = if has_debt_service {
        years.iter().map(|y| (*y, net[y] - debt_service[y])).collect()
    } else {
        net.clone()
    };

    Ok(AggregatedCashflow {
        total_revenue: to_series(&revenue),
        total_cost: to_series(&cost),
        net_cashflow: to_series(&net),
        equity_cashflow: to_series(&equity),
        gaps,
    })
}

/// Aggregate and wrap in the standard envelope; gaps become warnings.
pub fn aggregate_cashflow(
    input: &AggregationInput,
) -> WindFinanceResult<ComputationOutput<AggregatedCashflow>> {
    let start = Instant::now();
    let result = aggregate(&input.line_items, &input.selection)?;

    let mut gap_counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for gap in &result.gaps {
        *gap_counts
            .entry((gap.source.as_str(), gap.percentile.as_str()))
            .or_default() += 1;
    }
    let warnings = gap_counts
        .into_iter()
        .map(|((source, label), n)| {
            format!("{source} has no {label} values for {n} year(s); treated as zero")
        })
        .collect();

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Percentile cashflow aggregation",
        &serde_json::json!({
            "line_items": input.line_items.len(),
            "selection": input.selection,
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::series_from_fn;

    fn item(name: &str, category: LineCategory, labels: &[(&str, f64)]) -> NamedSeries {
        NamedSeries {
            name: name.into(),
            category,
            percentiles: labels
                .iter()
                .map(|(l, v)| (l.to_string(), series_from_fn(1..=3, |_| *v)))
                .collect(),
        }
    }

    #[test]
    fn test_unified_totals() {
        let items = vec![
            item("revenue", LineCategory::Revenue, &[("P50", 100.0), ("P90", 120.0)]),
            item("om", LineCategory::Cost, &[("P50", 30.0), ("P90", 45.0)]),
            item("insurance", LineCategory::Cost, &[("P50", 5.0)]),
        ];
        let out = aggregate(&items, &PercentileSelection::Unified { percentile: 50.0 }).unwrap();
        assert_eq!(out.total_revenue[0].value, 100.0);
        assert_eq!(out.total_cost[0].value, 35.0);
        assert_eq!(out.net_cashflow[2].value, 65.0);
        // No debt service line: equity equals net.
        assert_eq!(out.equity_cashflow, out.net_cashflow);
        assert!(out.gaps.is_empty());
    }

    #[test]
    fn test_per_source_selection() {
        let items = vec![
            item("revenue", LineCategory::Revenue, &[("P50", 100.0), ("P90", 120.0)]),
            item("om", LineCategory::Cost, &[("P50", 30.0), ("P90", 45.0)]),
            item("debt", LineCategory::DebtService, &[("P50", 20.0)]),
        ];
        let selection = PercentileSelection::PerSource {
            default: 50.0,
            sources: [("om".to_string(), 90.0)].into_iter().collect(),
        };
        let out = aggregate(&items, &selection).unwrap();
        assert_eq!(out.total_cost[0].value, 45.0);
        assert_eq!(out.net_cashflow[0].value, 55.0);
        assert_eq!(out.equity_cashflow[0].value, 35.0);
    }

    #[test]
    fn test_missing_percentile_is_gap() {
        let items = vec![
            item("revenue", LineCategory::Revenue, &[("P90", 120.0)]),
            item("om", LineCategory::Cost, &[("P90", 45.0)]),
            item("insurance", LineCategory::Cost, &[("P50", 5.0)]),
        ];
        let out = aggregate(&items, &PercentileSelection::Unified { percentile: 90.0 }).unwrap();
        assert_eq!(out.total_cost[0].value, 45.0);
        assert_eq!(out.gaps.len(), 3);
        assert!(out.gaps.iter().all(|g| g.source == "insurance" && g.percentile == "P90"));
    }

    #[test]
    fn test_missing_year_is_gap() {
        let mut short = item("om", LineCategory::Cost, &[("P50", 10.0)]);
        if let Some(series) = short.percentiles.get_mut("P50") {
            series.pop();
        }
        let items = vec![item("revenue", LineCategory::Revenue, &[("P50", 100.0)]), short];
        let out = aggregate(&items, &PercentileSelection::default()).unwrap();
        assert_eq!(out.total_cost[2].value, 0.0);
        assert_eq!(
            out.gaps,
            vec![AggregationGap { source: "om".into(), percentile: "P50".into(), year: 3 }]
        );
    }

    #[test]
    fn test_invalid_selection_rejected() {
        assert!(aggregate(&[], &PercentileSelection::Unified { percentile: 120.0 }).is_err());
    }

    #[test]
    fn test_envelope_reports_gaps() {
        let input = AggregationInput {
            line_items: vec![
                item("revenue", LineCategory::Revenue, &[("P50", 100.0)]),
                item("om", LineCategory::Cost, &[("P75", 40.0)]),
            ],
            selection: PercentileSelection::default(),
        };
        let out = aggregate_cashflow(&input).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("om"));
    }

    #[test]
    fn test_selection_serde() {
        let s: PercentileSelection = serde_json::from_str(
            r#"{"strategy":"perSource","default":50,"sources":{"cost":90}}"#,
        )
        .unwrap();
        assert_eq!(s.percentile_for("cost"), 90.0);
        assert_eq!(s.percentile_for("revenue"), 50.0);
    }
}
