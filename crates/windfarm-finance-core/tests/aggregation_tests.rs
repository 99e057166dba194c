use pretty_assertions::assert_eq;
use serde_json::json;
use windfarm_finance_core::aggregation::{
    aggregate, aggregate_cashflow, AggregationInput, LineCategory, NamedSeries,
    PercentileSelection,
};
use windfarm_finance_core::multipliers::{
    apply_multipliers, MultiplierConfig, MultiplierOperation, MultiplierValues,
};
use windfarm_finance_core::simulation::simulate;
use windfarm_finance_core::{series_from_fn, AnnualValue};

// ===========================================================================
// Aggregation
// ===========================================================================

fn line(name: &str, category: LineCategory, p50: f64, p90: f64) -> NamedSeries {
    NamedSeries {
        name: name.into(),
        category,
        percentiles: [
            ("P50".to_string(), series_from_fn(1..=4, |_| p50)),
            ("P90".to_string(), series_from_fn(1..=4, |_| p90)),
        ]
        .into_iter()
        .collect(),
    }
}

#[test]
fn test_conservative_per_source_view() {
    let items = vec![
        line("energyRevenue", LineCategory::Revenue, 1000.0, 1200.0),
        line("baseOM", LineCategory::Cost, 300.0, 380.0),
        line("majorRepairs", LineCategory::Cost, 0.0, 150.0),
        line("debtService", LineCategory::DebtService, 400.0, 400.0),
    ];
    let selection = PercentileSelection::PerSource {
        default: 90.0,
        sources: [("energyRevenue".to_string(), 50.0)].into_iter().collect(),
    };
    let out = aggregate(&items, &selection).unwrap();
    assert_eq!(out.total_revenue[0].value, 1000.0);
    assert_eq!(out.total_cost[0].value, 530.0);
    assert_eq!(out.net_cashflow[0].value, 470.0);
    assert_eq!(out.equity_cashflow[0].value, 70.0);
    assert!(out.gaps.is_empty());
}

#[test]
fn test_unified_selection_and_years() {
    let items = vec![
        line("energyRevenue", LineCategory::Revenue, 1000.0, 1200.0),
        line("baseOM", LineCategory::Cost, 300.0, 380.0),
    ];
    let out = aggregate(&items, &PercentileSelection::Unified { percentile: 90.0 }).unwrap();
    let years: Vec<i32> = out.net_cashflow.iter().map(|v| v.year).collect();
    assert_eq!(years, vec![1, 2, 3, 4]);
    assert!(out.net_cashflow.iter().all(|v| v.value == 820.0));
    assert_eq!(out.equity_cashflow, out.net_cashflow);
}

#[test]
fn test_gap_recorded_not_fatal() {
    let input: AggregationInput = serde_json::from_value(json!({
        "lineItems": [
            { "name": "energyRevenue", "category": "revenue",
              "percentiles": { "P50": [{ "year": 1, "value": 100.0 }, { "year": 2, "value": 100.0 }] } },
            { "name": "insurancePremium", "category": "cost",
              "percentiles": { "P75": [{ "year": 1, "value": 10.0 }] } }
        ],
        "selection": { "strategy": "unified", "percentile": 50 }
    }))
    .unwrap();
    let out = aggregate_cashflow(&input).unwrap();
    assert_eq!(out.result.total_cost[0].value, 0.0);
    assert_eq!(out.result.gaps.len(), 2);
    assert_eq!(out.warnings.len(), 1);
}

// ===========================================================================
// Multiplier engine
// ===========================================================================

#[test]
fn test_empty_config_is_identity() {
    let base = series_from_fn(1..=5, |y| 100.0 * y as f64);
    let out = apply_multipliers(&base, &[], &Default::default());
    assert_eq!(out.data, base);
    assert!(out.applied_multipliers.is_empty());
}

#[test]
fn test_multipliers_compose_in_order() {
    let base = series_from_fn(1..=3, |_| 100.0);
    let sources = [
        ("inflation".to_string(), MultiplierValues::Scalar(10.0)),
        (
            "availability".to_string(),
            MultiplierValues::Series(series_from_fn(1..=3, |_| 0.5)),
        ),
    ]
    .into_iter()
    .collect();
    let out = apply_multipliers(
        &base,
        &[
            MultiplierConfig {
                id: "inflation".into(),
                operation: MultiplierOperation::Simple,
                base_year: 1,
            },
            MultiplierConfig {
                id: "availability".into(),
                operation: MultiplierOperation::Multiply,
                base_year: 1,
            },
        ],
        &sources,
    );
    assert!((out.data[2].value - 60.0).abs() < 1e-9);
    assert_eq!(out.applied_multipliers.len(), 2);
    assert_eq!(out.applied_multipliers[1].values[0], AnnualValue { year: 1, value: 0.5 });
}

// ===========================================================================
// End to end
// ===========================================================================

#[test]
fn test_simulation_line_items_aggregate() {
    let request = serde_json::from_value(json!({
        "settings": {
            "general": { "projectLife": 8, "constructionYears": 2, "loanDuration": 6 },
            "project": { "windFarm": { "numWTGs": 6 } },
            "modules": {
                "financing": { "model": "Balance-Sheet", "capex": 20000000, "debtToEquityRatio": 1, "loanInterestRateBS": 4 },
                "cost": { "annualBaseOM": 600000, "escalationRate": 2 },
                "revenue": {
                    "energyProduction": { "type": "lognormal", "parameters": { "mean": 50000, "std": 4000 } },
                    "electricityPrice": { "type": "variable", "distribution": { "type": "uniform", "parameters": { "min": 70, "max": 90 } } }
                },
                "risk": { "insuranceEnabled": true, "insurancePremium": 120000, "insuranceDeductible": 50000, "escalate": true }
            },
            "simulation": { "iterations": 200, "seed": 2024 }
        }
    }))
    .unwrap();
    let out = simulate(&request).unwrap();
    let r = &out.result;

    let again = aggregate(
        &r.input_sim.cashflow,
        &PercentileSelection::Unified { percentile: 50.0 },
    )
    .unwrap();
    assert_eq!(again, r.aggregated);
    assert!(r.aggregated.gaps.is_empty());
    // Debt service present: equity sits below net in loan years.
    assert!(r.aggregated.equity_cashflow[0].value < r.aggregated.net_cashflow[0].value);
    assert_eq!(r.aggregated.net_cashflow.len(), 8);
}
