use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use windfarm_finance_core::modules::financing::build_schedule;
use windfarm_finance_core::oem::build_matrix;
use windfarm_finance_core::simulation::iteration::run_iteration;
use windfarm_finance_core::simulation::{
    simulate, validate_request, Metric, RunPlan, SimulationRequest,
};
use windfarm_finance_core::WindFinanceError;

// ===========================================================================
// Fixtures
// ===========================================================================

fn base_request() -> Value {
    json!({
        "settings": {
            "general": { "projectLife": 5, "constructionYears": 1, "loanDuration": 5 },
            "project": { "windFarm": { "numWTGs": 10, "mwPerWTG": 3.6 }, "currency": "EUR" },
            "modules": {
                "financing": {
                    "model": "Project-Finance",
                    "capex": 10000000,
                    "debtToCapexRatio": 0,
                    "loanInterestRateFP": 5,
                    "costOfEquity": 8
                },
                "cost": {
                    "annualBaseOM": 1200000,
                    "escalationDistribution": {
                        "type": "triangular",
                        "parameters": { "min": 1, "mode": 2, "max": 4 }
                    },
                    "failureEventProbability": 15,
                    "failureEventCost": 200000
                },
                "revenue": {
                    "energyProduction": { "type": "normal", "parameters": { "mean": 60000, "std": 5000 } },
                    "electricityPrice": { "type": "fixed", "value": 80 },
                    "revenueDegradationRate": 0.5,
                    "downtimeHours": { "type": "exponential", "parameters": { "rate": 0.01 } }
                },
                "contracts": {
                    "oemContracts": [
                        { "id": "tsa-1", "years": [1, 2, 3], "fixedFee": 100000, "isPerTurbine": true, "oemScope": "full" }
                    ]
                }
            },
            "simulation": { "iterations": 1000, "seed": 42 }
        },
        "oemScopes": [
            {
                "id": "full",
                "preventiveMaintenance": true,
                "correctiveMinor": true,
                "correctiveMajor": true,
                "correctiveMajorDetails": { "tooling": true, "manpower": true, "parts": true, "crane": true }
            }
        ]
    })
}

fn request(value: Value) -> SimulationRequest {
    serde_json::from_value(value).unwrap()
}

fn with_debt(mut value: Value) -> Value {
    value["settings"]["modules"]["financing"]["debtToCapexRatio"] = json!(60);
    value["settings"]["general"]["projectLife"] = json!(12);
    value["settings"]["general"]["loanDuration"] = json!(10);
    value["settings"]["simulation"]["iterations"] = json!(300);
    value
}

fn assert_ascending(label: &str, values: &[f64]) {
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "{label} percentiles not ordered: {values:?}");
    }
}

fn check_metric_ordering(name: &str, metric: &Metric, labels: &[&str]) {
    match metric {
        Metric::Scalar { .. } => {
            let values: Vec<f64> = labels.iter().map(|l| metric.scalar_at(l).unwrap()).collect();
            assert_ascending(name, &values);
        }
        Metric::TimeSeries { .. } => {
            let series: Vec<_> = labels.iter().map(|l| metric.series_at(l).unwrap()).collect();
            for j in 0..series[0].len() {
                let values: Vec<f64> = series.iter().map(|s| s[j].value).collect();
                assert_ascending(&format!("{name} year {}", series[0][j].year), &values);
            }
        }
    }
}

// ===========================================================================
// Determinism
// ===========================================================================

#[test]
fn test_same_seed_is_byte_identical() {
    let req = request(base_request());
    let a = simulate(&req).unwrap();
    let b = simulate(&req).unwrap();
    assert_eq!(
        serde_json::to_string(&a.result.output_sim).unwrap(),
        serde_json::to_string(&b.result.output_sim).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&a.result.input_sim).unwrap(),
        serde_json::to_string(&b.result.input_sim).unwrap()
    );
}

#[test]
fn test_different_seed_changes_output() {
    let a = simulate(&request(base_request())).unwrap();
    let mut other = base_request();
    other["settings"]["simulation"]["seed"] = json!(43);
    let b = simulate(&request(other)).unwrap();
    assert_ne!(
        a.result.output_sim.npv.scalar_at("P50"),
        b.result.output_sim.npv.scalar_at("P50")
    );
}

// ===========================================================================
// Contract fee substitution
// ===========================================================================

#[test]
fn test_contract_fee_is_deterministic_under_sampling() {
    let out = simulate(&request(base_request())).unwrap();
    let r = &out.result;
    assert_eq!(r.iterations.attempted, 1000);

    let oem_fee = r
        .input_sim
        .cashflow
        .iter()
        .find(|l| l.name == "oemFee")
        .unwrap();
    for (label, series) in &oem_fee.percentiles {
        assert_eq!(series[0].year, 1, "{label}");
        assert_eq!(series[0].value, 1_000_000.0, "{label}");
        assert_eq!(series[2].value, 1_000_000.0, "{label}");
        assert_eq!(series[3].value, 0.0, "{label}");
    }

    let base_om = r
        .input_sim
        .cashflow
        .iter()
        .find(|l| l.name == "baseOM")
        .unwrap();
    let p50 = &base_om.percentiles["P50"];
    assert_eq!(p50[0].value, 0.0);
    assert!(p50[3].value > 1_200_000.0);

    let matrix = &r.input_sim.scope.responsibility_matrix;
    assert_eq!(matrix.len(), 5);
    assert_eq!(matrix[0].contract_id.as_deref(), Some("tsa-1"));
    assert!(matrix[3].contract_id.is_none());
}

#[test]
fn test_request_contracts_override_settings() {
    let mut value = base_request();
    value["oemContracts"] = json!([
        { "id": "flat", "years": [1], "fixedFee": 250000, "isPerTurbine": false, "oemScope": "full" }
    ]);
    let out = simulate(&request(value)).unwrap();
    let oem_fee = out
        .result
        .input_sim
        .cashflow
        .iter()
        .find(|l| l.name == "oemFee")
        .unwrap();
    assert_eq!(oem_fee.percentiles["P50"][0].value, 250_000.0);
    assert_eq!(oem_fee.percentiles["P50"][1].value, 0.0);
}

// ===========================================================================
// Percentile ordering
// ===========================================================================

#[test]
fn test_percentiles_are_monotonic() {
    let out = simulate(&request(with_debt(base_request()))).unwrap();
    let o = &out.result.output_sim;
    let labels = ["P10", "P25", "P50", "P75", "P90"];

    check_metric_ordering("IRR", &o.irr, &labels);
    check_metric_ordering("NPV", &o.npv, &labels);
    check_metric_ordering("minDSCR", o.min_dscr.as_ref().unwrap(), &labels);
    check_metric_ordering("llcr", o.llcr.as_ref().unwrap(), &labels);
    check_metric_ordering("icr", o.icr.as_ref().unwrap(), &labels);
    check_metric_ordering("dscr", o.dscr.as_ref().unwrap(), &labels);
    check_metric_ordering("equityCashflow", &o.equity_cashflow, &labels);
}

#[test]
fn test_additional_percentiles_extracted() {
    let mut value = base_request();
    value["additionalPercentiles"] = json!([5, 95]);
    let out = simulate(&request(value)).unwrap();
    assert_eq!(
        out.result.percentiles,
        vec![5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0]
    );
    assert!(out.result.output_sim.irr.scalar_at("P95").is_some());
}

#[test]
fn test_output_shape() {
    let out = simulate(&request(with_debt(base_request()))).unwrap();
    let json = serde_json::to_value(&out.result).unwrap();
    let output_sim = &json["outputSim"];
    for key in ["IRR", "NPV", "paybackPeriod", "minDSCR", "llcr", "icr"] {
        assert!(output_sim.get(key).is_some(), "missing {key}");
    }
    assert_eq!(output_sim["IRR"]["kind"], "scalar");
    assert_eq!(output_sim["equityCashflow"]["kind"], "timeSeries");
    assert!(json["inputSim"]["scope"]["responsibilityMatrix"].is_array());
    assert_eq!(json["dscrBreachProbability"].as_array().unwrap().len(), 10);
}

// ===========================================================================
// Partial exclusion
// ===========================================================================

/// One operating year, all equity: the equity flows are `[-capex, CFADS]`,
/// so IRR only exists when the sampled energy covers O&M.
fn marginal_project() -> Value {
    json!({
        "settings": {
            "general": { "projectLife": 1, "constructionYears": 1 },
            "project": { "windFarm": { "numWTGs": 1 } },
            "modules": {
                "financing": { "model": "Balance-Sheet", "capex": 1000000 },
                "cost": { "annualBaseOM": 500000 },
                "revenue": {
                    "energyProduction": { "type": "uniform", "parameters": { "min": 0, "max": 20000 } },
                    "electricityPrice": { "type": "fixed", "value": 50 }
                }
            },
            "simulation": { "iterations": 400, "seed": 9 }
        }
    })
}

#[test]
fn test_failed_iterations_are_excluded_not_fatal() {
    let req = request(marginal_project());
    let out = simulate(&req).unwrap();
    let counts = out.result.iterations;

    assert_eq!(counts.attempted, 400);
    assert!(counts.excluded > 0, "{counts:?}");
    assert!(counts.succeeded > 0, "{counts:?}");
    assert_eq!(counts.succeeded + counts.excluded, 400);
    let note = format!("{} of 400 iterations excluded", counts.excluded);
    assert!(out.warnings.iter().any(|w| w.starts_with(&note)), "{:?}", out.warnings);

    // Recompute the surviving population iteration by iteration.
    let settings = &req.settings;
    let financing = &settings.modules.financing;
    let plan = RunPlan {
        settings,
        matrix: build_matrix(1, 1, &[], &[], Default::default()).unwrap(),
        schedule: build_schedule(financing, 1, settings.general.loan_duration, 1).unwrap(),
    };
    let survivors: Vec<f64> = (0..400)
        .filter_map(|i| run_iteration(&plan, i).ok())
        .map(|r| r.metrics.irr)
        .collect();
    assert_eq!(survivors.len() as u32, counts.succeeded);

    let expected = Metric::scalar(survivors, &out.result.percentiles).unwrap();
    assert_eq!(out.result.output_sim.irr, expected);
    // Every surviving IRR is a loss on a single year of cash.
    assert!(expected.scalar_at("P90").unwrap() < 0.0);
}

// ===========================================================================
// Fail-fast validation
// ===========================================================================

#[test]
fn test_bad_distribution_fails_before_sampling() {
    let mut value = base_request();
    value["settings"]["modules"]["revenue"]["energyProduction"] =
        json!({ "type": "uniform", "parameters": { "min": 10, "max": 5 } });
    let err = simulate(&request(value)).unwrap_err();
    match err {
        WindFinanceError::InvalidDistributionParameters { distribution, .. } => {
            assert!(distribution.contains("energyProduction"), "{distribution}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bad_module_parameter_names_field() {
    let mut value = base_request();
    value["settings"]["modules"]["cost"]["failureEventProbability"] = json!(140);
    match simulate(&request(value)).unwrap_err() {
        WindFinanceError::InvalidModuleParameters { module, field, value, .. } => {
            assert_eq!(module, "cost");
            assert_eq!(field, "failureEventProbability");
            assert_eq!(value, "140");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unknown_scope_rejected() {
    let mut value = base_request();
    value["oemScopes"] = json!([]);
    assert!(matches!(
        simulate(&request(value)),
        Err(WindFinanceError::InvalidInput { .. })
    ));
}

#[test]
fn test_strict_overlap_fails_run() {
    let mut value = base_request();
    value["settings"]["modules"]["contracts"] = json!({
        "overlapPolicy": "strict",
        "oemContracts": [
            { "id": "a", "years": [1, 2], "fixedFee": 1000, "oemScope": "full" },
            { "id": "b", "years": [2, 3], "fixedFee": 1000, "oemScope": "full" }
        ]
    });
    assert!(matches!(
        simulate(&request(value)),
        Err(WindFinanceError::ResponsibilityMatrixConflict { year: 2, .. })
    ));
}

#[test]
fn test_validate_request_matches_simulate() {
    assert!(validate_request(&request(base_request())).is_ok());

    let mut value = base_request();
    value["settings"]["simulation"]["iterations"] = json!(10);
    assert!(matches!(
        validate_request(&request(value)),
        Err(WindFinanceError::InvalidInput { .. })
    ));
}
