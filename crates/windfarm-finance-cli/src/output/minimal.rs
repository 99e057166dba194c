use serde_json::Value;
use windfarm_finance_core::probabilities::percentile_label;

/// Fallback pointers into the result, tried after the primary IRR.
const PRIORITY_POINTERS: [&str; 3] = ["/netCashflow", "/median", "/valid"];

/// Print just the key answer value from the output.
///
/// Simulation runs print the IRR at the configured primary percentile,
/// aggregation prints net cashflow, sampling prints the median draw. Anything
/// else falls back to the first field of the result.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let irr_pointers = primary_irr_pointers(value);
    let pointers = irr_pointers
        .iter()
        .map(String::as_str)
        .chain(PRIORITY_POINTERS);

    for pointer in pointers {
        if let Some(val) = result.pointer(pointer) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result));
}

/// IRR pointers for the run's primary percentile, numeric and legacy label.
/// The primary comes from the envelope's assumptions; 50 when absent.
pub fn primary_irr_pointers(envelope: &Value) -> Vec<String> {
    let primary = envelope
        .pointer("/assumptions/probabilities/primary")
        .and_then(Value::as_f64)
        .unwrap_or(50.0);
    [percentile_label(primary), "Pprimary".to_string()]
        .into_iter()
        .map(|label| format!("/outputSim/IRR/percentiles/{label}"))
        .collect()
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        // Annual series print as year=value pairs
        Value::Array(items) if items.iter().all(|i| i.get("year").is_some()) => items
            .iter()
            .map(|i| format!("{}={}", i["year"], i["value"]))
            .collect::<Vec<_>>()
            .join(" "),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primary_irr_follows_configured_percentile() {
        let envelope = json!({
            "result": { "outputSim": { "IRR": { "kind": "scalar", "percentiles": { "P40": 0.07 } } } },
            "assumptions": { "probabilities": { "primary": 40.0 } }
        });
        let pointers = primary_irr_pointers(&envelope);
        assert_eq!(pointers[0], "/outputSim/IRR/percentiles/P40");
        assert_eq!(envelope["result"].pointer(&pointers[0]), Some(&json!(0.07)));
    }

    #[test]
    fn test_primary_defaults_to_median() {
        let pointers = primary_irr_pointers(&json!({ "result": {} }));
        assert_eq!(pointers[0], "/outputSim/IRR/percentiles/P50");
        assert_eq!(pointers[1], "/outputSim/IRR/percentiles/Pprimary");
    }
}
