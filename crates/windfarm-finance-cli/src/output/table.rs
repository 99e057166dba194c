use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{cashflow_rows, metric_points, CASHFLOW_HEADERS};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => {
                print_result(result);
                print_envelope(map);
            }
            Some(Value::Array(rows)) => {
                print_array_table(rows);
                print_envelope(map);
            }
            _ => print_flat_object(map),
        },
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Map<String, Value>) {
    if let Some(Value::Object(output_sim)) = result.get("outputSim") {
        print_scalar_metrics(output_sim);
        if let Some(Value::Object(aggregated)) = result.get("aggregated") {
            println!("\nCashflow at primary percentile:");
            print_cashflow(aggregated);
        }
        if let Some(Value::Object(counts)) = result.get("iterations") {
            println!(
                "\nIterations: {} attempted, {} succeeded, {} excluded",
                format_value(counts.get("attempted").unwrap_or(&Value::Null)),
                format_value(counts.get("succeeded").unwrap_or(&Value::Null)),
                format_value(counts.get("excluded").unwrap_or(&Value::Null)),
            );
        }
    } else if result.contains_key("netCashflow") {
        print_cashflow(result);
    } else {
        print_flat_object(result);
    }
}

/// One row per scalar metric, one column per percentile label.
fn print_scalar_metrics(output_sim: &Map<String, Value>) {
    let points: Vec<_> = metric_points(output_sim)
        .into_iter()
        .filter(|p| p.year.is_none())
        .collect();

    let mut labels: Vec<&str> = Vec::new();
    for p in &points {
        if !labels.contains(&p.label.as_str()) {
            labels.push(&p.label);
        }
    }

    let mut builder = Builder::default();
    let mut header = vec!["Metric".to_string()];
    header.extend(labels.iter().map(|l| l.to_string()));
    builder.push_record(header);

    let mut metrics: Vec<&str> = Vec::new();
    for p in &points {
        if !metrics.contains(&p.metric.as_str()) {
            metrics.push(&p.metric);
        }
    }
    for metric in metrics {
        let mut row = vec![metric.to_string()];
        for label in &labels {
            let cell = points
                .iter()
                .find(|p| p.metric == metric && p.label == *label)
                .map(|p| format_value(&p.value))
                .unwrap_or_default();
            row.push(cell);
        }
        builder.push_record(row);
    }
    println!("{}", Table::from(builder));
}

fn print_cashflow(aggregated: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(CASHFLOW_HEADERS);
    for (year, row) in cashflow_rows(aggregated) {
        let mut record = vec![year.to_string()];
        record.extend(row.iter().map(format_value));
        builder.push_record(record);
    }
    println!("{}", Table::from(builder));
}

fn print_envelope(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.4}"),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
