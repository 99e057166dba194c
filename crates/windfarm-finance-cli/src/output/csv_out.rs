use serde_json::{Map, Value};
use std::io;

use super::{cashflow_rows, metric_points, CASHFLOW_HEADERS};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// Simulation results become long-format `metric,percentile,year,value`
/// rows; aggregated cashflow becomes one row per year.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = match value {
        Value::Object(map) => map.get("result").unwrap_or(value),
        _ => value,
    };

    match result {
        Value::Object(map) => {
            if let Some(Value::Object(output_sim)) = map.get("outputSim") {
                write_metrics(&mut wtr, output_sim);
            } else if map.contains_key("netCashflow") {
                write_cashflow(&mut wtr, map);
            } else {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            }
        }
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(result)]);
        }
    }

    let _ = wtr.flush();
}

fn write_metrics(wtr: &mut StdoutWriter<'_>, output_sim: &Map<String, Value>) {
    let _ = wtr.write_record(["metric", "percentile", "year", "value"]);
    for p in metric_points(output_sim) {
        let year = p.year.map(|y| y.to_string()).unwrap_or_default();
        let _ = wtr.write_record([
            p.metric.as_str(),
            p.label.as_str(),
            year.as_str(),
            &format_csv_value(&p.value),
        ]);
    }
}

fn write_cashflow(wtr: &mut StdoutWriter<'_>, aggregated: &Map<String, Value>) {
    let _ = wtr.write_record(CASHFLOW_HEADERS);
    for (year, row) in cashflow_rows(aggregated) {
        let mut record = vec![year.to_string()];
        record.extend(row.iter().map(format_csv_value));
        let _ = wtr.write_record(&record);
    }
}

fn write_array_csv(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
        return;
    };

    let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
    let _ = wtr.write_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
