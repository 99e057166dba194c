pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// One percentile observation of an `outputSim` metric. `year` is `None`
/// for scalar metrics.
pub struct MetricPoint {
    pub metric: String,
    pub label: String,
    pub year: Option<i64>,
    pub value: Value,
}

/// Flatten the serialised `outputSim` block into long-format points.
pub fn metric_points(output_sim: &Map<String, Value>) -> Vec<MetricPoint> {
    let mut points = Vec::new();
    for (metric, body) in output_sim {
        let Some(Value::Object(percentiles)) = body.get("percentiles") else {
            continue;
        };
        for (label, entry) in percentiles {
            match entry {
                Value::Array(series) => {
                    for item in series {
                        points.push(MetricPoint {
                            metric: metric.clone(),
                            label: label.clone(),
                            year: item.get("year").and_then(Value::as_i64),
                            value: item.get("value").cloned().unwrap_or(Value::Null),
                        });
                    }
                }
                other => points.push(MetricPoint {
                    metric: metric.clone(),
                    label: label.clone(),
                    year: None,
                    value: other.clone(),
                }),
            }
        }
    }
    points
}

/// Zip the aggregated cashflow series into per-year rows.
pub fn cashflow_rows(aggregated: &Map<String, Value>) -> Vec<(i64, [Value; 4])> {
    const COLUMNS: [&str; 4] = ["totalRevenue", "totalCost", "netCashflow", "equityCashflow"];
    let Some(Value::Array(years)) = aggregated.get("netCashflow") else {
        return Vec::new();
    };
    years
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let year = entry.get("year").and_then(Value::as_i64)?;
            let row = COLUMNS.map(|col| {
                aggregated
                    .get(col)
                    .and_then(|s| s.get(i))
                    .and_then(|v| v.get("value"))
                    .cloned()
                    .unwrap_or(Value::Null)
            });
            Some((year, row))
        })
        .collect()
}

pub const CASHFLOW_HEADERS: [&str; 5] = [
    "year",
    "totalRevenue",
    "totalCost",
    "netCashflow",
    "equityCashflow",
];
