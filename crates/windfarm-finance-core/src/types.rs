use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Contract money (OEM fees, caps). Exact decimal so fee scaling never drifts.
pub type Money = Decimal;

/// Percentages as entered by users (5.0 = 5%). Converted to rates at use site.
pub type Percent = f64;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    GBP,
    #[default]
    USD,
    EUR,
    DKK,
    NOK,
    SEK,
    Other(String),
}

/// A single value for a project year. Year 0 is COD; negative years are construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnualValue {
    pub year: i32,
    pub value: f64,
}

/// Ordered annual values, one per year.
pub type AnnualSeries = Vec<AnnualValue>;

/// Build a series over `years` from a per-year function.
pub fn series_from_fn(
    years: impl IntoIterator<Item = i32>,
    mut f: impl FnMut(i32) -> f64,
) -> AnnualSeries {
    years
        .into_iter()
        .map(|year| AnnualValue {
            year,
            value: f(year),
        })
        .collect()
}

/// Value for `year`, if the series has one.
pub fn value_at(series: &[AnnualValue], year: i32) -> Option<f64> {
    series.iter().find(|v| v.year == year).map(|v| v.value)
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_from_fn_and_lookup() {
        let s = series_from_fn(1..=3, |y| y as f64 * 10.0);
        assert_eq!(s.len(), 3);
        assert_eq!(value_at(&s, 2), Some(20.0));
        assert_eq!(value_at(&s, 4), None);
    }

    #[test]
    fn test_metadata_precision() {
        let out = with_metadata("test", &serde_json::json!({}), vec![], 5, 1.0_f64);
        assert_eq!(out.metadata.precision, "ieee754_f64");
        assert_eq!(out.metadata.computation_time_us, 5);
    }
}
