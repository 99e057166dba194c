use serde::{Deserialize, Serialize};

use crate::error::WindFinanceError;
use crate::WindFinanceResult;

/// Which percentiles are extracted from the iteration population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileSet {
    pub primary: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub extreme_upper: f64,
    pub extreme_lower: f64,
}

impl Default for PercentileSet {
    fn default() -> Self {
        Self {
            primary: 50.0,
            upper_bound: 75.0,
            lower_bound: 25.0,
            extreme_upper: 90.0,
            extreme_lower: 10.0,
        }
    }
}

/// Legacy role names used by older documents.
const LEGACY_ROLES: [&str; 5] = [
    "Pprimary",
    "Pupper_bound",
    "Plower_bound",
    "Pextreme_upper",
    "Pextreme_lower",
];

/// Numeric label for a percentile: `P50`, `P2.5`.
pub fn percentile_label(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("P{}", p as i64)
    } else {
        format!("P{p}")
    }
}

/// Parse a numeric label back to its percentile.
pub fn parse_percentile_label(label: &str) -> Option<f64> {
    label
        .strip_prefix('P')
        .and_then(|rest| rest.parse::<f64>().ok())
        .filter(|p| (0.0..=100.0).contains(p))
}

impl PercentileSet {
    /// Require `extremeLower < lowerBound < primary < upperBound < extremeUpper`, all in (0, 100).
    pub fn validate(&self) -> WindFinanceResult<()> {
        let ordered = self.ascending();
        for (name, value) in self.named() {
            if !(value > 0.0 && value < 100.0) {
                return Err(WindFinanceError::InvalidInput {
                    field: format!("probabilities.{name}"),
                    reason: format!("{value} must lie strictly between 0 and 100"),
                });
            }
        }
        if ordered.windows(2).any(|w| w[0] >= w[1]) {
            return Err(WindFinanceError::InvalidInput {
                field: "probabilities".into(),
                reason: format!(
                    "must satisfy extremeLower < lowerBound < primary < upperBound < extremeUpper, got {ordered:?}"
                ),
            });
        }
        Ok(())
    }

    fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("primary", self.primary),
            ("upperBound", self.upper_bound),
            ("lowerBound", self.lower_bound),
            ("extremeUpper", self.extreme_upper),
            ("extremeLower", self.extreme_lower),
        ]
    }

    /// The five configured percentiles in ascending order.
    pub fn ascending(&self) -> [f64; 5] {
        [
            self.extreme_lower,
            self.lower_bound,
            self.primary,
            self.upper_bound,
            self.extreme_upper,
        ]
    }

    /// Configured percentiles plus any extras, ascending and de-duplicated.
    pub fn with_additional(&self, extra: &[f64]) -> Vec<f64> {
        let mut all: Vec<f64> = self.ascending().to_vec();
        all.extend(extra.iter().copied());
        all.sort_by(f64::total_cmp);
        all.dedup();
        all
    }

    /// `P50` → `Pprimary` for a configured percentile.
    pub fn legacy_label(&self, label: &str) -> Option<&'static str> {
        let p = parse_percentile_label(label)?;
        self.named()
            .iter()
            .zip(LEGACY_ROLES.iter())
            .find(|((_, v), _)| *v == p)
            .map(|(_, legacy)| *legacy)
    }

    /// `Pprimary` → `P50`. Numeric labels pass through unchanged.
    pub fn from_legacy_label(&self, label: &str) -> Option<String> {
        if let Some(pos) = LEGACY_ROLES.iter().position(|l| *l == label) {
            return Some(percentile_label(self.named()[pos].1));
        }
        parse_percentile_label(label).map(percentile_label)
    }
}
