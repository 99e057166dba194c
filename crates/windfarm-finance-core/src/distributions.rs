use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Exp, LogNormal, Normal, Triangular, Uniform, Weibull};
use std::time::Instant;

use crate::error::WindFinanceError;
use crate::types::{with_metadata, ComputationOutput};
use crate::WindFinanceResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How to sample a stochastic quantity.
///
/// Serialized as `{"type": "triangular", "parameters": {"min": .., "mode": .., "max": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "lowercase")]
pub enum DistributionSpec {
    Normal { mean: f64, std: f64 },
    /// Mean and standard deviation of the log-normal variable itself.
    Lognormal { mean: f64, std: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
    Weibull { scale: f64, shape: f64 },
    Exponential { rate: f64 },
    Fixed { value: f64 },
}

/// A requested percentile and its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentilePoint {
    pub percentile: f64,
    pub value: f64,
}

/// A single histogram bin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
    pub frequency: f64,
}

/// Descriptive statistics for a sample population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleStatistics {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<PercentilePoint>,
    pub skewness: f64,
    pub kurtosis: f64,
    pub histogram: Vec<HistogramBin>,
}

/// Input for stand-alone distribution sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRequest {
    pub distribution: DistributionSpec,
    #[serde(default = "default_samples")]
    pub samples: u32,
    pub seed: u64,
    #[serde(default = "default_percentiles")]
    pub percentiles: Vec<f64>,
}

fn default_samples() -> u32 {
    10_000
}

fn default_percentiles() -> Vec<f64> {
    vec![10.0, 25.0, 50.0, 75.0, 90.0]
}

// ---------------------------------------------------------------------------
// Validation and sampling
// ---------------------------------------------------------------------------

fn invalid(distribution: &str, reason: impl Into<String>) -> WindFinanceError {
    WindFinanceError::InvalidDistributionParameters {
        distribution: distribution.to_string(),
        reason: reason.into(),
    }
}

fn param_error(distribution: &str, e: impl std::fmt::Display) -> WindFinanceError {
    invalid(distribution, format!("{e}"))
}

impl DistributionSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            DistributionSpec::Normal { .. } => "normal",
            DistributionSpec::Lognormal { .. } => "lognormal",
            DistributionSpec::Triangular { .. } => "triangular",
            DistributionSpec::Uniform { .. } => "uniform",
            DistributionSpec::Weibull { .. } => "weibull",
            DistributionSpec::Exponential { .. } => "exponential",
            DistributionSpec::Fixed { .. } => "fixed",
        }
    }

    fn parameters_finite(&self) -> bool {
        match *self {
            DistributionSpec::Normal { mean, std } | DistributionSpec::Lognormal { mean, std } => {
                mean.is_finite() && std.is_finite()
            }
            DistributionSpec::Triangular { min, mode, max } => {
                min.is_finite() && mode.is_finite() && max.is_finite()
            }
            DistributionSpec::Uniform { min, max } => min.is_finite() && max.is_finite(),
            DistributionSpec::Weibull { scale, shape } => scale.is_finite() && shape.is_finite(),
            DistributionSpec::Exponential { rate } => rate.is_finite(),
            DistributionSpec::Fixed { value } => value.is_finite(),
        }
    }

    /// Check parameter domains without touching any RNG.
    pub fn validate(&self) -> WindFinanceResult<()> {
        let kind = self.kind();
        if !self.parameters_finite() {
            return Err(invalid(kind, "parameters must be finite"));
        }
        match *self {
            DistributionSpec::Normal { std, .. } => {
                if std < 0.0 {
                    return Err(invalid(kind, format!("std must be >= 0, got {std}")));
                }
            }
            DistributionSpec::Lognormal { mean, std } => {
                if mean <= 0.0 {
                    return Err(invalid(kind, format!("mean must be > 0, got {mean}")));
                }
                if std < 0.0 {
                    return Err(invalid(kind, format!("std must be >= 0, got {std}")));
                }
            }
            DistributionSpec::Triangular { min, mode, max } => {
                if min >= max {
                    return Err(invalid(kind, format!("min ({min}) must be < max ({max})")));
                }
                if mode < min || mode > max {
                    return Err(invalid(
                        kind,
                        format!("mode ({mode}) must lie within [{min}, {max}]"),
                    ));
                }
            }
            DistributionSpec::Uniform { min, max } => {
                if min >= max {
                    return Err(invalid(kind, format!("min ({min}) must be < max ({max})")));
                }
            }
            DistributionSpec::Weibull { scale, shape } => {
                if scale <= 0.0 || shape <= 0.0 {
                    return Err(invalid(
                        kind,
                        format!("scale ({scale}) and shape ({shape}) must be > 0"),
                    ));
                }
            }
            DistributionSpec::Exponential { rate } => {
                if rate <= 0.0 {
                    return Err(invalid(kind, format!("rate must be > 0, got {rate}")));
                }
            }
            DistributionSpec::Fixed { .. } => {}
        }
        Ok(())
    }

    /// Draw one value. Degenerate specs (fixed, zero spread) do not advance the RNG.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> WindFinanceResult<f64> {
        self.validate()?;
        let kind = self.kind();
        match *self {
            DistributionSpec::Fixed { value } => Ok(value),
            DistributionSpec::Normal { mean, std } => {
                if std == 0.0 {
                    return Ok(mean);
                }
                let n = Normal::new(mean, std).map_err(|e| param_error(kind, e))?;
                Ok(rng.sample(n))
            }
            DistributionSpec::Lognormal { mean, std } => {
                if std == 0.0 {
                    return Ok(mean);
                }
                let (mu, sigma) = lognormal_underlying(mean, std);
                let ln = LogNormal::new(mu, sigma).map_err(|e| param_error(kind, e))?;
                Ok(rng.sample(ln))
            }
            DistributionSpec::Triangular { min, mode, max } => {
                let t = Triangular::new(min, max, mode).map_err(|e| param_error(kind, e))?;
                Ok(rng.sample(t))
            }
            DistributionSpec::Uniform { min, max } => {
                let u = Uniform::new(min, max).map_err(|e| param_error(kind, e))?;
                Ok(rng.sample(u))
            }
            DistributionSpec::Weibull { scale, shape } => {
                let w = Weibull::new(shape, scale).map_err(|e| param_error(kind, e))?;
                Ok(rng.sample(w))
            }
            DistributionSpec::Exponential { rate } => {
                let x = Exp::new(rate).map_err(|e| param_error(kind, e))?;
                Ok(rng.sample(x))
            }
        }
    }
}

/// Convert the mean/std of a log-normal variable into the μ/σ of its log.
fn lognormal_underlying(mean: f64, std: f64) -> (f64, f64) {
    let sigma_sq = (1.0 + (std * std) / (mean * mean)).ln();
    let mu = mean.ln() - sigma_sq / 2.0;
    (mu, sigma_sq.sqrt())
}

// ---------------------------------------------------------------------------
// Percentiles
// ---------------------------------------------------------------------------

/// Percentile of a **sorted** slice using linear interpolation between order
/// statistics at position `p/100 * (n-1)`. Interpolation follows NumPy's
/// two-sided lerp so results are bit-identical to `numpy.percentile`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let frac = rank - lower as f64;
    let a = sorted[lower];
    let b = sorted[upper];
    let diff = b - a;
    if frac >= 0.5 {
        b - diff * (1.0 - frac)
    } else {
        a + diff * frac
    }
}

fn check_percentile(p: f64) -> WindFinanceResult<()> {
    if !(0.0..=100.0).contains(&p) {
        return Err(WindFinanceError::InvalidInput {
            field: "percentile".into(),
            reason: format!("{p} is outside [0, 100]"),
        });
    }
    Ok(())
}

/// Sort in place with a total order (NaN last).
pub fn sort_values(values: &mut [f64]) {
    values.sort_by(f64::total_cmp);
}

/// Compute the requested percentiles of an unsorted population.
pub fn percentiles(values: &[f64], targets: &[f64]) -> WindFinanceResult<Vec<PercentilePoint>> {
    if values.is_empty() {
        return Err(WindFinanceError::InsufficientData(
            "percentiles require at least one value".into(),
        ));
    }
    for &p in targets {
        check_percentile(p)?;
    }
    let mut sorted = values.to_vec();
    sort_values(&mut sorted);
    Ok(targets
        .iter()
        .map(|&p| PercentilePoint {
            percentile: p,
            value: percentile_sorted(&sorted, p),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Build a histogram with `num_bins` equal-width bins.
fn build_histogram(sorted: &[f64], num_bins: usize) -> Vec<HistogramBin> {
    let min_val = sorted[0];
    let max_val = sorted[sorted.len() - 1];

    if (max_val - min_val).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min_val,
            upper: max_val,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let bin_width = (max_val - min_val) / num_bins as f64;
    let n = sorted.len() as f64;

    let mut bins: Vec<HistogramBin> = (0..num_bins)
        .map(|i| {
            let lower = min_val + i as f64 * bin_width;
            let upper = if i == num_bins - 1 {
                max_val
            } else {
                min_val + (i + 1) as f64 * bin_width
            };
            HistogramBin {
                lower,
                upper,
                count: 0,
                frequency: 0.0,
            }
        })
        .collect();

    for &val in sorted {
        let idx = (((val - min_val) / bin_width).floor() as usize).min(num_bins - 1);
        bins[idx].count += 1;
    }

    for bin in &mut bins {
        bin.frequency = bin.count as f64 / n;
    }

    bins
}

/// Descriptive statistics of a population. The slice is sorted in place.
pub fn compute_statistics(
    values: &mut [f64],
    name: &str,
    targets: &[f64],
) -> WindFinanceResult<SampleStatistics> {
    if values.is_empty() {
        return Err(WindFinanceError::InsufficientData(format!(
            "no samples for {name}"
        )));
    }
    for &p in targets {
        check_percentile(p)?;
    }
    sort_values(values);
    let n = values.len() as f64;

    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let skewness = if std_dev > f64::EPSILON {
        values
            .iter()
            .map(|v| ((v - mean) / std_dev).powi(3))
            .sum::<f64>()
            / n
    } else {
        0.0
    };

    // Excess kurtosis (population)
    let kurtosis = if std_dev > f64::EPSILON {
        values
            .iter()
            .map(|v| ((v - mean) / std_dev).powi(4))
            .sum::<f64>()
            / n
            - 3.0
    } else {
        0.0
    };

    Ok(SampleStatistics {
        name: name.to_string(),
        count: values.len(),
        mean,
        median: percentile_sorted(values, 50.0),
        std_dev,
        min: values[0],
        max: values[values.len() - 1],
        percentiles: targets
            .iter()
            .map(|&p| PercentilePoint {
                percentile: p,
                value: percentile_sorted(values, p),
            })
            .collect(),
        skewness,
        kurtosis,
        histogram: build_histogram(values, 20),
    })
}

// ---------------------------------------------------------------------------
// Public API: stand-alone sampling
// ---------------------------------------------------------------------------

/// Sample a distribution `samples` times from a seeded RNG and summarise it.
pub fn sample_distribution(
    request: &SampleRequest,
) -> WindFinanceResult<ComputationOutput<SampleStatistics>> {
    let start = Instant::now();

    if request.samples == 0 {
        return Err(WindFinanceError::InvalidInput {
            field: "samples".into(),
            reason: "Must be at least 1".into(),
        });
    }
    request.distribution.validate()?;

    let mut rng = StdRng::seed_from_u64(request.seed);
    let mut values = Vec::with_capacity(request.samples as usize);
    for _ in 0..request.samples {
        values.push(request.distribution.sample(&mut rng)?);
    }
    let stats = compute_statistics(
        &mut values,
        request.distribution.kind(),
        &request.percentiles,
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Seeded distribution sampling (StdRng / ChaCha12)",
        request,
        Vec::new(),
        elapsed,
        stats,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
