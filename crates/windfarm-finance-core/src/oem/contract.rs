use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::WindFinanceError;
use crate::types::Money;
use crate::WindFinanceResult;

/// A time-bounded OEM service agreement.
///
/// `years` is authoritative; `start_year` / `end_year` are kept for older
/// documents and are always re-derived by [`OemContract::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OemContract {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub years: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<u32>,
    pub fixed_fee: Money,
    #[serde(default)]
    pub is_per_turbine: bool,
    /// Id of the referenced [`OemScope`](super::scope::OemScope).
    pub oem_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl OemContract {
    /// Sort and de-duplicate `years`, derive the legacy bounds, or expand the
    /// bounds into `years` when only those were supplied.
    pub fn normalize(mut self) -> WindFinanceResult<Self> {
        if self.years.is_empty() {
            match (self.start_year, self.end_year) {
                (Some(start), Some(end)) if start <= end => {
                    self.years = (start..=end).collect();
                }
                (Some(start), Some(end)) => {
                    return Err(WindFinanceError::InvalidInput {
                        field: format!("oemContract[{}].startYear", self.id),
                        reason: format!("startYear ({start}) is after endYear ({end})"),
                    });
                }
                _ => {
                    return Err(WindFinanceError::InvalidInput {
                        field: format!("oemContract[{}].years", self.id),
                        reason: "contract must cover at least one year".into(),
                    });
                }
            }
        }

        self.years.sort_unstable();
        self.years.dedup();

        if self.years.first() == Some(&0) {
            return Err(WindFinanceError::InvalidInput {
                field: format!("oemContract[{}].years", self.id),
                reason: "contract years are 1-based operating years".into(),
            });
        }
        if self.fixed_fee < Decimal::ZERO {
            return Err(WindFinanceError::InvalidInput {
                field: format!("oemContract[{}].fixedFee", self.id),
                reason: format!("fee cannot be negative, got {}", self.fixed_fee),
            });
        }

        self.start_year = self.years.first().copied();
        self.end_year = self.years.last().copied();
        Ok(self)
    }

    pub fn is_active(&self, year: u32) -> bool {
        self.years.binary_search(&year).is_ok()
    }

    /// Fee charged for one contract year across the farm.
    pub fn annual_fee(&self, num_wtgs: u32) -> Money {
        if self.is_per_turbine {
            self.fixed_fee * Decimal::from(num_wtgs)
        } else {
            self.fixed_fee
        }
    }
}
