use serde::{Deserialize, Serialize};

use super::{check_finite, check_non_negative, check_percent};
use crate::error::WindFinanceError;
use crate::time_value::pmt;
use crate::types::{AnnualSeries, AnnualValue, Percent};
use crate::WindFinanceResult;

const MODULE: &str = "financing";

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Capital structure model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinancingModel {
    /// Debt sized from a debt-to-equity ratio on the sponsor's balance sheet
    #[default]
    #[serde(rename = "Balance-Sheet")]
    BalanceSheet,
    /// Non-recourse debt sized as a share of capex
    #[serde(rename = "Project-Finance")]
    ProjectFinance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingSettings {
    #[serde(default)]
    pub model: FinancingModel,
    pub capex: f64,
    #[serde(default)]
    pub devex: f64,
    /// D/E ratio (1.5 = 60% debt). Balance-Sheet only.
    #[serde(default)]
    pub debt_to_equity_ratio: f64,
    /// Debt as % of capex + devex. Project-Finance only.
    #[serde(default)]
    pub debt_to_capex_ratio: Percent,
    #[serde(default, rename = "loanInterestRateBS")]
    pub loan_interest_rate_bs: Percent,
    #[serde(default, rename = "loanInterestRateFP")]
    pub loan_interest_rate_pf: Percent,
    /// DSCR covenant
    #[serde(default = "default_minimum_dscr", rename = "minimumDSCR")]
    pub minimum_dscr: f64,
    /// Equity discount rate (%) for NPV
    #[serde(default = "default_cost_of_equity")]
    pub cost_of_equity: Percent,
}

fn default_minimum_dscr() -> f64 {
    1.3
}

fn default_cost_of_equity() -> Percent {
    8.0
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingYear {
    pub year: i32,
    pub debt_drawdown: f64,
    pub equity_drawdown: f64,
    pub opening_balance: f64,
    pub interest: f64,
    pub principal: f64,
    pub debt_service: f64,
    pub closing_balance: f64,
}

/// Deterministic funding and debt schedule from the first construction year
/// to the end of project life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingSchedule {
    pub model: FinancingModel,
    pub total_investment: f64,
    pub debt_amount: f64,
    pub equity_amount: f64,
    /// Loan rate as a decimal
    pub interest_rate: f64,
    pub annual_debt_service: f64,
    pub loan_duration: u32,
    pub years: Vec<FinancingYear>,
}

impl FinancingSchedule {
    pub fn has_debt(&self) -> bool {
        self.debt_amount > 0.0
    }

    pub fn year(&self, year: i32) -> Option<&FinancingYear> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn debt_service(&self) -> AnnualSeries {
        self.years
            .iter()
            .map(|y| AnnualValue {
                year: y.year,
                value: y.debt_service,
            })
            .collect()
    }

}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

impl FinancingSettings {
    pub fn validate(&self) -> WindFinanceResult<()> {
        check_non_negative(MODULE, "capex", self.capex)?;
        check_non_negative(MODULE, "devex", self.devex)?;
        if self.capex + self.devex <= 0.0 {
            return Err(WindFinanceError::module_param(
                MODULE,
                "capex",
                self.capex,
                "capex + devex must be positive",
            ));
        }
        match self.model {
            FinancingModel::BalanceSheet => {
                check_non_negative(MODULE, "debtToEquityRatio", self.debt_to_equity_ratio)?;
                check_percent(MODULE, "loanInterestRateBS", self.loan_interest_rate_bs)?;
            }
            FinancingModel::ProjectFinance => {
                check_percent(MODULE, "debtToCapexRatio", self.debt_to_capex_ratio)?;
                check_percent(MODULE, "loanInterestRateFP", self.loan_interest_rate_pf)?;
            }
        }
        check_finite(MODULE, "minimumDSCR", self.minimum_dscr)?;
        if self.minimum_dscr < 1.0 {
            return Err(WindFinanceError::module_param(
                MODULE,
                "minimumDSCR",
                self.minimum_dscr,
                "must be at least 1.0",
            ));
        }
        check_finite(MODULE, "costOfEquity", self.cost_of_equity)?;
        if self.cost_of_equity <= -100.0 {
            return Err(WindFinanceError::module_param(
                MODULE,
                "costOfEquity",
                self.cost_of_equity,
                "must be greater than -100",
            ));
        }
        Ok(())
    }

    pub fn total_investment(&self) -> f64 {
        self.capex + self.devex
    }

    /// Fraction of the investment funded by debt.
    pub fn debt_share(&self) -> f64 {
        match self.model {
            FinancingModel::BalanceSheet => {
                self.debt_to_equity_ratio / (1.0 + self.debt_to_equity_ratio)
            }
            FinancingModel::ProjectFinance => self.debt_to_capex_ratio / 100.0,
        }
    }

    /// Loan rate for the selected model, as a decimal.
    pub fn interest_rate(&self) -> f64 {
        match self.model {
            FinancingModel::BalanceSheet => self.loan_interest_rate_bs / 100.0,
            FinancingModel::ProjectFinance => self.loan_interest_rate_pf / 100.0,
        }
    }
}

/// Check the loan tenor against the project timeline.
pub fn validate_loan_duration(loan_duration: u32, project_life: u32) -> WindFinanceResult<()> {
    if loan_duration == 0 {
        return Err(WindFinanceError::module_param(
            MODULE,
            "loanDuration",
            loan_duration,
            "must be at least 1 year",
        ));
    }
    if loan_duration > project_life {
        return Err(WindFinanceError::module_param(
            MODULE,
            "loanDuration",
            loan_duration,
            "cannot exceed projectLife",
        ));
    }
    Ok(())
}

/// Build the funding and annuity debt schedule.
///
/// Investment is drawn evenly over years `-construction_years+1..=0` (year 0
/// alone when there is no construction period); debt is repaid as a level
/// annuity over years `1..=loan_duration`.
pub fn build_schedule(
    settings: &FinancingSettings,
    construction_years: u32,
    loan_duration: u32,
    project_life: u32,
) -> WindFinanceResult<FinancingSchedule> {
    let total_investment = settings.total_investment();
    let debt_amount = total_investment * settings.debt_share();
    let equity_amount = total_investment - debt_amount;
    let rate = settings.interest_rate();
    let annual_debt_service = if debt_amount > 0.0 {
        pmt(rate, loan_duration, debt_amount)?
    } else {
        0.0
    };

    let draw_years = construction_years.max(1);
    let first_year = 1 - draw_years as i32;
    let mut years = Vec::with_capacity((draw_years + project_life) as usize);
    let mut balance = 0.0_f64;

    for year in first_year..=project_life as i32 {
        let (debt_drawdown, equity_drawdown) = if year <= 0 {
            (
                debt_amount / draw_years as f64,
                equity_amount / draw_years as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let opening_balance = balance;
        let in_term = year >= 1 && year <= loan_duration as i32;
        let (interest, principal) = if in_term && opening_balance > 0.0 {
            let interest = opening_balance * rate;
            // Last instalment clears rounding residue.
            let principal = if year == loan_duration as i32 {
                opening_balance
            } else {
                (annual_debt_service - interest).min(opening_balance)
            };
            (interest, principal)
        } else {
            (0.0, 0.0)
        };

        balance = opening_balance + debt_drawdown - principal;
        years.push(FinancingYear {
            year,
            debt_drawdown,
            equity_drawdown,
            opening_balance,
            interest,
            principal,
            debt_service: interest + principal,
            closing_balance: balance,
        });
    }

    Ok(FinancingSchedule {
        model: settings.model,
        total_investment,
        debt_amount,
        equity_amount,
        interest_rate: rate,
        annual_debt_service,
        loan_duration,
        years,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
