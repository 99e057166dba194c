use crate::error::WindFinanceError;
use crate::WindFinanceResult;

const CONVERGENCE_THRESHOLD: f64 = 1e-7;
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Payback sentinel for cashflows that never recover the investment.
pub const NEVER_PAID_BACK: f64 = 999.0;

/// Net Present Value of a series of cash flows (first flow undiscounted).
pub fn npv(rate: f64, cash_flows: &[f64]) -> WindFinanceResult<f64> {
    if rate <= -1.0 {
        return Err(WindFinanceError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0_f64;
    let mut result = 0.0_f64;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount == 0.0 || !discount.is_finite() {
            return Err(WindFinanceError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

fn npv_and_derivative(rate: f64, cash_flows: &[f64]) -> (f64, f64) {
    let one_plus_r = 1.0 + rate;
    let mut discount = 1.0_f64;
    let mut value = 0.0;
    let mut dvalue = 0.0;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        value += cf / discount;
        if t > 0 {
            dvalue -= t as f64 * cf / (discount * one_plus_r);
        }
    }
    (value, dvalue)
}

/// Internal Rate of Return using Newton-Raphson, falling back to bisection
/// on [-0.99, 10] when Newton wanders off.
pub fn irr(cash_flows: &[f64], guess: f64) -> WindFinanceResult<f64> {
    if cash_flows.len() < 2 {
        return Err(WindFinanceError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }
    let has_positive = cash_flows.iter().any(|cf| *cf > 0.0);
    let has_negative = cash_flows.iter().any(|cf| *cf < 0.0);
    if !(has_positive && has_negative) {
        return Err(WindFinanceError::InsufficientData(
            "IRR requires both positive and negative cash flows".into(),
        ));
    }

    let mut rate = guess;
    for _ in 0..MAX_IRR_ITERATIONS {
        let (value, dvalue) = npv_and_derivative(rate, cash_flows);
        if !value.is_finite() {
            break;
        }
        if value.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }
        if dvalue == 0.0 {
            break;
        }
        rate -= value / dvalue;

        // Guard against divergence
        if rate <= -0.99 || rate > 100.0 || !rate.is_finite() {
            break;
        }
    }

    bisect_irr(cash_flows)
}

fn bisect_irr(cash_flows: &[f64]) -> WindFinanceResult<f64> {
    let mut low = -0.99_f64;
    let mut high = 10.0_f64;
    let (mut f_low, _) = npv_and_derivative(low, cash_flows);
    let (f_high, _) = npv_and_derivative(high, cash_flows);

    if f_low.signum() == f_high.signum() {
        return Err(WindFinanceError::ConvergenceFailure {
            function: "IRR".into(),
            iterations: MAX_IRR_ITERATIONS,
            last_delta: f_low,
        });
    }

    let mut mid = low;
    let mut f_mid = f_low;
    for _ in 0..MAX_BISECTION_ITERATIONS {
        mid = 0.5 * (low + high);
        f_mid = npv_and_derivative(mid, cash_flows).0;
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (high - low) < 1e-12 {
            return Ok(mid);
        }
        if f_mid.signum() == f_low.signum() {
            low = mid;
            f_low = f_mid;
        } else {
            high = mid;
        }
    }

    if f_mid.abs() < 1e-3 {
        Ok(mid)
    } else {
        Err(WindFinanceError::ConvergenceFailure {
            function: "IRR".into(),
            iterations: MAX_IRR_ITERATIONS + MAX_BISECTION_ITERATIONS,
            last_delta: f_mid,
        })
    }
}

/// Level annual payment repaying `principal` over `nper` periods at `rate`.
/// Returned as a positive amount.
pub fn pmt(rate: f64, nper: u32, principal: f64) -> WindFinanceResult<f64> {
    if nper == 0 {
        return Err(WindFinanceError::InvalidInput {
            field: "nper".into(),
            reason: "Number of periods must be > 0".into(),
        });
    }

    if rate == 0.0 {
        return Ok(principal / nper as f64);
    }

    let factor = (1.0 + rate).powi(nper as i32);
    let annuity_factor = (factor - 1.0) / rate;
    if annuity_factor == 0.0 {
        return Err(WindFinanceError::DivisionByZero {
            context: "PMT annuity factor".into(),
        });
    }

    Ok(principal * factor / annuity_factor)
}

/// Years from the first flow until cumulative cash turns non-negative,
/// interpolated within the recovering year. Flows before the first negative
/// cumulative balance count as year 0.
pub fn payback_period(cash_flows: &[f64]) -> f64 {
    let mut cumulative = 0.0_f64;
    let mut invested = false;
    for (i, cf) in cash_flows.iter().enumerate() {
        let prev = cumulative;
        cumulative += cf;
        if cumulative < 0.0 {
            invested = true;
            continue;
        }
        if invested {
            let fraction = if *cf > 0.0 { -prev / cf } else { 0.0 };
            return (i as f64 - 1.0) + fraction;
        }
    }
    if invested {
        NEVER_PAID_BACK
    } else {
        0.0
    }
}
