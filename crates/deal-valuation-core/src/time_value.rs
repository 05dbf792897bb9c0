use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::ValuationResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Rate ladder scanned when bisection needs a bracketing interval.
/// Bounded at -99% and +1000%.
const BISECTION_LADDER: [Decimal; 11] = [
    dec!(-0.99),
    dec!(-0.90),
    dec!(-0.50),
    dec!(-0.20),
    dec!(0),
    dec!(0.10),
    dec!(0.25),
    dec!(0.50),
    dec!(1.0),
    dec!(5.0),
    dec!(10.0),
];

/// Net Present Value of a series of cash flows
pub fn npv(rate: Rate, cash_flows: &[Money]) -> ValuationResult<Money> {
    if rate <= dec!(-1) {
        return Err(ValuationError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount *= one_plus_r;
        }
        if discount.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        result += cf / discount;
    }

    Ok(result)
}

/// Count sign changes across the ordered non-zero cash flows.
pub fn sign_changes(cash_flows: &[Money]) -> usize {
    let mut changes = 0;
    let mut prev_sign: Option<bool> = None;
    for cf in cash_flows {
        if cf.is_zero() {
            continue;
        }
        let positive = cf.is_sign_positive();
        if let Some(prev) = prev_sign {
            if prev != positive {
                changes += 1;
            }
        }
        prev_sign = Some(positive);
    }
    changes
}

/// Internal Rate of Return using Newton-Raphson from a single starting guess.
pub fn newton_irr(cash_flows: &[Money], guess: Rate) -> ValuationResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(ValuationError::insufficient(
            "IRR requires at least 2 cash flows",
        ));
    }

    let mut rate = guess;

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;
        let one_plus_r = Decimal::ONE + rate;

        for (t, cf) in cash_flows.iter().enumerate() {
            let t_dec = Decimal::from(t as i64);
            let discount = one_plus_r.powd(t_dec);
            if discount.is_zero() {
                continue;
            }
            npv_val += cf / discount;
            if t > 0 {
                dnpv -= t_dec * cf / (one_plus_r.powd(t_dec + Decimal::ONE));
            }
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(ValuationError::NumericalFailure {
                function: "newton_irr".into(),
                attempts: i,
                last_delta: npv_val,
            });
        }

        rate -= npv_val / dnpv;

        // Guard against divergence
        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(ValuationError::NumericalFailure {
        function: "newton_irr".into(),
        attempts: MAX_IRR_ITERATIONS,
        last_delta: npv(rate, cash_flows).unwrap_or(Decimal::MAX),
    })
}

/// Bisection IRR over an interval with a confirmed NPV sign change.
/// Scans `BISECTION_LADDER` for a bracketing pair, then halves until the
/// NPV at the midpoint is within tolerance.
pub fn bisection_irr(cash_flows: &[Money], tolerance: Decimal) -> ValuationResult<Rate> {
    let mut bracket: Option<(Rate, Rate, Money, Money)> = None;
    let mut prev: Option<(Rate, Money)> = None;

    for &r in BISECTION_LADDER.iter() {
        let f = npv(r, cash_flows)?;
        if f.abs() < tolerance {
            return Ok(r);
        }
        if let Some((pr, pf)) = prev {
            if (pf.is_sign_positive() && f.is_sign_negative())
                || (pf.is_sign_negative() && f.is_sign_positive())
            {
                bracket = Some((pr, r, pf, f));
                break;
            }
        }
        prev = Some((r, f));
    }

    let (mut lo, mut hi, mut f_lo, _f_hi) = bracket.ok_or(ValuationError::NumericalFailure {
        function: "bisection_irr (no bracketing interval)".into(),
        attempts: BISECTION_LADDER.len() as u32,
        last_delta: prev.map(|(_, f)| f).unwrap_or(Decimal::MAX),
    })?;

    let mut mid = (lo + hi) / dec!(2);
    for _ in 0..MAX_BISECTION_ITERATIONS {
        mid = (lo + hi) / dec!(2);
        let f_mid = npv(mid, cash_flows)?;

        if f_mid.abs() < tolerance || (hi - lo).abs() < dec!(0.0000000001) {
            return Ok(mid);
        }

        if f_lo.is_sign_positive() == f_mid.is_sign_positive() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(ValuationError::NumericalFailure {
        function: "bisection_irr".into(),
        attempts: MAX_BISECTION_ITERATIONS,
        last_delta: npv(mid, cash_flows).unwrap_or(Decimal::MAX),
    })
}

/// Modified IRR: negative flows discounted to present at the finance rate,
/// positive flows compounded to the final period at the reinvestment rate.
pub fn mirr(cash_flows: &[Money], finance_rate: Rate, reinvestment_rate: Rate) -> ValuationResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(ValuationError::insufficient(
            "MIRR requires at least 2 cash flows",
        ));
    }

    let n = Decimal::from((cash_flows.len() - 1) as i64);
    let mut fv_positive = Decimal::ZERO;
    let mut pv_negative = Decimal::ZERO;

    for (t, cf) in cash_flows.iter().enumerate() {
        let t_dec = Decimal::from(t as i64);
        if cf.is_sign_positive() && !cf.is_zero() {
            fv_positive += cf * (Decimal::ONE + reinvestment_rate).powd(n - t_dec);
        } else if cf.is_sign_negative() {
            pv_negative += cf.abs() / (Decimal::ONE + finance_rate).powd(t_dec);
        }
    }

    if pv_negative.is_zero() {
        return Err(ValuationError::InvalidInput {
            field: "cash_flows".into(),
            reason: "MIRR requires at least one negative cash flow".into(),
        });
    }
    if fv_positive.is_zero() {
        return Err(ValuationError::InvalidInput {
            field: "cash_flows".into(),
            reason: "MIRR requires at least one positive cash flow".into(),
        });
    }

    let ratio = fv_positive / pv_negative;
    Ok(ratio.powd(Decimal::ONE / n) - Decimal::ONE)
}

/// Geometric holding-period return over the first and last non-zero flows:
/// (|cf_last| / |cf_first|)^(1/periods) - 1. Used when a cash-flow series
/// has no sign change and root-finding is ill-posed.
pub fn geometric_holding_return(cash_flows: &[Money]) -> ValuationResult<Rate> {
    let first = cash_flows
        .iter()
        .position(|cf| !cf.is_zero())
        .ok_or_else(|| ValuationError::insufficient("All cash flows are zero"))?;
    let last = cash_flows
        .iter()
        .rposition(|cf| !cf.is_zero())
        .ok_or_else(|| ValuationError::insufficient("All cash flows are zero"))?;

    if last == first {
        return Err(ValuationError::insufficient(
            "Holding-period return requires at least two non-zero cash flows",
        ));
    }

    let periods = Decimal::from((last - first) as i64);
    let ratio = cash_flows[last].abs() / cash_flows[first].abs();
    Ok(ratio.powd(Decimal::ONE / periods) - Decimal::ONE)
}

/// Extended IRR for irregular cash flow dates using Newton-Raphson
pub fn xirr(dated_flows: &[(NaiveDate, Money)], guess: Rate) -> ValuationResult<Rate> {
    if dated_flows.len() < 2 {
        return Err(ValuationError::insufficient(
            "XIRR requires at least 2 cash flows",
        ));
    }

    let base_date = dated_flows[0].0;
    let mut rate = guess;

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;

        for (date, amount) in dated_flows {
            let days = (*date - base_date).num_days();
            let years = Decimal::from(days) / dec!(365.25);
            let one_plus_r = Decimal::ONE + rate;

            if one_plus_r <= Decimal::ZERO {
                return Err(ValuationError::NumericalFailure {
                    function: "xirr".into(),
                    attempts: i,
                    last_delta: npv_val,
                });
            }

            let discount = one_plus_r.powd(years);
            if discount.is_zero() {
                continue;
            }

            npv_val += amount / discount;
            dnpv -= years * amount / (one_plus_r * discount);
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(ValuationError::NumericalFailure {
                function: "xirr".into(),
                attempts: i,
                last_delta: npv_val,
            });
        }

        rate -= npv_val / dnpv;

        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(ValuationError::NumericalFailure {
        function: "xirr".into(),
        attempts: MAX_IRR_ITERATIONS,
        last_delta: Decimal::ZERO,
    })
}

// ---------------------------------------------------------------------------
// IRR fallback cascade
// ---------------------------------------------------------------------------

/// The method that ultimately produced an IRR figure. Reported so that
/// downstream consumers can assess confidence in the number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrrMethod {
    NewtonRaphson,
    Bisection,
    Mirr,
    GeometricHoldingPeriod,
}

impl std::fmt::Display for IrrMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrrMethod::NewtonRaphson => write!(f, "Newton-Raphson"),
            IrrMethod::Bisection => write!(f, "Bisection"),
            IrrMethod::Mirr => write!(f, "Modified IRR"),
            IrrMethod::GeometricHoldingPeriod => write!(f, "Geometric holding-period return"),
        }
    }
}

/// Tunables for the IRR cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrConfig {
    /// Distinct Newton-Raphson starting guesses, tried in order.
    pub initial_guesses: Vec<Rate>,
    /// Financing rate applied to negative flows in MIRR.
    pub finance_rate: Rate,
    /// Reinvestment rate applied to positive flows in MIRR.
    pub reinvestment_rate: Rate,
    /// |NPV| acceptance tolerance for a root.
    pub tolerance: Decimal,
}

impl Default for IrrConfig {
    fn default() -> Self {
        IrrConfig {
            initial_guesses: vec![
                dec!(0.05),
                dec!(0.10),
                dec!(0.15),
                dec!(0.20),
                dec!(0.30),
                dec!(0.50),
            ],
            finance_rate: dec!(0.08),
            reinvestment_rate: dec!(0.08),
            tolerance: dec!(0.000001),
        }
    }
}

/// Outcome of the IRR cascade: the rate, the method that produced it, the
/// residual NPV at that rate, and a log of every fallback transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrResolution {
    pub rate: Rate,
    pub method: IrrMethod,
    pub npv_at_rate: Money,
    pub method_log: Vec<String>,
}

/// Resolve an IRR through the validated fallback cascade:
///
/// 1. Zero sign changes: geometric holding-period return (root-finding is
///    ill-posed).
/// 2. Multiple sign changes: possible multiple roots; MIRR for stability.
/// 3. One sign change: Newton-Raphson from each configured starting guess;
///    accept the convergent root with the smallest |NPV| within tolerance.
/// 4. Newton exhausted: bisection over a bracketing interval.
/// 5. Still unresolved: MIRR.
///
/// Every transition is recorded in the resolution's method log.
pub fn resolve_irr(cash_flows: &[Money], config: &IrrConfig) -> ValuationResult<IrrResolution> {
    if cash_flows.len() < 2 {
        return Err(ValuationError::insufficient(
            "IRR requires at least 2 cash flows",
        ));
    }
    if config.initial_guesses.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "initial_guesses".into(),
            reason: "At least one Newton-Raphson starting guess is required".into(),
        });
    }

    let mut log: Vec<String> = Vec::new();
    let changes = sign_changes(cash_flows);

    if changes == 0 {
        log.push(
            "No sign change in cash flows: IRR root-finding is ill-posed; \
             reporting geometric holding-period return instead"
                .into(),
        );
        let rate = geometric_holding_return(cash_flows)?;
        let npv_at_rate = npv(rate, cash_flows)?;
        return Ok(IrrResolution {
            rate,
            method: IrrMethod::GeometricHoldingPeriod,
            npv_at_rate,
            method_log: log,
        });
    }

    if changes > 1 {
        log.push(format!(
            "{changes} sign changes in cash flows: multiple IRR roots possible; \
             using Modified IRR (finance {}, reinvestment {})",
            config.finance_rate, config.reinvestment_rate
        ));
        let rate = mirr(cash_flows, config.finance_rate, config.reinvestment_rate)?;
        let npv_at_rate = npv(rate, cash_flows)?;
        return Ok(IrrResolution {
            rate,
            method: IrrMethod::Mirr,
            npv_at_rate,
            method_log: log,
        });
    }

    // One sign change: Newton-Raphson from each starting guess, keeping the
    // root whose NPV is closest to zero.
    let mut best: Option<(Rate, Money, Rate)> = None; // (rate, npv, guess)
    let mut failed_guesses = 0u32;

    for &guess in &config.initial_guesses {
        match newton_irr(cash_flows, guess) {
            Ok(rate) => {
                let residual = npv(rate, cash_flows)?;
                let better = match &best {
                    Some((_, best_npv, _)) => residual.abs() < best_npv.abs(),
                    None => true,
                };
                if better {
                    best = Some((rate, residual, guess));
                }
            }
            Err(_) => failed_guesses += 1,
        }
    }

    if let Some((rate, residual, guess)) = best {
        if residual.abs() <= config.tolerance {
            log.push(format!(
                "Newton-Raphson converged from guess {guess} with residual NPV {residual}"
            ));
            return Ok(IrrResolution {
                rate,
                method: IrrMethod::NewtonRaphson,
                npv_at_rate: residual,
                method_log: log,
            });
        }
        log.push(format!(
            "Best Newton-Raphson root (from guess {guess}) left residual NPV {residual} \
             outside tolerance {}; falling back to bisection",
            config.tolerance
        ));
    } else {
        log.push(format!(
            "Newton-Raphson failed to converge from all {failed_guesses} starting guesses; \
             falling back to bisection"
        ));
    }

    match bisection_irr(cash_flows, config.tolerance) {
        Ok(rate) => {
            let npv_at_rate = npv(rate, cash_flows)?;
            log.push(format!("Bisection converged at rate {rate}"));
            Ok(IrrResolution {
                rate,
                method: IrrMethod::Bisection,
                npv_at_rate,
                method_log: log,
            })
        }
        Err(e) => {
            log.push(format!("Bisection failed ({e}); falling back to Modified IRR"));
            let rate = mirr(cash_flows, config.finance_rate, config.reinvestment_rate)?;
            let npv_at_rate = npv(rate, cash_flows)?;
            Ok(IrrResolution {
                rate,
                method: IrrMethod::Mirr,
                npv_at_rate,
                method_log: log,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
