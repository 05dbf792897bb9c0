use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::Multiple;
use crate::ValuationResult;

use super::multiples::{CcaTarget, MultipleType};
use super::peers::{PeerField, ValidatedPeerSet};

/// Minimum complete peers for any regression. Below this the engine reports
/// a structured failure; it never substitutes a median.
const MIN_REGRESSION_PEERS: usize = 3;

/// Request to regression-adjust one multiple against peer fundamentals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionSpec {
    /// The multiple being explained (e.g. EV/EBITDA).
    pub metric: MultipleType,
    /// Explanatory fundamentals (growth, ROIC, margin).
    pub explanatory: Vec<PeerField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionCoefficient {
    pub variable: String,
    pub value: Decimal,
}

/// OLS fit of a peer multiple against fundamentals, with the multiple
/// predicted at the target's own fundamentals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionAdjustment {
    pub metric: MultipleType,
    pub intercept: Decimal,
    pub coefficients: Vec<RegressionCoefficient>,
    pub r_squared: Decimal,
    pub peers_used: usize,
    pub predicted_multiple: Multiple,
}

/// Fit `metric = a + b1*x1 + ... + bk*xk` over the validated peer set by
/// ordinary least squares (normal equations, Gaussian elimination with
/// partial pivoting) and predict the target's multiple from its own
/// fundamentals.
pub fn regression_adjusted(
    peers: &ValidatedPeerSet,
    metric: MultipleType,
    explanatory: &[PeerField],
    target: &CcaTarget,
) -> ValuationResult<RegressionAdjustment> {
    if explanatory.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "explanatory".into(),
            reason: "At least one explanatory variable is required".into(),
        });
    }
    for field in explanatory {
        if field.is_multiple() {
            return Err(ValuationError::InvalidInput {
                field: format!("explanatory:{field}"),
                reason: "Explanatory variables must be fundamentals, not multiples".into(),
            });
        }
    }
    for window in explanatory.windows(2) {
        if explanatory.iter().filter(|f| **f == window[0]).count() > 1 {
            return Err(ValuationError::InvalidInput {
                field: format!("explanatory:{}", window[0]),
                reason: "Duplicate explanatory variable".into(),
            });
        }
    }

    let metric_field = metric.peer_field();
    if !peers.requires(metric_field) {
        return Err(ValuationError::InvalidInput {
            field: format!("metric:{metric}"),
            reason: "Peer set was not screened for this multiple".into(),
        });
    }
    for field in explanatory {
        if !peers.requires(*field) {
            return Err(ValuationError::InvalidInput {
                field: format!("explanatory:{field}"),
                reason: "Peer set was not screened for this fundamental".into(),
            });
        }
    }

    let n = peers.len();
    let k = explanatory.len();
    if n < MIN_REGRESSION_PEERS || n < k + 2 {
        return Err(ValuationError::InsufficientData {
            reason: format!(
                "Regression on {k} variable(s) needs at least {} complete peers, got {n}",
                MIN_REGRESSION_PEERS.max(k + 2)
            ),
            exclusions: peers.exclusions().to_vec(),
        });
    }

    // Design matrix rows [1, x1, ..., xk] and response vector
    let mut rows: Vec<Vec<Decimal>> = Vec::with_capacity(n);
    let mut y: Vec<Decimal> = Vec::with_capacity(n);
    for peer in peers.peers() {
        let mut row = Vec::with_capacity(k + 1);
        row.push(Decimal::ONE);
        for field in explanatory {
            row.push(peers.field_value(peer, *field));
        }
        rows.push(row);
        y.push(peers.field_value(peer, metric_field));
    }

    // Normal equations: (X'X) beta = X'y
    let dim = k + 1;
    let mut xtx = vec![vec![Decimal::ZERO; dim]; dim];
    let mut xty = vec![Decimal::ZERO; dim];
    for (row, yi) in rows.iter().zip(y.iter()) {
        for i in 0..dim {
            xty[i] += row[i] * yi;
            for j in 0..dim {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let beta = solve_linear_system(xtx, xty)?;

    // Fit statistics
    let n_dec = Decimal::from(n as u32);
    let y_mean = y.iter().copied().sum::<Decimal>() / n_dec;
    let mut ss_res = Decimal::ZERO;
    let mut ss_tot = Decimal::ZERO;
    for (row, yi) in rows.iter().zip(y.iter()) {
        let fitted: Decimal = row.iter().zip(beta.iter()).map(|(x, b)| x * b).sum();
        let residual = yi - fitted;
        ss_res += residual * residual;
        let dev = yi - y_mean;
        ss_tot += dev * dev;
    }
    let r_squared = if ss_tot.is_zero() {
        Decimal::ZERO
    } else {
        (Decimal::ONE - ss_res / ss_tot).clamp(Decimal::ZERO, Decimal::ONE)
    };

    // Predict the target's multiple from its own fundamentals
    let mut predicted = beta[0];
    let mut coefficients = Vec::with_capacity(k);
    for (idx, field) in explanatory.iter().enumerate() {
        let coeff = beta[idx + 1];
        predicted += coeff * target_fundamental(target, *field)?;
        coefficients.push(RegressionCoefficient {
            variable: field.to_string(),
            value: coeff,
        });
    }

    Ok(RegressionAdjustment {
        metric,
        intercept: beta[0],
        coefficients,
        r_squared,
        peers_used: n,
        predicted_multiple: predicted,
    })
}

fn target_fundamental(target: &CcaTarget, field: PeerField) -> ValuationResult<Decimal> {
    match field {
        PeerField::RevenueGrowth => Ok(target.revenue_growth),
        PeerField::Roic => Ok(target.roic),
        PeerField::EbitdaMargin => Ok(target.ebitda_margin),
        other => Err(ValuationError::InvalidInput {
            field: format!("explanatory:{other}"),
            reason: "Target carries no value for this variable".into(),
        }),
    }
}

/// Solve A x = b by Gaussian elimination with partial pivoting.
fn solve_linear_system(
    mut a: Vec<Vec<Decimal>>,
    mut b: Vec<Decimal>,
) -> ValuationResult<Vec<Decimal>> {
    let dim = b.len();
    let pivot_floor = dec!(0.0000000000001);

    for col in 0..dim {
        // Partial pivot
        let mut pivot_row = col;
        for row in (col + 1)..dim {
            if a[row][col].abs() > a[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        if a[pivot_row][col].abs() < pivot_floor {
            return Err(ValuationError::NumericalFailure {
                function: "regression_adjusted (singular normal equations)".into(),
                attempts: col as u32,
                last_delta: a[pivot_row][col],
            });
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..dim {
            let factor = a[row][col] / a[col][col];
            for j in col..dim {
                let scaled = factor * a[col][j];
                a[row][j] -= scaled;
            }
            let scaled_b = factor * b[col];
            b[row] -= scaled_b;
        }
    }

    // Back substitution
    let mut x = vec![Decimal::ZERO; dim];
    for col in (0..dim).rev() {
        let mut sum = b[col];
        for j in (col + 1)..dim {
            sum -= a[col][j] * x[j];
        }
        x[col] = sum / a[col][col];
    }
    Ok(x)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
