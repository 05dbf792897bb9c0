use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::ValuationResult;

// Altman Z'-Score coefficients (private companies)
const ZP_COEFF_X1: Decimal = dec!(0.717);
const ZP_COEFF_X2: Decimal = dec!(0.847);
const ZP_COEFF_X3: Decimal = dec!(3.107);
const ZP_COEFF_X4: Decimal = dec!(0.420);
const ZP_COEFF_X5: Decimal = dec!(0.998);

// Z' zone thresholds
const ZP_SAFE: Decimal = dec!(2.90);
const ZP_DISTRESS: Decimal = dec!(1.23);

// Zmijewski probit coefficients (logistic-mapped)
const ZM_INTERCEPT: Decimal = dec!(-4.336);
const ZM_ROA: Decimal = dec!(-4.513);
const ZM_LEVERAGE: Decimal = dec!(5.679);

/// Balance-sheet and income lines a distress score is computed from.
/// For scenario projections these come from one scenario's own terminal
/// balance sheet, never a shared baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistressInput {
    pub working_capital: Money,
    pub total_assets: Money,
    pub retained_earnings: Money,
    pub ebit: Money,
    pub revenue: Money,
    pub total_liabilities: Money,
    pub book_equity: Money,
    pub net_income: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistressZone {
    Safe,
    Grey,
    Distress,
}

impl std::fmt::Display for DistressZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Grey => write!(f, "Grey Zone"),
            Self::Distress => write!(f, "Distress"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreComponent {
    pub name: String,
    pub ratio: Decimal,
    pub coefficient: Decimal,
    pub weighted_value: Decimal,
}

/// Both distress indices: the Altman Z' linear score (higher = healthier)
/// and a Zmijewski-style logistic bankruptcy probability (higher = more
/// distressed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistressScores {
    pub z_prime_score: Decimal,
    pub zone: DistressZone,
    pub components: Vec<ZScoreComponent>,
    pub bankruptcy_probability: Rate,
}

/// Taylor series exp(x) for Decimal. Uses sum_{k} x^k / k! with early
/// termination on convergence.
fn decimal_exp(x: Decimal) -> Decimal {
    let mut term = Decimal::ONE;
    let mut sum = Decimal::ONE;
    for k in 1u32..=50 {
        term *= x / Decimal::from(k);
        sum += term;
        if term.abs() < dec!(0.00000000001) {
            break;
        }
    }
    sum
}

fn safe_div(num: Decimal, den: Decimal, ctx: &str) -> ValuationResult<Decimal> {
    if den.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: ctx.to_string(),
        });
    }
    Ok(num / den)
}

fn build_component(name: &str, ratio: Decimal, coefficient: Decimal) -> ZScoreComponent {
    ZScoreComponent {
        name: name.to_string(),
        ratio,
        coefficient,
        weighted_value: coefficient * ratio,
    }
}

/// Compute both distress indices from a single balance sheet.
///
/// Z' = 0.717*X1 + 0.847*X2 + 3.107*X3 + 0.420*X4' + 0.998*X5
/// X  = -4.336 - 4.513*(NI/TA) + 5.679*(TL/TA); P(bankrupt) = 1/(1+exp(-X))
pub fn score_distress(input: &DistressInput) -> ValuationResult<DistressScores> {
    if input.total_assets <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "total_assets".into(),
            reason: "Total assets must be positive".into(),
        });
    }
    if input.total_liabilities <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "total_liabilities".into(),
            reason: "Total liabilities must be positive".into(),
        });
    }

    let ta = input.total_assets;
    let x1 = safe_div(input.working_capital, ta, "X1: WC / Total Assets")?;
    let x2 = safe_div(input.retained_earnings, ta, "X2: Retained Earnings / Total Assets")?;
    let x3 = safe_div(input.ebit, ta, "X3: EBIT / Total Assets")?;
    let x4 = safe_div(
        input.book_equity,
        input.total_liabilities,
        "X4': Book Equity / Total Liabilities",
    )?;
    let x5 = safe_div(input.revenue, ta, "X5: Revenue / Total Assets")?;

    let components = vec![
        build_component("X1: Working Capital / Total Assets", x1, ZP_COEFF_X1),
        build_component("X2: Retained Earnings / Total Assets", x2, ZP_COEFF_X2),
        build_component("X3: EBIT / Total Assets", x3, ZP_COEFF_X3),
        build_component("X4': Book Equity / Total Liabilities", x4, ZP_COEFF_X4),
        build_component("X5: Revenue / Total Assets", x5, ZP_COEFF_X5),
    ];

    let z_prime_score = ZP_COEFF_X1 * x1
        + ZP_COEFF_X2 * x2
        + ZP_COEFF_X3 * x3
        + ZP_COEFF_X4 * x4
        + ZP_COEFF_X5 * x5;

    let zone = if z_prime_score > ZP_SAFE {
        DistressZone::Safe
    } else if z_prime_score < ZP_DISTRESS {
        DistressZone::Distress
    } else {
        DistressZone::Grey
    };

    // Zmijewski-style probit, mapped through the logistic function
    let roa = safe_div(input.net_income, ta, "ROA: Net Income / Total Assets")?;
    let leverage = safe_div(input.total_liabilities, ta, "Leverage: TL / Total Assets")?;
    let x_score = ZM_INTERCEPT + ZM_ROA * roa + ZM_LEVERAGE * leverage;
    let exp_neg_x = decimal_exp(-x_score);
    let bankruptcy_probability = safe_div(
        Decimal::ONE,
        Decimal::ONE + exp_neg_x,
        "bankruptcy probability",
    )?;

    Ok(DistressScores {
        z_prime_score,
        zone,
        components,
        bankruptcy_probability,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
