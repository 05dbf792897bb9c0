use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

/// Input parameters for Weighted Average Cost of Capital calculation.
/// Capital structure weights are derived from market capitalisation and
/// net debt (market-value basis).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccInput {
    /// Risk-free rate (e.g. 10-year government bond yield)
    pub risk_free_rate: Rate,
    /// Equity risk premium (market return minus risk-free rate)
    pub equity_risk_premium: Rate,
    /// Levered beta of equity (used directly when no unlevered beta given)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levered_beta: Option<Decimal>,
    /// Unlevered (asset) beta — if provided, re-levered via Hamada
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlevered_beta: Option<Decimal>,
    /// Target debt-to-equity ratio for Hamada re-levering; when absent the
    /// market-value D/E is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_debt_to_equity: Option<Decimal>,
    /// Pre-tax cost of debt
    pub pre_tax_cost_of_debt: Rate,
    /// Marginal corporate tax rate
    pub tax_rate: Rate,
    /// Current market capitalisation (equity value)
    pub market_cap: Money,
    /// Net debt (total debt minus cash); may be negative for net cash
    pub net_debt: Money,
    /// Small-cap / size premium
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_premium: Option<Rate>,
    /// Country risk premium for emerging markets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_risk_premium: Option<Rate>,
    /// Company-specific / alpha risk premium
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_risk_premium: Option<Rate>,
}

/// Output of the WACC calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccOutput {
    /// Weighted average cost of capital
    pub wacc: Rate,
    /// Cost of equity (via CAPM + premiums)
    pub cost_of_equity: Rate,
    /// After-tax cost of debt
    pub after_tax_cost_of_debt: Rate,
    /// Pre-tax cost of debt (echoed back)
    pub cost_of_debt_pretax: Rate,
    /// Levered beta used in the calculation
    pub levered_beta: Decimal,
    /// Unlevered beta (if re-levered via Hamada)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlevered_beta: Option<Decimal>,
    /// Market-value weight of equity
    pub equity_weight: Rate,
    /// Market-value weight of debt
    pub debt_weight: Rate,
}

/// Calculate the Weighted Average Cost of Capital using CAPM.
///
/// Cost of equity: Ke = Rf + Beta * ERP + size_premium + country_risk + specific_risk
/// After-tax cost of debt: Kd_at = Kd * (1 - t)
/// WACC = Ke * We + Kd_at * Wd, with We/Wd from market cap and net debt.
///
/// If `unlevered_beta` is provided, the levered beta is computed using the
/// Hamada equation: Beta_L = Beta_U * (1 + (1 - t) * D/E).
pub fn calculate_wacc(input: &WaccInput) -> ValuationResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_wacc_input(input)?;

    // --- Market-value weights ---
    let debt_value = if input.net_debt < Decimal::ZERO {
        warnings.push(format!(
            "Net cash position ({}); debt weight floored at zero",
            input.net_debt
        ));
        Decimal::ZERO
    } else {
        input.net_debt
    };
    let total_capital = input.market_cap + debt_value;
    let equity_weight = input.market_cap / total_capital;
    let debt_weight = debt_value / total_capital;

    // --- Levered beta (Hamada re-levering if applicable) ---
    let (levered_beta, unlevered_beta_out) =
        compute_beta(input, debt_value, &mut warnings)?;

    // --- Cost of Equity (CAPM build-up) ---
    let cost_of_equity = compute_cost_of_equity(input, levered_beta);

    // --- After-tax cost of debt ---
    let after_tax_cost_of_debt = input.pre_tax_cost_of_debt * (Decimal::ONE - input.tax_rate);

    // --- WACC ---
    let wacc = cost_of_equity * equity_weight + after_tax_cost_of_debt * debt_weight;

    // --- Reasonableness warnings ---
    if levered_beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({levered_beta}): verify market data; betas above 3.0 are unusual"
        ));
    }
    if input.equity_risk_premium > dec!(0.10) {
        warnings.push(format!(
            "Equity risk premium ({}) exceeds 10%; verify estimate",
            input.equity_risk_premium
        ));
    }
    if wacc > dec!(0.20) {
        warnings.push(format!(
            "WACC of {wacc} exceeds 20%; appropriate for high-risk / emerging-market situations only"
        ));
    }

    let output = WaccOutput {
        wacc,
        cost_of_equity,
        after_tax_cost_of_debt,
        cost_of_debt_pretax: input.pre_tax_cost_of_debt,
        levered_beta,
        unlevered_beta: unlevered_beta_out,
        equity_weight,
        debt_weight,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "WACC via CAPM build-up",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_wacc_input(input: &WaccInput) -> ValuationResult<()> {
    if input.risk_free_rate < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "risk_free_rate".into(),
            reason: "Risk-free rate cannot be negative".into(),
        });
    }
    if input.equity_risk_premium < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "equity_risk_premium".into(),
            reason: "Equity risk premium cannot be negative".into(),
        });
    }
    if input.market_cap <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "market_cap".into(),
            reason: "Market capitalisation must be positive".into(),
        });
    }
    if input.pre_tax_cost_of_debt < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "pre_tax_cost_of_debt".into(),
            reason: "Cost of debt cannot be negative".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate > Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be between 0 and 1".into(),
        });
    }
    if input.levered_beta.is_none() && input.unlevered_beta.is_none() {
        return Err(ValuationError::InvalidInput {
            field: "levered_beta / unlevered_beta".into(),
            reason: "Either a levered or an unlevered beta is required".into(),
        });
    }
    if let Some(beta) = input.levered_beta {
        if beta <= Decimal::ZERO && input.unlevered_beta.is_none() {
            return Err(ValuationError::InvalidInput {
                field: "levered_beta".into(),
                reason: "Beta must be positive".into(),
            });
        }
    }
    Ok(())
}

/// Returns (levered_beta, Option<unlevered_beta>).
fn compute_beta(
    input: &WaccInput,
    debt_value: Money,
    warnings: &mut Vec<String>,
) -> ValuationResult<(Decimal, Option<Decimal>)> {
    if let Some(beta_u) = input.unlevered_beta {
        if beta_u <= Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: "unlevered_beta".into(),
                reason: "Unlevered beta must be positive".into(),
            });
        }
        let de = match input.target_debt_to_equity {
            Some(de) => {
                if de < Decimal::ZERO {
                    return Err(ValuationError::InvalidInput {
                        field: "target_debt_to_equity".into(),
                        reason: "Target D/E ratio cannot be negative".into(),
                    });
                }
                de
            }
            // Market-value D/E; market_cap positivity validated above
            None => debt_value / input.market_cap,
        };
        let beta_l = relever_beta(beta_u, input.tax_rate, de);
        warnings.push(format!(
            "Levered beta re-calculated via Hamada equation: {beta_l} (from unlevered {beta_u}, D/E {de})"
        ));
        Ok((beta_l, Some(beta_u)))
    } else {
        // Presence validated above
        let beta = input.levered_beta.unwrap();
        Ok((beta, None))
    }
}

fn compute_cost_of_equity(input: &WaccInput, levered_beta: Decimal) -> Rate {
    let mut ke = input.risk_free_rate + levered_beta * input.equity_risk_premium;
    if let Some(sp) = input.size_premium {
        ke += sp;
    }
    if let Some(crp) = input.country_risk_premium {
        ke += crp;
    }
    if let Some(srp) = input.specific_risk_premium {
        ke += srp;
    }
    ke
}

/// Unlever a beta using the Hamada equation.
///
/// Beta_U = Beta_L / (1 + (1 - t) * D/E)
pub fn unlever_beta(
    levered_beta: Decimal,
    tax_rate: Rate,
    debt_equity: Decimal,
) -> ValuationResult<Decimal> {
    let denom = Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity;
    if denom.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "Hamada unlever denominator".into(),
        });
    }
    Ok(levered_beta / denom)
}

/// Re-lever a beta using the Hamada equation.
///
/// Beta_L = Beta_U * (1 + (1 - t) * D/E)
pub fn relever_beta(unlevered_beta: Decimal, tax_rate: Rate, debt_equity: Decimal) -> Decimal {
    unlevered_beta * (Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
