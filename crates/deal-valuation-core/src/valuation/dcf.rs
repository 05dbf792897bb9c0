use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::sensitivity::{evaluate_grid, SensitivityGrid};
use crate::types::{
    with_metadata, ComputationOutput, Currency, Money, MonteCarloSummary, Multiple, Rate,
    SensitivityAxis,
};
use crate::ValuationResult;

use super::wacc::{calculate_wacc, WaccInput};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Method for computing terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TerminalMethod {
    /// Gordon growth model: TV = CF_terminal * (1+g) / (WACC - g)
    GordonGrowth,
    /// Exit multiple: TV = EBITDA_terminal * exit_multiple
    ExitMultiple,
    /// Compute both and report; uses Gordon as primary
    Both,
}

/// Terminal value assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalValueInput {
    pub method: TerminalMethod,
    /// Perpetuity growth rate (required for GordonGrowth / Both)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<Rate>,
    /// Cash-flow basis for the perpetuity; defaults to the final forecast FCFF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_cash_flow: Option<Money>,
    /// Exit EBITDA multiple (required for ExitMultiple / Both)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_multiple: Option<Multiple>,
    /// Terminal-year EBITDA basis for the exit-multiple method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_ebitda: Option<Money>,
}

/// Input for a Discounted Cash Flow valuation over an explicit FCFF forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInput {
    /// Unlevered free cash flow forecast, one entry per year starting at year 1
    pub fcff_forecast: Vec<Money>,
    /// Discount rate; ignored when `wacc_input` is provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
    /// If provided, WACC is computed from this input (overrides `discount_rate`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wacc_input: Option<WaccInput>,
    /// Terminal value assumptions
    pub terminal: TerminalValueInput,
    /// Diluted shares outstanding for per-share value
    pub shares_outstanding: Decimal,
    /// Net debt for the equity bridge (debt minus cash)
    pub net_debt: Money,
    /// Minority interest to subtract in the equity bridge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minority_interest: Option<Money>,
    /// Use mid-year convention for discounting (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid_year_convention: Option<bool>,
    /// Reporting currency
    pub currency: Currency,
}

/// Output of the DCF valuation. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    /// Sum of present values of explicit-period FCFFs
    pub pv_of_fcff: Money,
    /// Terminal value via Gordon growth (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_value_gordon: Option<Money>,
    /// Terminal value via exit multiple (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_value_exit: Option<Money>,
    /// Terminal value used in the primary valuation
    pub terminal_value_used: Money,
    /// Present value of the terminal value
    pub pv_of_terminal: Money,
    /// Enterprise value = PV(FCFFs) + PV(TV)
    pub enterprise_value: Money,
    /// Equity value = EV - net debt - minority interest
    pub equity_value: Money,
    /// Per-share equity value
    pub value_per_share: Money,
    /// Discount rate used
    pub discount_rate_used: Rate,
    /// Terminal value as a fraction of enterprise value
    pub terminal_value_pct: Rate,
    /// Implied EV/EBITDA exit multiple (when a terminal EBITDA was supplied)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_exit_multiple: Option<Multiple>,
    /// Attached discount-rate x terminal-growth grid of per-share values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityGrid>,
    /// Attached Monte Carlo percentile summary of per-share values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloSummary>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a DCF valuation over an explicit FCFF forecast.
pub fn calculate_dcf(input: &DcfInput) -> ValuationResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let discount_rate = resolve_discount_rate(input, &mut warnings)?;
    let output = compute_dcf(input, discount_rate, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "FCFF DCF (WACC-based)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// DCF sensitivity: discount rate x terminal growth, per-share values.
/// Cells where the growth rate meets or exceeds the discount rate are left
/// empty and reported in the warnings.
pub fn dcf_sensitivity(
    input: &DcfInput,
    discount_rate_axis: &SensitivityAxis,
    growth_axis: &SensitivityAxis,
) -> ValuationResult<ComputationOutput<SensitivityGrid>> {
    let start = Instant::now();

    let (grid, warnings) = evaluate_grid(
        discount_rate_axis,
        growth_axis,
        "Value per Share",
        |rate, growth| {
            let mut cell_input = input.clone();
            cell_input.wacc_input = None;
            cell_input.discount_rate = Some(rate);
            cell_input.terminal.method = TerminalMethod::GordonGrowth;
            cell_input.terminal.growth_rate = Some(growth);
            let mut cell_warnings = Vec::new();
            let out = compute_dcf(&cell_input, rate, &mut cell_warnings)?;
            Ok(out.value_per_share)
        },
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "DCF Sensitivity Grid (discount rate x terminal growth)",
        &serde_json::json!({
            "discount_rate_axis": discount_rate_axis,
            "growth_axis": growth_axis,
        }),
        warnings,
        elapsed,
        grid,
    ))
}

/// Base DCF with the sensitivity grid attached to the result.
pub fn dcf_with_sensitivity(
    input: &DcfInput,
    discount_rate_axis: &SensitivityAxis,
    growth_axis: &SensitivityAxis,
) -> ValuationResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let discount_rate = resolve_discount_rate(input, &mut warnings)?;
    let mut output = compute_dcf(input, discount_rate, &mut warnings)?;

    let grid = dcf_sensitivity(input, discount_rate_axis, growth_axis)?;
    for w in &grid.warnings {
        warnings.push(format!("[Sensitivity] {w}"));
    }
    output.sensitivity = Some(grid.result);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "FCFF DCF (WACC-based) with sensitivity grid",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn resolve_discount_rate(input: &DcfInput, warnings: &mut Vec<String>) -> ValuationResult<Rate> {
    if let Some(ref wacc_input) = input.wacc_input {
        let wacc_out = calculate_wacc(wacc_input)?;
        for w in &wacc_out.warnings {
            warnings.push(format!("[WACC] {w}"));
        }
        Ok(wacc_out.result.wacc)
    } else {
        input.discount_rate.ok_or_else(|| ValuationError::InvalidInput {
            field: "discount_rate".into(),
            reason: "Either discount_rate or wacc_input is required".into(),
        })
    }
}

fn validate_dcf_input(input: &DcfInput, rate: Rate) -> ValuationResult<()> {
    if input.fcff_forecast.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "fcff_forecast".into(),
            reason: "Forecast must contain at least one year".into(),
        });
    }
    if rate <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "discount_rate".into(),
            reason: "Discount rate must be positive".into(),
        });
    }
    if input.shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "Shares outstanding must be positive".into(),
        });
    }

    // Gordon growth constraint: rejected, never clamped
    if let Some(g) = input.terminal.growth_rate {
        if g >= rate {
            return Err(ValuationError::InvalidInput {
                field: "terminal.growth_rate".into(),
                reason: format!(
                    "Terminal growth rate ({g}) must be below the discount rate ({rate}); \
                     the perpetuity is otherwise divergent"
                ),
            });
        }
    }

    match input.terminal.method {
        TerminalMethod::GordonGrowth => {
            if input.terminal.growth_rate.is_none() {
                return Err(ValuationError::InvalidInput {
                    field: "terminal.growth_rate".into(),
                    reason: "Required for GordonGrowth terminal method".into(),
                });
            }
        }
        TerminalMethod::ExitMultiple => {
            if input.terminal.exit_multiple.is_none() || input.terminal.terminal_ebitda.is_none() {
                return Err(ValuationError::InvalidInput {
                    field: "terminal.exit_multiple / terminal.terminal_ebitda".into(),
                    reason: "Required for ExitMultiple terminal method".into(),
                });
            }
        }
        TerminalMethod::Both => {
            if input.terminal.growth_rate.is_none() {
                return Err(ValuationError::InvalidInput {
                    field: "terminal.growth_rate".into(),
                    reason: "Required for Both terminal method".into(),
                });
            }
            if input.terminal.exit_multiple.is_none() || input.terminal.terminal_ebitda.is_none() {
                return Err(ValuationError::InvalidInput {
                    field: "terminal.exit_multiple / terminal.terminal_ebitda".into(),
                    reason: "Required for Both terminal method".into(),
                });
            }
        }
    }

    Ok(())
}

fn compute_dcf(
    input: &DcfInput,
    discount_rate: Rate,
    warnings: &mut Vec<String>,
) -> ValuationResult<DcfOutput> {
    validate_dcf_input(input, discount_rate)?;

    let mid_year = input.mid_year_convention.unwrap_or(false);
    let n_years = input.fcff_forecast.len() as u32;

    // --- Discount the explicit forecast ---
    let mut pv_of_fcff = Decimal::ZERO;
    for (idx, fcff) in input.fcff_forecast.iter().enumerate() {
        let year = Decimal::from((idx + 1) as u32);
        let period = if mid_year { year - dec!(0.5) } else { year };
        let discount_factor = (Decimal::ONE + discount_rate).powd(period);
        pv_of_fcff += fcff / discount_factor;
    }

    // Validated non-empty above
    let final_fcff = *input.fcff_forecast.last().unwrap();

    // --- Terminal value ---
    let (tv_gordon, tv_exit, tv_used) =
        compute_terminal_values(input, final_fcff, discount_rate, warnings)?;

    // --- Discount TV at the final forecast period ---
    let tv_discount_factor = (Decimal::ONE + discount_rate).powd(Decimal::from(n_years));
    let pv_of_terminal = tv_used / tv_discount_factor;

    // --- Enterprise value and equity bridge ---
    let enterprise_value = pv_of_fcff + pv_of_terminal;
    let equity_value =
        enterprise_value - input.net_debt - input.minority_interest.unwrap_or(Decimal::ZERO);
    let value_per_share = equity_value / input.shares_outstanding;

    if equity_value < Decimal::ZERO {
        warnings.push(format!(
            "Net debt exceeds enterprise value; equity value is negative ({equity_value})"
        ));
    }

    // --- Terminal value percentage warning ---
    let tv_pct = if enterprise_value.is_zero() {
        Decimal::ZERO
    } else {
        pv_of_terminal / enterprise_value
    };
    if tv_pct > dec!(0.75) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value; consider extending the explicit forecast period",
            tv_pct * dec!(100)
        ));
    }

    // --- Implied exit multiple ---
    let implied_exit_multiple = match input.terminal.terminal_ebitda {
        Some(ebitda) if !ebitda.is_zero() => Some(tv_used / ebitda),
        _ => None,
    };

    Ok(DcfOutput {
        pv_of_fcff,
        terminal_value_gordon: tv_gordon,
        terminal_value_exit: tv_exit,
        terminal_value_used: tv_used,
        pv_of_terminal,
        enterprise_value,
        equity_value,
        value_per_share,
        discount_rate_used: discount_rate,
        terminal_value_pct: tv_pct,
        implied_exit_multiple,
        sensitivity: None,
        monte_carlo: None,
    })
}

fn compute_terminal_values(
    input: &DcfInput,
    final_fcff: Money,
    rate: Rate,
    warnings: &mut Vec<String>,
) -> ValuationResult<(Option<Money>, Option<Money>, Money)> {
    let tv_gordon = match input.terminal.method {
        TerminalMethod::GordonGrowth | TerminalMethod::Both => {
            let g = input.terminal.growth_rate.unwrap(); // validated above
            let basis = input.terminal.terminal_cash_flow.unwrap_or(final_fcff);
            let denom = rate - g;
            if denom <= Decimal::ZERO {
                return Err(ValuationError::InvalidInput {
                    field: "terminal.growth_rate".into(),
                    reason: "Discount rate must exceed terminal growth rate".into(),
                });
            }
            Some(basis * (Decimal::ONE + g) / denom)
        }
        TerminalMethod::ExitMultiple => None,
    };

    let tv_exit = match input.terminal.method {
        TerminalMethod::ExitMultiple | TerminalMethod::Both => {
            // Both validated above
            let multiple = input.terminal.exit_multiple.unwrap();
            let ebitda = input.terminal.terminal_ebitda.unwrap();
            Some(ebitda * multiple)
        }
        TerminalMethod::GordonGrowth => None,
    };

    let tv_used = match input.terminal.method {
        TerminalMethod::GordonGrowth => tv_gordon.unwrap(),
        TerminalMethod::ExitMultiple => tv_exit.unwrap(),
        TerminalMethod::Both => {
            let g = tv_gordon.unwrap();
            let e = tv_exit.unwrap();
            if g > Decimal::ZERO && e > Decimal::ZERO {
                let diff_pct = ((g - e) / g).abs();
                if diff_pct > dec!(0.25) {
                    warnings.push(format!(
                        "Gordon TV ({g}) and Exit Multiple TV ({e}) differ by {:.1}%; review assumptions",
                        diff_pct * dec!(100)
                    ));
                }
            }
            // Use Gordon as primary when Both
            g
        }
    };

    Ok((tv_gordon, tv_exit, tv_used))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_dcf_input() -> DcfInput {
        DcfInput {
            fcff_forecast: vec![dec!(100), dec!(108), dec!(115), dec!(122), dec!(130)],
            discount_rate: Some(dec!(0.09)),
            wacc_input: None,
            terminal: TerminalValueInput {
                method: TerminalMethod::GordonGrowth,
                growth_rate: Some(dec!(0.025)),
                terminal_cash_flow: None,
                exit_multiple: None,
                terminal_ebitda: None,
            },
            shares_outstanding: dec!(1000),
            net_debt: dec!(500),
            minority_interest: None,
            mid_year_convention: None,
            currency: Currency::USD,
        }
    }

    #[test]
    fn test_basic_dcf() {
        let result = calculate_dcf(&sample_dcf_input()).unwrap();
        let out = &result.result;

        assert!(out.enterprise_value > Decimal::ZERO);
        assert_eq!(out.equity_value, out.enterprise_value - dec!(500));
        assert_eq!(out.value_per_share, out.equity_value / dec!(1000));
        assert_eq!(out.discount_rate_used, dec!(0.09));
    }

    #[test]
    fn test_dcf_terminal_value() {
        let result = calculate_dcf(&sample_dcf_input()).unwrap();
        let out = &result.result;

        // TV = 130 * 1.025 / (0.09 - 0.025) = 2050
        assert_eq!(out.terminal_value_used, out.terminal_value_gordon.unwrap());
        assert!(
            (out.terminal_value_used - dec!(2050)).abs() < dec!(0.0001),
            "TV: expected 2050, got {}",
            out.terminal_value_used
        );
    }

    #[test]
    fn test_dcf_monotone_decreasing_in_rate() {
        let mut input = sample_dcf_input();
        let mut prev = Decimal::MAX;
        for rate in [dec!(0.07), dec!(0.08), dec!(0.09), dec!(0.10), dec!(0.11)] {
            input.discount_rate = Some(rate);
            let ev = calculate_dcf(&input).unwrap().result.enterprise_value;
            assert!(ev > Decimal::ZERO);
            assert!(
                ev < prev,
                "EV should decrease as the discount rate rises (rate {rate}: {ev} >= {prev})"
            );
            prev = ev;
        }
    }

    #[test]
    fn test_dcf_growth_at_rate_rejected() {
        let mut input = sample_dcf_input();
        input.terminal.growth_rate = Some(dec!(0.09));
        let result = calculate_dcf(&input);
        assert!(result.is_err());
        match result.unwrap_err() {
            ValuationError::InvalidInput { field, .. } => {
                assert_eq!(field, "terminal.growth_rate");
            }
            e => panic!("Expected InvalidInput, got {e:?}"),
        }
    }

    #[test]
    fn test_dcf_growth_above_rate_rejected() {
        let mut input = sample_dcf_input();
        input.terminal.growth_rate = Some(dec!(0.12));
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_dcf_empty_forecast_rejected() {
        let mut input = sample_dcf_input();
        input.fcff_forecast = vec![];
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_dcf_zero_shares_rejected() {
        let mut input = sample_dcf_input();
        input.shares_outstanding = Decimal::ZERO;
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_dcf_missing_rate_rejected() {
        let mut input = sample_dcf_input();
        input.discount_rate = None;
        assert!(calculate_dcf(&input).is_err());
    }

    #[test]
    fn test_dcf_exit_multiple_method() {
        let mut input = sample_dcf_input();
        input.terminal = TerminalValueInput {
            method: TerminalMethod::ExitMultiple,
            growth_rate: None,
            terminal_cash_flow: None,
            exit_multiple: Some(dec!(10)),
            terminal_ebitda: Some(dec!(180)),
        };

        let result = calculate_dcf(&input).unwrap();
        let out = &result.result;

        assert!(out.terminal_value_gordon.is_none());
        assert_eq!(out.terminal_value_exit, Some(dec!(1800)));
        assert_eq!(out.terminal_value_used, dec!(1800));
        assert_eq!(out.implied_exit_multiple, Some(dec!(10)));
    }

    #[test]
    fn test_dcf_both_methods_gordon_primary() {
        let mut input = sample_dcf_input();
        input.terminal.method = TerminalMethod::Both;
        input.terminal.exit_multiple = Some(dec!(10));
        input.terminal.terminal_ebitda = Some(dec!(180));

        let result = calculate_dcf(&input).unwrap();
        let out = &result.result;

        assert!(out.terminal_value_gordon.is_some());
        assert!(out.terminal_value_exit.is_some());
        assert_eq!(out.terminal_value_used, out.terminal_value_gordon.unwrap());
        // 2050 vs 1800 differ by ~12%: no divergence warning expected
        assert!(!result.warnings.iter().any(|w| w.contains("differ")));
    }

    #[test]
    fn test_dcf_explicit_terminal_cash_flow() {
        let mut input = sample_dcf_input();
        input.terminal.terminal_cash_flow = Some(dec!(140));

        let result = calculate_dcf(&input).unwrap();
        // TV = 140 * 1.025 / 0.065
        let expected = dec!(140) * dec!(1.025) / dec!(0.065);
        assert!(
            (result.result.terminal_value_used - expected).abs() < dec!(0.0001),
            "TV basis override not applied"
        );
    }

    #[test]
    fn test_dcf_mid_year_convention_raises_value() {
        let mut input = sample_dcf_input();
        input.mid_year_convention = Some(false);
        let end_year = calculate_dcf(&input).unwrap().result.enterprise_value;

        input.mid_year_convention = Some(true);
        let mid_year = calculate_dcf(&input).unwrap().result.enterprise_value;

        assert!(
            mid_year > end_year,
            "Mid-year EV ({mid_year}) should exceed end-of-year EV ({end_year})"
        );
    }

    #[test]
    fn test_dcf_minority_interest_bridge() {
        let mut input = sample_dcf_input();
        input.minority_interest = Some(dec!(50));

        let with_mi = calculate_dcf(&input).unwrap().result.equity_value;
        input.minority_interest = None;
        let without_mi = calculate_dcf(&input).unwrap().result.equity_value;

        assert_eq!(without_mi - with_mi, dec!(50));
    }

    #[test]
    fn test_dcf_with_wacc_input() {
        let mut input = sample_dcf_input();
        input.wacc_input = Some(WaccInput {
            risk_free_rate: dec!(0.042),
            equity_risk_premium: dec!(0.055),
            levered_beta: Some(dec!(1.10)),
            unlevered_beta: None,
            target_debt_to_equity: None,
            pre_tax_cost_of_debt: dec!(0.055),
            tax_rate: dec!(0.21),
            market_cap: dec!(7000),
            net_debt: dec!(3000),
            size_premium: None,
            country_risk_premium: None,
            specific_risk_premium: None,
        });

        let result = calculate_dcf(&input).unwrap();
        // WACC ~8.5% should override the flat 9%
        let rate = result.result.discount_rate_used;
        assert!(rate > dec!(0.07) && rate < dec!(0.09), "rate = {rate}");
    }

    #[test]
    fn test_dcf_sensitivity_grid() {
        let input = sample_dcf_input();
        let rate_axis = SensitivityAxis {
            name: "Discount Rate".into(),
            min: dec!(0.07),
            max: dec!(0.11),
            steps: 5,
        };
        let growth_axis = SensitivityAxis {
            name: "Terminal Growth".into(),
            min: dec!(0.015),
            max: dec!(0.035),
            steps: 5,
        };

        let result = dcf_sensitivity(&input, &rate_axis, &growth_axis).unwrap();
        let grid = &result.result;

        assert_eq!(grid.matrix.len(), 5);
        assert_eq!(grid.matrix[0].len(), 5);
        // All cells valid here (min rate 7% > max growth 3.5%)
        assert!(grid.matrix.iter().flatten().all(|c| c.is_some()));

        // Monotone: per-share value decreasing in rate, increasing in growth
        for j in 0..5 {
            for i in 0..4 {
                assert!(grid.matrix[i][j].unwrap() > grid.matrix[i + 1][j].unwrap());
            }
        }
        for i in 0..5 {
            for j in 0..4 {
                assert!(grid.matrix[i][j].unwrap() < grid.matrix[i][j + 1].unwrap());
            }
        }
    }

    #[test]
    fn test_dcf_sensitivity_invalid_cells_reported() {
        let input = sample_dcf_input();
        let rate_axis = SensitivityAxis {
            name: "Discount Rate".into(),
            min: dec!(0.02),
            max: dec!(0.10),
            steps: 5,
        };
        let growth_axis = SensitivityAxis {
            name: "Terminal Growth".into(),
            min: dec!(0.02),
            max: dec!(0.04),
            steps: 3,
        };

        let result = dcf_sensitivity(&input, &rate_axis, &growth_axis).unwrap();
        // Rate 2% with growth 2% is invalid (g >= rate)
        assert!(result.result.matrix[0][0].is_none());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_dcf_with_sensitivity_attaches_grid() {
        let input = sample_dcf_input();
        let rate_axis = SensitivityAxis {
            name: "Discount Rate".into(),
            min: dec!(0.08),
            max: dec!(0.10),
            steps: 3,
        };
        let growth_axis = SensitivityAxis {
            name: "Terminal Growth".into(),
            min: dec!(0.02),
            max: dec!(0.03),
            steps: 3,
        };

        let result = dcf_with_sensitivity(&input, &rate_axis, &growth_axis).unwrap();
        let grid = result.result.sensitivity.as_ref().unwrap();
        assert_eq!(grid.metric, "Value per Share");

        // The base-case cell (9%, 2.5%) matches the standalone computation
        let base = calculate_dcf(&input).unwrap().result.value_per_share;
        assert_eq!(grid.matrix[1][1].unwrap(), base);
    }

    #[test]
    fn test_dcf_methodology() {
        let result = calculate_dcf(&sample_dcf_input()).unwrap();
        assert_eq!(result.methodology, "FCFF DCF (WACC-based)");
    }
}
