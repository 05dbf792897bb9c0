use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::sensitivity::{evaluate_grid, SensitivityGrid};
use crate::time_value::{resolve_irr, IrrConfig, IrrMethod};
use crate::types::{
    with_metadata, ComputationOutput, Currency, Money, Multiple, Rate, SensitivityAxis,
};
use crate::ValuationResult;

use super::debt_schedule::{
    self, build_debt_schedule, AmortisationType, DebtScheduleOutput, DebtTrancheInput,
};
use super::sources_uses::{
    build_sources_uses, ImbalancePolicy, SourcesUsesInput, SourcesUsesOutput,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Exit assumptions for the sponsor's realisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitAssumptions {
    /// Exit year (e.g. 5 for a 5-year hold)
    pub year: u32,
    /// Exit EV/EBITDA multiple
    pub multiple: Multiple,
}

/// Input for a full LBO model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboInput {
    // Entry
    /// Entry-year EBITDA (LTM or projected)
    pub entry_ebitda: Money,
    /// Entry EV/EBITDA multiple; enterprise value is derived
    pub entry_multiple: Multiple,

    // Operating projections
    /// Revenue in the base year (year 0)
    pub base_revenue: Money,
    /// Revenue growth per year; the last value carries forward
    pub revenue_growth: Vec<Rate>,
    /// EBITDA margin per year; the last value carries forward
    pub ebitda_margin: Vec<Rate>,
    /// Depreciation & amortisation as percentage of revenue
    pub da_as_pct_revenue: Rate,
    /// Capital expenditure as percentage of revenue
    pub capex_as_pct_revenue: Rate,
    /// Net working capital as percentage of revenue
    pub nwc_as_pct_revenue: Rate,
    /// Corporate tax rate
    pub tax_rate: Rate,

    // Capital structure
    /// Debt tranches in seniority order
    pub tranches: Vec<DebtTrancheInput>,
    /// Sponsor equity contribution
    pub equity_contribution: Money,
    /// Percentage of post-amortisation free cash flow swept into repayment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_sweep_pct: Option<Rate>,
    /// Minimum cash balance preserved before sweeping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_cash: Option<Money>,

    // Exit
    pub exit: ExitAssumptions,

    // Fees and rollover
    /// Transaction advisory fees as a percentage of enterprise value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_fee_pct: Option<Rate>,
    /// Debt financing fees as a percentage of enterprise value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financing_fee_pct: Option<Rate>,
    /// Management equity rollover (participates alongside the sponsor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_rollover: Option<Money>,

    // Policy and numerics
    /// Sources & uses reconciliation tolerance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Money>,
    #[serde(default)]
    pub on_imbalance: ImbalancePolicy,
    /// IRR cascade configuration; defaults apply when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr: Option<IrrConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
}

/// A single year in the LBO projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboYearProjection {
    pub year: u32,
    pub revenue: Money,
    pub ebitda: Money,
    pub ebit: Money,
    pub less_interest: Money,
    pub ebt: Money,
    pub tax: Money,
    pub net_income: Money,
    pub plus_da: Money,
    pub less_capex: Money,
    pub less_nwc_change: Money,
    pub fcf_before_debt_service: Money,
    pub mandatory_repayment: Money,
    pub optional_repayment: Money,
    pub total_debt_outstanding: Money,
    pub net_debt: Money,
    pub cash_balance: Money,
}

/// Full LBO model output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboOutput {
    /// Year-by-year financial projections
    pub projections: Vec<LboYearProjection>,
    /// Per-tranche scheduled amortisation (before cash sweeps)
    pub debt_schedules: Vec<DebtScheduleOutput>,
    /// Sources & uses of funds at entry
    pub sources_uses: SourcesUsesOutput,
    /// Exit enterprise value
    pub exit_ev: Money,
    /// Exit equity value (exit EV minus exit net debt)
    pub exit_equity_value: Money,
    /// Net debt at exit
    pub exit_net_debt: Money,
    /// Sponsor share of exit equity (after management rollover's claim)
    pub sponsor_exit_proceeds: Money,
    /// Sponsor IRR
    pub irr: Rate,
    /// The method that produced the IRR figure
    pub irr_method: IrrMethod,
    /// Multiple on Invested Capital
    pub moic: Multiple,
    /// Entry leverage (entry debt / entry EBITDA)
    pub entry_leverage: Multiple,
    /// Exit leverage (exit net debt / exit EBITDA)
    pub exit_leverage: Multiple,
    /// Attached exit multiple x exit EBITDA grid of sponsor IRRs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityGrid>,
}

/// Helper: get a rate from a vector by index, clamping to the last value if
/// the vector is shorter than the requested index.
fn get_rate(rates: &[Rate], index: usize) -> Rate {
    if rates.is_empty() {
        Decimal::ZERO
    } else if index < rates.len() {
        rates[index]
    } else {
        rates[rates.len() - 1]
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build a complete LBO model from entry through exit: sources & uses, debt
/// schedules, operating projection with mandatory amortisation and optional
/// cash sweep, exit bridge and sponsor returns via the IRR cascade.
pub fn build_lbo(input: &LboInput) -> ValuationResult<ComputationOutput<LboOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let (projections, debt_schedules, sources_uses, sponsor_outlay) =
        run_projection(input, &mut warnings)?;

    // Projections validated non-empty by exit.year >= 1
    let last = projections.last().unwrap();
    let exit_ebitda = last.ebitda;
    let exit_ev = exit_ebitda * input.exit.multiple;
    let exit_net_debt = last.net_debt;
    let exit_equity_value = exit_ev - exit_net_debt;

    let rollover = input.management_rollover.unwrap_or(Decimal::ZERO);
    let sponsor_share = if rollover > Decimal::ZERO {
        sponsor_outlay / (sponsor_outlay + rollover)
    } else {
        Decimal::ONE
    };
    let sponsor_exit_proceeds = exit_equity_value * sponsor_share;

    if exit_equity_value <= Decimal::ZERO {
        warnings.push(format!(
            "Exit equity value is not positive ({exit_equity_value}); the structure is under water at exit"
        ));
    }

    // Sponsor cash-flow vector: [-outlay, 0, ..., proceeds]
    let mut cf_series: Vec<Money> = Vec::with_capacity((input.exit.year + 1) as usize);
    cf_series.push(-sponsor_outlay);
    for year in 1..=input.exit.year {
        if year == input.exit.year {
            cf_series.push(sponsor_exit_proceeds);
        } else {
            cf_series.push(Decimal::ZERO);
        }
    }

    let irr_config = input.irr.clone().unwrap_or_default();
    let resolution = resolve_irr(&cf_series, &irr_config)?;
    for entry in &resolution.method_log {
        warnings.push(format!("[IRR] {entry}"));
    }

    let moic = sponsor_exit_proceeds / sponsor_outlay;

    let total_initial_debt: Money = input.tranches.iter().map(|t| t.amount).sum();
    let entry_leverage = total_initial_debt / input.entry_ebitda;
    let exit_leverage = if exit_ebitda.is_zero() {
        warnings.push("Exit EBITDA is zero; exit leverage undefined".into());
        Decimal::ZERO
    } else {
        exit_net_debt / exit_ebitda
    };

    let output = LboOutput {
        projections,
        debt_schedules,
        sources_uses,
        exit_ev,
        exit_equity_value,
        exit_net_debt,
        sponsor_exit_proceeds,
        irr: resolution.rate,
        irr_method: resolution.method,
        moic,
        entry_leverage,
        exit_leverage,
        sensitivity: None,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Leveraged Buyout Model",
        &serde_json::json!({
            "entry_ebitda": input.entry_ebitda.to_string(),
            "entry_multiple": input.entry_multiple.to_string(),
            "exit_year": input.exit.year,
            "exit_multiple": input.exit.multiple.to_string(),
            "equity_contribution": input.equity_contribution.to_string(),
            "num_tranches": input.tranches.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Exit-assumption sensitivity: sponsor IRR over exit multiple x exit
/// EBITDA. The debt paydown path is held at the base projection; only the
/// exit bridge is swept. Cells with non-positive exit equity stay empty.
pub fn lbo_sensitivity(
    input: &LboInput,
    exit_multiple_axis: &SensitivityAxis,
    exit_ebitda_axis: &SensitivityAxis,
) -> ValuationResult<ComputationOutput<SensitivityGrid>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let (projections, _, _, sponsor_outlay) = run_projection(input, &mut warnings)?;
    let exit_net_debt = projections.last().unwrap().net_debt;

    let rollover = input.management_rollover.unwrap_or(Decimal::ZERO);
    let sponsor_share = if rollover > Decimal::ZERO {
        sponsor_outlay / (sponsor_outlay + rollover)
    } else {
        Decimal::ONE
    };

    let irr_config = input.irr.clone().unwrap_or_default();
    let exit_year = input.exit.year;

    let (grid, grid_warnings) = evaluate_grid(
        exit_multiple_axis,
        exit_ebitda_axis,
        "Sponsor IRR",
        |multiple, ebitda| {
            let exit_equity = ebitda * multiple - exit_net_debt;
            if exit_equity <= Decimal::ZERO {
                return Err(ValuationError::InvalidInput {
                    field: "exit".into(),
                    reason: format!("Exit equity is not positive ({exit_equity})"),
                });
            }
            let mut cf = Vec::with_capacity((exit_year + 1) as usize);
            cf.push(-sponsor_outlay);
            for year in 1..=exit_year {
                if year == exit_year {
                    cf.push(exit_equity * sponsor_share);
                } else {
                    cf.push(Decimal::ZERO);
                }
            }
            Ok(resolve_irr(&cf, &irr_config)?.rate)
        },
    )?;
    warnings.extend(grid_warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO Sensitivity Grid (exit multiple x exit EBITDA)",
        &serde_json::json!({
            "exit_multiple_axis": exit_multiple_axis,
            "exit_ebitda_axis": exit_ebitda_axis,
            "exit_net_debt": exit_net_debt.to_string(),
        }),
        warnings,
        elapsed,
        grid,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_lbo_input(input: &LboInput) -> ValuationResult<()> {
    if input.entry_ebitda <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "entry_ebitda".into(),
            reason: "Entry EBITDA must be positive".into(),
        });
    }
    if input.entry_multiple <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "entry_multiple".into(),
            reason: "Entry multiple must be positive".into(),
        });
    }
    if input.base_revenue <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "base_revenue".into(),
            reason: "Base revenue must be positive".into(),
        });
    }
    if input.exit.year == 0 {
        return Err(ValuationError::InvalidInput {
            field: "exit.year".into(),
            reason: "Exit year must be at least 1".into(),
        });
    }
    if input.exit.multiple <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "exit.multiple".into(),
            reason: "Exit multiple must be positive".into(),
        });
    }
    if input.tranches.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "tranches".into(),
            reason: "At least one debt tranche is required".into(),
        });
    }
    if input.equity_contribution <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "equity_contribution".into(),
            reason: "Equity contribution must be positive".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate > Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be between 0 and 1".into(),
        });
    }
    Ok(())
}

/// Scheduled amortisation for one tranche in one year, capped at the actual
/// remaining balance (which cash sweeps may have reduced below schedule).
fn scheduled_repayment(
    tranche: &DebtTrancheInput,
    year: u32,
    balance: Money,
) -> Money {
    if year > tranche.maturity_years {
        return Decimal::ZERO;
    }
    match &tranche.amortisation {
        AmortisationType::Bullet => {
            if year == tranche.maturity_years {
                balance
            } else {
                Decimal::ZERO
            }
        }
        AmortisationType::StraightLine(pct) => {
            if year == tranche.maturity_years {
                balance
            } else {
                (tranche.amount * pct).min(balance)
            }
        }
        AmortisationType::Custom(schedule) => {
            if year == tranche.maturity_years {
                balance
            } else {
                schedule
                    .get((year - 1) as usize)
                    .copied()
                    .unwrap_or(Decimal::ZERO)
                    .min(balance)
            }
        }
    }
}

/// Run sources & uses, static schedules and the operating projection.
/// Returns the projections, schedules, S&U and the sponsor's total outlay
/// (equity contribution plus any balancing equity plug).
fn run_projection(
    input: &LboInput,
    warnings: &mut Vec<String>,
) -> ValuationResult<(
    Vec<LboYearProjection>,
    Vec<DebtScheduleOutput>,
    SourcesUsesOutput,
    Money,
)> {
    validate_lbo_input(input)?;

    // --- Sources & Uses ---
    let su_input = SourcesUsesInput {
        entry_ebitda: input.entry_ebitda,
        entry_multiple: input.entry_multiple,
        equity_contribution: input.equity_contribution,
        debt_tranches: input
            .tranches
            .iter()
            .map(|t| (t.name.clone(), t.amount))
            .collect(),
        transaction_fee_pct: input.transaction_fee_pct,
        financing_fee_pct: input.financing_fee_pct,
        management_rollover: input.management_rollover,
        tolerance: input.tolerance,
        on_imbalance: input.on_imbalance,
    };
    let su = build_sources_uses(&su_input)?;
    for w in &su.warnings {
        warnings.push(format!("[S&U] {w}"));
    }
    let su_output = su.result;

    // A balancing equity plug is money the sponsor actually puts in
    let mut sponsor_outlay = input.equity_contribution;
    if let Some((label, amount)) = &su_output.balancing_adjustment {
        if label == "Balancing Equity Adjustment" {
            sponsor_outlay += *amount;
        }
    }

    // --- Static schedules (for reporting) ---
    let mut debt_schedules: Vec<DebtScheduleOutput> = Vec::new();
    for tranche in &input.tranches {
        let ds = build_debt_schedule(tranche)?;
        for w in ds.warnings {
            warnings.push(format!("[Debt schedule:{}] {w}", tranche.name));
        }
        debt_schedules.push(ds.result);
    }

    // --- Year-by-year projection on actual balances ---
    let minimum_cash = input.minimum_cash.unwrap_or(Decimal::ZERO);
    let cash_sweep_pct = input.cash_sweep_pct.unwrap_or(Decimal::ZERO);

    let mut tranche_balances: Vec<Money> = input.tranches.iter().map(|t| t.amount).collect();
    let tranche_rates: Vec<Rate> = input
        .tranches
        .iter()
        .map(|t| debt_schedule::effective_rate(t, warnings))
        .collect();

    let mut projections: Vec<LboYearProjection> = Vec::with_capacity(input.exit.year as usize);
    let mut prev_revenue = input.base_revenue;
    let mut prev_nwc = input.base_revenue * input.nwc_as_pct_revenue;
    let mut cash_balance = Decimal::ZERO;

    for year in 1..=input.exit.year {
        let yr_idx = (year - 1) as usize;

        let growth = get_rate(&input.revenue_growth, yr_idx);
        let revenue = prev_revenue * (Decimal::ONE + growth);
        let margin = get_rate(&input.ebitda_margin, yr_idx);
        let ebitda = revenue * margin;
        let da = revenue * input.da_as_pct_revenue;
        let ebit = ebitda - da;

        // Cash interest on actual opening balances; PIK capitalises
        let mut total_interest = Decimal::ZERO;
        for (i, tranche) in input.tranches.iter().enumerate() {
            total_interest += tranche_balances[i] * tranche_rates[i];
            if let Some(pik) = tranche.pik_rate {
                let pik_accrual = tranche_balances[i] * pik;
                tranche_balances[i] += pik_accrual;
            }
        }

        let ebt = ebit - total_interest;
        let tax = if ebt > Decimal::ZERO {
            ebt * input.tax_rate
        } else {
            Decimal::ZERO
        };
        let net_income = ebt - tax;

        let capex = revenue * input.capex_as_pct_revenue;
        let current_nwc = revenue * input.nwc_as_pct_revenue;
        let nwc_change = current_nwc - prev_nwc;

        let fcf_before_debt_service = net_income + da - capex - nwc_change;

        // Mandatory amortisation
        let mut mandatory_repayment = Decimal::ZERO;
        for (i, tranche) in input.tranches.iter().enumerate() {
            let repay = scheduled_repayment(tranche, year, tranche_balances[i]);
            tranche_balances[i] -= repay;
            mandatory_repayment += repay;
        }

        let fcf_after_mandatory = fcf_before_debt_service - mandatory_repayment;

        // Cash sweep: most junior tranche first, respecting minimum cash
        let mut optional_repayment = Decimal::ZERO;
        if cash_sweep_pct > Decimal::ZERO && fcf_after_mandatory > Decimal::ZERO {
            let sweep_amount = fcf_after_mandatory * cash_sweep_pct;
            let available_for_sweep =
                if cash_balance + fcf_after_mandatory - sweep_amount >= minimum_cash {
                    sweep_amount
                } else {
                    (cash_balance + fcf_after_mandatory - minimum_cash)
                        .max(Decimal::ZERO)
                        .min(sweep_amount)
                };

            let total_remaining: Money = tranche_balances.iter().sum();
            let mut remaining_sweep = available_for_sweep.min(total_remaining);

            if remaining_sweep > Decimal::ZERO {
                let mut indices: Vec<usize> = (0..input.tranches.len()).collect();
                indices.sort_by(|a, b| {
                    input.tranches[*b]
                        .seniority
                        .cmp(&input.tranches[*a].seniority)
                });
                for idx in indices {
                    if remaining_sweep <= Decimal::ZERO {
                        break;
                    }
                    let paydown = remaining_sweep.min(tranche_balances[idx]);
                    tranche_balances[idx] -= paydown;
                    remaining_sweep -= paydown;
                    optional_repayment += paydown;
                }
            }
        }

        cash_balance += fcf_after_mandatory - optional_repayment;
        if cash_balance < Decimal::ZERO {
            warnings.push(format!(
                "Year {year}: negative cash balance of {cash_balance}"
            ));
        }

        let total_debt: Money = tranche_balances.iter().sum();
        let net_debt = total_debt - cash_balance.max(Decimal::ZERO);

        projections.push(LboYearProjection {
            year,
            revenue,
            ebitda,
            ebit,
            less_interest: total_interest,
            ebt,
            tax,
            net_income,
            plus_da: da,
            less_capex: capex,
            less_nwc_change: nwc_change,
            fcf_before_debt_service,
            mandatory_repayment,
            optional_repayment,
            total_debt_outstanding: total_debt,
            net_debt,
            cash_balance,
        });

        prev_revenue = revenue;
        prev_nwc = current_nwc;
    }

    Ok((projections, debt_schedules, su_output, sponsor_outlay))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
