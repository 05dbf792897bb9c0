use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Currency, Money, Rate};
use crate::ValuationResult;

use super::distress::{score_distress, DistressInput, DistressScores};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioKind {
    Bear,
    Base,
    Bull,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioKind::Bear => write!(f, "Bear"),
            ScenarioKind::Base => write!(f, "Base"),
            ScenarioKind::Bull => write!(f, "Bull"),
        }
    }
}

/// One scenario's operating assumptions. Paths are per-year, one entry per
/// horizon year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioAssumptions {
    pub growth_path: Vec<Rate>,
    /// EBITDA margin per year
    pub margin_path: Vec<Rate>,
    /// Net working capital as a percentage of revenue. Bear carries the
    /// heaviest drag, Bull the lightest.
    pub nwc_pct_of_revenue: Rate,
}

/// Input for the three-scenario growth projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthScenarioInput {
    pub base_revenue: Money,
    pub horizon_years: u32,
    pub bear: ScenarioAssumptions,
    pub base: ScenarioAssumptions,
    pub bull: ScenarioAssumptions,
    /// Depreciation & amortisation as a percentage of revenue (shared)
    pub da_as_pct_revenue: Rate,
    /// Capital expenditure as a percentage of revenue (shared)
    pub capex_as_pct_revenue: Rate,
    pub tax_rate: Rate,
    /// Revenue / total assets; terminal assets derive from terminal revenue
    pub asset_turnover: Decimal,
    /// Retained earnings at the start of the projection
    pub base_retained_earnings: Money,
    /// Terminal total liabilities (shared across scenarios)
    pub terminal_liabilities: Money,
    pub currency: Currency,
}

/// A single projected year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioYear {
    pub year: u32,
    pub revenue: Money,
    pub ebitda: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub plus_da: Money,
    pub less_capex: Money,
    pub less_nwc_change: Money,
    pub fcf: Money,
}

/// A scenario's independently projected terminal balance sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalBalanceSheet {
    pub revenue: Money,
    pub ebitda: Money,
    pub ebit: Money,
    /// Free cash flow in the terminal year
    pub fcf: Money,
    /// Cumulative free cash flow over the horizon
    pub cumulative_fcf: Money,
    /// Terminal revenue / asset turnover
    pub total_assets: Money,
    /// Terminal revenue x the scenario's NWC percentage
    pub working_capital: Money,
    /// Base retained earnings + this scenario's cumulative FCF
    pub retained_earnings: Money,
    pub total_liabilities: Money,
    /// Total assets - total liabilities
    pub book_equity: Money,
}

/// One scenario's full projection with its distress scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioProjection {
    pub scenario: ScenarioKind,
    pub years: Vec<ScenarioYear>,
    pub terminal: TerminalBalanceSheet,
    pub distress: DistressScores,
}

/// All three scenarios with the cross-scenario ordering verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthScenarioOutput {
    pub bear: ScenarioProjection,
    pub base: ScenarioProjection,
    pub bull: ScenarioProjection,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Project a single scenario: revenue/margin path, free cash flow, terminal
/// balance sheet and distress scores.
pub fn project(
    input: &GrowthScenarioInput,
    scenario: ScenarioKind,
) -> ValuationResult<ComputationOutput<ScenarioProjection>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;
    let projection = project_scenario(input, scenario, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Growth Scenario Projection",
        &serde_json::json!({
            "scenario": scenario,
            "horizon_years": input.horizon_years,
            "base_revenue": input.base_revenue.to_string(),
        }),
        warnings,
        elapsed,
        projection,
    ))
}

/// Project Bear, Base and Bull and cross-check the ordering invariants:
/// terminal and cumulative free cash flow and the Z' score must ascend from
/// Bear to Bull, the bankruptcy probability must descend. A violation is a
/// structured error, never a silently emitted result.
pub fn compare_scenarios(
    input: &GrowthScenarioInput,
) -> ValuationResult<ComputationOutput<GrowthScenarioOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let bear = project_scenario(input, ScenarioKind::Bear, &mut warnings)?;
    let base = project_scenario(input, ScenarioKind::Base, &mut warnings)?;
    let bull = project_scenario(input, ScenarioKind::Bull, &mut warnings)?;

    check_ordering(
        "terminal free cash flow",
        bear.terminal.fcf,
        base.terminal.fcf,
        bull.terminal.fcf,
        true,
    )?;
    check_ordering(
        "cumulative free cash flow",
        bear.terminal.cumulative_fcf,
        base.terminal.cumulative_fcf,
        bull.terminal.cumulative_fcf,
        true,
    )?;
    check_ordering(
        "Z' score",
        bear.distress.z_prime_score,
        base.distress.z_prime_score,
        bull.distress.z_prime_score,
        true,
    )?;
    check_ordering(
        "bankruptcy probability",
        bear.distress.bankruptcy_probability,
        base.distress.bankruptcy_probability,
        bull.distress.bankruptcy_probability,
        false,
    )?;

    let output = GrowthScenarioOutput { bear, base, bull };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Bear/Base/Bull Scenario Comparison",
        &serde_json::json!({
            "horizon_years": input.horizon_years,
            "base_revenue": input.base_revenue.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &GrowthScenarioInput) -> ValuationResult<()> {
    if input.base_revenue <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "base_revenue".into(),
            reason: "Base revenue must be positive".into(),
        });
    }
    if input.horizon_years == 0 {
        return Err(ValuationError::InvalidInput {
            field: "horizon_years".into(),
            reason: "Horizon must be at least 1 year".into(),
        });
    }
    if input.tax_rate < Decimal::ZERO || input.tax_rate > Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "tax_rate".into(),
            reason: "Tax rate must be between 0 and 1".into(),
        });
    }
    if input.asset_turnover <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "asset_turnover".into(),
            reason: "Asset turnover must be positive".into(),
        });
    }
    if input.terminal_liabilities <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "terminal_liabilities".into(),
            reason: "Terminal liabilities must be positive".into(),
        });
    }

    let horizon = input.horizon_years as usize;
    for (name, scenario) in [
        ("bear", &input.bear),
        ("base", &input.base),
        ("bull", &input.bull),
    ] {
        if scenario.growth_path.len() != horizon {
            return Err(ValuationError::InvalidInput {
                field: format!("{name}.growth_path"),
                reason: format!("Expected {horizon} entries, got {}", scenario.growth_path.len()),
            });
        }
        if scenario.margin_path.len() != horizon {
            return Err(ValuationError::InvalidInput {
                field: format!("{name}.margin_path"),
                reason: format!("Expected {horizon} entries, got {}", scenario.margin_path.len()),
            });
        }
        for (idx, g) in scenario.growth_path.iter().enumerate() {
            if *g <= Decimal::NEGATIVE_ONE {
                return Err(ValuationError::InvalidInput {
                    field: format!("{name}.growth_path[{idx}]"),
                    reason: "Growth must be above -100%".into(),
                });
            }
        }
        for (idx, m) in scenario.margin_path.iter().enumerate() {
            if *m <= Decimal::ZERO || *m >= Decimal::ONE {
                return Err(ValuationError::InvalidInput {
                    field: format!("{name}.margin_path[{idx}]"),
                    reason: "EBITDA margin must be between 0 and 1 (exclusive)".into(),
                });
            }
        }
        if scenario.nwc_pct_of_revenue < Decimal::ZERO || scenario.nwc_pct_of_revenue >= Decimal::ONE
        {
            return Err(ValuationError::InvalidInput {
                field: format!("{name}.nwc_pct_of_revenue"),
                reason: "NWC percentage must be in [0, 1)".into(),
            });
        }
    }

    // The ordering invariant is built into the assumptions: Bear never
    // outgrows or out-earns Base, Base never outgrows Bull, and the working
    // capital drag runs the other way.
    for year in 0..horizon {
        let (gb, gm, gu) = (
            input.bear.growth_path[year],
            input.base.growth_path[year],
            input.bull.growth_path[year],
        );
        if gb > gm || gm > gu {
            return Err(ValuationError::InvalidInput {
                field: format!("growth_path[{year}]"),
                reason: format!(
                    "Scenario growth must satisfy Bear <= Base <= Bull, got {gb} / {gm} / {gu}"
                ),
            });
        }
        let (mb, mm, mu) = (
            input.bear.margin_path[year],
            input.base.margin_path[year],
            input.bull.margin_path[year],
        );
        if mb > mm || mm > mu {
            return Err(ValuationError::InvalidInput {
                field: format!("margin_path[{year}]"),
                reason: format!(
                    "Scenario margins must satisfy Bear <= Base <= Bull, got {mb} / {mm} / {mu}"
                ),
            });
        }
    }
    if input.bear.nwc_pct_of_revenue < input.base.nwc_pct_of_revenue
        || input.base.nwc_pct_of_revenue < input.bull.nwc_pct_of_revenue
    {
        return Err(ValuationError::InvalidInput {
            field: "nwc_pct_of_revenue".into(),
            reason: format!(
                "Working-capital drag must satisfy Bear >= Base >= Bull, got {} / {} / {}",
                input.bear.nwc_pct_of_revenue,
                input.base.nwc_pct_of_revenue,
                input.bull.nwc_pct_of_revenue
            ),
        });
    }

    Ok(())
}

fn assumptions_for(input: &GrowthScenarioInput, scenario: ScenarioKind) -> &ScenarioAssumptions {
    match scenario {
        ScenarioKind::Bear => &input.bear,
        ScenarioKind::Base => &input.base,
        ScenarioKind::Bull => &input.bull,
    }
}

fn project_scenario(
    input: &GrowthScenarioInput,
    scenario: ScenarioKind,
    warnings: &mut Vec<String>,
) -> ValuationResult<ScenarioProjection> {
    let assumptions = assumptions_for(input, scenario);
    let nwc_pct = assumptions.nwc_pct_of_revenue;

    let mut years = Vec::with_capacity(input.horizon_years as usize);
    let mut prev_revenue = input.base_revenue;
    let mut prev_nwc = input.base_revenue * nwc_pct;
    let mut cumulative_fcf = Decimal::ZERO;

    for year_idx in 0..input.horizon_years as usize {
        let growth = assumptions.growth_path[year_idx];
        let margin = assumptions.margin_path[year_idx];

        let revenue = prev_revenue * (Decimal::ONE + growth);
        let ebitda = revenue * margin;
        let da = revenue * input.da_as_pct_revenue;
        let ebit = ebitda - da;
        let nopat = ebit * (Decimal::ONE - input.tax_rate);
        let capex = revenue * input.capex_as_pct_revenue;
        let current_nwc = revenue * nwc_pct;
        let nwc_change = current_nwc - prev_nwc;
        let fcf = nopat + da - capex - nwc_change;

        cumulative_fcf += fcf;

        years.push(ScenarioYear {
            year: (year_idx + 1) as u32,
            revenue,
            ebitda,
            ebit,
            nopat,
            plus_da: da,
            less_capex: capex,
            less_nwc_change: nwc_change,
            fcf,
        });

        prev_revenue = revenue;
        prev_nwc = current_nwc;
    }

    // Paths validated non-empty (horizon >= 1)
    let last = years.last().unwrap();

    // This scenario's own terminal balance sheet; never a shared baseline
    let total_assets = last.revenue / input.asset_turnover;
    let working_capital = last.revenue * nwc_pct;
    let retained_earnings = input.base_retained_earnings + cumulative_fcf;
    let book_equity = total_assets - input.terminal_liabilities;

    if book_equity <= Decimal::ZERO {
        warnings.push(format!(
            "{scenario}: terminal book equity is not positive ({book_equity}); \
             liabilities exceed projected assets"
        ));
    }

    let terminal = TerminalBalanceSheet {
        revenue: last.revenue,
        ebitda: last.ebitda,
        ebit: last.ebit,
        fcf: last.fcf,
        cumulative_fcf,
        total_assets,
        working_capital,
        retained_earnings,
        total_liabilities: input.terminal_liabilities,
        book_equity,
    };

    let distress = score_distress(&DistressInput {
        working_capital: terminal.working_capital,
        total_assets: terminal.total_assets,
        retained_earnings: terminal.retained_earnings,
        ebit: terminal.ebit,
        revenue: terminal.revenue,
        total_liabilities: terminal.total_liabilities,
        book_equity: terminal.book_equity,
        net_income: last.nopat,
    })?;

    Ok(ScenarioProjection {
        scenario,
        years,
        terminal,
        distress,
    })
}

fn check_ordering(
    metric: &str,
    bear: Decimal,
    base: Decimal,
    bull: Decimal,
    ascending: bool,
) -> ValuationResult<()> {
    let holds = if ascending {
        bear <= base && base <= bull
    } else {
        bear >= base && base >= bull
    };
    if !holds {
        return Err(ValuationError::InvalidInput {
            field: "scenarios".into(),
            reason: format!(
                "Cross-scenario {metric} ordering violated (Bear {bear}, Base {base}, Bull {bull}); \
                 the scenario assumptions are economically inconsistent"
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
