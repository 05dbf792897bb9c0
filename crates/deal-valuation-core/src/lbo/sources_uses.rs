use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::ValuationResult;

/// Default reconciliation tolerance on |sources - uses|.
const DEFAULT_TOLERANCE: Decimal = dec!(0.01);

/// What to do when total sources and total uses do not reconcile within
/// tolerance. Reject reports a structured mismatch; AutoBalance books a
/// single, explicitly labelled plug line. Never silent rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImbalancePolicy {
    #[default]
    Reject,
    AutoBalance,
}

/// Input for the Sources & Uses table of a leveraged transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesUsesInput {
    /// Entry-year EBITDA (LTM or projected)
    pub entry_ebitda: Money,
    /// Entry EV/EBITDA multiple; enterprise value is derived
    pub entry_multiple: Multiple,
    /// Sponsor equity contribution
    pub equity_contribution: Money,
    /// Debt tranches: (name, amount)
    pub debt_tranches: Vec<(String, Money)>,
    /// Transaction advisory fees as a percentage of enterprise value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_fee_pct: Option<Rate>,
    /// Debt financing/arrangement fees as a percentage of enterprise value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financing_fee_pct: Option<Rate>,
    /// Management equity rollover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_rollover: Option<Money>,
    /// Reconciliation tolerance; defaults to 0.01
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Money>,
    /// Behaviour when sources and uses do not reconcile
    #[serde(default)]
    pub on_imbalance: ImbalancePolicy,
}

/// Output for Sources & Uses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesUsesOutput {
    /// Derived enterprise value (entry EBITDA x entry multiple)
    pub enterprise_value: Money,
    /// All sources of funds
    pub sources: Vec<(String, Money)>,
    /// All uses of funds
    pub uses: Vec<(String, Money)>,
    pub total_sources: Money,
    pub total_uses: Money,
    /// Whether sources equal uses within tolerance
    pub balanced: bool,
    /// The single plug line booked under the AutoBalance policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balancing_adjustment: Option<(String, Money)>,
}

/// Build the Sources & Uses table for a leveraged transaction.
///
/// Invariant: total sources must equal total uses within tolerance. Under
/// the default Reject policy any residual is returned as a
/// `ReconciliationMismatch`; under AutoBalance exactly one labelled plug
/// line closes the gap and is reported in the output and warnings.
pub fn build_sources_uses(
    input: &SourcesUsesInput,
) -> ValuationResult<ComputationOutput<SourcesUsesOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

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
    if input.equity_contribution < Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "equity_contribution".into(),
            reason: "Equity contribution cannot be negative".into(),
        });
    }
    for pct in [input.transaction_fee_pct, input.financing_fee_pct]
        .into_iter()
        .flatten()
    {
        if pct < Decimal::ZERO || pct >= Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: "transaction_fee_pct / financing_fee_pct".into(),
                reason: "Fee percentages must be in [0, 1)".into(),
            });
        }
    }

    let enterprise_value = input.entry_ebitda * input.entry_multiple;

    // Build sources
    let mut sources: Vec<(String, Money)> = Vec::new();
    sources.push(("Sponsor Equity".into(), input.equity_contribution));

    for (name, amount) in &input.debt_tranches {
        if *amount < Decimal::ZERO {
            return Err(ValuationError::InvalidInput {
                field: format!("debt_tranche:{name}"),
                reason: "Debt tranche amount cannot be negative".into(),
            });
        }
        sources.push((name.clone(), *amount));
    }

    if let Some(rollover) = input.management_rollover {
        if rollover > Decimal::ZERO {
            sources.push(("Management Rollover".into(), rollover));
        }
    }

    // Build uses
    let mut uses: Vec<(String, Money)> = Vec::new();
    uses.push(("Enterprise Value".into(), enterprise_value));

    if let Some(pct) = input.transaction_fee_pct {
        if pct > Decimal::ZERO {
            uses.push(("Transaction Fees".into(), enterprise_value * pct));
        }
    }
    if let Some(pct) = input.financing_fee_pct {
        if pct > Decimal::ZERO {
            uses.push(("Financing Fees".into(), enterprise_value * pct));
        }
    }

    let mut total_sources: Money = sources.iter().map(|(_, v)| *v).sum();
    let mut total_uses: Money = uses.iter().map(|(_, v)| *v).sum();
    let tolerance = input.tolerance.unwrap_or(DEFAULT_TOLERANCE);
    let difference = total_sources - total_uses;

    let mut balancing_adjustment: Option<(String, Money)> = None;
    let balanced = if difference.abs() <= tolerance {
        true
    } else {
        match input.on_imbalance {
            ImbalancePolicy::Reject => {
                return Err(ValuationError::ReconciliationMismatch {
                    total_sources,
                    total_uses,
                    difference,
                    tolerance,
                });
            }
            ImbalancePolicy::AutoBalance => {
                let plug = difference.abs();
                if difference < Decimal::ZERO {
                    sources.push(("Balancing Equity Adjustment".into(), plug));
                    total_sources += plug;
                    warnings.push(format!(
                        "Sources fell {plug} short of uses; booked a balancing equity adjustment"
                    ));
                    balancing_adjustment = Some(("Balancing Equity Adjustment".into(), plug));
                } else {
                    uses.push(("Cash to Balance Sheet".into(), plug));
                    total_uses += plug;
                    warnings.push(format!(
                        "Sources exceeded uses by {plug}; booked the excess as cash to the balance sheet"
                    ));
                    balancing_adjustment = Some(("Cash to Balance Sheet".into(), plug));
                }
                true
            }
        }
    };

    let output = SourcesUsesOutput {
        enterprise_value,
        sources,
        uses,
        total_sources,
        total_uses,
        balanced,
        balancing_adjustment,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sources & Uses of Funds",
        &serde_json::json!({
            "entry_ebitda": input.entry_ebitda.to_string(),
            "entry_multiple": input.entry_multiple.to_string(),
            "equity": input.equity_contribution.to_string(),
            "policy": input.on_imbalance,
        }),
        warnings,
        elapsed,
        output,
    ))
}
