use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::time_value::{resolve_irr, xirr, IrrConfig, IrrMethod};
use crate::types::{with_metadata, CashFlow, ComputationOutput, Money, Multiple, Rate, Years};
use crate::ValuationResult;

/// Input for sponsor returns calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    /// Periodic cash flows (index 0 = initial investment, negative)
    pub cash_flows: Vec<Money>,
    /// Dated cash flows for XIRR calculation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dated_cash_flows: Option<Vec<CashFlow>>,
    /// Equity invested at entry
    pub entry_equity: Money,
    /// Equity received at exit
    pub exit_equity: Money,
    /// Holding period in years (for periodic IRR)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding_period_years: Option<Years>,
    /// Entry and exit dates (for XIRR and date-based holding period)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dates: Option<(NaiveDate, NaiveDate)>,
    /// IRR cascade configuration; defaults apply when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr: Option<IrrConfig>,
}

/// Output of sponsor returns calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsOutput {
    /// Internal Rate of Return (periodic), with the method that produced it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr_method: Option<IrrMethod>,
    /// Extended IRR (date-based)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xirr: Option<Rate>,
    /// Multiple on Invested Capital
    pub moic: Multiple,
    /// Cash-on-Cash return
    pub cash_on_cash: Multiple,
    /// Total equity invested
    pub total_invested: Money,
    /// Total equity returned
    pub total_returned: Money,
    /// Holding period in years
    pub holding_period: Years,
}

/// Calculate sponsor returns: IRR (via the fallback cascade), XIRR, MOIC
/// and cash-on-cash.
pub fn calculate_returns(
    input: &ReturnsInput,
) -> ValuationResult<ComputationOutput<ReturnsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.entry_equity <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "entry_equity".into(),
            reason: "Entry equity must be positive".into(),
        });
    }

    // Derive total invested and returned from cash flows when present,
    // otherwise use entry/exit equity directly
    let (total_invested, total_returned) = if input.cash_flows.is_empty() {
        (input.entry_equity, input.exit_equity)
    } else {
        let invested = input
            .cash_flows
            .iter()
            .filter(|cf| cf.is_sign_negative())
            .map(|cf| cf.abs())
            .sum::<Decimal>();
        let returned = input
            .cash_flows
            .iter()
            .filter(|cf| cf.is_sign_positive())
            .sum::<Decimal>();
        (invested, returned)
    };

    if total_invested.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "total_invested is zero".into(),
        });
    }

    let moic = total_returned / total_invested;
    let cash_on_cash = input.exit_equity / input.entry_equity;

    let holding_period = if let Some(hp) = input.holding_period_years {
        hp
    } else if let Some((entry, exit)) = input.dates {
        let days = (exit - entry).num_days();
        if days <= 0 {
            return Err(ValuationError::InvalidInput {
                field: "dates".into(),
                reason: "Exit date must be after entry date".into(),
            });
        }
        Decimal::from(days) / dec!(365.25)
    } else {
        let n = input.cash_flows.len();
        if n > 1 {
            Decimal::from((n - 1) as i64)
        } else {
            warnings.push("No holding period or dates provided; defaulting to 0".into());
            Decimal::ZERO
        }
    };

    // Periodic IRR through the cascade; the resolution method rides along
    let (irr_value, irr_method) = if input.cash_flows.len() >= 2 {
        let config = input.irr.clone().unwrap_or_default();
        let resolution = resolve_irr(&input.cash_flows, &config)?;
        for entry in &resolution.method_log {
            warnings.push(format!("[IRR] {entry}"));
        }
        (Some(resolution.rate), Some(resolution.method))
    } else {
        (None, None)
    };

    // XIRR from dated cash flows
    let xirr_value = if let Some(ref dated) = input.dated_cash_flows {
        if dated.len() >= 2 {
            let flows: Vec<(NaiveDate, Money)> =
                dated.iter().map(|cf| (cf.date, cf.amount)).collect();
            match xirr(&flows, dec!(0.10)) {
                Ok(r) => Some(r),
                Err(e) => {
                    warnings.push(format!("XIRR did not resolve: {e}"));
                    None
                }
            }
        } else {
            warnings.push("XIRR requires at least 2 dated cash flows".into());
            None
        }
    } else {
        None
    };

    let output = ReturnsOutput {
        irr: irr_value,
        irr_method,
        xirr: xirr_value,
        moic,
        cash_on_cash,
        total_invested,
        total_returned,
        holding_period,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sponsor Returns: IRR, XIRR, MOIC, Cash-on-Cash",
        &serde_json::json!({
            "entry_equity": input.entry_equity.to_string(),
            "exit_equity": input.exit_equity.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
