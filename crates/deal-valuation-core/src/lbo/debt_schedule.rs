use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

/// Amortisation profile for a debt tranche
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AmortisationType {
    /// No repayment until maturity (bullet repayment at end)
    Bullet,
    /// Fixed percentage of original principal per year
    StraightLine(Rate),
    /// Custom repayment schedule (one amount per year)
    Custom(Vec<Money>),
}

/// A single debt tranche in the capital structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtTrancheInput {
    pub name: String,
    pub amount: Money,
    /// Fixed coupon, or the all-in rate fallback for floating tranches
    pub interest_rate: Rate,
    pub is_floating: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_rate: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<Rate>,
    pub amortisation: AmortisationType,
    pub maturity_years: u32,
    /// Payment-in-kind rate, capitalised onto the balance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pik_rate: Option<Rate>,
    /// 1 = most senior. Cash sweeps repay the most junior tranche first.
    pub seniority: u32,
}

/// A single period in the debt schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub year: u32,
    pub opening_balance: Money,
    pub interest: Money,
    pub pik_interest: Money,
    pub scheduled_repayment: Money,
    pub closing_balance: Money,
}

/// Output for a single tranche debt schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleOutput {
    pub tranche_name: String,
    pub periods: Vec<DebtPeriod>,
    pub total_interest_paid: Money,
    pub total_principal_paid: Money,
}

/// Effective cash interest rate for a tranche.
pub(crate) fn effective_rate(tranche: &DebtTrancheInput, warnings: &mut Vec<String>) -> Rate {
    if tranche.is_floating {
        let base = tranche.base_rate.unwrap_or_else(|| {
            warnings.push(format!(
                "Floating tranche '{}' missing base_rate; using 0",
                tranche.name
            ));
            Decimal::ZERO
        });
        let spread = tranche.spread.unwrap_or_else(|| {
            warnings.push(format!(
                "Floating tranche '{}' missing spread; using interest_rate",
                tranche.name
            ));
            tranche.interest_rate
        });
        base + spread
    } else {
        tranche.interest_rate
    }
}

/// Build a year-by-year schedule for a single tranche under its scheduled
/// amortisation only (cash sweeps are applied by the LBO model on top).
pub fn build_debt_schedule(
    input: &DebtTrancheInput,
) -> ValuationResult<ComputationOutput<DebtScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.amount <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: format!("tranche:{}:amount", input.name),
            reason: "Debt amount must be positive".into(),
        });
    }
    if input.maturity_years == 0 {
        return Err(ValuationError::InvalidInput {
            field: format!("tranche:{}:maturity_years", input.name),
            reason: "Maturity must be at least 1 year".into(),
        });
    }
    if let AmortisationType::StraightLine(pct) = &input.amortisation {
        if *pct < Decimal::ZERO || *pct > Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: format!("tranche:{}:amortisation", input.name),
                reason: "Straight-line percentage must be between 0 and 1".into(),
            });
        }
    }

    let rate = effective_rate(input, &mut warnings);
    let pik_rate = input.pik_rate.unwrap_or(Decimal::ZERO);
    let original_amount = input.amount;

    let mut periods = Vec::with_capacity(input.maturity_years as usize);
    let mut balance = input.amount;
    let mut total_interest_paid = Decimal::ZERO;
    let mut total_principal_paid = Decimal::ZERO;

    for year in 1..=input.maturity_years {
        let opening = balance;

        // Cash interest on the opening balance; PIK capitalises on top
        let interest = opening * rate;
        let pik_interest = opening * pik_rate;
        total_interest_paid += interest;
        balance += pik_interest;

        let repayment = match &input.amortisation {
            AmortisationType::Bullet => {
                if year == input.maturity_years {
                    balance
                } else {
                    Decimal::ZERO
                }
            }
            AmortisationType::StraightLine(pct) => {
                if year == input.maturity_years {
                    // Final year clears whatever remains
                    balance
                } else {
                    (original_amount * pct).min(balance)
                }
            }
            AmortisationType::Custom(schedule) => {
                if year == input.maturity_years {
                    balance
                } else {
                    let idx = (year - 1) as usize;
                    schedule
                        .get(idx)
                        .copied()
                        .unwrap_or(Decimal::ZERO)
                        .min(balance)
                }
            }
        };

        balance -= repayment;
        total_principal_paid += repayment;

        periods.push(DebtPeriod {
            year,
            opening_balance: opening,
            interest,
            pik_interest,
            scheduled_repayment: repayment,
            closing_balance: balance,
        });
    }

    if balance.abs() > Decimal::ZERO {
        warnings.push(format!(
            "Tranche '{}' carries a residual balance of {balance} past maturity",
            input.name
        ));
    }

    let output = DebtScheduleOutput {
        tranche_name: input.name.clone(),
        periods,
        total_interest_paid,
        total_principal_paid,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Debt Tranche Schedule",
        &serde_json::json!({
            "tranche": input.name,
            "amount": input.amount.to_string(),
            "maturity_years": input.maturity_years,
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tranche(amortisation: AmortisationType) -> DebtTrancheInput {
        DebtTrancheInput {
            name: "Senior Term Loan".into(),
            amount: dec!(1000),
            interest_rate: dec!(0.06),
            is_floating: false,
            base_rate: None,
            spread: None,
            amortisation,
            maturity_years: 5,
            pik_rate: None,
            seniority: 1,
        }
    }

    #[test]
    fn test_bullet_schedule() {
        let result = build_debt_schedule(&tranche(AmortisationType::Bullet)).unwrap();
        let out = &result.result;

        assert_eq!(out.periods.len(), 5);
        // No repayment before maturity
        for p in &out.periods[..4] {
            assert_eq!(p.scheduled_repayment, Decimal::ZERO);
            assert_eq!(p.interest, dec!(60));
        }
        // Full repayment at maturity
        assert_eq!(out.periods[4].scheduled_repayment, dec!(1000));
        assert_eq!(out.periods[4].closing_balance, Decimal::ZERO);
        assert_eq!(out.total_interest_paid, dec!(300));
        assert_eq!(out.total_principal_paid, dec!(1000));
    }

    #[test]
    fn test_straight_line_schedule() {
        let result =
            build_debt_schedule(&tranche(AmortisationType::StraightLine(dec!(0.10)))).unwrap();
        let out = &result.result;

        // 10% of original per year, remainder at maturity
        assert_eq!(out.periods[0].scheduled_repayment, dec!(100));
        assert_eq!(out.periods[0].closing_balance, dec!(900));
        assert_eq!(out.periods[1].interest, dec!(54)); // 900 * 6%
        assert_eq!(out.periods[4].scheduled_repayment, dec!(600));
        assert_eq!(out.periods[4].closing_balance, Decimal::ZERO);
        assert_eq!(out.total_principal_paid, dec!(1000));
    }

    #[test]
    fn test_custom_schedule() {
        let schedule = vec![dec!(50), dec!(100), dec!(150), dec!(200)];
        let result = build_debt_schedule(&tranche(AmortisationType::Custom(schedule))).unwrap();
        let out = &result.result;

        assert_eq!(out.periods[0].scheduled_repayment, dec!(50));
        assert_eq!(out.periods[2].scheduled_repayment, dec!(150));
        // Final year clears the remaining 500
        assert_eq!(out.periods[4].scheduled_repayment, dec!(500));
        assert_eq!(out.total_principal_paid, dec!(1000));
    }

    #[test]
    fn test_pik_capitalises() {
        let mut t = tranche(AmortisationType::Bullet);
        t.pik_rate = Some(dec!(0.02));
        let result = build_debt_schedule(&t).unwrap();
        let out = &result.result;

        // Year 1: balance grows to 1020 before repayment
        assert_eq!(out.periods[0].pik_interest, dec!(20));
        assert_eq!(out.periods[0].closing_balance, dec!(1020));
        // Year 2 cash interest on the grown balance
        assert_eq!(out.periods[1].interest, dec!(61.20));
        // Bullet at maturity clears everything
        assert_eq!(out.periods[4].closing_balance, Decimal::ZERO);
    }

    #[test]
    fn test_floating_rate() {
        let mut t = tranche(AmortisationType::Bullet);
        t.is_floating = true;
        t.base_rate = Some(dec!(0.04));
        t.spread = Some(dec!(0.035));
        let result = build_debt_schedule(&t).unwrap();

        // 7.5% on 1000
        assert_eq!(result.result.periods[0].interest, dec!(75));
    }

    #[test]
    fn test_floating_missing_base_warns() {
        let mut t = tranche(AmortisationType::Bullet);
        t.is_floating = true;
        t.spread = Some(dec!(0.05));
        let result = build_debt_schedule(&t).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("base_rate")));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut t = tranche(AmortisationType::Bullet);
        t.amount = Decimal::ZERO;
        assert!(build_debt_schedule(&t).is_err());
    }

    #[test]
    fn test_zero_maturity_rejected() {
        let mut t = tranche(AmortisationType::Bullet);
        t.maturity_years = 0;
        assert!(build_debt_schedule(&t).is_err());
    }
}
