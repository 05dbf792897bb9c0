use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::sensitivity::{evaluate_grid, SensitivityGrid};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, SensitivityAxis};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How the acquirer pays: fractions of deal value funded with balance-sheet
/// cash, newly issued stock, and new debt. Must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsiderationMix {
    pub cash_pct: Rate,
    pub stock_pct: Rate,
    pub debt_pct: Rate,
}

impl ConsiderationMix {
    pub fn all_cash() -> Self {
        ConsiderationMix {
            cash_pct: Decimal::ONE,
            stock_pct: Decimal::ZERO,
            debt_pct: Decimal::ZERO,
        }
    }

    pub fn all_stock() -> Self {
        ConsiderationMix {
            cash_pct: Decimal::ZERO,
            stock_pct: Decimal::ONE,
            debt_pct: Decimal::ZERO,
        }
    }

    pub fn all_debt() -> Self {
        ConsiderationMix {
            cash_pct: Decimal::ZERO,
            stock_pct: Decimal::ZERO,
            debt_pct: Decimal::ONE,
        }
    }
}

/// Inputs for an accretion / dilution merger analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergerInput {
    // --- Acquirer ---
    pub acquirer_name: String,
    pub acquirer_net_income: Money,
    pub acquirer_shares_outstanding: Decimal,
    pub acquirer_share_price: Money,
    pub acquirer_tax_rate: Rate,

    // --- Target ---
    pub target_name: String,
    pub target_net_income: Money,
    pub target_shares_outstanding: Decimal,
    pub target_share_price: Money,

    // --- Deal terms ---
    /// Offer premium over the target's share price (0.25 = 25%)
    pub offer_premium_pct: Rate,
    pub consideration: ConsiderationMix,

    // --- Synergies ---
    /// Pre-tax revenue synergies expected (annual run-rate).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_synergies: Option<Money>,
    /// Pre-tax cost synergies expected (annual run-rate).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_synergies: Option<Money>,
    /// Fraction of synergies realised in year 1 (0..=1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synergy_phase_in_pct: Option<Rate>,
    /// One-time integration / restructuring costs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_costs: Option<Money>,

    // --- Financing ---
    /// Interest rate on new debt raised for the debt-funded portion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_financing_rate: Option<Rate>,
    /// Yield foregone on balance-sheet cash spent on the cash portion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foregone_cash_yield: Option<Rate>,

    // --- Optional adjustments ---
    /// Annual goodwill amortisation charge (non-cash, pre-tax).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goodwill_amortisation: Option<Money>,
    /// One-time transaction / advisory fees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_fees: Option<Money>,
}

/// Pro-forma combined financials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProFormaFinancials {
    /// Offer price per target share (target price grossed up by the premium)
    pub offer_price_per_share: Money,
    /// Total deal value (offer price * target shares).
    pub deal_value: Money,
    /// Absolute premium per share.
    pub premium_amount: Money,
    /// Acquirer standalone EPS before the deal.
    pub acquirer_eps_standalone: Money,
    /// Combined net income before synergies / adjustments.
    pub combined_net_income: Money,
    /// After-tax financing cost of the cash- and debt-funded portions.
    pub financing_cost: Money,
    /// Net synergy contribution to earnings (after tax, net of costs).
    pub synergy_impact: Money,
    /// Pro-forma net income after all adjustments.
    pub pro_forma_net_income: Money,
    /// Exchange ratio (offer price / acquirer share price); stock deals only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_ratio: Option<Decimal>,
    /// New shares issued to target shareholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_shares_issued: Option<Decimal>,
    /// Pro-forma total shares outstanding.
    pub pro_forma_shares: Decimal,
    /// Pro-forma EPS.
    pub pro_forma_eps: Money,
}

/// Direction of the EPS impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealDirection {
    Accretive,
    Dilutive,
    Neutral,
}

impl std::fmt::Display for DealDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DealDirection::Accretive => write!(f, "Accretive"),
            DealDirection::Dilutive => write!(f, "Dilutive"),
            DealDirection::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Accretion / dilution to acquirer EPS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccretionDilution {
    /// Absolute change in EPS.
    pub eps_change: Money,
    /// Percentage change in EPS (decimal).
    pub pct: Rate,
    pub direction: DealDirection,
}

/// Results of the merger analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergerOutput {
    pub pro_forma: ProFormaFinancials,
    pub accretion_dilution: AccretionDilution,
    /// Pre-tax synergies required for an EPS-neutral deal.
    pub breakeven_synergies: Money,
    /// Attached premium x stock-mix grid of accretion/dilution percentages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<SensitivityGrid>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Combine the two companies under the deal terms: deal value, financing,
/// synergies, share issuance and pro-forma EPS.
pub fn pro_forma(input: &MergerInput) -> ValuationResult<ComputationOutput<ProFormaFinancials>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;
    let output = compute_pro_forma(input, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Pro-Forma Merger Combination",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Accretion / dilution of pro-forma EPS against the standalone EPS.
pub fn accretion_dilution(
    pro_forma_eps: Money,
    standalone_eps: Money,
) -> ValuationResult<AccretionDilution> {
    if standalone_eps.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "standalone EPS is zero".into(),
        });
    }
    let eps_change = pro_forma_eps - standalone_eps;
    let pct = eps_change / standalone_eps;
    let direction = if eps_change.is_zero() {
        DealDirection::Neutral
    } else if eps_change > Decimal::ZERO {
        DealDirection::Accretive
    } else {
        DealDirection::Dilutive
    };
    Ok(AccretionDilution {
        eps_change,
        pct,
        direction,
    })
}

/// Full accretion / dilution analysis: pro-forma combination, EPS impact
/// and breakeven synergies.
pub fn analyze_merger(input: &MergerInput) -> ValuationResult<ComputationOutput<MergerOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;
    let pf = compute_pro_forma(input, &mut warnings)?;
    let ad = accretion_dilution(pf.pro_forma_eps, pf.acquirer_eps_standalone)?;
    let breakeven_synergies = compute_breakeven_synergies(
        input,
        pf.combined_net_income,
        pf.financing_cost,
        pf.acquirer_eps_standalone,
        pf.pro_forma_shares,
    );

    let output = MergerOutput {
        pro_forma: pf,
        accretion_dilution: ad,
        breakeven_synergies,
        sensitivity: None,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "M&A Accretion/Dilution Analysis",
        &serde_json::json!({
            "acquirer": input.acquirer_name,
            "target": input.target_name,
            "premium": input.offer_premium_pct.to_string(),
            "consideration": &input.consideration,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Deal-structure sensitivity: offer premium x stock fraction of the
/// consideration, reporting the accretion/dilution percentage. The non-stock
/// remainder keeps the base case's cash/debt proportions.
pub fn merger_sensitivity(
    input: &MergerInput,
    premium_axis: &SensitivityAxis,
    stock_mix_axis: &SensitivityAxis,
) -> ValuationResult<ComputationOutput<SensitivityGrid>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let base_cash = input.consideration.cash_pct;
    let base_debt = input.consideration.debt_pct;
    let non_stock = base_cash + base_debt;
    let (cash_share, debt_share) = if non_stock.is_zero() {
        warnings.push(
            "Base consideration is all stock; the non-stock remainder of the sweep is funded with cash"
                .into(),
        );
        (Decimal::ONE, Decimal::ZERO)
    } else {
        (base_cash / non_stock, base_debt / non_stock)
    };

    let (grid, grid_warnings) = evaluate_grid(
        premium_axis,
        stock_mix_axis,
        "EPS Accretion/Dilution %",
        |premium, stock_pct| {
            if stock_pct < Decimal::ZERO || stock_pct > Decimal::ONE {
                return Err(ValuationError::InvalidInput {
                    field: "stock_pct".into(),
                    reason: "Stock fraction must be between 0 and 1".into(),
                });
            }
            let remainder = Decimal::ONE - stock_pct;
            let mut cell_input = input.clone();
            cell_input.offer_premium_pct = premium;
            cell_input.consideration = ConsiderationMix {
                cash_pct: remainder * cash_share,
                stock_pct,
                debt_pct: remainder * debt_share,
            };
            validate_input(&cell_input)?;
            let mut cell_warnings = Vec::new();
            let pf = compute_pro_forma(&cell_input, &mut cell_warnings)?;
            Ok(accretion_dilution(pf.pro_forma_eps, pf.acquirer_eps_standalone)?.pct)
        },
    )?;
    warnings.extend(grid_warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Merger Sensitivity Grid (premium x stock mix)",
        &serde_json::json!({
            "premium_axis": premium_axis,
            "stock_mix_axis": stock_mix_axis,
        }),
        warnings,
        elapsed,
        grid,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &MergerInput) -> ValuationResult<()> {
    if input.acquirer_shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "acquirer_shares_outstanding".into(),
            reason: "Acquirer shares outstanding must be positive".into(),
        });
    }
    if input.target_shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "target_shares_outstanding".into(),
            reason: "Target shares outstanding must be positive".into(),
        });
    }
    if input.acquirer_share_price <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "acquirer_share_price".into(),
            reason: "Acquirer share price must be positive".into(),
        });
    }
    if input.target_share_price <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "target_share_price".into(),
            reason: "Target share price must be positive".into(),
        });
    }
    if input.offer_premium_pct <= dec!(-1) {
        return Err(ValuationError::InvalidInput {
            field: "offer_premium_pct".into(),
            reason: "Premium must be above -100%".into(),
        });
    }
    if input.acquirer_tax_rate < Decimal::ZERO || input.acquirer_tax_rate > Decimal::ONE {
        return Err(ValuationError::InvalidInput {
            field: "acquirer_tax_rate".into(),
            reason: "Tax rate must be between 0 and 1".into(),
        });
    }

    let mix = &input.consideration;
    for (name, pct) in [
        ("cash_pct", mix.cash_pct),
        ("stock_pct", mix.stock_pct),
        ("debt_pct", mix.debt_pct),
    ] {
        if pct < Decimal::ZERO || pct > Decimal::ONE {
            return Err(ValuationError::InvalidInput {
                field: format!("consideration.{name}"),
                reason: "Consideration fractions must be between 0 and 1".into(),
            });
        }
    }
    let mix_sum = mix.cash_pct + mix.stock_pct + mix.debt_pct;
    if (mix_sum - Decimal::ONE).abs() > dec!(0.000001) {
        return Err(ValuationError::InvalidInput {
            field: "consideration".into(),
            reason: format!("Consideration mix must sum to 1.0, got {mix_sum}"),
        });
    }

    Ok(())
}

fn compute_pro_forma(
    input: &MergerInput,
    warnings: &mut Vec<String>,
) -> ValuationResult<ProFormaFinancials> {
    let zero = Decimal::ZERO;

    // --- Deal value & premium ---
    let offer_price_per_share =
        input.target_share_price * (Decimal::ONE + input.offer_premium_pct);
    let deal_value = offer_price_per_share * input.target_shares_outstanding;
    let premium_amount = offer_price_per_share - input.target_share_price;

    if input.offer_premium_pct < zero {
        warnings.push("Offer price is below current target share price (negative premium)".into());
    }

    // --- Acquirer standalone EPS ---
    let acquirer_eps_standalone = input.acquirer_net_income / input.acquirer_shares_outstanding;

    // --- Financing cost of the cash- and debt-funded portions ---
    let after_tax = Decimal::ONE - input.acquirer_tax_rate;
    let mix = &input.consideration;

    let debt_portion = deal_value * mix.debt_pct;
    let cash_portion = deal_value * mix.cash_pct;

    if debt_portion > zero && input.debt_financing_rate.is_none() {
        warnings.push("Debt-funded portion with no debt_financing_rate; its cost is zero".into());
    }
    if cash_portion > zero && input.foregone_cash_yield.is_none() {
        warnings.push("Cash-funded portion with no foregone_cash_yield; its cost is zero".into());
    }

    let financing_cost = debt_portion
        * input.debt_financing_rate.unwrap_or(zero)
        * after_tax
        + cash_portion * input.foregone_cash_yield.unwrap_or(zero) * after_tax;

    // --- Stock component ---
    let (exchange_ratio, new_shares_issued) = if mix.stock_pct > zero {
        let ratio = offer_price_per_share / input.acquirer_share_price;
        let new_shares = input.target_shares_outstanding * ratio * mix.stock_pct;
        (Some(ratio), Some(new_shares))
    } else {
        (None, None)
    };
    let pro_forma_shares =
        input.acquirer_shares_outstanding + new_shares_issued.unwrap_or(zero);

    // --- Earnings ---
    let combined_net_income = input.acquirer_net_income + input.target_net_income;
    let synergy_impact = compute_synergy_impact(input, warnings);
    let pro_forma_net_income = combined_net_income - financing_cost + synergy_impact;
    let pro_forma_eps = pro_forma_net_income / pro_forma_shares;

    Ok(ProFormaFinancials {
        offer_price_per_share,
        deal_value,
        premium_amount,
        acquirer_eps_standalone,
        combined_net_income,
        financing_cost,
        synergy_impact,
        pro_forma_net_income,
        exchange_ratio,
        new_shares_issued,
        pro_forma_shares,
        pro_forma_eps,
    })
}

/// Net after-tax synergy impact on earnings.
///
/// Synergy impact = (cost_synergies + revenue_synergies) * phase_in_pct
///                  * (1 - tax_rate) - integration_costs
///                  - goodwill_amortisation - transaction_fees
fn compute_synergy_impact(input: &MergerInput, warnings: &mut Vec<String>) -> Money {
    let zero = Decimal::ZERO;

    let gross_synergies =
        input.cost_synergies.unwrap_or(zero) + input.revenue_synergies.unwrap_or(zero);
    let phase_in = input.synergy_phase_in_pct.unwrap_or(Decimal::ONE);

    let after_tax_synergies =
        gross_synergies * phase_in * (Decimal::ONE - input.acquirer_tax_rate);

    let integration = input.integration_costs.unwrap_or(zero);
    let goodwill = input.goodwill_amortisation.unwrap_or(zero);
    let fees = input.transaction_fees.unwrap_or(zero);

    if gross_synergies == zero && (integration > zero || goodwill > zero || fees > zero) {
        warnings.push("No synergies specified but integration costs / fees are present".into());
    }

    after_tax_synergies - integration - goodwill - fees
}

/// Pre-tax synergy amount that would make the deal EPS-neutral.
///
/// Setting pro_forma_EPS = standalone_EPS and solving for gross synergies S:
///
/// S = [ standalone_EPS * pro_forma_shares - combined_NI + financing_cost
///       + integration + goodwill + fees ] / [ phase_in * (1 - tax_rate) ]
fn compute_breakeven_synergies(
    input: &MergerInput,
    combined_ni: Money,
    financing_cost: Money,
    standalone_eps: Money,
    pro_forma_shares: Decimal,
) -> Money {
    let zero = Decimal::ZERO;

    let phase_in = input.synergy_phase_in_pct.unwrap_or(Decimal::ONE);
    let after_tax_multiplier = (Decimal::ONE - input.acquirer_tax_rate) * phase_in;
    if after_tax_multiplier == zero {
        return zero;
    }

    let integration = input.integration_costs.unwrap_or(zero);
    let goodwill = input.goodwill_amortisation.unwrap_or(zero);
    let fees = input.transaction_fees.unwrap_or(zero);

    let target_ni = standalone_eps * pro_forma_shares;
    let numerator = target_ni - combined_ni + financing_cost + integration + goodwill + fees;
    let breakeven = numerator / after_tax_multiplier;

    // Negative breakeven means the deal is accretive without synergies
    breakeven.max(zero)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Base deal: offer 25 on a 20 target price (25% premium), acquirer
    /// P/E 10x, target P/E at offer 12.5x.
    fn base_input() -> MergerInput {
        MergerInput {
            acquirer_name: "AcquirerCo".into(),
            acquirer_net_income: dec!(500),
            acquirer_shares_outstanding: dec!(100),
            acquirer_share_price: dec!(50),
            acquirer_tax_rate: dec!(0.25),

            target_name: "TargetCo".into(),
            target_net_income: dec!(100),
            target_shares_outstanding: dec!(50),
            target_share_price: dec!(20),

            offer_premium_pct: dec!(0.25),
            consideration: ConsiderationMix::all_debt(),

            revenue_synergies: None,
            cost_synergies: None,
            synergy_phase_in_pct: None,
            integration_costs: None,

            debt_financing_rate: Some(dec!(0.05)),
            foregone_cash_yield: None,

            goodwill_amortisation: None,
            transaction_fees: None,
        }
    }

    #[test]
    fn test_all_debt_accretive() {
        // Target earnings yield at offer (100/1250 = 8%) exceeds the
        // after-tax debt cost (5% * 0.75 = 3.75%): accretive
        let result = analyze_merger(&base_input()).unwrap();
        let out = &result.result;
        let pf = &out.pro_forma;

        assert_eq!(pf.offer_price_per_share, dec!(25));
        assert_eq!(pf.deal_value, dec!(1250));
        assert_eq!(pf.premium_amount, dec!(5));
        assert_eq!(pf.financing_cost, dec!(46.875));
        assert_eq!(pf.combined_net_income, dec!(600));
        assert_eq!(pf.pro_forma_net_income, dec!(553.125));
        assert_eq!(pf.pro_forma_shares, dec!(100));
        assert!(pf.new_shares_issued.is_none());
        assert_eq!(pf.acquirer_eps_standalone, dec!(5));
        assert_eq!(pf.pro_forma_eps, dec!(5.53125));

        assert_eq!(out.accretion_dilution.direction, DealDirection::Accretive);
        assert!(out.accretion_dilution.pct > Decimal::ZERO);
    }

    #[test]
    fn test_all_stock_dilutive() {
        // Target P/E at offer (12.5x) above acquirer P/E (10x): dilutive
        let mut input = base_input();
        input.consideration = ConsiderationMix::all_stock();

        let result = analyze_merger(&input).unwrap();
        let out = &result.result;
        let pf = &out.pro_forma;

        assert_eq!(pf.exchange_ratio.unwrap(), dec!(0.5));
        assert_eq!(pf.new_shares_issued.unwrap(), dec!(25));
        assert_eq!(pf.pro_forma_shares, dec!(125));
        assert_eq!(pf.financing_cost, Decimal::ZERO);
        assert_eq!(pf.pro_forma_net_income, dec!(600));
        assert_eq!(pf.pro_forma_eps, dec!(4.8));

        assert_eq!(out.accretion_dilution.direction, DealDirection::Dilutive);
        assert_eq!(out.accretion_dilution.eps_change, dec!(-0.2));
        assert_eq!(out.accretion_dilution.pct, dec!(-0.04));
    }

    #[test]
    fn test_all_stock_accretive_when_acquirer_richly_valued() {
        let mut input = base_input();
        input.acquirer_share_price = dec!(80); // P/E 16x vs target 12.5x
        input.consideration = ConsiderationMix::all_stock();

        let result = analyze_merger(&input).unwrap();
        let out = &result.result;

        assert_eq!(out.pro_forma.exchange_ratio.unwrap(), dec!(0.3125));
        assert_eq!(out.pro_forma.new_shares_issued.unwrap(), dec!(15.625));
        assert_eq!(out.accretion_dilution.direction, DealDirection::Accretive);
    }

    #[test]
    fn test_mixed_consideration() {
        let mut input = base_input();
        input.consideration = ConsiderationMix {
            cash_pct: dec!(0.3),
            stock_pct: dec!(0.5),
            debt_pct: dec!(0.2),
        };
        input.foregone_cash_yield = Some(dec!(0.02));

        let result = analyze_merger(&input).unwrap();
        let pf = &result.result.pro_forma;

        // Debt portion 250 at 5%, cash portion 375 at 2%, both after tax:
        // 250*0.05*0.75 + 375*0.02*0.75 = 9.375 + 5.625 = 15
        assert_eq!(pf.financing_cost, dec!(15));

        // Stock portion: 50 shares * 0.5 ratio * 0.5 stock = 12.5 new shares
        assert_eq!(pf.new_shares_issued.unwrap(), dec!(12.5));
        assert_eq!(pf.pro_forma_shares, dec!(112.5));

        // NI = 600 - 15 = 585; EPS = 585 / 112.5 = 5.2
        assert_eq!(pf.pro_forma_eps, dec!(5.2));
    }

    #[test]
    fn test_mix_must_sum_to_one() {
        let mut input = base_input();
        input.consideration = ConsiderationMix {
            cash_pct: dec!(0.5),
            stock_pct: dec!(0.6),
            debt_pct: Decimal::ZERO,
        };
        assert!(analyze_merger(&input).is_err());
    }

    #[test]
    fn test_synergies_flip_dilutive_deal() {
        let mut input = base_input();
        input.consideration = ConsiderationMix::all_stock();

        let without = analyze_merger(&input).unwrap();
        assert_eq!(
            without.result.accretion_dilution.direction,
            DealDirection::Dilutive
        );

        input.cost_synergies = Some(dec!(50));
        input.synergy_phase_in_pct = Some(dec!(1));

        let with = analyze_merger(&input).unwrap();
        let out = &with.result;

        // Impact = 50 * 0.75 = 37.5; NI = 637.5; EPS = 5.1
        assert_eq!(out.pro_forma.synergy_impact, dec!(37.5));
        assert_eq!(out.pro_forma.pro_forma_eps, dec!(5.1));
        assert_eq!(out.accretion_dilution.direction, DealDirection::Accretive);
    }

    #[test]
    fn test_breakeven_synergies_neutralise_eps() {
        let mut input = base_input();
        input.consideration = ConsiderationMix::all_stock();

        let result = analyze_merger(&input).unwrap();
        let breakeven = result.result.breakeven_synergies;
        assert!(breakeven > Decimal::ZERO);

        let mut verify = input.clone();
        verify.cost_synergies = Some(breakeven);
        verify.synergy_phase_in_pct = Some(dec!(1));
        let verified = analyze_merger(&verify).unwrap();

        let eps_diff = verified.result.accretion_dilution.eps_change.abs();
        assert!(
            eps_diff < dec!(0.0001),
            "Breakeven synergies should neutralise EPS; residual {eps_diff}"
        );
    }

    #[test]
    fn test_adjustments_reduce_synergy_impact() {
        let mut input = base_input();
        input.cost_synergies = Some(dec!(100));
        input.synergy_phase_in_pct = Some(dec!(1));
        input.integration_costs = Some(dec!(10));
        input.goodwill_amortisation = Some(dec!(5));
        input.transaction_fees = Some(dec!(3));

        let result = analyze_merger(&input).unwrap();
        // 100 * 0.75 - 10 - 5 - 3 = 57
        assert_eq!(result.result.pro_forma.synergy_impact, dec!(57));
    }

    #[test]
    fn test_negative_premium_warns() {
        let mut input = base_input();
        input.offer_premium_pct = dec!(-0.10);
        let result = analyze_merger(&input).unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("negative premium")));
    }

    #[test]
    fn test_zero_shares_rejected() {
        let mut input = base_input();
        input.acquirer_shares_outstanding = Decimal::ZERO;
        let result = analyze_merger(&input);
        match result.unwrap_err() {
            ValuationError::InvalidInput { field, .. } => {
                assert_eq!(field, "acquirer_shares_outstanding");
            }
            e => panic!("Expected InvalidInput, got {e}"),
        }
    }

    #[test]
    fn test_accretion_dilution_direction() {
        let neutral = accretion_dilution(dec!(5), dec!(5)).unwrap();
        assert_eq!(neutral.direction, DealDirection::Neutral);
        assert_eq!(neutral.pct, Decimal::ZERO);

        let up = accretion_dilution(dec!(5.5), dec!(5)).unwrap();
        assert_eq!(up.direction, DealDirection::Accretive);
        assert_eq!(up.pct, dec!(0.1));

        let down = accretion_dilution(dec!(4.5), dec!(5)).unwrap();
        assert_eq!(down.direction, DealDirection::Dilutive);
        assert_eq!(down.pct, dec!(-0.1));
    }

    #[test]
    fn test_sensitivity_grid_premium_monotone() {
        let input = base_input();
        let premium_axis = SensitivityAxis {
            name: "Offer Premium".into(),
            min: dec!(0.10),
            max: dec!(0.50),
            steps: 5,
        };
        let stock_axis = SensitivityAxis {
            name: "Stock %".into(),
            min: dec!(0),
            max: dec!(1),
            steps: 5,
        };

        let result = merger_sensitivity(&input, &premium_axis, &stock_axis).unwrap();
        let grid = &result.result;

        assert_eq!(grid.matrix.len(), 5);
        assert_eq!(grid.matrix[0].len(), 5);

        // A richer premium always erodes accretion, whatever the mix
        for j in 0..5 {
            for i in 0..4 {
                assert!(
                    grid.matrix[i][j].unwrap() > grid.matrix[i + 1][j].unwrap(),
                    "Accretion should fall as the premium rises"
                );
            }
        }
    }

    #[test]
    fn test_sensitivity_all_stock_base_sweeps_cash() {
        let mut input = base_input();
        input.consideration = ConsiderationMix::all_stock();
        input.foregone_cash_yield = Some(dec!(0.03));

        let premium_axis = SensitivityAxis {
            name: "Offer Premium".into(),
            min: dec!(0.10),
            max: dec!(0.30),
            steps: 3,
        };
        let stock_axis = SensitivityAxis {
            name: "Stock %".into(),
            min: dec!(0),
            max: dec!(1),
            steps: 3,
        };

        let result = merger_sensitivity(&input, &premium_axis, &stock_axis).unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("funded with cash")));
    }
}
