//! Result objects are consumed verbatim by the reporting layer; a
//! serialize/deserialize cycle must therefore be lossless for every engine
//! output.

use deal_valuation_core::comps::{
    calculate_comps, CcaInput, CcaOutput, CcaTarget, MultipleType, PeerCandidate, PeerMetrics,
};
use deal_valuation_core::growth::{
    compare_scenarios, GrowthScenarioInput, GrowthScenarioOutput, ScenarioAssumptions,
};
use deal_valuation_core::lbo::{
    build_lbo, AmortisationType, DebtTrancheInput, ExitAssumptions, ImbalancePolicy, LboInput,
    LboOutput,
};
use deal_valuation_core::merger::{analyze_merger, ConsiderationMix, MergerInput, MergerOutput};
use deal_valuation_core::monte_carlo::{
    run_dcf_monte_carlo, DcfDistributions, Distribution, McDcfInput,
};
use deal_valuation_core::types::{Currency, MonteCarloSummary};
use deal_valuation_core::valuation::dcf::{
    calculate_dcf, DcfInput, DcfOutput, TerminalMethod, TerminalValueInput,
};
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize, deserialize, re-serialize; the two JSON trees must match
/// exactly for the cycle to be lossless.
fn assert_roundtrip<T: Serialize + DeserializeOwned>(value: &T) {
    let json = serde_json::to_value(value).expect("serialize");
    let back: T = serde_json::from_value(json.clone()).expect("deserialize");
    let json_again = serde_json::to_value(&back).expect("re-serialize");
    assert_eq!(json, json_again, "round-trip altered the value");
}

fn dcf_input() -> DcfInput {
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
fn test_dcf_result_roundtrip() {
    let out: DcfOutput = calculate_dcf(&dcf_input()).unwrap().result;
    assert_roundtrip(&out);
}

#[test]
fn test_cca_result_roundtrip() {
    let peer = |name: &str, m: rust_decimal::Decimal| PeerCandidate {
        name: name.into(),
        metrics: PeerMetrics {
            ev_ebitda: Some(m),
            ev_revenue: Some(dec!(2.4)),
            price_earnings: Some(dec!(13)),
            revenue_growth: Some(dec!(0.07)),
            roic: Some(dec!(0.11)),
            ebitda_margin: Some(dec!(0.23)),
        },
    };
    let input = CcaInput {
        target_name: "TargetCo".into(),
        target: CcaTarget {
            ebitda: dec!(120),
            revenue: dec!(480),
            net_income: dec!(70),
            net_debt: dec!(140),
            shares_outstanding: dec!(90),
            revenue_growth: dec!(0.08),
            roic: dec!(0.12),
            ebitda_margin: dec!(0.25),
        },
        candidates: vec![peer("A", dec!(9)), peer("B", dec!(10)), peer("C", dec!(11))],
        multiple_types: vec![MultipleType::EvEbitda, MultipleType::PriceEarnings],
        min_peers: 3,
        outlier_z_threshold: None,
        regression: None,
        currency: Currency::USD,
    };
    let out: CcaOutput = calculate_comps(&input).unwrap().result;
    assert_roundtrip(&out);
}

#[test]
fn test_lbo_result_roundtrip() {
    let input = LboInput {
        entry_ebitda: dec!(200),
        entry_multiple: dec!(10),
        base_revenue: dec!(1000),
        revenue_growth: vec![dec!(0.05); 5],
        ebitda_margin: vec![dec!(0.20); 5],
        da_as_pct_revenue: dec!(0.02),
        capex_as_pct_revenue: dec!(0.03),
        nwc_as_pct_revenue: dec!(0.05),
        tax_rate: dec!(0.25),
        tranches: vec![DebtTrancheInput {
            name: "Senior Term Loan".into(),
            amount: dec!(1200),
            interest_rate: dec!(0.06),
            is_floating: false,
            base_rate: None,
            spread: None,
            amortisation: AmortisationType::StraightLine(dec!(0.05)),
            maturity_years: 7,
            pik_rate: None,
            seniority: 1,
        }],
        equity_contribution: dec!(800),
        cash_sweep_pct: Some(dec!(0.5)),
        minimum_cash: Some(dec!(25)),
        exit: ExitAssumptions {
            year: 5,
            multiple: dec!(10),
        },
        transaction_fee_pct: None,
        financing_fee_pct: None,
        management_rollover: None,
        tolerance: None,
        on_imbalance: ImbalancePolicy::Reject,
        irr: None,
        currency: Some(Currency::USD),
    };
    let out: LboOutput = build_lbo(&input).unwrap().result;
    assert_roundtrip(&out);
}

#[test]
fn test_merger_result_roundtrip() {
    let input = MergerInput {
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
        consideration: ConsiderationMix {
            cash_pct: dec!(0.3),
            stock_pct: dec!(0.5),
            debt_pct: dec!(0.2),
        },
        revenue_synergies: Some(dec!(20)),
        cost_synergies: Some(dec!(40)),
        synergy_phase_in_pct: Some(dec!(0.8)),
        integration_costs: Some(dec!(10)),
        debt_financing_rate: Some(dec!(0.05)),
        foregone_cash_yield: Some(dec!(0.02)),
        goodwill_amortisation: None,
        transaction_fees: Some(dec!(5)),
    };
    let out: MergerOutput = analyze_merger(&input).unwrap().result;
    assert_roundtrip(&out);
}

#[test]
fn test_growth_result_roundtrip() {
    let input = GrowthScenarioInput {
        base_revenue: dec!(1000),
        horizon_years: 3,
        bear: ScenarioAssumptions {
            growth_path: vec![dec!(0); 3],
            margin_path: vec![dec!(0.18); 3],
            nwc_pct_of_revenue: dec!(0.12),
        },
        base: ScenarioAssumptions {
            growth_path: vec![dec!(0.04); 3],
            margin_path: vec![dec!(0.20); 3],
            nwc_pct_of_revenue: dec!(0.10),
        },
        bull: ScenarioAssumptions {
            growth_path: vec![dec!(0.08); 3],
            margin_path: vec![dec!(0.22); 3],
            nwc_pct_of_revenue: dec!(0.08),
        },
        da_as_pct_revenue: dec!(0.03),
        capex_as_pct_revenue: dec!(0.04),
        tax_rate: dec!(0.25),
        asset_turnover: dec!(1.25),
        base_retained_earnings: dec!(200),
        terminal_liabilities: dec!(600),
        currency: Currency::USD,
    };
    let out: GrowthScenarioOutput = compare_scenarios(&input).unwrap().result;
    assert_roundtrip(&out);
}

#[test]
fn test_monte_carlo_summary_roundtrip() {
    let input = McDcfInput {
        dcf: DcfInput {
            wacc_input: Some(deal_valuation_core::valuation::wacc::WaccInput {
                risk_free_rate: dec!(0.04),
                equity_risk_premium: dec!(0.05),
                levered_beta: Some(dec!(1.0)),
                unlevered_beta: None,
                target_debt_to_equity: None,
                pre_tax_cost_of_debt: dec!(0.06),
                tax_rate: dec!(0.25),
                market_cap: dec!(7000),
                net_debt: dec!(3000),
                size_premium: None,
                country_risk_premium: None,
                specific_risk_premium: None,
            }),
            discount_rate: None,
            ..dcf_input()
        },
        distributions: DcfDistributions {
            risk_free_rate: Distribution::Normal {
                mean: 0.04,
                std_dev: 0.005,
            },
            beta: Distribution::Normal {
                mean: 1.0,
                std_dev: 0.1,
            },
            terminal_growth: Distribution::Normal {
                mean: 0.025,
                std_dev: 0.005,
            },
        },
        num_simulations: 10_000,
        seed: Some(7),
    };
    let out: MonteCarloSummary = run_dcf_monte_carlo(&input).unwrap().result;
    assert_roundtrip(&out);
}
