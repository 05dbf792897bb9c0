use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{PeerExclusion, ValuationError};
use crate::types::{with_metadata, ComputationOutput, Currency, Money, Multiple, Rate};
use crate::ValuationResult;

use super::peers::{select_complete_peers, PeerCandidate, PeerField, ValidatedPeerSet};
use super::regression::{regression_adjusted, RegressionAdjustment, RegressionSpec};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Types of valuation multiples the engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultipleType {
    EvEbitda,
    EvRevenue,
    PriceEarnings,
}

impl MultipleType {
    pub fn peer_field(&self) -> PeerField {
        match self {
            MultipleType::EvEbitda => PeerField::EvEbitda,
            MultipleType::EvRevenue => PeerField::EvRevenue,
            MultipleType::PriceEarnings => PeerField::PriceEarnings,
        }
    }

    /// Enterprise-value multiples need the net-debt bridge; equity
    /// multiples imply equity value directly.
    pub fn is_enterprise(&self) -> bool {
        matches!(self, MultipleType::EvEbitda | MultipleType::EvRevenue)
    }
}

impl std::fmt::Display for MultipleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultipleType::EvEbitda => write!(f, "EV/EBITDA"),
            MultipleType::EvRevenue => write!(f, "EV/Revenue"),
            MultipleType::PriceEarnings => write!(f, "P/E"),
        }
    }
}

/// The target company's own financials and fundamentals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcaTarget {
    pub ebitda: Money,
    pub revenue: Money,
    pub net_income: Money,
    pub net_debt: Money,
    pub shares_outstanding: Decimal,
    pub revenue_growth: Rate,
    pub roic: Rate,
    pub ebitda_margin: Rate,
}

/// Input for a comparable-company analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcaInput {
    pub target_name: String,
    pub target: CcaTarget,
    pub candidates: Vec<PeerCandidate>,
    pub multiple_types: Vec<MultipleType>,
    /// Minimum complete peers for the analysis to proceed.
    pub min_peers: usize,
    /// Peers whose multiple sits beyond this many standard deviations from
    /// the peer mean are flagged (never dropped). Default 3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_z_threshold: Option<Decimal>,
    /// Optional regression adjustment applied to one of the multiples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionSpec>,
    pub currency: Currency,
}

/// Descriptive statistics for a single multiple across the peer set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleStatistics {
    pub multiple_type: MultipleType,
    pub values: Vec<(String, Multiple)>,
    pub mean: Multiple,
    pub median: Multiple,
    pub high: Multiple,
    pub low: Multiple,
    pub std_dev: Multiple,
    pub count: usize,
}

/// A peer flagged as an outlier on one multiple. Flagged peers stay in the
/// statistics; dropping them silently would bias the set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierFlag {
    pub peer: String,
    pub multiple_type: MultipleType,
    pub z_score: Decimal,
}

/// Implied valuation of the target from one multiple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpliedValue {
    pub multiple_type: MultipleType,
    /// The multiple actually applied (peer median, or the
    /// regression-predicted multiple when adjustment was requested)
    pub applied_multiple: Multiple,
    /// True when `applied_multiple` came from the regression adjustment
    pub regression_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_enterprise_value: Option<Money>,
    pub implied_equity_value: Money,
    pub implied_value_per_share: Money,
}

/// Output of a comparable-company analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcaOutput {
    pub statistics: Vec<MultipleStatistics>,
    pub implied_values: Vec<ImpliedValue>,
    pub peers_used: usize,
    pub excluded_peers: Vec<PeerExclusion>,
    pub outliers_flagged: Vec<OutlierFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionAdjustment>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a comparable-company analysis: screen the candidate peers once,
/// compute multiple statistics, flag outliers, optionally regression-adjust
/// one multiple, and derive implied values for the target.
pub fn calculate_comps(input: &CcaInput) -> ValuationResult<ComputationOutput<CcaOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.multiple_types.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "multiple_types".into(),
            reason: "At least one multiple type must be specified".into(),
        });
    }
    if input.target.shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "target.shares_outstanding".into(),
            reason: "Shares outstanding must be positive".into(),
        });
    }

    // Every field the analysis needs, screened once up front
    let mut required: Vec<PeerField> = input
        .multiple_types
        .iter()
        .map(|m| m.peer_field())
        .collect();
    if let Some(ref spec) = input.regression {
        let metric_field = spec.metric.peer_field();
        if !required.contains(&metric_field) {
            required.push(metric_field);
        }
        for field in &spec.explanatory {
            if !required.contains(field) {
                required.push(*field);
            }
        }
    }

    let peer_set = select_complete_peers(&input.candidates, &required, input.min_peers)?;
    for exclusion in peer_set.exclusions() {
        warnings.push(format!(
            "Peer '{}' excluded: missing {}",
            exclusion.peer,
            exclusion.missing_fields.join(", ")
        ));
    }

    // Optional regression adjustment
    let regression = match input.regression {
        Some(ref spec) => {
            let fit = regression_adjusted(&peer_set, spec.metric, &spec.explanatory, &input.target)?;
            if fit.r_squared < dec!(0.5) {
                warnings.push(format!(
                    "Regression R-squared is {:.2}; the fundamentals explain little of the {} spread",
                    fit.r_squared, spec.metric
                ));
            }
            Some(fit)
        }
        None => None,
    };

    let z_threshold = input.outlier_z_threshold.unwrap_or(dec!(3));
    let mut statistics: Vec<MultipleStatistics> = Vec::new();
    let mut implied_values: Vec<ImpliedValue> = Vec::new();
    let mut outliers: Vec<OutlierFlag> = Vec::new();

    for mult_type in &input.multiple_types {
        let stats = compute_statistics(*mult_type, &peer_set);

        flag_outliers(&stats, z_threshold, &mut outliers, &mut warnings);

        // Regression-predicted multiple takes precedence when requested
        let (applied, regression_applied) = match regression {
            Some(ref fit) if fit.metric == *mult_type => {
                warnings.push(format!(
                    "{mult_type}: applying regression-adjusted multiple {} in place of peer median {}",
                    fit.predicted_multiple, stats.median
                ));
                (fit.predicted_multiple, true)
            }
            _ => (stats.median, false),
        };

        match implied_value(*mult_type, applied, regression_applied, &input.target) {
            Some(iv) => implied_values.push(iv),
            None => warnings.push(format!(
                "Target metric for {mult_type} is not positive; implied value skipped"
            )),
        }

        statistics.push(stats);
    }

    if implied_values.is_empty() {
        return Err(ValuationError::insufficient(
            "Could not derive any implied value: no requested multiple had a positive target metric",
        ));
    }

    let output = CcaOutput {
        statistics,
        implied_values,
        peers_used: peer_set.len(),
        excluded_peers: peer_set.exclusions().to_vec(),
        outliers_flagged: outliers,
        regression,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Comparable Company Analysis",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn compute_statistics(mult_type: MultipleType, peer_set: &ValidatedPeerSet) -> MultipleStatistics {
    let field = mult_type.peer_field();
    let values: Vec<(String, Multiple)> = peer_set
        .peers()
        .iter()
        .map(|p| (p.name.clone(), peer_set.field_value(p, field)))
        .collect();

    let count = values.len();
    let mut sorted: Vec<Multiple> = values.iter().map(|(_, v)| *v).collect();
    sorted.sort();

    let sum: Decimal = sorted.iter().copied().sum();
    let mean = sum / Decimal::from(count as i64);

    let median = if count % 2 == 0 {
        let mid = count / 2;
        (sorted[mid - 1] + sorted[mid]) / dec!(2)
    } else {
        sorted[count / 2]
    };

    let high = sorted[count - 1];
    let low = sorted[0];

    let std_dev = if count > 1 {
        let variance: Decimal = sorted
            .iter()
            .map(|v| {
                let diff = *v - mean;
                diff * diff
            })
            .sum::<Decimal>()
            / Decimal::from((count - 1) as i64); // sample std dev
        variance.sqrt().unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    MultipleStatistics {
        multiple_type: mult_type,
        values,
        mean,
        median,
        high,
        low,
        std_dev,
        count,
    }
}

fn flag_outliers(
    stats: &MultipleStatistics,
    z_threshold: Decimal,
    outliers: &mut Vec<OutlierFlag>,
    warnings: &mut Vec<String>,
) {
    if stats.std_dev.is_zero() {
        return;
    }
    for (name, value) in &stats.values {
        let z = (*value - stats.mean) / stats.std_dev;
        if z.abs() > z_threshold {
            warnings.push(format!(
                "Peer '{name}' is a {} outlier (z-score {z:.2}); retained in the statistics",
                stats.multiple_type
            ));
            outliers.push(OutlierFlag {
                peer: name.clone(),
                multiple_type: stats.multiple_type,
                z_score: z,
            });
        }
    }
}

fn implied_value(
    mult_type: MultipleType,
    applied: Multiple,
    regression_applied: bool,
    target: &CcaTarget,
) -> Option<ImpliedValue> {
    let metric = match mult_type {
        MultipleType::EvEbitda => target.ebitda,
        MultipleType::EvRevenue => target.revenue,
        MultipleType::PriceEarnings => target.net_income,
    };
    if metric <= Decimal::ZERO {
        return None;
    }

    let (implied_ev, implied_equity) = if mult_type.is_enterprise() {
        let ev = metric * applied;
        (Some(ev), ev - target.net_debt)
    } else {
        (None, metric * applied)
    };

    Some(ImpliedValue {
        multiple_type: mult_type,
        applied_multiple: applied,
        regression_applied,
        implied_enterprise_value: implied_ev,
        implied_equity_value: implied_equity,
        implied_value_per_share: implied_equity / target.shares_outstanding,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comps::peers::PeerMetrics;
    use rust_decimal_macros::dec;

    fn peer(name: &str, ev_ebitda: Decimal, ev_revenue: Decimal, pe: Decimal) -> PeerCandidate {
        PeerCandidate {
            name: name.into(),
            metrics: PeerMetrics {
                ev_ebitda: Some(ev_ebitda),
                ev_revenue: Some(ev_revenue),
                price_earnings: Some(pe),
                revenue_growth: Some(dec!(0.08)),
                roic: Some(dec!(0.12)),
                ebitda_margin: Some(dec!(0.25)),
            },
        }
    }

    fn sample_input() -> CcaInput {
        CcaInput {
            target_name: "TargetCo".into(),
            target: CcaTarget {
                ebitda: dec!(125),
                revenue: dec!(500),
                net_income: dec!(75),
                net_debt: dec!(150),
                shares_outstanding: dec!(100),
                revenue_growth: dec!(0.10),
                roic: dec!(0.13),
                ebitda_margin: dec!(0.25),
            },
            candidates: vec![
                peer("CompA", dec!(10), dec!(2.5), dec!(13)),
                peer("CompB", dec!(8), dec!(2.1), dec!(12)),
                peer("CompC", dec!(10), dec!(2.6), dec!(14)),
            ],
            multiple_types: vec![
                MultipleType::EvEbitda,
                MultipleType::EvRevenue,
                MultipleType::PriceEarnings,
            ],
            min_peers: 3,
            outlier_z_threshold: None,
            regression: None,
            currency: Currency::USD,
        }
    }

    #[test]
    fn test_basic_comps() {
        let result = calculate_comps(&sample_input()).unwrap();
        let out = &result.result;

        assert_eq!(out.peers_used, 3);
        assert!(out.excluded_peers.is_empty());
        assert_eq!(out.statistics.len(), 3);
        assert_eq!(out.implied_values.len(), 3);
    }

    #[test]
    fn test_ev_ebitda_statistics() {
        let result = calculate_comps(&sample_input()).unwrap();
        let stats = result
            .result
            .statistics
            .iter()
            .find(|s| s.multiple_type == MultipleType::EvEbitda)
            .unwrap();

        // Values 8, 10, 10: median 10, low 8, high 10
        assert_eq!(stats.median, dec!(10));
        assert_eq!(stats.low, dec!(8));
        assert_eq!(stats.high, dec!(10));
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn test_implied_value_ev_bridge() {
        let result = calculate_comps(&sample_input()).unwrap();
        let implied = result
            .result
            .implied_values
            .iter()
            .find(|v| v.multiple_type == MultipleType::EvEbitda)
            .unwrap();

        // EV = 125 * 10 = 1250; equity = 1250 - 150 = 1100; per share = 11
        assert_eq!(implied.implied_enterprise_value, Some(dec!(1250)));
        assert_eq!(implied.implied_equity_value, dec!(1100));
        assert_eq!(implied.implied_value_per_share, dec!(11));
        assert!(!implied.regression_applied);
    }

    #[test]
    fn test_implied_value_pe_no_bridge() {
        let result = calculate_comps(&sample_input()).unwrap();
        let implied = result
            .result
            .implied_values
            .iter()
            .find(|v| v.multiple_type == MultipleType::PriceEarnings)
            .unwrap();

        // Equity = 75 * 13 = 975 directly; no EV
        assert!(implied.implied_enterprise_value.is_none());
        assert_eq!(implied.implied_equity_value, dec!(975));
        assert_eq!(implied.implied_value_per_share, dec!(9.75));
    }

    #[test]
    fn test_incomplete_peer_reported_and_survivors_used() {
        let mut input = sample_input();
        input.candidates[1].metrics.ev_revenue = None;
        input.min_peers = 2;

        let result = calculate_comps(&input).unwrap();
        let out = &result.result;

        assert_eq!(out.peers_used, 2);
        assert_eq!(out.excluded_peers.len(), 1);
        assert_eq!(out.excluded_peers[0].peer, "CompB");
        assert_eq!(out.excluded_peers[0].missing_fields, vec!["ev_revenue"]);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("CompB") && w.contains("ev_revenue")));
    }

    #[test]
    fn test_minimum_unmet_fails_with_breakdown() {
        let mut input = sample_input();
        input.candidates[1].metrics.ev_ebitda = None;
        input.candidates[2].metrics.price_earnings = None;
        // min_peers stays 3; only CompA survives

        let result = calculate_comps(&input);
        match result.unwrap_err() {
            ValuationError::InsufficientData { exclusions, .. } => {
                assert_eq!(exclusions.len(), 2);
            }
            e => panic!("Expected InsufficientData, got {e:?}"),
        }
    }

    #[test]
    fn test_outlier_flagged_not_dropped() {
        let mut input = sample_input();
        input.candidates = vec![
            peer("CompA", dec!(10.0), dec!(2.5), dec!(13)),
            peer("CompB", dec!(10.2), dec!(2.5), dec!(13)),
            peer("CompC", dec!(9.8), dec!(2.5), dec!(13)),
            peer("CompD", dec!(10.1), dec!(2.5), dec!(13)),
            peer("Frothy", dec!(25), dec!(2.5), dec!(13)),
        ];
        input.min_peers = 5;
        input.outlier_z_threshold = Some(dec!(1.5));
        input.multiple_types = vec![MultipleType::EvEbitda];

        let result = calculate_comps(&input).unwrap();
        let out = &result.result;

        assert!(out
            .outliers_flagged
            .iter()
            .any(|o| o.peer == "Frothy" && o.multiple_type == MultipleType::EvEbitda));
        // Still present in the statistics
        let stats = &out.statistics[0];
        assert_eq!(stats.count, 5);
        assert!(stats.values.iter().any(|(n, _)| n == "Frothy"));
        assert!(result.warnings.iter().any(|w| w.contains("outlier")));
    }

    #[test]
    fn test_regression_adjustment_applied() {
        let mut input = sample_input();
        // Peers following EV/EBITDA = 2 + 50*growth exactly
        let growth_peer = |name: &str, g: Decimal| PeerCandidate {
            name: name.into(),
            metrics: PeerMetrics {
                ev_ebitda: Some(dec!(2) + dec!(50) * g),
                ev_revenue: Some(dec!(2.5)),
                price_earnings: Some(dec!(13)),
                revenue_growth: Some(g),
                roic: Some(dec!(0.12)),
                ebitda_margin: Some(dec!(0.25)),
            },
        };
        input.candidates = vec![
            growth_peer("A", dec!(0.04)),
            growth_peer("B", dec!(0.08)),
            growth_peer("C", dec!(0.12)),
            growth_peer("D", dec!(0.16)),
        ];
        input.min_peers = 4;
        input.multiple_types = vec![MultipleType::EvEbitda];
        input.regression = Some(RegressionSpec {
            metric: MultipleType::EvEbitda,
            explanatory: vec![PeerField::RevenueGrowth],
        });

        let result = calculate_comps(&input).unwrap();
        let out = &result.result;

        let fit = out.regression.as_ref().unwrap();
        assert!((fit.r_squared - Decimal::ONE).abs() < dec!(0.0000001));

        // Target growth 10%: predicted 2 + 5 = 7x, applied instead of median
        let implied = &out.implied_values[0];
        assert!(implied.regression_applied);
        assert!((implied.applied_multiple - dec!(7)).abs() < dec!(0.0000001));
        // EV = 125 * 7 = 875; equity = 725; per share = 7.25
        assert!((implied.implied_value_per_share - dec!(7.25)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_regression_too_few_peers_never_falls_back() {
        let mut input = sample_input();
        input.regression = Some(RegressionSpec {
            metric: MultipleType::EvEbitda,
            explanatory: vec![PeerField::RevenueGrowth, PeerField::Roic],
        });
        // 3 peers cannot support 2 regressors; the whole analysis must fail
        // rather than silently fall back to the median
        let result = calculate_comps(&input);
        assert!(matches!(
            result.unwrap_err(),
            ValuationError::InsufficientData { .. }
        ));
    }

    #[test]
    fn test_negative_target_metric_skipped_with_warning() {
        let mut input = sample_input();
        input.target.net_income = dec!(-10);

        let result = calculate_comps(&input).unwrap();
        let out = &result.result;

        assert!(out
            .implied_values
            .iter()
            .all(|v| v.multiple_type != MultipleType::PriceEarnings));
        assert!(result.warnings.iter().any(|w| w.contains("P/E")));
    }

    #[test]
    fn test_no_multiple_types_rejected() {
        let mut input = sample_input();
        input.multiple_types.clear();
        assert!(calculate_comps(&input).is_err());
    }
}
