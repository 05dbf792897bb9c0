use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata_f64, ComputationOutput, MonteCarloSummary};
use crate::valuation::dcf::{calculate_dcf, DcfInput};
use crate::valuation::wacc::WaccInput;
use crate::ValuationResult;

/// The summary's statistics are defined over at least this many paths.
const MIN_SIMULATIONS: u32 = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probability distribution for a sampled variable. Shapes and parameters
/// are caller-configured; nothing is hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Distribution {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

/// Distributions for the three sampled DCF drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfDistributions {
    pub risk_free_rate: Distribution,
    pub beta: Distribution,
    pub terminal_growth: Distribution,
}

/// Input for a Monte Carlo DCF valuation. The base case must carry a
/// `wacc_input` so the discount rate can be re-derived from the sampled
/// risk-free rate and beta on every path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McDcfInput {
    pub dcf: DcfInput,
    pub distributions: DcfDistributions,
    /// Number of simulation paths (minimum 10,000).
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Optional seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_num_simulations() -> u32 {
    MIN_SIMULATIONS
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// A validated sampler; construction fails fast on bad parameters so the
/// hot loop cannot.
enum Sampler {
    Normal(Normal),
    LogNormal(LogNormal),
    Triangular(Triangular),
    Uniform(Uniform),
}

impl Sampler {
    fn build(dist: &Distribution) -> ValuationResult<Self> {
        let invalid = |detail: String| ValuationError::InvalidInput {
            field: "distribution".into(),
            reason: detail,
        };
        match dist {
            Distribution::Normal { mean, std_dev } => Normal::new(*mean, *std_dev)
                .map(Sampler::Normal)
                .map_err(|e| invalid(format!("Invalid Normal parameters: {e}"))),
            Distribution::LogNormal { mu, sigma } => LogNormal::new(*mu, *sigma)
                .map(Sampler::LogNormal)
                .map_err(|e| invalid(format!("Invalid LogNormal parameters: {e}"))),
            Distribution::Triangular { min, mode, max } => Triangular::new(*min, *max, *mode)
                .map(Sampler::Triangular)
                .map_err(|e| invalid(format!("Invalid Triangular parameters: {e}"))),
            Distribution::Uniform { min, max } => Uniform::new(*min, *max)
                .map(Sampler::Uniform)
                .map_err(|e| invalid(format!("Invalid Uniform parameters: {e}"))),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Normal(d) => rng.sample(d),
            Sampler::LogNormal(d) => rng.sample(d),
            Sampler::Triangular(d) => rng.sample(d),
            Sampler::Uniform(d) => rng.sample(d),
        }
    }
}

/// Fixed (non-sampled) WACC components lifted to f64 once, outside the loop.
struct WaccComponentsF64 {
    equity_risk_premium: f64,
    extra_premiums: f64,
    after_tax_cost_of_debt: f64,
    equity_weight: f64,
    debt_weight: f64,
}

impl WaccComponentsF64 {
    fn from_input(w: &WaccInput) -> Self {
        let debt = dec_f64(w.net_debt).max(0.0);
        let market_cap = dec_f64(w.market_cap);
        let total = market_cap + debt;
        WaccComponentsF64 {
            equity_risk_premium: dec_f64(w.equity_risk_premium),
            extra_premiums: dec_f64(w.size_premium.unwrap_or(Decimal::ZERO))
                + dec_f64(w.country_risk_premium.unwrap_or(Decimal::ZERO))
                + dec_f64(w.specific_risk_premium.unwrap_or(Decimal::ZERO)),
            after_tax_cost_of_debt: dec_f64(w.pre_tax_cost_of_debt)
                * (1.0 - dec_f64(w.tax_rate)),
            equity_weight: market_cap / total,
            debt_weight: debt / total,
        }
    }

    fn wacc(&self, risk_free_rate: f64, beta: f64) -> f64 {
        let cost_of_equity = risk_free_rate + beta * self.equity_risk_premium + self.extra_premiums;
        cost_of_equity * self.equity_weight + self.after_tax_cost_of_debt * self.debt_weight
    }
}

fn dec_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile from a **sorted** slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn summarise(mut values: Vec<f64>) -> MonteCarloSummary {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;

    let mean = values.iter().sum::<f64>() / n;
    let median = if values.len() % 2 == 0 {
        let mid = values.len() / 2;
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[values.len() / 2]
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    MonteCarloSummary {
        mean,
        median,
        std_dev: variance.sqrt(),
        p10: percentile_sorted(&values, 10.0),
        p25: percentile_sorted(&values, 25.0),
        p50: percentile_sorted(&values, 50.0),
        p75: percentile_sorted(&values, 75.0),
        p90: percentile_sorted(&values, 90.0),
        simulations: values.len() as u32,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a Monte Carlo DCF.
///
/// Per path: risk-free rate, beta and terminal growth are drawn from their
/// distributions, the WACC is re-derived through CAPM, and the full DCF
/// per-share value is recomputed. Paths where the sampled growth meets or
/// exceeds the sampled WACC are skipped and counted. Trials run in parallel
/// with a deterministic seed per trial, so a seeded run is reproducible
/// regardless of thread count.
pub fn run_dcf_monte_carlo(
    input: &McDcfInput,
) -> ValuationResult<ComputationOutput<MonteCarloSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.num_simulations < MIN_SIMULATIONS {
        return Err(ValuationError::InvalidInput {
            field: "num_simulations".into(),
            reason: format!("Must be at least {MIN_SIMULATIONS}"),
        });
    }
    if input.dcf.fcff_forecast.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "dcf.fcff_forecast".into(),
            reason: "Forecast must contain at least one year".into(),
        });
    }
    if input.dcf.shares_outstanding <= Decimal::ZERO {
        return Err(ValuationError::InvalidInput {
            field: "dcf.shares_outstanding".into(),
            reason: "Shares outstanding must be positive".into(),
        });
    }
    let wacc_input = input.dcf.wacc_input.as_ref().ok_or_else(|| {
        ValuationError::InvalidInput {
            field: "dcf.wacc_input".into(),
            reason: "Monte Carlo needs component-level WACC inputs to resample \
                     the risk-free rate and beta"
                .into(),
        }
    })?;

    let rf_sampler = Sampler::build(&input.distributions.risk_free_rate)?;
    let beta_sampler = Sampler::build(&input.distributions.beta)?;
    let growth_sampler = Sampler::build(&input.distributions.terminal_growth)?;

    let components = WaccComponentsF64::from_input(wacc_input);
    let fcff: Vec<f64> = input.dcf.fcff_forecast.iter().map(|d| dec_f64(*d)).collect();
    let terminal_basis = input
        .dcf
        .terminal
        .terminal_cash_flow
        .map(dec_f64)
        .unwrap_or_else(|| *fcff.last().unwrap()); // non-empty validated above
    let net_debt = dec_f64(input.dcf.net_debt);
    let minority = dec_f64(input.dcf.minority_interest.unwrap_or(Decimal::ZERO));
    let shares = dec_f64(input.dcf.shares_outstanding);
    let mid_year = input.dcf.mid_year_convention.unwrap_or(false);

    let base_seed = input.seed.unwrap_or_else(rand::random::<u64>);
    let n = input.num_simulations;

    // Deterministic seed-per-trial scheme keeps the run reproducible under
    // any rayon thread count.
    let paths: Vec<Option<f64>> = (0..n)
        .into_par_iter()
        .map(|trial| {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(trial as u64));
            let rf = rf_sampler.sample(&mut rng);
            let beta = beta_sampler.sample(&mut rng);
            let growth = growth_sampler.sample(&mut rng);

            let wacc = components.wacc(rf, beta);
            if growth >= wacc || wacc <= 0.0 {
                return None;
            }

            let mut ev = 0.0_f64;
            let mut final_discount = 1.0_f64;
            for (idx, cf) in fcff.iter().enumerate() {
                let period = if mid_year {
                    (idx + 1) as f64 - 0.5
                } else {
                    (idx + 1) as f64
                };
                ev += cf / (1.0 + wacc).powf(period);
                if idx + 1 == fcff.len() {
                    final_discount = (1.0 + wacc).powf((idx + 1) as f64);
                }
            }

            let terminal_value = terminal_basis * (1.0 + growth) / (wacc - growth);
            ev += terminal_value / final_discount;

            Some((ev - net_debt - minority) / shares)
        })
        .collect();

    let mut values: Vec<f64> = Vec::with_capacity(paths.len());
    let mut skipped: u32 = 0;
    for path in paths {
        match path {
            Some(v) => values.push(v),
            None => skipped += 1,
        }
    }

    if values.is_empty() {
        return Err(ValuationError::insufficient(
            "All simulation paths were skipped (terminal growth >= WACC on every draw)",
        ));
    }
    if skipped > 0 {
        warnings.push(format!(
            "{skipped} of {n} simulation paths skipped (terminal growth >= WACC)"
        ));
    }

    let summary = summarise(values);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo DCF Valuation",
        &serde_json::json!({
            "num_simulations": input.num_simulations,
            "valid_paths": summary.simulations,
            "skipped_paths": skipped,
            "seed": input.seed,
            "distributions": &input.distributions,
        }),
        warnings,
        elapsed,
        summary,
    ))
}

/// Base-case DCF with the Monte Carlo summary attached to the result.
pub fn dcf_with_uncertainty(
    input: &McDcfInput,
) -> ValuationResult<ComputationOutput<crate::valuation::dcf::DcfOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let base = calculate_dcf(&input.dcf)?;
    warnings.extend(base.warnings);

    let mc = run_dcf_monte_carlo(input)?;
    for w in &mc.warnings {
        warnings.push(format!("[Monte Carlo] {w}"));
    }

    let mut output = base.result;
    output.monte_carlo = Some(mc.result);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "FCFF DCF with Monte Carlo uncertainty",
        &input.dcf,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
