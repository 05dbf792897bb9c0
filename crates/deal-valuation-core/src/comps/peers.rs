use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PeerExclusion, ValuationError};
use crate::types::{Multiple, Rate};
use crate::ValuationResult;

/// A field a peer may carry. Used to declare which fields a calculation
/// requires and to name missing fields in exclusions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerField {
    EvEbitda,
    EvRevenue,
    PriceEarnings,
    RevenueGrowth,
    Roic,
    EbitdaMargin,
}

impl PeerField {
    /// Trading multiples are screened for positivity as well as presence;
    /// fundamentals may legitimately be negative.
    pub fn is_multiple(&self) -> bool {
        matches!(
            self,
            PeerField::EvEbitda | PeerField::EvRevenue | PeerField::PriceEarnings
        )
    }
}

impl std::fmt::Display for PeerField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerField::EvEbitda => write!(f, "ev_ebitda"),
            PeerField::EvRevenue => write!(f, "ev_revenue"),
            PeerField::PriceEarnings => write!(f, "price_earnings"),
            PeerField::RevenueGrowth => write!(f, "revenue_growth"),
            PeerField::Roic => write!(f, "roic"),
            PeerField::EbitdaMargin => write!(f, "ebitda_margin"),
        }
    }
}

/// Trading multiples and fundamentals for one comparable company. All
/// fields are optional at the candidate stage; completeness is enforced by
/// `select_complete_peers`, never by defaulting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_ebitda: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_revenue: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_earnings: Option<Multiple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_growth: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roic: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebitda_margin: Option<Rate>,
}

impl PeerMetrics {
    pub fn get(&self, field: PeerField) -> Option<Decimal> {
        match field {
            PeerField::EvEbitda => self.ev_ebitda,
            PeerField::EvRevenue => self.ev_revenue,
            PeerField::PriceEarnings => self.price_earnings,
            PeerField::RevenueGrowth => self.revenue_growth,
            PeerField::Roic => self.roic,
            PeerField::EbitdaMargin => self.ebitda_margin,
        }
    }
}

/// A candidate comparable company, prior to completeness screening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerCandidate {
    pub name: String,
    pub metrics: PeerMetrics,
}

/// A peer set that passed completeness screening. Constructible only
/// through `select_complete_peers`, so every retained peer is guaranteed to
/// carry every required field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedPeerSet {
    required_fields: Vec<PeerField>,
    peers: Vec<PeerCandidate>,
    exclusions: Vec<PeerExclusion>,
}

impl ValidatedPeerSet {
    pub fn peers(&self) -> &[PeerCandidate] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn required_fields(&self) -> &[PeerField] {
        &self.required_fields
    }

    /// Peers rejected during screening, with their missing fields.
    pub fn exclusions(&self) -> &[PeerExclusion] {
        &self.exclusions
    }

    pub fn requires(&self, field: PeerField) -> bool {
        self.required_fields.contains(&field)
    }

    /// Field value for a retained peer. Only valid for required fields;
    /// the screening invariant guarantees presence.
    pub(crate) fn field_value(&self, peer: &PeerCandidate, field: PeerField) -> Decimal {
        debug_assert!(self.requires(field));
        peer.metrics.get(field).unwrap() // guaranteed by screening
    }
}

/// Screen candidates against a required-field list. A candidate missing any
/// required field (or carrying a non-positive trading multiple) is excluded
/// and recorded with the offending field names. If fewer than
/// `min_required` candidates survive, the whole screening fails with the
/// full exclusion breakdown — nothing is defaulted or substituted.
pub fn select_complete_peers(
    candidates: &[PeerCandidate],
    required: &[PeerField],
    min_required: usize,
) -> ValuationResult<ValidatedPeerSet> {
    if required.is_empty() {
        return Err(ValuationError::InvalidInput {
            field: "required".into(),
            reason: "At least one required field must be specified".into(),
        });
    }
    if min_required == 0 {
        return Err(ValuationError::InvalidInput {
            field: "min_required".into(),
            reason: "Minimum peer count must be at least 1".into(),
        });
    }

    let mut peers: Vec<PeerCandidate> = Vec::new();
    let mut exclusions: Vec<PeerExclusion> = Vec::new();

    for candidate in candidates {
        let mut missing: Vec<String> = Vec::new();
        for field in required {
            match candidate.metrics.get(*field) {
                None => missing.push(field.to_string()),
                Some(value) if field.is_multiple() && value <= Decimal::ZERO => {
                    missing.push(format!("{field} (non-positive)"));
                }
                Some(_) => {}
            }
        }
        if missing.is_empty() {
            peers.push(candidate.clone());
        } else {
            exclusions.push(PeerExclusion {
                peer: candidate.name.clone(),
                missing_fields: missing,
            });
        }
    }

    if peers.len() < min_required {
        return Err(ValuationError::InsufficientData {
            reason: format!(
                "{} of {} candidate peers have complete data; {min_required} required",
                peers.len(),
                candidates.len()
            ),
            exclusions,
        });
    }

    Ok(ValidatedPeerSet {
        required_fields: required.to_vec(),
        peers,
        exclusions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
