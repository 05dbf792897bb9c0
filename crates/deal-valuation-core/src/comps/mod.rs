pub mod multiples;
pub mod peers;
pub mod regression;

pub use multiples::{
    calculate_comps, CcaInput, CcaOutput, CcaTarget, ImpliedValue, MultipleStatistics,
    MultipleType, OutlierFlag,
};
pub use peers::{
    select_complete_peers, PeerCandidate, PeerField, PeerMetrics, ValidatedPeerSet,
};
pub use regression::{regression_adjusted, RegressionAdjustment, RegressionSpec};
