pub mod error;
pub mod sensitivity;
pub mod time_value;
pub mod types;

#[cfg(feature = "valuation")]
pub mod valuation;

#[cfg(feature = "comps")]
pub mod comps;

#[cfg(feature = "lbo")]
pub mod lbo;

#[cfg(feature = "merger")]
pub mod merger;

#[cfg(feature = "growth")]
pub mod growth;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use error::{PeerExclusion, ValuationError};
pub use types::*;

/// Standard result type for all valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
