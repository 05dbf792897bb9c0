pub mod dcf_simulation;

pub use dcf_simulation::{
    dcf_with_uncertainty, run_dcf_monte_carlo, DcfDistributions, Distribution, McDcfInput,
};
