pub mod model;

pub use model::{
    accretion_dilution, analyze_merger, merger_sensitivity, pro_forma, AccretionDilution,
    ConsiderationMix, DealDirection, MergerInput, MergerOutput, ProFormaFinancials,
};
