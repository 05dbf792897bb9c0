pub mod debt_schedule;
pub mod model;
pub mod returns;
pub mod sources_uses;

pub use debt_schedule::{
    build_debt_schedule, AmortisationType, DebtPeriod, DebtScheduleOutput, DebtTrancheInput,
};
pub use model::{build_lbo, lbo_sensitivity, ExitAssumptions, LboInput, LboOutput, LboYearProjection};
pub use returns::{calculate_returns, ReturnsInput, ReturnsOutput};
pub use sources_uses::{
    build_sources_uses, ImbalancePolicy, SourcesUsesInput, SourcesUsesOutput,
};
