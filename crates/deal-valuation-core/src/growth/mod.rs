pub mod distress;
pub mod projection;

pub use distress::{score_distress, DistressInput, DistressScores, DistressZone, ZScoreComponent};
pub use projection::{
    compare_scenarios, project, GrowthScenarioInput, GrowthScenarioOutput, ScenarioAssumptions,
    ScenarioKind, ScenarioProjection, ScenarioYear, TerminalBalanceSheet,
};
