//! Cross-validation of register contracts against TED notices: sequential
//! matching (E1–E5), lot aggregation, gap diagnosis and run statistics.

pub mod diagnosis;
pub mod lots;
pub mod matcher;
pub mod pipeline;
pub mod stats;
pub mod strategy;

pub use matcher::{MatchCandidate, Matcher, StageOutcome};
pub use pipeline::{RunOutput, run};
pub use stats::{RunReport, SectorCoverage, StrategyYield, Summary, YearValidation};
