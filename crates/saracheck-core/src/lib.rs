pub mod config;
pub mod eligibility;
pub mod model;
pub mod money;
pub mod normalize;
pub mod outcome;
pub mod schema;
pub mod threshold;

pub use config::{ConfigError, MatchConfig, SectorAdjustment, StrategyTolerance, Tolerances};
pub use eligibility::{Eligibility, IneligibleReason, classify};
pub use model::{
    BuyerTier, ContractCategory, NormalizedContract, NormalizedNotice, ProcurementContract,
    TedNotice, TedSource,
};
pub use money::{AmountDelta, Cents, Tolerance};
pub use outcome::{
    Diagnosis, EnrichedContract, GapConfidence, GapFinding, MatchEvidence, Outcome, StrategyId,
};
pub use schema::{output, placsp, ted};
pub use threshold::{Biennium, LookupMiss, ThresholdRule, ThresholdTable, TierScope};
