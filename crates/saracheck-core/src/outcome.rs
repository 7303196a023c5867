//! Terminal states attached to each register record.
//!
//! A run derives one [`EnrichedContract`] per input contract. Nothing here is
//! mutated after the fact: eligibility, then the match or diagnosis, are fixed
//! once and written out.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::eligibility::Eligibility;
use crate::model::{BuyerTier, ContractCategory};
use crate::money::Cents;

/// Matching strategies, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrategyId {
    /// Awardee tax ID, amount and year.
    E1,
    /// Case number cross-referenced against the notice's file reference.
    E2,
    /// Buyer tax ID and amount.
    E3,
    /// Lot group (buyer tax ID + year) summed against one notice.
    E4,
    /// Normalised buyer name and amount.
    E5,
}

impl StrategyId {
    pub const ORDER: [StrategyId; 5] = [Self::E1, Self::E2, Self::E3, Self::E4, Self::E5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E1 => "E1",
            Self::E2 => "E2",
            Self::E3 => "E3",
            Self::E4 => "E4",
            Self::E5 => "E5",
        }
    }

    pub fn join_key(&self) -> &'static str {
        match self {
            Self::E1 => "awardee tax id",
            Self::E2 => "case number",
            Self::E3 => "buyer tax id",
            Self::E4 => "buyer tax id + year (lot sum)",
            Self::E5 => "buyer name",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an eligible contract has no TED notice.
///
/// Tiers are tested in order: insufficient data, then the lot pattern, then
/// the sector pattern. Whatever survives is a confirmed gap. A confirmed
/// gap is [`GapConfidence::High`] unless a notice passes the relaxed
/// tolerance, in which case it is a near miss at [`GapConfidence::Medium`]
/// and the notice is kept as the relaxed candidate. The other diagnoses are
/// always [`GapConfidence::Low`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Diagnosis {
    /// No notice under strict tolerances. Medium confidence marks a near
    /// miss, high confidence none at all.
    ConfirmedGap,
    LikelyFalsePositiveLotPattern,
    LikelyFalsePositiveSectorPattern,
    InsufficientData,
}

impl Diagnosis {
    pub const ALL: [Diagnosis; 4] = [
        Self::ConfirmedGap,
        Self::LikelyFalsePositiveLotPattern,
        Self::LikelyFalsePositiveSectorPattern,
        Self::InsufficientData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmedGap => "confirmed-gap",
            Self::LikelyFalsePositiveLotPattern => "likely-false-positive-lot-pattern",
            Self::LikelyFalsePositiveSectorPattern => "likely-false-positive-sector-pattern",
            Self::InsufficientData => "insufficient-data",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How confident the diagnosis is that the contract is really missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GapConfidence {
    High,
    Medium,
    Low,
}

impl GapConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// What a strategy observed when it claimed a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvidence {
    pub notice_id: String,
    pub strategy: StrategyId,
    /// Relative amount difference against the contract (or lot group) amount.
    pub amount_delta_pct: f64,
    /// Absolute year difference, when both years are known.
    pub year_delta: Option<u32>,
    /// Number of contracts sharing the notice: 1 except under E4.
    pub group_size: usize,
    /// Another candidate was tied on delta and year.
    pub ambiguous: bool,
}

/// Diagnosis of an eligible contract left unmatched.
#[derive(Debug, Clone, PartialEq)]
pub struct GapFinding {
    pub diagnosis: Diagnosis,
    pub confidence: GapConfidence,
    /// Closest notice under the relaxed tolerance, kept for audit.
    pub relaxed_candidate: Option<String>,
}

/// Terminal state of one contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not SARA-eligible, so never matched or diagnosed.
    NotEligible,
    Matched(MatchEvidence),
    Unmatched(GapFinding),
}

impl Outcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::NotEligible => "not-eligible",
            Self::Matched(_) => "matched",
            Self::Unmatched(_) => "unmatched",
        }
    }

    pub fn evidence(&self) -> Option<&MatchEvidence> {
        match self {
            Self::Matched(m) => Some(m),
            _ => None,
        }
    }

    pub fn finding(&self) -> Option<&GapFinding> {
        match self {
            Self::Unmatched(g) => Some(g),
            _ => None,
        }
    }
}

/// One output row: the contract's comparable fields plus its terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedContract {
    pub id: String,
    pub year: Option<i32>,
    pub category: Option<ContractCategory>,
    pub tier: Option<BuyerTier>,
    pub amount: Option<Cents>,
    /// First configured sector the contract belongs to.
    pub sector: Option<String>,
    pub eligibility: Eligibility,
    pub outcome: Outcome,
}

impl EnrichedContract {
    pub fn is_eligible(&self) -> bool {
        self.eligibility.is_eligible()
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.outcome, Outcome::Matched(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_order_is_priority_order() {
        let mut sorted = StrategyId::ORDER;
        sorted.sort();
        assert_eq!(sorted, StrategyId::ORDER);
        assert_eq!(StrategyId::E3.to_string(), "E3");
    }

    #[test]
    fn diagnosis_labels() {
        assert_eq!(Diagnosis::ConfirmedGap.as_str(), "confirmed-gap");
        assert_eq!(
            serde_json::to_string(&Diagnosis::LikelyFalsePositiveLotPattern).unwrap(),
            "\"likely-false-positive-lot-pattern\""
        );
    }

    #[test]
    fn outcome_accessors() {
        let m = Outcome::Matched(MatchEvidence {
            notice_id: "N1".into(),
            strategy: StrategyId::E3,
            amount_delta_pct: 2.17,
            year_delta: Some(0),
            group_size: 1,
            ambiguous: false,
        });
        assert_eq!(m.status(), "matched");
        assert_eq!(m.evidence().unwrap().notice_id, "N1");
        assert!(m.finding().is_none());
        assert_eq!(Outcome::NotEligible.status(), "not-eligible");
    }
}
