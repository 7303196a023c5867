//! SARA eligibility classification.
//!
//! A contract is eligible when its reference amount is strictly above the
//! threshold for its (biennium, category, tier) cell. Anything that stops the
//! cell from being resolved makes the contract ineligible with a named reason;
//! classification never guesses a threshold.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::NormalizedContract;
use crate::money::Cents;
use crate::threshold::{LookupMiss, ThresholdTable};

/// Why a contract was not classified as SARA-eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IneligibleReason {
    BelowThreshold,
    MissingIdentifier,
    MissingYear,
    YearOutsideTable,
    MissingCategory,
    MissingBuyerTier,
    MissingAmount,
    NoRuleCell,
}

impl IneligibleReason {
    pub const ALL: [IneligibleReason; 8] = [
        Self::BelowThreshold,
        Self::MissingIdentifier,
        Self::MissingYear,
        Self::YearOutsideTable,
        Self::MissingCategory,
        Self::MissingBuyerTier,
        Self::MissingAmount,
        Self::NoRuleCell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelowThreshold => "below-threshold",
            Self::MissingIdentifier => "missing-identifier",
            Self::MissingYear => "missing-year",
            Self::YearOutsideTable => "year-outside-table",
            Self::MissingCategory => "missing-category",
            Self::MissingBuyerTier => "missing-buyer-tier",
            Self::MissingAmount => "missing-amount",
            Self::NoRuleCell => "no-rule-cell",
        }
    }

    /// Everything except a plain below-threshold amount.
    pub fn is_unclassifiable(&self) -> bool {
        !matches!(self, Self::BelowThreshold)
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LookupMiss> for IneligibleReason {
    fn from(miss: LookupMiss) -> Self {
        match miss {
            LookupMiss::YearOutsideTable => Self::YearOutsideTable,
            LookupMiss::MissingBuyerTier => Self::MissingBuyerTier,
            LookupMiss::NoRuleCell => Self::NoRuleCell,
        }
    }
}

/// Eligibility label attached to every contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible {
        threshold: Cents,
        /// Range label, e.g. `2018-2019`.
        biennium: String,
    },
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }

    pub fn reason(&self) -> Option<IneligibleReason> {
        match self {
            Self::Eligible { .. } => None,
            Self::Ineligible(r) => Some(*r),
        }
    }

    pub fn threshold(&self) -> Option<Cents> {
        match self {
            Self::Eligible { threshold, .. } => Some(*threshold),
            Self::Ineligible(_) => None,
        }
    }
}

/// Classify one contract against the table. Pure and order-independent.
pub fn classify(contract: &NormalizedContract, table: &ThresholdTable) -> Eligibility {
    let eligibility = decide(contract, table);
    if let Eligibility::Ineligible(reason) = &eligibility
        && reason.is_unclassifiable()
    {
        debug!(id = %contract.id, reason = reason.as_str(), "unclassifiable contract");
    }
    eligibility
}

fn decide(contract: &NormalizedContract, table: &ThresholdTable) -> Eligibility {
    use IneligibleReason::*;

    if contract.id.trim().is_empty() {
        return Eligibility::Ineligible(MissingIdentifier);
    }
    let Some(year) = contract.year else {
        return Eligibility::Ineligible(MissingYear);
    };
    let Some(category) = contract.category else {
        return Eligibility::Ineligible(MissingCategory);
    };
    let resolved = match table.lookup(year, category, contract.tier) {
        Ok(r) => r,
        Err(miss) => return Eligibility::Ineligible(miss.into()),
    };
    let Some(amount) = contract.amount else {
        return Eligibility::Ineligible(MissingAmount);
    };

    if amount > resolved.rule.amount {
        Eligibility::Eligible {
            threshold: resolved.rule.amount,
            biennium: resolved.biennium.label(),
        }
    } else {
        Eligibility::Ineligible(BelowThreshold)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::model::{BuyerTier, ContractCategory};

    fn table() -> ThresholdTable {
        ThresholdTable::builtin().unwrap()
    }

    fn contract(
        category: Option<ContractCategory>,
        tier: Option<BuyerTier>,
        year: Option<i32>,
        euros: Option<i64>,
    ) -> NormalizedContract {
        NormalizedContract {
            id: "c".into(),
            expediente_key: None,
            buyer_name_key: None,
            buyer_tax_key: Some("P2906700F".into()),
            awardee_tax_key: None,
            category,
            tier,
            amount: euros.map(Cents::from_whole_euros),
            year,
            cpv: None,
        }
    }

    #[test]
    fn services_other_2019_above_threshold() {
        let c = contract(
            Some(ContractCategory::Services),
            Some(BuyerTier::Other),
            Some(2019),
            Some(230_000),
        );
        let e = classify(&c, &table());
        assert_eq!(
            e,
            Eligibility::Eligible {
                threshold: Cents::from_whole_euros(221_000),
                biennium: "2018-2019".into(),
            }
        );
    }

    #[test]
    fn works_2021_below_threshold() {
        let c = contract(Some(ContractCategory::Works), None, Some(2021), Some(4_000_000));
        assert_eq!(
            classify(&c, &table()),
            Eligibility::Ineligible(IneligibleReason::BelowThreshold)
        );
    }

    #[test]
    fn equal_to_threshold_is_not_eligible() {
        let c = contract(
            Some(ContractCategory::Supplies),
            Some(BuyerTier::CentralGovernment),
            Some(2024),
            Some(143_000),
        );
        assert_eq!(classify(&c, &table()).reason(), Some(IneligibleReason::BelowThreshold));
    }

    #[test]
    fn unclassifiable_reasons() {
        let t = table();
        let cases = [
            (
                contract(Some(ContractCategory::Works), None, None, Some(9_000_000)),
                IneligibleReason::MissingYear,
            ),
            (
                contract(None, Some(BuyerTier::Other), Some(2019), Some(9_000_000)),
                IneligibleReason::MissingCategory,
            ),
            (
                contract(Some(ContractCategory::Works), None, Some(2030), Some(9_000_000)),
                IneligibleReason::YearOutsideTable,
            ),
            (
                contract(Some(ContractCategory::Services), None, Some(2019), Some(9_000_000)),
                IneligibleReason::MissingBuyerTier,
            ),
            (
                contract(Some(ContractCategory::Works), None, Some(2019), None),
                IneligibleReason::MissingAmount,
            ),
        ];
        for (c, expected) in cases {
            let reason = classify(&c, &t).reason();
            assert_eq!(reason, Some(expected));
            assert!(expected.is_unclassifiable());
        }
    }

    #[test]
    fn missing_identifier() {
        let mut c = contract(Some(ContractCategory::Works), None, Some(2019), Some(9_000_000));
        c.id = "  ".into();
        assert_eq!(classify(&c, &table()).reason(), Some(IneligibleReason::MissingIdentifier));
    }

    #[test]
    fn no_rule_cell_from_sparse_table() {
        let t = ThresholdTable::from_json_str(
            r#"{"version": "works-only", "bienniums": [
                {"start_year": 2018, "end_year": 2019, "rules": [
                    {"category": "works", "tier": "any", "amount": 5548000}
                ]}
            ]}"#,
        )
        .unwrap();
        let c = contract(
            Some(ContractCategory::SpecialSector),
            Some(BuyerTier::Other),
            Some(2018),
            Some(9_000_000),
        );
        assert_eq!(classify(&c, &t).reason(), Some(IneligibleReason::NoRuleCell));
    }

    fn category() -> impl Strategy<Value = ContractCategory> {
        prop::sample::select(ContractCategory::ALL.to_vec())
    }

    fn tier() -> impl Strategy<Value = BuyerTier> {
        prop_oneof![Just(BuyerTier::CentralGovernment), Just(BuyerTier::Other)]
    }

    proptest! {
        #[test]
        fn eligibility_is_monotonic_in_amount(
            category in category(),
            tier in tier(),
            year in 2008i32..2028,
            low in 0i64..2_000_000_000,
            bump in 1i64..2_000_000_000,
        ) {
            let t = table();
            let mut c = contract(Some(category), Some(tier), Some(year), None);
            c.amount = Some(Cents::new(low));
            let lower = classify(&c, &t);
            c.amount = Some(Cents::new(low + bump));
            let higher = classify(&c, &t);
            if lower.is_eligible() {
                prop_assert!(higher.is_eligible());
            }
        }

        #[test]
        fn classification_is_pure(
            category in category(),
            year in 2008i32..2028,
            cents in 0i64..2_000_000_000,
        ) {
            let t = table();
            let mut c = contract(Some(category), Some(BuyerTier::Other), Some(year), None);
            c.amount = Some(Cents::new(cents));
            prop_assert_eq!(classify(&c, &t), classify(&c, &t));
        }
    }
}
