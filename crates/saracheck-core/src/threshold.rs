//! Versioned table of SARA publication thresholds.
//!
//! The table is an ordered list of year ranges (normally two-year bienniums),
//! each with its own rule set keyed by contract category and buyer tier. It is
//! data, not code: the built-in copy lives in `data/sara_thresholds.json` and a
//! replacement can be loaded at runtime, so a new biennium is a JSON edit.
//!
//! Lookups fail closed. A year outside every range, or a (category, tier) with
//! no cell, is reported as a miss and never borrows a neighbouring cell.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ConfigError;
use crate::model::{BuyerTier, ContractCategory};
use crate::money::Cents;

const BUILTIN_THRESHOLDS: &str = include_str!("../data/sara_thresholds.json");

/// Which buyer tiers a rule cell covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierScope {
    Any,
    CentralGovernment,
    Other,
}

impl TierScope {
    fn exact(tier: BuyerTier) -> Self {
        match tier {
            BuyerTier::CentralGovernment => Self::CentralGovernment,
            BuyerTier::Other => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::CentralGovernment => "central-government",
            Self::Other => "other",
        }
    }
}

/// One cell: contracts of `category` and `tier` above `amount` must go to TED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub category: ContractCategory,
    pub tier: TierScope,
    pub amount: Cents,
}

/// An inclusive range of years sharing one rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Biennium {
    pub start_year: i32,
    pub end_year: i32,
    pub rules: Vec<ThresholdRule>,
}

impl Biennium {
    pub fn contains(&self, year: i32) -> bool {
        (self.start_year..=self.end_year).contains(&year)
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }

    fn rule(&self, category: ContractCategory, scope: TierScope) -> Option<&ThresholdRule> {
        self.rules
            .iter()
            .find(|r| r.category == category && r.tier == scope)
    }
}

impl fmt::Display for Biennium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}

/// Why a lookup found no threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    YearOutsideTable,
    /// The category has only tier-specific cells and the tier is unknown.
    MissingBuyerTier,
    NoRuleCell,
}

/// A resolved threshold and the range it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedThreshold<'a> {
    pub biennium: &'a Biennium,
    pub rule: &'a ThresholdRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ThresholdDocument {
    version: String,
    bienniums: Vec<Biennium>,
}

/// The full threshold table, sorted by start year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdTable {
    version: String,
    bienniums: Vec<Biennium>,
}

impl ThresholdTable {
    /// Build and validate a table.
    ///
    /// Ranges must be well-formed and non-overlapping, amounts positive, and
    /// no (category, tier) cell may appear twice within one range.
    pub fn new(version: impl Into<String>, mut bienniums: Vec<Biennium>) -> Result<Self, ConfigError> {
        if bienniums.is_empty() {
            return Err(ConfigError::InvalidThresholds("table has no bienniums".into()));
        }
        bienniums.sort_by_key(|b| b.start_year);

        for b in &bienniums {
            if b.start_year > b.end_year {
                return Err(ConfigError::InvalidThresholds(format!(
                    "range {b} ends before it starts"
                )));
            }
            if b.rules.is_empty() {
                return Err(ConfigError::InvalidThresholds(format!("range {b} has no rules")));
            }
            for (i, rule) in b.rules.iter().enumerate() {
                if rule.amount.is_zero() {
                    return Err(ConfigError::InvalidThresholds(format!(
                        "range {b}: {} / {} has a zero threshold",
                        rule.category,
                        rule.tier.as_str()
                    )));
                }
                if b.rules[..i]
                    .iter()
                    .any(|r| r.category == rule.category && r.tier == rule.tier)
                {
                    return Err(ConfigError::InvalidThresholds(format!(
                        "range {b}: duplicate cell {} / {}",
                        rule.category,
                        rule.tier.as_str()
                    )));
                }
            }
        }

        for pair in bienniums.windows(2) {
            if pair[1].start_year <= pair[0].end_year {
                return Err(ConfigError::InvalidThresholds(format!(
                    "ranges {} and {} overlap",
                    pair[0], pair[1]
                )));
            }
        }

        Ok(Self {
            version: version.into(),
            bienniums,
        })
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_json_str(BUILTIN_THRESHOLDS)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let doc: ThresholdDocument = serde_json::from_str(json)?;
        Self::new(doc.version, doc.bienniums)
    }

    pub fn from_json_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            version = %table.version,
            ranges = table.bienniums.len(),
            "loaded threshold table"
        );
        Ok(table)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        let doc = ThresholdDocument {
            version: self.version.clone(),
            bienniums: self.bienniums.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn bienniums(&self) -> &[Biennium] {
        &self.bienniums
    }

    /// First and last year the table covers.
    pub fn year_span(&self) -> (i32, i32) {
        let first = self.bienniums.first().map_or(0, |b| b.start_year);
        let last = self.bienniums.last().map_or(0, |b| b.end_year);
        (first, last)
    }

    pub fn biennium_for(&self, year: i32) -> Option<&Biennium> {
        let idx = self.bienniums.partition_point(|b| b.end_year < year);
        self.bienniums.get(idx).filter(|b| b.contains(year))
    }

    /// Resolve the threshold for one (year, category, tier).
    ///
    /// An exact tier cell wins over an `any` cell. The tier is only required
    /// when the category has no `any` cell.
    pub fn lookup(
        &self,
        year: i32,
        category: ContractCategory,
        tier: Option<BuyerTier>,
    ) -> Result<ResolvedThreshold<'_>, LookupMiss> {
        let biennium = self.biennium_for(year).ok_or(LookupMiss::YearOutsideTable)?;

        let exact = tier.and_then(|t| biennium.rule(category, TierScope::exact(t)));
        if let Some(rule) = exact.or_else(|| biennium.rule(category, TierScope::Any)) {
            return Ok(ResolvedThreshold { biennium, rule });
        }

        let has_tier_cells = biennium.rules.iter().any(|r| r.category == category);
        if tier.is_none() && has_tier_cells {
            Err(LookupMiss::MissingBuyerTier)
        } else {
            Err(LookupMiss::NoRuleCell)
        }
    }
}
