//! Run configuration: per-strategy tolerances and sector calibration.
//!
//! Everything has a default, so an empty JSON object is a valid config.
//! Sector adjustments are never built in; they come from the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::outcome::StrategyId;
use crate::money::Tolerance;
use crate::normalize;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid threshold table: {0}")]
    InvalidThresholds(String),

    #[error("invalid match config: {0}")]
    InvalidConfig(String),
}

/// Numeric and temporal tolerance for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyTolerance {
    /// Relative amount tolerance, `0.10` for ±10 %.
    pub amount_pct: f64,
    /// Maximum year difference; `None` means the strategy ignores years.
    #[serde(default)]
    pub year_delta: Option<u32>,
}

impl StrategyTolerance {
    pub const fn new(amount_pct: f64, year_delta: Option<u32>) -> Self {
        Self {
            amount_pct,
            year_delta,
        }
    }

    pub fn amount(&self) -> Tolerance {
        Tolerance::from_fraction(self.amount_pct)
    }
}

/// Tolerances for every strategy plus the relaxed probe used by diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub e1: StrategyTolerance,
    pub e2: StrategyTolerance,
    pub e3: StrategyTolerance,
    pub e4: StrategyTolerance,
    pub e5: StrategyTolerance,
    pub relaxed: StrategyTolerance,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            e1: StrategyTolerance::new(0.10, Some(1)),
            e2: StrategyTolerance::new(0.10, None),
            e3: StrategyTolerance::new(0.10, None),
            e4: StrategyTolerance::new(0.10, Some(0)),
            e5: StrategyTolerance::new(0.10, None),
            relaxed: StrategyTolerance::new(0.50, Some(2)),
        }
    }
}

impl Tolerances {
    pub fn for_strategy(&self, strategy: StrategyId) -> StrategyTolerance {
        match strategy {
            StrategyId::E1 => self.e1,
            StrategyId::E2 => self.e2,
            StrategyId::E3 => self.e3,
            StrategyId::E4 => self.e4,
            StrategyId::E5 => self.e5,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &StrategyTolerance)> {
        [
            ("e1", &self.e1),
            ("e2", &self.e2),
            ("e3", &self.e3),
            ("e4", &self.e4),
            ("e5", &self.e5),
            ("relaxed", &self.relaxed),
        ]
        .into_iter()
    }
}

/// Externally calibrated correction for one procurement sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorAdjustment {
    pub id: String,
    /// CPV stems identifying the sector, e.g. `"33"` for medical supplies.
    #[serde(default)]
    pub cpv_prefixes: Vec<String>,
    /// Substrings of the normalised buyer name, e.g. `"HOSPITAL"`.
    #[serde(default)]
    pub buyer_keywords: Vec<String>,
    /// Estimated register records per TED notice in this sector.
    pub lot_ratio: f64,
    /// Independently estimated true compliance rate after lot adjustment.
    #[serde(default)]
    pub expected_compliance: Option<f64>,
}

impl SectorAdjustment {
    pub fn matches(&self, cpv: Option<&str>, buyer_name_key: Option<&str>) -> bool {
        let by_cpv = cpv.is_some_and(|code| {
            self.cpv_prefixes
                .iter()
                .any(|p| !p.is_empty() && code.starts_with(p.as_str()))
        });
        let by_name = buyer_name_key.is_some_and(|name| {
            self.buyer_keywords.iter().any(|k| {
                let k = normalize::fold_diacritics(k.trim());
                !k.is_empty() && name.contains(&k)
            })
        });
        by_cpv || by_name
    }
}

/// Everything the matcher and diagnosis engine can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// VAT rate used to net VAT-inclusive amounts.
    pub vat_rate: f64,
    pub tolerances: Tolerances,
    /// Smallest (buyer, year) group E4 will aggregate.
    pub min_lot_group: usize,
    /// Lot ratio above which a buyer's unmatched records read as lots,
    /// for contracts outside any configured sector.
    pub lot_pattern_min_ratio: f64,
    /// How far below its expected compliance a sector must fall before its
    /// unmatched records are partly reclassified.
    pub sector_gap_margin: f64,
    pub sectors: Vec<SectorAdjustment>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            vat_rate: 0.21,
            tolerances: Tolerances::default(),
            min_lot_group: 2,
            lot_pattern_min_ratio: 3.0,
            sector_gap_margin: 0.10,
            sectors: Vec::new(),
        }
    }
}

impl MatchConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: MatchConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            sectors = cfg.sectors.len(),
            "loaded match config"
        );
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidConfig(msg));

        if !(0.0..1.0).contains(&self.vat_rate) {
            return invalid(format!("vat_rate {} outside [0, 1)", self.vat_rate));
        }
        for (name, tol) in self.tolerances.iter() {
            if !(0.0..=1.0).contains(&tol.amount_pct) {
                return invalid(format!(
                    "tolerance {name}: amount_pct {} outside [0, 1]",
                    tol.amount_pct
                ));
            }
        }
        if self.min_lot_group < 2 {
            return invalid(format!("min_lot_group {} below 2", self.min_lot_group));
        }
        if !self.lot_pattern_min_ratio.is_finite() || self.lot_pattern_min_ratio < 1.0 {
            return invalid(format!(
                "lot_pattern_min_ratio {} below 1",
                self.lot_pattern_min_ratio
            ));
        }
        if !(0.0..1.0).contains(&self.sector_gap_margin) {
            return invalid(format!(
                "sector_gap_margin {} outside [0, 1)",
                self.sector_gap_margin
            ));
        }

        for (i, s) in self.sectors.iter().enumerate() {
            if s.id.trim().is_empty() {
                return invalid(format!("sector #{i} has an empty id"));
            }
            if self.sectors[..i].iter().any(|o| o.id == s.id) {
                return invalid(format!("sector {} configured twice", s.id));
            }
            if !s.lot_ratio.is_finite() || s.lot_ratio < 1.0 {
                return invalid(format!("sector {}: lot_ratio {} below 1", s.id, s.lot_ratio));
            }
            if let Some(rate) = s.expected_compliance
                && !(rate > 0.0 && rate <= 1.0)
            {
                return invalid(format!(
                    "sector {}: expected_compliance {rate} outside (0, 1]",
                    s.id
                ));
            }
            if s.cpv_prefixes.is_empty() && s.buyer_keywords.is_empty() {
                warn!(sector = %s.id, "sector has no cpv prefixes or buyer keywords; it will match nothing");
            }
        }
        Ok(())
    }

    /// First configured sector the contract belongs to.
    pub fn sector_for(&self, cpv: Option<&str>, buyer_name_key: Option<&str>) -> Option<&SectorAdjustment> {
        self.sectors.iter().find(|s| s.matches(cpv, buyer_name_key))
    }
}
