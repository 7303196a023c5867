//! Aggregate statistics over the enriched records.
//!
//! Reporting only: nothing here feeds back into matching or diagnosis.

use std::collections::BTreeMap;

use serde::Serialize;

use saracheck_core::{
    Diagnosis, EnrichedContract, IneligibleReason, MatchConfig, Outcome, StrategyId,
};

/// Validation rate for one year: matched ÷ eligible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearValidation {
    pub year: i32,
    pub eligible: u64,
    pub matched: u64,
    pub validation_rate: f64,
}

/// Share of all matched contracts attributable to one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyYield {
    pub strategy: StrategyId,
    pub matches: u64,
    pub share: f64,
}

/// Raw coverage of a configured sector and its lot-adjusted estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorCoverage {
    pub sector: String,
    pub eligible: u64,
    pub matched: u64,
    pub raw_coverage: f64,
    pub lot_ratio: f64,
    /// `min(1, raw × lot_ratio)`.
    pub adjusted_coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub validation_by_year: Vec<YearValidation>,
    pub strategy_yield: Vec<StrategyYield>,
    pub sector_coverage: Vec<SectorCoverage>,
}

fn rate(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

pub fn summarize(records: &[EnrichedContract], config: &MatchConfig) -> Summary {
    let mut years: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    let mut strategies: BTreeMap<StrategyId, u64> = BTreeMap::new();
    let mut sectors: BTreeMap<&str, (u64, u64)> = BTreeMap::new();

    for r in records.iter().filter(|r| r.is_eligible()) {
        let matched = u64::from(r.is_matched());
        if let Some(year) = r.year {
            let entry = years.entry(year).or_default();
            entry.0 += 1;
            entry.1 += matched;
        }
        if let Outcome::Matched(m) = &r.outcome {
            *strategies.entry(m.strategy).or_default() += 1;
        }
        if let Some(sector) = r.sector.as_deref() {
            let entry = sectors.entry(sector).or_default();
            entry.0 += 1;
            entry.1 += matched;
        }
    }

    let validation_by_year = years
        .into_iter()
        .map(|(year, (eligible, matched))| YearValidation {
            year,
            eligible,
            matched,
            validation_rate: rate(matched, eligible),
        })
        .collect();

    let total: u64 = strategies.values().sum();
    let strategy_yield = StrategyId::ORDER
        .iter()
        .map(|&strategy| {
            let matches = strategies.get(&strategy).copied().unwrap_or(0);
            StrategyYield {
                strategy,
                matches,
                share: rate(matches, total),
            }
        })
        .collect();

    let sector_coverage = config
        .sectors
        .iter()
        .map(|s| {
            let (eligible, matched) = sectors.get(s.id.as_str()).copied().unwrap_or((0, 0));
            let raw = rate(matched, eligible);
            SectorCoverage {
                sector: s.id.clone(),
                eligible,
                matched,
                raw_coverage: raw,
                lot_ratio: s.lot_ratio,
                adjusted_coverage: (raw * s.lot_ratio).min(1.0),
            }
        })
        .collect();

    Summary {
        validation_by_year,
        strategy_yield,
        sector_coverage,
    }
}

/// Machine-readable account of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub threshold_version: String,
    pub contracts: usize,
    /// Contracts with no identifier; still present in the output.
    pub malformed_contracts: usize,
    pub duplicate_contract_ids: usize,
    pub notices: usize,
    /// Notices with no identifier; left out of matching.
    pub malformed_notices: usize,
    pub notices_by_source: BTreeMap<String, usize>,
    pub eligible: usize,
    /// Every reason is listed, zero counts included.
    pub ineligible_by_reason: BTreeMap<String, usize>,
    pub matched: usize,
    pub matched_by_strategy: BTreeMap<String, usize>,
    pub ambiguous_matches: usize,
    pub diagnosed: usize,
    /// Every diagnosis tier is listed, zero counts included.
    pub diagnoses: BTreeMap<String, usize>,
    pub confidence: BTreeMap<String, usize>,
    /// `eligible == matched + diagnosed`.
    pub residue_balanced: bool,
}

impl RunReport {
    /// Count outcomes over the records. Input-side counts start at zero and
    /// are filled in by the caller.
    pub fn from_records(threshold_version: &str, records: &[EnrichedContract]) -> Self {
        fn zeroed<const N: usize>(keys: [&'static str; N]) -> BTreeMap<String, usize> {
            keys.into_iter().map(|k| (k.to_owned(), 0)).collect()
        }

        let mut report = RunReport {
            threshold_version: threshold_version.to_owned(),
            contracts: records.len(),
            malformed_contracts: records.iter().filter(|r| r.id.trim().is_empty()).count(),
            duplicate_contract_ids: 0,
            notices: 0,
            malformed_notices: 0,
            notices_by_source: BTreeMap::new(),
            eligible: 0,
            ineligible_by_reason: zeroed(IneligibleReason::ALL.map(|r| r.as_str())),
            matched: 0,
            matched_by_strategy: BTreeMap::new(),
            ambiguous_matches: 0,
            diagnosed: 0,
            diagnoses: zeroed(Diagnosis::ALL.map(|d| d.as_str())),
            confidence: BTreeMap::new(),
            residue_balanced: false,
        };

        for r in records {
            if let Some(reason) = r.eligibility.reason() {
                *report
                    .ineligible_by_reason
                    .entry(reason.as_str().to_owned())
                    .or_default() += 1;
                continue;
            }
            report.eligible += 1;
            match &r.outcome {
                Outcome::Matched(m) => {
                    report.matched += 1;
                    *report
                        .matched_by_strategy
                        .entry(m.strategy.as_str().to_owned())
                        .or_default() += 1;
                    if m.ambiguous {
                        report.ambiguous_matches += 1;
                    }
                }
                Outcome::Unmatched(g) => {
                    report.diagnosed += 1;
                    *report
                        .diagnoses
                        .entry(g.diagnosis.as_str().to_owned())
                        .or_default() += 1;
                    *report
                        .confidence
                        .entry(g.confidence.as_str().to_owned())
                        .or_default() += 1;
                }
                Outcome::NotEligible => {}
            }
        }
        report.residue_balanced = report.eligible == report.matched + report.diagnosed;
        report
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
