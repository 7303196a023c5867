//! Diagnosis and confidence grading for eligible contracts left unmatched.
//!
//! Tiers are tried in a fixed order: insufficient data, lot pattern, sector
//! pattern, confirmed gap. Every unmatched contract gets exactly one.
//!
//! A relaxed probe (wider amount and year tolerance, same join keys) looks
//! for a near miss among the unclaimed notices. It never changes a match; it
//! only grades confidence and is reported as audit evidence.

use std::collections::HashMap;

use tracing::info;

use saracheck_core::{
    ContractCategory, Diagnosis, GapConfidence, GapFinding, MatchConfig, NormalizedContract,
    NormalizedNotice, SectorAdjustment, StrategyId,
};

use crate::strategy::{self, NoticeIndex, Rule};

/// Join keys the relaxed probe searches on.
const PROBE_KEYS: [StrategyId; 4] = [StrategyId::E1, StrategyId::E2, StrategyId::E3, StrategyId::E5];

/// Diagnose every contract in `unmatched`.
///
/// `eligible` is the full eligible set (matched or not), `notices` every
/// notice in the run and `unclaimed` the notices no strategy claimed. The
/// result is parallel to `unmatched`.
pub fn diagnose(
    config: &MatchConfig,
    eligible: &[&NormalizedContract],
    unmatched: &[&NormalizedContract],
    notices: &[&NormalizedNotice],
    unclaimed: &[&NormalizedNotice],
) -> Vec<GapFinding> {
    let presence = BuyerPresence::build(eligible, notices);
    let probe = RelaxedProbe::new(config, unclaimed);

    let sectors: Vec<Option<&SectorAdjustment>> = unmatched
        .iter()
        .map(|c| config.sector_for(c.cpv.as_deref(), c.buyer_name_key.as_deref()))
        .collect();

    let mut tiers: Vec<Option<Diagnosis>> = unmatched
        .iter()
        .zip(&sectors)
        .map(|(c, sector)| {
            if c.has_no_join_keys() {
                return Some(Diagnosis::InsufficientData);
            }
            let min_ratio = sector.map_or(config.lot_pattern_min_ratio, |s| s.lot_ratio);
            presence
                .lot_ratio(c)
                .filter(|&ratio| ratio >= min_ratio)
                .map(|_| Diagnosis::LikelyFalsePositiveLotPattern)
        })
        .collect();

    for sector in &config.sectors {
        reclassify_sector(config, sector, eligible, unmatched, &sectors, &mut tiers);
    }

    let findings: Vec<GapFinding> = unmatched
        .iter()
        .zip(tiers)
        .map(|(c, tier)| {
            let diagnosis = tier.unwrap_or(Diagnosis::ConfirmedGap);
            let relaxed_candidate = match diagnosis {
                Diagnosis::InsufficientData => None,
                _ => probe.nearest(c).map(str::to_owned),
            };
            let confidence = match (diagnosis, &relaxed_candidate) {
                (Diagnosis::ConfirmedGap, None) => GapConfidence::High,
                (Diagnosis::ConfirmedGap, Some(_)) => GapConfidence::Medium,
                _ => GapConfidence::Low,
            };
            GapFinding {
                diagnosis,
                confidence,
                relaxed_candidate,
            }
        })
        .collect();

    let count = |d: Diagnosis| findings.iter().filter(|f| f.diagnosis == d).count();
    info!(
        unmatched = unmatched.len(),
        confirmed_gap = count(Diagnosis::ConfirmedGap),
        lot_pattern = count(Diagnosis::LikelyFalsePositiveLotPattern),
        sector_pattern = count(Diagnosis::LikelyFalsePositiveSectorPattern),
        insufficient_data = count(Diagnosis::InsufficientData),
        "diagnosis complete"
    );
    findings
}

/// Share of a sector's still-undiagnosed unmatched contracts to reclassify,
/// when its strict rate falls short of the expected rate by more than the
/// configured margin.
pub fn reclassified_share(remaining: usize, strict: f64, expected: f64, margin: f64) -> usize {
    if remaining == 0 || expected - strict <= margin || strict >= 1.0 {
        return 0;
    }
    let fraction = ((expected - strict) / (1.0 - strict)).clamp(0.0, 1.0);
    // Rates like 0.7 − 0.4 land a hair under the exact value.
    ((remaining as f64 * fraction + 1e-9).floor() as usize).min(remaining)
}

fn reclassify_sector(
    config: &MatchConfig,
    sector: &SectorAdjustment,
    eligible: &[&NormalizedContract],
    unmatched: &[&NormalizedContract],
    sectors: &[Option<&SectorAdjustment>],
    tiers: &mut [Option<Diagnosis>],
) {
    let Some(expected) = sector.expected_compliance else {
        return;
    };
    let in_sector = |s: &Option<&SectorAdjustment>| s.is_some_and(|s| s.id == sector.id);

    let eligible_n = eligible
        .iter()
        .filter(|c| in_sector(&config.sector_for(c.cpv.as_deref(), c.buyer_name_key.as_deref())))
        .count();
    let unmatched_n = sectors.iter().filter(|s| in_sector(s)).count();
    if eligible_n == 0 {
        return;
    }
    let strict = eligible_n.saturating_sub(unmatched_n) as f64 / eligible_n as f64;

    let mut remaining: Vec<usize> = (0..unmatched.len())
        .filter(|&i| in_sector(&sectors[i]) && tiers[i].is_none())
        .collect();
    let share = reclassified_share(remaining.len(), strict, expected, config.sector_gap_margin);
    if share == 0 {
        return;
    }

    remaining.sort_by(|&a, &b| {
        unmatched[a]
            .amount
            .cmp(&unmatched[b].amount)
            .then_with(|| unmatched[a].id.cmp(&unmatched[b].id))
    });
    for &i in &remaining[..share] {
        tiers[i] = Some(Diagnosis::LikelyFalsePositiveSectorPattern);
    }
    info!(
        sector = %sector.id,
        strict_rate = strict,
        expected_rate = expected,
        reclassified = share,
        "sector pattern applied"
    );
}

// ── Buyer presence ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BuyerRef<'a> {
    Tax(&'a str),
    Name(&'a str),
}

impl<'a> BuyerRef<'a> {
    fn of_contract(c: &'a NormalizedContract) -> Option<Self> {
        c.buyer_tax_key
            .as_deref()
            .map(Self::Tax)
            .or_else(|| c.buyer_name_key.as_deref().map(Self::Name))
    }
}

/// Register records and TED notices per (buyer, category).
struct BuyerPresence<'a> {
    records: HashMap<(BuyerRef<'a>, Option<ContractCategory>), usize>,
    notices: HashMap<(BuyerRef<'a>, Option<ContractCategory>), usize>,
}

impl<'a> BuyerPresence<'a> {
    fn build(eligible: &[&'a NormalizedContract], notices: &[&'a NormalizedNotice]) -> Self {
        let mut records = HashMap::new();
        for &c in eligible {
            if let Some(buyer) = BuyerRef::of_contract(c) {
                *records.entry((buyer, c.category)).or_default() += 1;
            }
        }

        let mut counts = HashMap::new();
        for &n in notices {
            let refs = [
                n.buyer_tax_key.as_deref().map(BuyerRef::Tax),
                n.buyer_name_key.as_deref().map(BuyerRef::Name),
            ];
            for buyer in refs.into_iter().flatten() {
                *counts.entry((buyer, n.category)).or_default() += 1;
            }
        }
        Self {
            records,
            notices: counts,
        }
    }

    /// Register records per notice for the contract's buyer and category.
    ///
    /// Notices with no category count towards every category. `None` when
    /// the buyer has no TED presence at all.
    fn lot_ratio(&self, c: &'a NormalizedContract) -> Option<f64> {
        let buyer = BuyerRef::of_contract(c)?;
        let notices = self.notices.get(&(buyer, c.category)).copied().unwrap_or(0)
            + match c.category {
                Some(_) => self.notices.get(&(buyer, None)).copied().unwrap_or(0),
                None => 0,
            };
        if notices == 0 {
            return None;
        }
        let records = self.records.get(&(buyer, c.category)).copied().unwrap_or(1);
        Some(records as f64 / notices as f64)
    }
}

// ── Relaxed probe ──

struct RelaxedProbe<'a> {
    rule: Rule,
    notices: &'a [&'a NormalizedNotice],
    indexes: Vec<(StrategyId, NoticeIndex<'a>)>,
}

impl<'a> RelaxedProbe<'a> {
    fn new(config: &MatchConfig, unclaimed: &'a [&'a NormalizedNotice]) -> Self {
        let indexes = PROBE_KEYS
            .iter()
            .map(|&key| (key, NoticeIndex::build(unclaimed, move |n| strategy::notice_key(key, n))))
            .collect();
        Self {
            rule: Rule::new(config.tolerances.relaxed),
            notices: unclaimed,
            indexes,
        }
    }

    /// Closest unclaimed notice under the relaxed rule, on any probe key.
    fn nearest(&self, c: &NormalizedContract) -> Option<&'a str> {
        let amount = c.amount?;
        let (low, high) = amount.window(self.rule.amount);

        let mut best = None;
        for (key, index) in &self.indexes {
            let Some(k) = strategy::contract_key(*key, c) else {
                continue;
            };
            for pos in index.window(k, low, high) {
                let n = self.notices[pos];
                let Some(adm) = self.rule.admits(amount, c.year, n) else {
                    continue;
                };
                let rank = (adm.delta, n.year.unwrap_or(i32::MAX), n.notice_id.as_str());
                if best.as_ref().is_none_or(|b| rank < *b) {
                    best = Some(rank);
                }
            }
        }
        best.map(|(_, _, id)| id)
    }
}
