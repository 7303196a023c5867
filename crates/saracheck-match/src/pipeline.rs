//! End-to-end run: normalise, classify, match, diagnose, summarise.
//!
//! Every input contract yields exactly one output record, in input order.
//! Each run is a full recomputation from the two input collections.

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use saracheck_core::{
    Diagnosis, EnrichedContract, GapConfidence, GapFinding, MatchConfig, NormalizedContract,
    NormalizedNotice, Outcome, ProcurementContract, TedNotice, ThresholdTable, classify,
};

use crate::diagnosis;
use crate::matcher::{MatchCandidate, Matcher};
use crate::stats::{self, RunReport, Summary};

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// One record per input contract, in input order.
    pub records: Vec<EnrichedContract>,
    /// Claimed pairings, in strategy order.
    pub matches: Vec<MatchCandidate>,
    pub summary: Summary,
    pub report: RunReport,
}

pub fn run(
    contracts: &[ProcurementContract],
    notices: &[TedNotice],
    table: &ThresholdTable,
    config: &MatchConfig,
) -> RunOutput {
    let normalized: Vec<NormalizedContract> = contracts
        .iter()
        .map(|c| NormalizedContract::from_contract(c, config.vat_rate))
        .collect();
    let eligibility: Vec<_> = normalized.iter().map(|c| classify(c, table)).collect();

    let all_notices: Vec<NormalizedNotice> = notices.iter().map(NormalizedNotice::from_notice).collect();
    let notice_pool: Vec<&NormalizedNotice> = all_notices
        .iter()
        .filter(|n| !n.notice_id.trim().is_empty())
        .collect();
    let malformed_notices = all_notices.len() - notice_pool.len();

    // Row index in `normalized` of each eligible contract.
    let eligible_rows: Vec<usize> = eligibility
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_eligible())
        .map(|(row, _)| row)
        .collect();
    let eligible: Vec<&NormalizedContract> =
        eligible_rows.iter().map(|&row| &normalized[row]).collect();
    let duplicate_ids = count_duplicates(&eligible);
    if duplicate_ids > 0 {
        warn!(duplicate_ids, "eligible contracts share identifiers");
    }
    info!(
        contracts = normalized.len(),
        eligible = eligible.len(),
        notices = notice_pool.len(),
        malformed_notices,
        "classified contracts"
    );

    let matcher = Matcher::new(config);
    let outcome = matcher.run(eligible.clone(), notice_pool.clone());

    let findings = diagnosis::diagnose(
        config,
        &eligible,
        &outcome.contracts,
        &notice_pool,
        &outcome.notices,
    );

    // Outcomes are placed by row, never by id: register ids can repeat.
    let mut terminal: Vec<Option<Outcome>> = vec![None; normalized.len()];
    for m in &outcome.matches {
        let evidence = m.evidence();
        for &p in &m.positions {
            terminal[eligible_rows[p]] = Some(Outcome::Matched(evidence.clone()));
        }
    }
    for (&p, finding) in outcome.residual.iter().zip(findings) {
        terminal[eligible_rows[p]] = Some(Outcome::Unmatched(finding));
    }

    let records: Vec<EnrichedContract> = normalized
        .iter()
        .zip(eligibility)
        .zip(terminal)
        .map(|((c, eligibility), terminal)| {
            let outcome = if !eligibility.is_eligible() {
                Outcome::NotEligible
            } else if let Some(outcome) = terminal {
                outcome
            } else {
                warn!(id = %c.id, "eligible contract with no terminal state");
                Outcome::Unmatched(GapFinding {
                    diagnosis: Diagnosis::InsufficientData,
                    confidence: GapConfidence::Low,
                    relaxed_candidate: None,
                })
            };
            EnrichedContract {
                id: c.id.clone(),
                year: c.year,
                category: c.category,
                tier: c.tier,
                amount: c.amount,
                sector: config
                    .sector_for(c.cpv.as_deref(), c.buyer_name_key.as_deref())
                    .map(|s| s.id.clone()),
                eligibility,
                outcome,
            }
        })
        .collect();

    let summary = stats::summarize(&records, config);

    let mut report = RunReport::from_records(table.version(), &records);
    report.duplicate_contract_ids = duplicate_ids;
    report.notices = all_notices.len();
    report.malformed_notices = malformed_notices;
    report.notices_by_source = notice_pool.iter().fold(BTreeMap::new(), |mut acc, n| {
        *acc.entry(n.source.as_str().to_owned()).or_default() += 1;
        acc
    });
    if !report.residue_balanced {
        warn!(
            eligible = report.eligible,
            matched = report.matched,
            diagnosed = report.diagnosed,
            "residue does not balance"
        );
    }
    info!(
        eligible = report.eligible,
        matched = report.matched,
        diagnosed = report.diagnosed,
        ambiguous = report.ambiguous_matches,
        "run complete"
    );

    RunOutput {
        records,
        matches: outcome.matches,
        summary,
        report,
    }
}

fn count_duplicates(contracts: &[&NormalizedContract]) -> usize {
    let mut seen = HashSet::with_capacity(contracts.len());
    contracts.iter().filter(|c| !seen.insert(c.id.as_str())).count()
}
