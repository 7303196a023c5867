//! Terminal rendering for run summaries, the threshold table and single
//! eligibility decisions.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use saracheck_core::{ContractCategory, Eligibility, NormalizedContract, ThresholdTable};
use saracheck_match::RunOutput;

// ── Public API ──

pub fn print_run_summary(run: &RunOutput) {
    print!("{}", run_summary(run));
}

pub fn print_threshold_table(table: &ThresholdTable) {
    print!("{}", threshold_grid(table));
}

pub fn print_classification(contract: &NormalizedContract, decision: &Eligibility) {
    print!("{}", classification(contract, decision));
}

// ── Rendering ──

fn pct(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

fn nonzero(counts: &BTreeMap<String, usize>) -> impl Iterator<Item = (&String, &usize)> {
    counts.iter().filter(|(_, n)| **n > 0)
}

fn run_summary(run: &RunOutput) -> String {
    let r = &run.report;
    let mut s = String::new();

    let _ = writeln!(s, "=== SARA cross-check ({}) ===", r.threshold_version);
    let _ = writeln!(
        s,
        "  {:<26} {} ({} malformed)",
        "register contracts", r.contracts, r.malformed_contracts
    );
    let _ = writeln!(
        s,
        "  {:<26} {} ({} malformed)",
        "TED notices", r.notices, r.malformed_notices
    );
    let _ = writeln!(s, "  {:<26} {}", "eligible", r.eligible);
    let _ = writeln!(
        s,
        "  {:<26} {} ({} ambiguous)",
        "matched", r.matched, r.ambiguous_matches
    );
    let _ = writeln!(s, "  {:<26} {}", "unmatched", r.diagnosed);
    if !r.residue_balanced {
        let _ = writeln!(s, "  WARNING: eligible != matched + unmatched");
    }

    if r.eligible < r.contracts {
        let _ = writeln!(s, "\nNot eligible");
        for (reason, n) in nonzero(&r.ineligible_by_reason) {
            let _ = writeln!(s, "  {reason:<26} {n}");
        }
    }

    let _ = writeln!(s, "\nStrategy yield");
    for y in &run.summary.strategy_yield {
        let _ = writeln!(
            s,
            "  {:<3} {:<22} {:>7} {:>7}",
            y.strategy.as_str(),
            y.strategy.join_key(),
            y.matches,
            pct(y.share)
        );
    }

    if r.diagnosed > 0 {
        let _ = writeln!(s, "\nDiagnosis");
        for (diagnosis, n) in nonzero(&r.diagnoses) {
            let _ = writeln!(s, "  {diagnosis:<36} {n}");
        }
        for (confidence, n) in &r.confidence {
            let _ = writeln!(s, "  confidence {confidence:<25} {n}");
        }
    }

    if !run.summary.validation_by_year.is_empty() {
        let _ = writeln!(s, "\nValidation by year");
        for y in &run.summary.validation_by_year {
            let _ = writeln!(
                s,
                "  {}  {:>6} / {:<6} {:>7}",
                y.year,
                y.matched,
                y.eligible,
                pct(y.validation_rate)
            );
        }
    }

    if !run.summary.sector_coverage.is_empty() {
        let _ = writeln!(s, "\nSector coverage");
        for c in &run.summary.sector_coverage {
            let _ = writeln!(
                s,
                "  {:<12} raw {:>7}  x{:<4} adjusted {:>7}",
                c.sector,
                pct(c.raw_coverage),
                c.lot_ratio,
                pct(c.adjusted_coverage)
            );
        }
    }
    s
}

fn threshold_grid(table: &ThresholdTable) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "=== SARA thresholds ({}) ===", table.version());
    for b in table.bienniums() {
        let _ = writeln!(s, "{b}");
        for category in ContractCategory::ALL {
            for rule in b.rules.iter().filter(|r| r.category == category) {
                let _ = writeln!(
                    s,
                    "  {:<16} {:<20} {:>14} EUR",
                    category.as_str(),
                    rule.tier.as_str(),
                    rule.amount
                );
            }
        }
    }
    s
}

fn classification(contract: &NormalizedContract, decision: &Eligibility) -> String {
    let mut s = String::new();
    let field = |v: Option<String>| v.unwrap_or_else(|| "(unrecognised)".into());
    let _ = writeln!(
        s,
        "  {:<12} {}",
        "category",
        field(contract.category.map(|c| c.as_str().to_owned()))
    );
    let _ = writeln!(
        s,
        "  {:<12} {}",
        "tier",
        field(contract.tier.map(|t| t.as_str().to_owned()))
    );
    let _ = writeln!(s, "  {:<12} {}", "amount", field(contract.amount.map(|a| a.to_string())));
    match decision {
        Eligibility::Eligible { threshold, biennium } => {
            let _ = writeln!(s, "ELIGIBLE: above {threshold} EUR ({biennium})");
        }
        Eligibility::Ineligible(reason) if reason.is_unclassifiable() => {
            let _ = writeln!(s, "UNCLASSIFIABLE: {}", reason.as_str());
        }
        Eligibility::Ineligible(reason) => {
            let _ = writeln!(s, "NOT ELIGIBLE: {}", reason.as_str());
        }
    }
    s
}
