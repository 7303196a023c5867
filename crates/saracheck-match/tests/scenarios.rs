//! End-to-end scenarios through `pipeline::run`.

use chrono::NaiveDate;
use saracheck_core::{
    Cents, Diagnosis, GapConfidence, IneligibleReason, MatchConfig, Outcome, ProcurementContract,
    SectorAdjustment, StrategyId, TedNotice, TedSource, ThresholdTable,
};
use saracheck_match::run;

// ─── Builders ───────────────────────────────────────────────────────────────

fn contract(id: &str, category: &str, tier: &str, year: i32, euros: i64) -> ProcurementContract {
    ProcurementContract {
        id: id.into(),
        category: Some(category.into()),
        buyer_tier: Some(tier.into()),
        award_amount: Some(Cents::from_whole_euros(euros)),
        year: Some(year),
        ..Default::default()
    }
}

fn notice(id: &str, year: i32, euros: i64) -> TedNotice {
    TedNotice {
        notice_id: id.into(),
        buyer_name: None,
        buyer_tax_id: None,
        awardee_name: None,
        awardee_tax_id: None,
        contract_type: None,
        reference_number: None,
        award_value: Some(Cents::from_whole_euros(euros)),
        estimated_value: None,
        year: Some(year),
        dispatch_date: None,
        cpv: None,
        source: TedSource::for_year(year),
    }
}

fn table() -> ThresholdTable {
    ThresholdTable::builtin().unwrap()
}

// ─── Worked examples ────────────────────────────────────────────────────────

/// Services for a non-central buyer in 2019 at 230 000 € clears the
/// 221 000 € threshold and is claimed by buyer tax ID.
#[test]
fn services_contract_matched_by_buyer_tax_id() {
    let mut c1 = contract("C1", "Servicios", "Comunidad Autónoma", 2019, 230_000);
    c1.buyer_tax_id = Some("S-4111001-F".into());
    let mut n1 = notice("N1", 2019, 235_000);
    n1.buyer_tax_id = Some("ES S4111001F".into());

    let out = run(&[c1], &[n1], &table(), &MatchConfig::default());
    let row = &out.records[0];

    assert!(row.is_eligible());
    assert_eq!(row.eligibility.threshold(), Some(Cents::from_whole_euros(221_000)));
    let m = row.outcome.evidence().expect("matched");
    assert_eq!(m.strategy, StrategyId::E3);
    assert_eq!(m.notice_id, "N1");
    assert_eq!(out.report.matched, 1);
}

/// Works at 4 000 000 € in 2021 stays below 5 350 000 € and never reaches
/// the matcher, even with a perfect notice on offer.
#[test]
fn works_below_threshold_is_not_matched() {
    let mut c2 = contract("C2", "Obras", "Entidad Local", 2021, 4_000_000);
    c2.buyer_tax_id = Some("P2906700F".into());
    let mut n = notice("N2", 2021, 4_000_000);
    n.buyer_tax_id = Some("P2906700F".into());

    let out = run(&[c2], &[n], &table(), &MatchConfig::default());
    let row = &out.records[0];

    assert_eq!(row.eligibility.reason(), Some(IneligibleReason::BelowThreshold));
    assert_eq!(row.outcome, Outcome::NotEligible);
    assert!(out.matches.is_empty());
    assert_eq!(out.report.diagnosed, 0);
}

/// Five lots of one buyer in 2020 summing to 1 200 000 € against one notice
/// of 1 210 000 €: E4 claims all five against the same notice.
#[test]
fn lots_aggregate_to_one_notice() {
    let amounts = [230_000, 235_000, 240_000, 245_000, 250_000];
    let contracts: Vec<ProcurementContract> = amounts
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let mut c = contract(&format!("L{i}"), "Suministros", "Local", 2020, a);
            c.buyer_tax_id = Some("Q2866001G".into());
            c
        })
        .collect();
    let mut n = notice("2020/S 123-456789", 2020, 1_210_000);
    n.buyer_tax_id = Some("Q2866001G".into());

    let out = run(&contracts, &[n], &table(), &MatchConfig::default());

    assert_eq!(out.report.eligible, 5);
    for row in &out.records {
        let m = row.outcome.evidence().expect("matched");
        assert_eq!(m.strategy, StrategyId::E4);
        assert_eq!(m.notice_id, "2020/S 123-456789");
        assert_eq!(m.group_size, 5);
    }
    assert_eq!(out.matches.len(), 1);
    assert_eq!(out.summary.strategy_yield[3].share, 1.0);
}

// ─── Strategy coverage ──────────────────────────────────────────────────────

/// E2 joins the register's case number to the notice's file reference.
#[test]
fn case_number_cross_reference() {
    let mut c = contract("C", "Servicios", "central", 2018, 500_000);
    c.expediente = Some("2018/00123-SE".into());
    let mut n = notice("N", 2018, 520_000);
    n.reference_number = Some("2018 00123 SE".into());

    let out = run(&[c], &[n], &table(), &MatchConfig::default());
    assert_eq!(out.records[0].outcome.evidence().unwrap().strategy, StrategyId::E2);
}

/// E5 falls back to the normalised buyer name.
#[test]
fn buyer_name_fallback() {
    let mut c = contract("C", "Suministros", "Local", 2022, 600_000);
    c.buyer_name = Some("Ayuntamiento de Málaga".into());
    let mut n = notice("N", 2022, 590_000);
    n.buyer_name = Some("AYUNTAMIENTO DE MALAGA".into());

    let out = run(&[c], &[n], &table(), &MatchConfig::default());
    assert_eq!(out.records[0].outcome.evidence().unwrap().strategy, StrategyId::E5);
}

/// VAT-inclusive award amounts are netted before comparison.
#[test]
fn vat_inclusive_amount_reconciled() {
    let mut c = ProcurementContract {
        id: "C".into(),
        category: Some("Servicios".into()),
        buyer_tier: Some("Local".into()),
        award_amount_vat: Some(Cents::from_whole_euros(363_000)),
        award_date: NaiveDate::from_ymd_opt(2023, 6, 1),
        ..Default::default()
    };
    c.awardee_tax_id = Some("B12345678".into());
    let mut n = notice("N", 2023, 300_000);
    n.awardee_tax_id = Some("B12345678".into());

    let out = run(&[c], &[n], &table(), &MatchConfig::default());
    let row = &out.records[0];
    assert_eq!(row.amount, Some(Cents::from_whole_euros(300_000)));
    assert_eq!(row.year, Some(2023));
    let m = row.outcome.evidence().unwrap();
    assert_eq!(m.strategy, StrategyId::E1);
    assert_eq!(m.amount_delta_pct, 0.0);
}

/// A notice whose value is far outside the strict tolerance but inside the
/// relaxed one leaves a medium-confidence gap naming that notice.
#[test]
fn near_miss_recorded_as_evidence() {
    let mut c = contract("C", "Servicios", "Local", 2019, 300_000);
    c.buyer_tax_id = Some("P2906700F".into());
    let mut n = notice("N-near", 2019, 400_000);
    n.buyer_tax_id = Some("P2906700F".into());

    let out = run(&[c], &[n], &table(), &MatchConfig::default());
    let gap = out.records[0].outcome.finding().expect("unmatched");
    assert_eq!(gap.diagnosis, Diagnosis::ConfirmedGap);
    assert_eq!(gap.confidence, GapConfidence::Medium);
    assert_eq!(gap.relaxed_candidate.as_deref(), Some("N-near"));
}

/// A contract with no join key at all is insufficient data, not a gap.
#[test]
fn no_join_keys_is_insufficient_data() {
    let c = contract("C", "Obras", "Local", 2019, 9_000_000);
    let out = run(&[c], &[], &table(), &MatchConfig::default());
    let gap = out.records[0].outcome.finding().unwrap();
    assert_eq!(gap.diagnosis, Diagnosis::InsufficientData);
}

/// Rows without identifiers are kept in the output and counted.
#[test]
fn malformed_rows_counted_not_dropped() {
    let c = contract("", "Obras", "Local", 2019, 9_000_000);
    let n = notice(" ", 2019, 9_000_000);
    let out = run(&[c], &[n], &table(), &MatchConfig::default());

    assert_eq!(out.records.len(), 1);
    assert_eq!(
        out.records[0].eligibility.reason(),
        Some(IneligibleReason::MissingIdentifier)
    );
    assert_eq!(out.report.malformed_contracts, 1);
    assert_eq!(out.report.malformed_notices, 1);
    assert_eq!(out.report.notices, 1);
}

/// Register ids can repeat; each row keeps its own outcome.
#[test]
fn duplicate_ids_keep_row_outcomes() {
    let small = contract("X", "Obras", "Local", 2021, 1_000_000);
    let mut near = contract("X", "Obras", "Local", 2021, 6_000_000);
    near.buyer_tax_id = Some("P2906700F".into());
    let mut far = contract("X", "Obras", "Local", 2021, 20_000_000);
    far.buyer_tax_id = Some("P2906700F".into());
    let mut n = notice("N1", 2021, 6_000_000);
    n.buyer_tax_id = Some("P2906700F".into());

    let out = run(&[small, near, far], &[n], &table(), &MatchConfig::default());

    assert_eq!(out.records[0].outcome, Outcome::NotEligible);
    let m = out.records[1].outcome.evidence().expect("matched");
    assert_eq!(m.notice_id, "N1");
    let gap = out.records[2].outcome.finding().expect("unmatched");
    assert_eq!(gap.diagnosis, Diagnosis::ConfirmedGap);
    assert_eq!(gap.confidence, GapConfidence::High);

    let claimed: usize = out.matches.iter().map(|m| m.contract_ids.len()).sum();
    assert_eq!(out.report.matched, claimed);
    assert_eq!((out.report.matched, out.report.diagnosed), (1, 1));
    assert!(out.report.residue_balanced);
    assert_eq!(out.report.duplicate_contract_ids, 1);
}

/// Sector calibration feeds both diagnosis and coverage reporting.
#[test]
fn health_sector_reclassification() {
    let contracts: Vec<ProcurementContract> = (0..10)
        .map(|i| {
            let mut c = contract(&format!("H{i:02}"), "Suministros", "Comunidad Autónoma", 2021, 300_000 + i * 5_000);
            c.buyer_name = Some(format!("Hospital Universitario {i}"));
            c.buyer_tax_id = Some(format!("Q{:07}H", 2_800_000 + i));
            c.cpv = Some("33690000-3".into());
            c
        })
        .collect();
    let notices: Vec<TedNotice> = (0..2)
        .map(|i| {
            let mut n = notice(&format!("N{i}"), 2021, 300_000 + i * 5_000);
            n.buyer_tax_id = Some(format!("Q{:07}H", 2_800_000 + i));
            n
        })
        .collect();

    let config = MatchConfig {
        sectors: vec![SectorAdjustment {
            id: "health".into(),
            cpv_prefixes: vec!["33".into()],
            buyer_keywords: vec!["hospital".into()],
            lot_ratio: 4.5,
            expected_compliance: Some(0.6),
        }],
        ..MatchConfig::default()
    };
    let out = run(&contracts, &notices, &table(), &config);

    // strict 0.2, expected 0.6: floor(8 × 0.4 / 0.8) = 4 of 8 reclassified.
    assert_eq!(out.report.matched, 2);
    assert_eq!(out.report.diagnoses["likely-false-positive-sector-pattern"], 4);
    assert_eq!(out.report.diagnoses["confirmed-gap"], 4);

    let sector = &out.summary.sector_coverage[0];
    assert_eq!((sector.eligible, sector.matched), (10, 2));
    assert!((sector.adjusted_coverage - 0.9).abs() < 1e-9);
    assert!(out.records.iter().all(|r| r.sector.as_deref() == Some("health")));
}
