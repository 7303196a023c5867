//! Domain records → Arrow batches in the `saracheck_core::output` layouts.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Decimal128Array, Float64Array, Int32Array, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::record_batch::RecordBatch;

use saracheck_core::output;
use saracheck_core::{Cents, Eligibility, EnrichedContract, GapFinding, MatchEvidence};
use saracheck_match::{SectorCoverage, StrategyYield, YearValidation};

use crate::StoreError;

fn decimals(values: impl Iterator<Item = Option<Cents>>) -> Result<ArrayRef, StoreError> {
    let raw: Vec<Option<i128>> = values.map(|c| c.map(|c| i128::from(c.get()))).collect();
    Ok(Arc::new(
        Decimal128Array::from(raw).with_precision_and_scale(18, 2)?,
    ))
}

fn u32_saturating(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// The per-contract match table, one row per record, in record order.
pub fn encode_matches(records: &[EnrichedContract]) -> Result<RecordBatch, StoreError> {
    fn evidence(r: &EnrichedContract) -> Option<&MatchEvidence> {
        r.outcome.evidence()
    }
    fn finding(r: &EnrichedContract) -> Option<&GapFinding> {
        r.outcome.finding()
    }

    let biennium: Vec<Option<&str>> = records
        .iter()
        .map(|r| match &r.eligibility {
            Eligibility::Eligible { biennium, .. } => Some(biennium.as_str()),
            Eligibility::Ineligible(_) => None,
        })
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))),
        Arc::new(Int32Array::from_iter(records.iter().map(|r| r.year))),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| r.category.map(|c| c.as_str())),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| r.tier.map(|t| t.as_str())),
        )),
        decimals(records.iter().map(|r| r.amount))?,
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| r.sector.as_deref()),
        )),
        Arc::new(BooleanArray::from_iter(
            records.iter().map(|r| Some(r.is_eligible())),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| r.eligibility.reason().map(|x| x.as_str())),
        )),
        decimals(records.iter().map(|r| r.eligibility.threshold()))?,
        Arc::new(StringArray::from(biennium)),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.outcome.status()),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| evidence(r).map(|m| m.notice_id.as_str())),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| evidence(r).map(|m| m.strategy.as_str())),
        )),
        Arc::new(Float64Array::from_iter(
            records.iter().map(|r| evidence(r).map(|m| m.amount_delta_pct)),
        )),
        Arc::new(UInt32Array::from_iter(
            records.iter().map(|r| evidence(r).and_then(|m| m.year_delta)),
        )),
        Arc::new(UInt32Array::from_iter(
            records
                .iter()
                .map(|r| evidence(r).map(|m| u32_saturating(m.group_size))),
        )),
        Arc::new(BooleanArray::from_iter(
            records.iter().map(|r| evidence(r).map(|m| m.ambiguous)),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| finding(r).map(|g| g.diagnosis.as_str())),
        )),
        Arc::new(StringArray::from_iter(
            records.iter().map(|r| finding(r).map(|g| g.confidence.as_str())),
        )),
        Arc::new(StringArray::from_iter(records.iter().map(|r| {
            finding(r).and_then(|g| g.relaxed_candidate.as_deref())
        }))),
    ];

    Ok(RecordBatch::try_new(
        Arc::new(output::match_schema()),
        columns,
    )?)
}

pub fn encode_validation_by_year(rows: &[YearValidation]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.eligible))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.matched))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.validation_rate),
        )),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(output::validation_by_year_schema()),
        columns,
    )?)
}

pub fn encode_strategy_yield(rows: &[StrategyYield]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.strategy.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.strategy.join_key()),
        )),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.matches))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.share))),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(output::strategy_yield_schema()),
        columns,
    )?)
}

pub fn encode_sector_coverage(rows: &[SectorCoverage]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.sector.as_str()),
        )),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.eligible))),
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.matched))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.raw_coverage),
        )),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.lot_ratio))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.adjusted_coverage),
        )),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(output::sector_coverage_schema()),
        columns,
    )?)
}

#[cfg(test)]
mod tests {
    use arrow::array::Array;
    use arrow::datatypes::DataType;
    use saracheck_core::{
        ContractCategory, Diagnosis, GapConfidence, IneligibleReason, Outcome, StrategyId,
    };

    use super::*;

    fn records() -> Vec<EnrichedContract> {
        let eligible = Eligibility::Eligible {
            threshold: Cents::from_whole_euros(221_000),
            biennium: "2018-2019".into(),
        };
        vec![
            EnrichedContract {
                id: "C1".into(),
                year: Some(2019),
                category: Some(ContractCategory::Services),
                tier: None,
                amount: Some(Cents::new(23_000_050)),
                sector: None,
                eligibility: eligible.clone(),
                outcome: Outcome::Matched(MatchEvidence {
                    notice_id: "N1".into(),
                    strategy: StrategyId::E4,
                    amount_delta_pct: 2.17,
                    year_delta: Some(0),
                    group_size: 5,
                    ambiguous: false,
                }),
            },
            EnrichedContract {
                id: "C2".into(),
                year: Some(2021),
                category: Some(ContractCategory::Works),
                tier: None,
                amount: Some(Cents::from_whole_euros(4_000_000)),
                sector: Some("health".into()),
                eligibility: Eligibility::Ineligible(IneligibleReason::BelowThreshold),
                outcome: Outcome::NotEligible,
            },
            EnrichedContract {
                id: "C3".into(),
                year: None,
                category: None,
                tier: None,
                amount: None,
                sector: None,
                eligibility: eligible,
                outcome: Outcome::Unmatched(GapFinding {
                    diagnosis: Diagnosis::ConfirmedGap,
                    confidence: GapConfidence::Medium,
                    relaxed_candidate: Some("N9".into()),
                }),
            },
        ]
    }

    fn utf8<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[test]
    fn match_table_layout() {
        let batch = encode_matches(&records()).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 20);
        assert_eq!(
            batch.column_by_name("amount").unwrap().data_type(),
            &DataType::Decimal128(18, 2)
        );

        let status = utf8(&batch, "match_status");
        assert_eq!(status.value(0), "matched");
        assert_eq!(status.value(1), "not-eligible");
        assert_eq!(status.value(2), "unmatched");

        assert_eq!(utf8(&batch, "strategy").value(0), "E4");
        assert!(utf8(&batch, "strategy").is_null(2));
        assert_eq!(utf8(&batch, "ineligible_reason").value(1), "below-threshold");
        assert_eq!(utf8(&batch, "relaxed_candidate").value(2), "N9");
        assert!(utf8(&batch, "biennium").is_null(1));

        let amounts = batch
            .column_by_name("amount")
            .unwrap()
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(amounts.value(0), 23_000_050);
        assert!(amounts.is_null(2));

        let group = batch
            .column_by_name("lot_group_size")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt32Array>()
            .unwrap();
        assert_eq!(group.value(0), 5);
        assert!(group.is_null(1));
    }

    #[test]
    fn empty_match_table() {
        let batch = encode_matches(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema().as_ref(), &output::match_schema());
    }

    #[test]
    fn summary_tables() {
        let yields = vec![StrategyYield {
            strategy: StrategyId::E2,
            matches: 3,
            share: 1.0,
        }];
        let batch = encode_strategy_yield(&yields).unwrap();
        assert_eq!(utf8(&batch, "join_key").value(0), StrategyId::E2.join_key());

        let years = vec![YearValidation {
            year: 2020,
            eligible: 4,
            matched: 1,
            validation_rate: 0.25,
        }];
        assert_eq!(encode_validation_by_year(&years).unwrap().num_rows(), 1);

        let sectors = vec![SectorCoverage {
            sector: "health".into(),
            eligible: 10,
            matched: 2,
            raw_coverage: 0.2,
            lot_ratio: 4.5,
            adjusted_coverage: 0.9,
        }];
        let batch = encode_sector_coverage(&sectors).unwrap();
        assert_eq!(utf8(&batch, "sector").value(0), "health");
    }
}
