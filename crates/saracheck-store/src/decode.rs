//! Arrow batches → domain records.
//!
//! Columns are found by alias (see `saracheck_core::schema`) and read from
//! whatever physical type the extractor wrote: text, integers, floats,
//! decimals, dates or timestamps. A cell that cannot be read is absent, never
//! an error; only a missing identifier column fails the decode.

use std::collections::HashMap;

use arrow::array::{
    Array, Date32Array, Date64Array, Decimal128Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, LargeStringArray, StringArray, StringViewArray,
    TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
    TimestampSecondArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use saracheck_core::schema::{self, placsp, ted};
use saracheck_core::{Cents, ProcurementContract, TedNotice, TedSource, normalize};

use crate::StoreError;

// ── Contracts ──

/// Decode register batches. Rows keep their order; none are dropped.
pub fn decode_contracts(batches: &[RecordBatch]) -> Result<Vec<ProcurementContract>, StoreError> {
    let mut out = Vec::with_capacity(batches.iter().map(|b| b.num_rows()).sum());

    for batch in batches {
        let s = batch.schema();
        let col = |aliases: &[&str]| schema::resolve(&s, aliases).map(|i| batch.column(i).as_ref());
        let id = col(placsp::ID).ok_or(StoreError::MissingColumn {
            collection: "placsp",
            column: "id",
        })?;
        let expediente = col(placsp::EXPEDIENTE);
        let buyer_name = col(placsp::BUYER_NAME);
        let buyer_tax_id = col(placsp::BUYER_TAX_ID);
        let awardee_tax_id = col(placsp::AWARDEE_TAX_ID);
        let category = col(placsp::CATEGORY);
        let buyer_tier = col(placsp::BUYER_TIER);
        let award_amount = col(placsp::AWARD_AMOUNT);
        let award_amount_vat = col(placsp::AWARD_AMOUNT_VAT);
        let estimated_amount = col(placsp::ESTIMATED_AMOUNT);
        let estimated_amount_vat = col(placsp::ESTIMATED_AMOUNT_VAT);
        let publication_date = col(placsp::PUBLICATION_DATE);
        let award_date = col(placsp::AWARD_DATE);
        let year = col(placsp::YEAR);
        let cpv = col(placsp::CPV);

        for row in 0..batch.num_rows() {
            out.push(ProcurementContract {
                id: get_string(id, row).unwrap_or_default(),
                expediente: text(expediente, row),
                buyer_name: text(buyer_name, row),
                buyer_tax_id: text(buyer_tax_id, row),
                awardee_tax_id: text(awardee_tax_id, row),
                category: text(category, row),
                buyer_tier: text(buyer_tier, row),
                award_amount: amount(award_amount, row),
                award_amount_vat: amount(award_amount_vat, row),
                estimated_amount: amount(estimated_amount, row),
                estimated_amount_vat: amount(estimated_amount_vat, row),
                publication_date: date(publication_date, row),
                award_date: date(award_date, row),
                year: year_of(year, row),
                cpv: text(cpv, row),
            });
        }
    }

    info!(contracts = out.len(), "decoded register contracts");
    Ok(out)
}

// ── Notices ──

/// Decode TED batches from either source tier.
///
/// The tier comes from a `source` column when present, otherwise from the
/// notice year (eForms from 2020 onwards).
pub fn decode_notices(batches: &[RecordBatch]) -> Result<Vec<TedNotice>, StoreError> {
    let mut out = Vec::with_capacity(batches.iter().map(|b| b.num_rows()).sum());

    for batch in batches {
        let s = batch.schema();
        let col = |aliases: &[&str]| schema::resolve(&s, aliases).map(|i| batch.column(i).as_ref());
        let notice_id = col(ted::NOTICE_ID).ok_or(StoreError::MissingColumn {
            collection: "ted",
            column: "notice_id",
        })?;
        let buyer_name = col(ted::BUYER_NAME);
        let buyer_tax_id = col(ted::BUYER_TAX_ID);
        let awardee_name = col(ted::AWARDEE_NAME);
        let awardee_tax_id = col(ted::AWARDEE_TAX_ID);
        let contract_type = col(ted::CONTRACT_TYPE);
        let reference_number = col(ted::REFERENCE_NUMBER);
        let award_value = col(ted::AWARD_VALUE);
        let estimated_value = col(ted::ESTIMATED_VALUE);
        let year = col(ted::YEAR);
        let dispatch_date = col(ted::DISPATCH_DATE);
        let cpv = col(ted::CPV);
        let source = col(ted::SOURCE);

        for row in 0..batch.num_rows() {
            let year = year_of(year, row);
            let dispatch_date = date(dispatch_date, row);
            let source = text(source, row)
                .and_then(|s| parse_source(&s))
                .unwrap_or_else(|| {
                    year.or(dispatch_date.map(|d| d.year()))
                        .map_or(TedSource::BulkCsv, TedSource::for_year)
                });
            out.push(TedNotice {
                notice_id: get_string(notice_id, row).unwrap_or_default(),
                buyer_name: text(buyer_name, row),
                buyer_tax_id: text(buyer_tax_id, row),
                awardee_name: text(awardee_name, row),
                awardee_tax_id: text(awardee_tax_id, row),
                contract_type: text(contract_type, row),
                reference_number: text(reference_number, row),
                award_value: amount(award_value, row),
                estimated_value: amount(estimated_value, row),
                year,
                dispatch_date,
                cpv: text(cpv, row),
                source,
            });
        }
    }

    info!(notices = out.len(), "decoded TED notices");
    Ok(out)
}

/// Merge notices that appear more than once, e.g. in both source tiers.
///
/// The first occurrence keeps its position; later copies only fill its
/// missing fields. Notices without an identifier pass through untouched.
pub fn reconcile_notices(notices: Vec<TedNotice>) -> Vec<TedNotice> {
    let mut out: Vec<TedNotice> = Vec::with_capacity(notices.len());
    let mut first: HashMap<String, usize> = HashMap::new();
    let mut merged = 0usize;

    for n in notices {
        let key = n.notice_id.trim().to_owned();
        if key.is_empty() {
            out.push(n);
            continue;
        }
        match first.get(&key) {
            Some(&pos) => {
                fill_missing(&mut out[pos], n);
                merged += 1;
            }
            None => {
                first.insert(key, out.len());
                out.push(n);
            }
        }
    }

    if merged > 0 {
        info!(merged, remaining = out.len(), "merged duplicate TED notices");
    }
    out
}

fn fill_missing(into: &mut TedNotice, from: TedNotice) {
    fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
        if slot.is_none() {
            *slot = value;
        }
    }
    debug!(notice = %into.notice_id, "filling notice from duplicate");
    fill(&mut into.buyer_name, from.buyer_name);
    fill(&mut into.buyer_tax_id, from.buyer_tax_id);
    fill(&mut into.awardee_name, from.awardee_name);
    fill(&mut into.awardee_tax_id, from.awardee_tax_id);
    fill(&mut into.contract_type, from.contract_type);
    fill(&mut into.reference_number, from.reference_number);
    fill(&mut into.award_value, from.award_value);
    fill(&mut into.estimated_value, from.estimated_value);
    fill(&mut into.year, from.year);
    fill(&mut into.dispatch_date, from.dispatch_date);
    fill(&mut into.cpv, from.cpv);
}

fn parse_source(s: &str) -> Option<TedSource> {
    match s.trim().to_ascii_lowercase().as_str() {
        "bulk-csv" | "bulk_csv" | "csv" | "bulk" => Some(TedSource::BulkCsv),
        "eforms" | "e-forms" | "api" => Some(TedSource::EForms),
        _ => None,
    }
}

// ── Cell readers ──

fn text(col: Option<&dyn Array>, row: usize) -> Option<String> {
    get_string(col?, row)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Text, or the decimal rendering of an integer column.
fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<StringArray>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = any.downcast_ref::<LargeStringArray>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = any.downcast_ref::<StringViewArray>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = any.downcast_ref::<Int64Array>() {
        return Some(arr.value(row).to_string());
    }
    if let Some(arr) = any.downcast_ref::<Int32Array>() {
        return Some(arr.value(row).to_string());
    }
    any.downcast_ref::<UInt64Array>()
        .map(|arr| arr.value(row).to_string())
}

fn amount(col: Option<&dyn Array>, row: usize) -> Option<Cents> {
    let col = col?;
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .and_then(|a| Cents::from_euros(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .and_then(|a| Cents::from_euros(f64::from(a.value(row)))),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .and_then(|a| whole_euros(a.value(row))),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .and_then(|a| whole_euros(i64::from(a.value(row)))),
        DataType::Decimal128(_, scale) => any
            .downcast_ref::<Decimal128Array>()
            .and_then(|a| decimal_cents(a.value(row), *scale)),
        _ => get_string(col, row).and_then(|s| normalize::parse_amount(&s)),
    }
}

fn whole_euros(euros: i64) -> Option<Cents> {
    (euros >= 0).then(|| euros.checked_mul(100)).flatten().map(Cents::new)
}

/// Rescale a decimal to two places, rounding half up.
fn decimal_cents(value: i128, scale: i8) -> Option<Cents> {
    if value < 0 {
        return None;
    }
    let cents = match scale {
        s if s > 2 => {
            let div = 10i128.checked_pow(u32::try_from(s - 2).ok()?)?;
            (value + div / 2) / div
        }
        s => value.checked_mul(10i128.checked_pow(u32::try_from(2 - s).ok()?)?)?,
    };
    i64::try_from(cents).ok().map(Cents::new)
}

fn date(col: Option<&dyn Array>, row: usize) -> Option<NaiveDate> {
    let col = col?;
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Date32 => any.downcast_ref::<Date32Array>()?.value_as_date(row),
        DataType::Date64 => any.downcast_ref::<Date64Array>()?.value_as_date(row),
        DataType::Timestamp(TimeUnit::Second, _) => any
            .downcast_ref::<TimestampSecondArray>()?
            .value_as_datetime(row)
            .map(|dt| dt.date()),
        DataType::Timestamp(TimeUnit::Millisecond, _) => any
            .downcast_ref::<TimestampMillisecondArray>()?
            .value_as_datetime(row)
            .map(|dt| dt.date()),
        DataType::Timestamp(TimeUnit::Microsecond, _) => any
            .downcast_ref::<TimestampMicrosecondArray>()?
            .value_as_datetime(row)
            .map(|dt| dt.date()),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => any
            .downcast_ref::<TimestampNanosecondArray>()?
            .value_as_datetime(row)
            .map(|dt| dt.date()),
        _ => get_string(col, row).and_then(|s| normalize::parse_date(&s)),
    }
}

fn year_of(col: Option<&dyn Array>, row: usize) -> Option<i32> {
    let col = col?;
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    let year = match col.data_type() {
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(row)),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .and_then(|a| i32::try_from(a.value(row)).ok()),
        DataType::Int16 => any
            .downcast_ref::<Int16Array>()
            .map(|a| i32::from(a.value(row))),
        DataType::UInt32 => any
            .downcast_ref::<UInt32Array>()
            .and_then(|a| i32::try_from(a.value(row)).ok()),
        DataType::Float64 => any.downcast_ref::<Float64Array>().and_then(|a| {
            let v = a.value(row);
            (v.is_finite() && v.fract() == 0.0).then_some(v as i32)
        }),
        _ => get_string(col, row).and_then(|s| s.trim().parse().ok()),
    };
    year.filter(|y| (1900..=2100).contains(y))
}
