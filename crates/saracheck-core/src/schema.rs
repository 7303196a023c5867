//! Arrow schemas and column names for the two input collections and the
//! outputs.
//!
//! Input columns are looked up by alias: the first alias is the canonical
//! name, the rest are the spellings the upstream extractors are known to use.
//! Matching is case-insensitive.

use arrow::datatypes::Schema;

/// Index of the first column whose name matches one of `aliases`.
pub fn resolve(schema: &Schema, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        schema
            .fields()
            .iter()
            .position(|f| f.name().eq_ignore_ascii_case(alias))
    })
}

/// National register (PLACSP) contract records.
pub mod placsp {
    use arrow::datatypes::{DataType, Field, Schema};

    pub const ID: &[&str] = &["id", "identificador", "id_contrato", "link"];
    pub const EXPEDIENTE: &[&str] = &["expediente", "numero_expediente", "num_expediente"];
    pub const BUYER_NAME: &[&str] = &["organo_contratante", "buyer_name", "organo"];
    pub const BUYER_TAX_ID: &[&str] = &["nif_organo_contratante", "nif_organo", "buyer_tax_id"];
    pub const AWARDEE_TAX_ID: &[&str] = &["nif_adjudicatario", "awardee_tax_id"];
    pub const CATEGORY: &[&str] = &["tipo_contrato", "category"];
    pub const BUYER_TIER: &[&str] = &["tipo_administracion", "buyer_tier"];
    pub const AWARD_AMOUNT: &[&str] = &[
        "importe_adjudicacion",
        "importe_adjudicacion_sin_iva",
        "importe_sin_iva",
        "award_amount",
    ];
    pub const AWARD_AMOUNT_VAT: &[&str] = &[
        "importe_adjudicacion_con_iva",
        "importe_adj_con_iva",
        "importe_con_iva",
        "award_amount_vat",
    ];
    pub const ESTIMATED_AMOUNT: &[&str] = &[
        "valor_estimado",
        "presupuesto_base_sin_iva",
        "estimated_amount",
    ];
    pub const ESTIMATED_AMOUNT_VAT: &[&str] = &["presupuesto_base_con_iva", "estimated_amount_vat"];
    pub const PUBLICATION_DATE: &[&str] = &["fecha_publicacion", "publication_date"];
    pub const AWARD_DATE: &[&str] = &["fecha_adjudicacion", "award_date"];
    pub const YEAR: &[&str] = &["year", "anio", "ano"];
    pub const CPV: &[&str] = &["cpv", "codigo_cpv"];

    /// Canonical schema, as written by the register extractor.
    pub fn contract_schema() -> Schema {
        Schema::new(vec![
            Field::new(ID[0], DataType::Utf8, false),
            Field::new(EXPEDIENTE[0], DataType::Utf8, true),
            Field::new(BUYER_NAME[0], DataType::Utf8, true),
            Field::new(BUYER_TAX_ID[0], DataType::Utf8, true),
            Field::new(AWARDEE_TAX_ID[0], DataType::Utf8, true),
            Field::new(CATEGORY[0], DataType::Utf8, true),
            Field::new(BUYER_TIER[0], DataType::Utf8, true),
            Field::new(AWARD_AMOUNT[0], DataType::Float64, true),
            Field::new(AWARD_AMOUNT_VAT[0], DataType::Float64, true),
            Field::new(ESTIMATED_AMOUNT[0], DataType::Float64, true),
            Field::new(ESTIMATED_AMOUNT_VAT[0], DataType::Float64, true),
            Field::new(PUBLICATION_DATE[0], DataType::Date32, true),
            Field::new(AWARD_DATE[0], DataType::Date32, true),
            Field::new(YEAR[0], DataType::Int32, true),
            Field::new(CPV[0], DataType::Utf8, true),
        ])
    }
}

/// TED contract-award notices, from either the CSV bulk files or eForms.
pub mod ted {
    use arrow::datatypes::{DataType, Field, Schema};

    pub const NOTICE_ID: &[&str] = &["notice_id", "id_notice_can", "publication-number", "notice-identifier"];
    pub const BUYER_NAME: &[&str] = &["buyer_name", "cae_name", "buyer-name"];
    pub const BUYER_TAX_ID: &[&str] = &["buyer_tax_id", "cae_nationalid", "buyer-identifier"];
    pub const AWARDEE_NAME: &[&str] = &["awardee_name", "win_name", "winner-name"];
    pub const AWARDEE_TAX_ID: &[&str] = &["awardee_tax_id", "win_nationalid", "winner-identifier"];
    pub const CONTRACT_TYPE: &[&str] = &["contract_type", "type_of_contract", "contract-nature"];
    pub const REFERENCE_NUMBER: &[&str] = &["reference_number", "file_reference", "internal-identifier"];
    pub const AWARD_VALUE: &[&str] = &["award_value", "award_value_euro", "value_euro_fin_2", "result-value"];
    pub const ESTIMATED_VALUE: &[&str] = &["estimated_value", "value_euro", "estimated-value"];
    pub const YEAR: &[&str] = &["year"];
    pub const DISPATCH_DATE: &[&str] = &["dispatch_date", "dt_dispatch", "dispatch-date"];
    pub const CPV: &[&str] = &["cpv", "main-classification-proc"];
    pub const SOURCE: &[&str] = &["source", "source_tier"];

    /// Canonical reconciled notice schema.
    pub fn notice_schema() -> Schema {
        Schema::new(vec![
            Field::new(NOTICE_ID[0], DataType::Utf8, false),
            Field::new(BUYER_NAME[0], DataType::Utf8, true),
            Field::new(BUYER_TAX_ID[0], DataType::Utf8, true),
            Field::new(AWARDEE_NAME[0], DataType::Utf8, true),
            Field::new(AWARDEE_TAX_ID[0], DataType::Utf8, true),
            Field::new(CONTRACT_TYPE[0], DataType::Utf8, true),
            Field::new(REFERENCE_NUMBER[0], DataType::Utf8, true),
            Field::new(AWARD_VALUE[0], DataType::Float64, true),
            Field::new(ESTIMATED_VALUE[0], DataType::Float64, true),
            Field::new(YEAR[0], DataType::Int32, true),
            Field::new(DISPATCH_DATE[0], DataType::Date32, true),
            Field::new(CPV[0], DataType::Utf8, true),
            Field::new(SOURCE[0], DataType::Utf8, true),
        ])
    }
}

/// Run outputs: the per-contract match table and the summary tables.
pub mod output {
    use arrow::datatypes::{DataType, Field, Schema};

    /// Amounts are written as exact decimals, two places.
    pub const AMOUNT_TYPE: DataType = DataType::Decimal128(18, 2);

    /// One row per register contract.
    pub fn match_schema() -> Schema {
        Schema::new(vec![
            Field::new("contract_id", DataType::Utf8, false),
            Field::new("year", DataType::Int32, true),
            Field::new("category", DataType::Utf8, true),
            Field::new("buyer_tier", DataType::Utf8, true),
            Field::new("amount", AMOUNT_TYPE, true),
            Field::new("sector", DataType::Utf8, true),
            Field::new("eligible", DataType::Boolean, false),
            Field::new("ineligible_reason", DataType::Utf8, true),
            Field::new("threshold", AMOUNT_TYPE, true),
            Field::new("biennium", DataType::Utf8, true),
            Field::new("match_status", DataType::Utf8, false),
            Field::new("ted_notice_id", DataType::Utf8, true),
            Field::new("strategy", DataType::Utf8, true),
            Field::new("amount_delta_pct", DataType::Float64, true),
            Field::new("year_delta", DataType::UInt32, true),
            Field::new("lot_group_size", DataType::UInt32, true),
            Field::new("ambiguous", DataType::Boolean, true),
            Field::new("diagnosis", DataType::Utf8, true),
            Field::new("confidence", DataType::Utf8, true),
            Field::new("relaxed_candidate", DataType::Utf8, true),
        ])
    }

    pub fn validation_by_year_schema() -> Schema {
        Schema::new(vec![
            Field::new("year", DataType::Int32, false),
            Field::new("eligible", DataType::UInt64, false),
            Field::new("matched", DataType::UInt64, false),
            Field::new("validation_rate", DataType::Float64, false),
        ])
    }

    pub fn strategy_yield_schema() -> Schema {
        Schema::new(vec![
            Field::new("strategy", DataType::Utf8, false),
            Field::new("join_key", DataType::Utf8, false),
            Field::new("matches", DataType::UInt64, false),
            Field::new("share", DataType::Float64, false),
        ])
    }

    pub fn sector_coverage_schema() -> Schema {
        Schema::new(vec![
            Field::new("sector", DataType::Utf8, false),
            Field::new("eligible", DataType::UInt64, false),
            Field::new("matched", DataType::UInt64, false),
            Field::new("raw_coverage", DataType::Float64, false),
            Field::new("lot_ratio", DataType::Float64, false),
            Field::new("adjusted_coverage", DataType::Float64, false),
        ])
    }
}
