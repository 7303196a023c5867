//! Record types for the two input collections and their normalised forms.
//!
//! Raw records are what the decoders hand over: identifiers and names as
//! delivered, amounts already parsed to [`Cents`], dates already parsed.
//! Normalised records carry the comparable keys every later stage works on.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::money::Cents;
use crate::normalize;

/// Contract category as recorded in the national register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractCategory {
    Works,
    Services,
    Supplies,
    SpecialSector,
}

impl ContractCategory {
    pub const ALL: [ContractCategory; 4] = [
        Self::Works,
        Self::Services,
        Self::Supplies,
        Self::SpecialSector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Works => "works",
            Self::Services => "services",
            Self::Supplies => "supplies",
            Self::SpecialSector => "special-sector",
        }
    }
}

impl fmt::Display for ContractCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the contracting authority is part of central government.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuyerTier {
    CentralGovernment,
    Other,
}

impl BuyerTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CentralGovernment => "central-government",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for BuyerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which TED extraction a notice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TedSource {
    /// Contract-award CSV bulk downloads (2010–2019).
    BulkCsv,
    /// eForms notices from the search API (2020 onwards).
    EForms,
}

impl TedSource {
    /// First year served by the eForms API.
    pub const EFORMS_FIRST_YEAR: i32 = 2020;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BulkCsv => "bulk-csv",
            Self::EForms => "eforms",
        }
    }

    /// Tier implied by the notice year when the input does not say.
    pub fn for_year(year: i32) -> Self {
        if year >= Self::EFORMS_FIRST_YEAR {
            Self::EForms
        } else {
            Self::BulkCsv
        }
    }
}

/// One award record from the national register (PLACSP).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcurementContract {
    pub id: String,
    pub expediente: Option<String>,
    pub buyer_name: Option<String>,
    pub buyer_tax_id: Option<String>,
    pub awardee_tax_id: Option<String>,
    /// Raw category text, e.g. `Obras` or `Servicios`.
    pub category: Option<String>,
    /// Raw buyer tier text, e.g. `central` or `Comunidad Autónoma`.
    pub buyer_tier: Option<String>,
    pub award_amount: Option<Cents>,
    pub award_amount_vat: Option<Cents>,
    pub estimated_amount: Option<Cents>,
    pub estimated_amount_vat: Option<Cents>,
    pub publication_date: Option<NaiveDate>,
    pub award_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub cpv: Option<String>,
}

/// One contract-award notice from TED.
#[derive(Debug, Clone, PartialEq)]
pub struct TedNotice {
    pub notice_id: String,
    pub buyer_name: Option<String>,
    pub buyer_tax_id: Option<String>,
    pub awardee_name: Option<String>,
    pub awardee_tax_id: Option<String>,
    /// Raw contract type, e.g. `W`, `services`.
    pub contract_type: Option<String>,
    /// Buyer's own file reference, when the notice carries one.
    pub reference_number: Option<String>,
    pub award_value: Option<Cents>,
    pub estimated_value: Option<Cents>,
    pub year: Option<i32>,
    pub dispatch_date: Option<NaiveDate>,
    pub cpv: Option<String>,
    pub source: TedSource,
}

/// Comparable view of a [`ProcurementContract`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContract {
    pub id: String,
    pub expediente_key: Option<String>,
    pub buyer_name_key: Option<String>,
    pub buyer_tax_key: Option<String>,
    pub awardee_tax_key: Option<String>,
    pub category: Option<ContractCategory>,
    pub tier: Option<BuyerTier>,
    /// Reference amount net of VAT, preferring the award amount.
    pub amount: Option<Cents>,
    pub year: Option<i32>,
    pub cpv: Option<String>,
}

impl NormalizedContract {
    pub fn from_contract(c: &ProcurementContract, vat_rate: f64) -> Self {
        let amount = c
            .award_amount
            .or_else(|| c.award_amount_vat.map(|a| a.net_of_vat(vat_rate)))
            .or(c.estimated_amount)
            .or_else(|| c.estimated_amount_vat.map(|a| a.net_of_vat(vat_rate)));

        let year = c
            .year
            .or_else(|| c.award_date.map(|d| d.year()))
            .or_else(|| c.publication_date.map(|d| d.year()));

        Self {
            id: c.id.clone(),
            expediente_key: c.expediente.as_deref().and_then(normalize::case_number),
            buyer_name_key: c.buyer_name.as_deref().and_then(normalize::org_name),
            buyer_tax_key: c.buyer_tax_id.as_deref().and_then(normalize::tax_id),
            awardee_tax_key: c.awardee_tax_id.as_deref().and_then(normalize::tax_id),
            category: c.category.as_deref().and_then(normalize::category),
            tier: c.buyer_tier.as_deref().and_then(normalize::buyer_tier),
            amount,
            year,
            cpv: c.cpv.as_deref().and_then(normalize::cpv),
        }
    }

    /// True when no strategy has a join key to work with.
    pub fn has_no_join_keys(&self) -> bool {
        self.expediente_key.is_none()
            && self.buyer_name_key.is_none()
            && self.buyer_tax_key.is_none()
            && self.awardee_tax_key.is_none()
    }
}

/// Comparable view of a [`TedNotice`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedNotice {
    pub notice_id: String,
    pub reference_key: Option<String>,
    pub buyer_name_key: Option<String>,
    pub buyer_tax_key: Option<String>,
    pub awardee_tax_key: Option<String>,
    pub category: Option<ContractCategory>,
    /// Award value, falling back to the estimated value.
    pub amount: Option<Cents>,
    pub year: Option<i32>,
    pub cpv: Option<String>,
    pub source: TedSource,
}

impl NormalizedNotice {
    pub fn from_notice(n: &TedNotice) -> Self {
        Self {
            notice_id: n.notice_id.clone(),
            reference_key: n.reference_number.as_deref().and_then(normalize::case_number),
            buyer_name_key: n.buyer_name.as_deref().and_then(normalize::org_name),
            buyer_tax_key: n.buyer_tax_id.as_deref().and_then(normalize::tax_id),
            awardee_tax_key: n.awardee_tax_id.as_deref().and_then(normalize::tax_id),
            category: n.contract_type.as_deref().and_then(normalize::category),
            amount: n.award_value.or(n.estimated_value),
            year: n.year.or_else(|| n.dispatch_date.map(|d| d.year())),
            cpv: n.cpv.as_deref().and_then(normalize::cpv),
            source: n.source,
        }
    }
}
