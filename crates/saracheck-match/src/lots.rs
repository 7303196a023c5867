//! Lot aggregation.
//!
//! The register records each lot of a tender as its own award; TED usually
//! publishes the tender once. Grouping the residual contracts by
//! (buyer tax ID, year) and summing their amounts gives E4 a single candidate
//! to hold against one notice.

use std::collections::BTreeMap;

use saracheck_core::{Cents, NormalizedContract};

/// Residual contracts sharing a buyer and year.
#[derive(Debug, Clone, PartialEq)]
pub struct LotGroup<'a> {
    pub buyer_tax_key: &'a str,
    pub year: i32,
    /// Positions into the pool the group was built from, in id order.
    pub members: Vec<usize>,
    pub amount: Cents,
}

impl LotGroup<'_> {
    pub fn label(&self) -> String {
        format!("{}/{}", self.buyer_tax_key, self.year)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group `pool` by (buyer tax ID, year), keeping groups of at least `min_size`.
///
/// Contracts without a buyer tax ID, year or amount cannot be aggregated and
/// are left out. Groups come back ordered by buyer, then year.
pub fn aggregate<'a>(pool: &[&'a NormalizedContract], min_size: usize) -> Vec<LotGroup<'a>> {
    let mut groups: BTreeMap<(&'a str, i32), Vec<usize>> = BTreeMap::new();
    for (pos, &c) in pool.iter().enumerate() {
        if let (Some(buyer), Some(year), Some(_)) = (c.buyer_tax_key.as_deref(), c.year, c.amount) {
            groups.entry((buyer, year)).or_default().push(pos);
        }
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= min_size.max(1))
        .map(|((buyer_tax_key, year), mut members)| {
            members.sort_by(|&a, &b| pool[a].id.cmp(&pool[b].id).then(a.cmp(&b)));
            let amount = members.iter().filter_map(|&m| pool[m].amount).sum();
            LotGroup {
                buyer_tax_key,
                year,
                members,
                amount,
            }
        })
        .collect()
}
