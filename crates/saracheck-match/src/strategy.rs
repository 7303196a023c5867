//! Comparator predicates, join keys and the per-key notice index.
//!
//! Tolerances are parameters of named predicates, never inlined arithmetic,
//! so every accepted pair can be explained by (strategy, tolerance, observed
//! delta).

use std::collections::HashMap;

use saracheck_core::{
    AmountDelta, Cents, NormalizedContract, NormalizedNotice, StrategyId, StrategyTolerance,
    Tolerance,
};

/// `|candidate − base| ≤ tolerance × base`.
pub fn within_amount(base: Cents, candidate: Cents, tolerance: Tolerance) -> bool {
    base.delta_to(candidate).within(tolerance)
}

/// Absolute year difference, when both years are known.
pub fn year_gap(a: Option<i32>, b: Option<i32>) -> Option<u32> {
    Some(a?.abs_diff(b?))
}

/// Both years known and at most `delta` apart.
pub fn within_years(a: Option<i32>, b: Option<i32>, delta: u32) -> bool {
    year_gap(a, b).is_some_and(|gap| gap <= delta)
}

/// Join key a strategy reads from a register contract.
pub fn contract_key(strategy: StrategyId, c: &NormalizedContract) -> Option<&str> {
    match strategy {
        StrategyId::E1 => c.awardee_tax_key.as_deref(),
        StrategyId::E2 => c.expediente_key.as_deref(),
        StrategyId::E3 | StrategyId::E4 => c.buyer_tax_key.as_deref(),
        StrategyId::E5 => c.buyer_name_key.as_deref(),
    }
}

/// Join key a strategy reads from a TED notice.
pub fn notice_key(strategy: StrategyId, n: &NormalizedNotice) -> Option<&str> {
    match strategy {
        StrategyId::E1 => n.awardee_tax_key.as_deref(),
        StrategyId::E2 => n.reference_key.as_deref(),
        StrategyId::E3 | StrategyId::E4 => n.buyer_tax_key.as_deref(),
        StrategyId::E5 => n.buyer_name_key.as_deref(),
    }
}

/// What a predicate observed for an admitted pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub delta: AmountDelta,
    pub year_delta: Option<u32>,
}

/// Amount and year predicate with its configured tolerance.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub amount: Tolerance,
    /// `None` when the rule ignores years.
    pub years: Option<u32>,
}

impl Rule {
    pub fn new(tolerance: StrategyTolerance) -> Self {
        Self {
            amount: tolerance.amount(),
            years: tolerance.year_delta,
        }
    }

    /// Check a notice against a contract (or lot group) amount and year.
    ///
    /// Notices without an amount never pass. A notice without a year fails
    /// any rule that constrains years.
    pub fn admits(&self, amount: Cents, year: Option<i32>, notice: &NormalizedNotice) -> Option<Admission> {
        let notice_amount = notice.amount?;
        if !within_amount(amount, notice_amount, self.amount) {
            return None;
        }
        if let Some(delta) = self.years
            && !within_years(year, notice.year, delta)
        {
            return None;
        }
        Some(Admission {
            delta: amount.delta_to(notice_amount),
            year_delta: year_gap(year, notice.year),
        })
    }
}

/// Notices bucketed by join key, each bucket sorted by amount.
///
/// Entries are positions into the slice the index was built from.
pub struct NoticeIndex<'a> {
    buckets: HashMap<&'a str, Vec<(Cents, usize)>>,
}

impl<'a> NoticeIndex<'a> {
    pub fn build<F>(notices: &[&'a NormalizedNotice], key: F) -> Self
    where
        F: Fn(&'a NormalizedNotice) -> Option<&'a str>,
    {
        let mut buckets: HashMap<&'a str, Vec<(Cents, usize)>> = HashMap::new();
        for (pos, &notice) in notices.iter().enumerate() {
            if let (Some(k), Some(amount)) = (key(notice), notice.amount) {
                buckets.entry(k).or_default().push((amount, pos));
            }
        }
        for bucket in buckets.values_mut() {
            bucket.sort_unstable();
        }
        Self { buckets }
    }

    /// Positions of notices under `key` whose amount lies in `[low, high]`.
    pub fn window(&self, key: &str, low: Cents, high: Cents) -> impl Iterator<Item = usize> + '_ {
        let slice: &[(Cents, usize)] = self.buckets.get(key).map_or(&[], Vec::as_slice);
        let start = slice.partition_point(|(amount, _)| *amount < low);
        let end = slice.partition_point(|(amount, _)| *amount <= high);
        slice[start..end.max(start)].iter().map(|(_, pos)| *pos)
    }
}

#[cfg(test)]
mod tests {
    use saracheck_core::{ContractCategory, TedSource};

    use super::*;

    fn notice(id: &str, buyer: &str, euros: i64, year: Option<i32>) -> NormalizedNotice {
        NormalizedNotice {
            notice_id: id.into(),
            reference_key: None,
            buyer_name_key: None,
            buyer_tax_key: Some(buyer.into()),
            awardee_tax_key: None,
            category: Some(ContractCategory::Services),
            amount: Some(Cents::from_whole_euros(euros)),
            year,
            cpv: None,
            source: TedSource::BulkCsv,
        }
    }

    #[test]
    fn amount_predicate_inclusive() {
        let ten = Tolerance::from_fraction(0.10);
        let base = Cents::from_whole_euros(100_000);
        assert!(within_amount(base, Cents::from_whole_euros(110_000), ten));
        assert!(within_amount(base, Cents::from_whole_euros(90_000), ten));
        assert!(!within_amount(base, Cents::from_whole_euros(110_001), ten));
    }

    #[test]
    fn year_predicate_needs_both_years() {
        assert!(within_years(Some(2019), Some(2020), 1));
        assert!(!within_years(Some(2019), Some(2021), 1));
        assert!(!within_years(None, Some(2019), 5));
        assert_eq!(year_gap(Some(2021), Some(2019)), Some(2));
    }

    #[test]
    fn rule_without_years_ignores_missing_year() {
        let rule = Rule::new(StrategyTolerance::new(0.10, None));
        let n = notice("N1", "S2800000A", 235_000, None);
        let adm = rule
            .admits(Cents::from_whole_euros(230_000), Some(2019), &n)
            .unwrap();
        assert_eq!(adm.year_delta, None);

        let dated = Rule::new(StrategyTolerance::new(0.10, Some(1)));
        assert!(dated.admits(Cents::from_whole_euros(230_000), Some(2019), &n).is_none());
    }

    #[test]
    fn index_window_bounds() {
        let a = notice("a", "B1", 90, None);
        let b = notice("b", "B1", 100, None);
        let c = notice("c", "B1", 111, None);
        let d = notice("d", "B2", 100, None);
        let pool = vec![&a, &b, &c, &d];
        let idx = NoticeIndex::build(&pool, |n| n.buyer_tax_key.as_deref());

        let (low, high) = Cents::from_whole_euros(100).window(Tolerance::from_fraction(0.10));
        let hits: Vec<usize> = idx.window("B1", low, high).collect();
        assert_eq!(hits, vec![0, 1]);
        assert_eq!(idx.window("B9", low, high).count(), 0);
        assert_eq!(idx.window("B2", low, high).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn keys_per_strategy() {
        let n = notice("n", "B1", 1, None);
        assert_eq!(notice_key(StrategyId::E3, &n), Some("B1"));
        assert_eq!(notice_key(StrategyId::E4, &n), Some("B1"));
        assert_eq!(notice_key(StrategyId::E1, &n), None);
    }
}
