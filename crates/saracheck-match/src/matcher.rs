//! Sequential matcher.
//!
//! Strategies run in priority order. Each one is a pure stage: it takes the
//! residual contracts and notices, claims what it can, and hands back the
//! rest. Nothing claimed by one stage is visible to the next.
//!
//! Within a stage every admissible (contract, notice) edge is collected and
//! claimed greedily in (amount delta, notice year, notice id, contract id)
//! order, so the result does not depend on input order.

use tracing::{debug, info};

use saracheck_core::{
    AmountDelta, Cents, MatchConfig, MatchEvidence, NormalizedContract, NormalizedNotice,
    StrategyId, Tolerances,
};

use crate::lots::{self, LotGroup};
use crate::strategy::{self, Admission, NoticeIndex, Rule};

/// One claimed pairing: a contract, or an E4 lot group, and one notice.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub strategy: StrategyId,
    pub notice_id: String,
    /// One id, or every member of an E4 lot group.
    pub contract_ids: Vec<String>,
    /// Positions of the claimed contracts in the pool handed to the stage
    /// or run, parallel to `contract_ids`. Ids need not be unique.
    pub positions: Vec<usize>,
    /// Contract amount, or the summed group amount.
    pub amount: Cents,
    pub notice_amount: Cents,
    pub delta: AmountDelta,
    pub year_delta: Option<u32>,
    /// Another equally good pairing existed and lost on identifier order.
    pub ambiguous: bool,
}

impl MatchCandidate {
    pub fn evidence(&self) -> MatchEvidence {
        MatchEvidence {
            notice_id: self.notice_id.clone(),
            strategy: self.strategy,
            amount_delta_pct: self.delta.percent(),
            year_delta: self.year_delta,
            group_size: self.contract_ids.len(),
            ambiguous: self.ambiguous,
        }
    }
}

/// Result of a stage, or of the whole run.
#[derive(Debug, Clone)]
pub struct StageOutcome<'a> {
    pub matches: Vec<MatchCandidate>,
    /// Unclaimed contracts, in input order.
    pub contracts: Vec<&'a NormalizedContract>,
    /// Input positions of the unclaimed contracts, parallel to `contracts`.
    pub residual: Vec<usize>,
    /// Unclaimed notices, in input order.
    pub notices: Vec<&'a NormalizedNotice>,
}

impl StageOutcome<'_> {
    pub fn matched_contracts(&self) -> usize {
        self.matches.iter().map(|m| m.contract_ids.len()).sum()
    }

    pub fn ambiguous(&self) -> usize {
        self.matches.iter().filter(|m| m.ambiguous).count()
    }
}

/// Runs E1–E5 with the configured tolerances.
#[derive(Debug, Clone)]
pub struct Matcher {
    tolerances: Tolerances,
    min_lot_group: usize,
}

impl Matcher {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            tolerances: config.tolerances,
            min_lot_group: config.min_lot_group,
        }
    }

    /// Apply every strategy in order to the residual pools.
    pub fn run<'a>(
        &self,
        contracts: Vec<&'a NormalizedContract>,
        notices: Vec<&'a NormalizedNotice>,
    ) -> StageOutcome<'a> {
        let mut outcome = StageOutcome {
            matches: Vec::new(),
            residual: (0..contracts.len()).collect(),
            contracts,
            notices,
        };
        for strategy in StrategyId::ORDER {
            let stage = self.stage(strategy, outcome.contracts, outcome.notices);
            info!(
                strategy = strategy.as_str(),
                matches = stage.matches.len(),
                contracts = stage.matched_contracts(),
                ambiguous = stage.ambiguous(),
                contracts_left = stage.contracts.len(),
                notices_left = stage.notices.len(),
                "strategy applied"
            );
            // Stage positions index the residual pool; lift them to run input.
            let origin = outcome.residual;
            outcome.matches.extend(stage.matches.into_iter().map(|mut m| {
                for p in &mut m.positions {
                    *p = origin[*p];
                }
                m
            }));
            outcome.residual = stage.residual.iter().map(|&p| origin[p]).collect();
            outcome.contracts = stage.contracts;
            outcome.notices = stage.notices;
        }
        outcome
    }

    /// Run one strategy against the given pools.
    pub fn stage<'a>(
        &self,
        strategy: StrategyId,
        contracts: Vec<&'a NormalizedContract>,
        notices: Vec<&'a NormalizedNotice>,
    ) -> StageOutcome<'a> {
        let rule = Rule::new(self.tolerances.for_strategy(strategy));
        match strategy {
            StrategyId::E4 => lot_stage(rule, self.min_lot_group, contracts, notices),
            _ => pair_stage(strategy, rule, contracts, notices),
        }
    }
}

fn pair_stage<'a>(
    strategy: StrategyId,
    rule: Rule,
    contracts: Vec<&'a NormalizedContract>,
    notices: Vec<&'a NormalizedNotice>,
) -> StageOutcome<'a> {
    let index = NoticeIndex::build(&notices, |n| strategy::notice_key(strategy, n));

    let mut edges = Vec::new();
    for (party, c) in contracts.iter().enumerate() {
        let (Some(key), Some(amount)) = (strategy::contract_key(strategy, c), c.amount) else {
            continue;
        };
        let (low, high) = amount.window(rule.amount);
        for notice in index.window(key, low, high) {
            if let Some(admission) = rule.admits(amount, c.year, notices[notice]) {
                edges.push(Edge::new(party, notice, admission, notices[notice].year));
            }
        }
    }

    let accepted = claim(edges, &notices, |p| contracts[p].id.as_str());

    let mut contract_claimed = vec![false; contracts.len()];
    let mut notice_claimed = vec![false; notices.len()];
    let mut matches = Vec::with_capacity(accepted.len());
    for (edge, ambiguous) in accepted {
        contract_claimed[edge.party] = true;
        notice_claimed[edge.notice] = true;
        let c = contracts[edge.party];
        let n = notices[edge.notice];
        matches.push(MatchCandidate {
            strategy,
            notice_id: n.notice_id.clone(),
            contract_ids: vec![c.id.clone()],
            positions: vec![edge.party],
            amount: c.amount.unwrap_or(Cents::ZERO),
            notice_amount: n.amount.unwrap_or(Cents::ZERO),
            delta: edge.delta,
            year_delta: edge.year_delta,
            ambiguous,
        });
    }

    StageOutcome {
        matches,
        residual: retain_unclaimed((0..contracts.len()).collect(), &contract_claimed),
        contracts: retain_unclaimed(contracts, &contract_claimed),
        notices: retain_unclaimed(notices, &notice_claimed),
    }
}

fn lot_stage<'a>(
    rule: Rule,
    min_group: usize,
    contracts: Vec<&'a NormalizedContract>,
    notices: Vec<&'a NormalizedNotice>,
) -> StageOutcome<'a> {
    let groups = lots::aggregate(&contracts, min_group);
    let index = NoticeIndex::build(&notices, |n| strategy::notice_key(StrategyId::E4, n));

    let mut edges = Vec::new();
    for (party, group) in groups.iter().enumerate() {
        let (low, high) = group.amount.window(rule.amount);
        for notice in index.window(group.buyer_tax_key, low, high) {
            if let Some(admission) = rule.admits(group.amount, Some(group.year), notices[notice]) {
                edges.push(Edge::new(party, notice, admission, notices[notice].year));
            }
        }
    }

    let labels: Vec<String> = groups.iter().map(LotGroup::label).collect();
    let accepted = claim(edges, &notices, |p| labels[p].as_str());

    let mut contract_claimed = vec![false; contracts.len()];
    let mut notice_claimed = vec![false; notices.len()];
    let mut matches = Vec::with_capacity(accepted.len());
    for (edge, ambiguous) in accepted {
        let group = &groups[edge.party];
        let n = notices[edge.notice];
        notice_claimed[edge.notice] = true;
        for &m in &group.members {
            contract_claimed[m] = true;
        }
        debug!(
            group = %labels[edge.party],
            members = group.len(),
            notice = %n.notice_id,
            "lot group matched"
        );
        matches.push(MatchCandidate {
            strategy: StrategyId::E4,
            notice_id: n.notice_id.clone(),
            contract_ids: group.members.iter().map(|&m| contracts[m].id.clone()).collect(),
            positions: group.members.clone(),
            amount: group.amount,
            notice_amount: n.amount.unwrap_or(Cents::ZERO),
            delta: edge.delta,
            year_delta: edge.year_delta,
            ambiguous,
        });
    }

    StageOutcome {
        matches,
        residual: retain_unclaimed((0..contracts.len()).collect(), &contract_claimed),
        contracts: retain_unclaimed(contracts, &contract_claimed),
        notices: retain_unclaimed(notices, &notice_claimed),
    }
}

// ── Claiming ──

#[derive(Debug, Clone, Copy)]
struct Edge {
    party: usize,
    notice: usize,
    delta: AmountDelta,
    /// Missing years sort last.
    notice_year: i32,
    year_delta: Option<u32>,
}

impl Edge {
    fn new(party: usize, notice: usize, admission: Admission, notice_year: Option<i32>) -> Self {
        Self {
            party,
            notice,
            delta: admission.delta,
            notice_year: notice_year.unwrap_or(i32::MAX),
            year_delta: admission.year_delta,
        }
    }

    fn ties_with(&self, other: &Edge) -> bool {
        self.delta == other.delta && self.notice_year == other.notice_year
    }
}

/// Greedy one-to-one claiming over all edges of a stage.
///
/// Returns accepted edges in acceptance order, each flagged when another
/// still-open edge for the same party or notice tied on delta and year.
fn claim<'s, F>(mut edges: Vec<Edge>, notices: &[&NormalizedNotice], party_id: F) -> Vec<(Edge, bool)>
where
    F: Fn(usize) -> &'s str,
{
    edges.sort_by(|a, b| {
        a.delta
            .cmp(&b.delta)
            .then(a.notice_year.cmp(&b.notice_year))
            .then_with(|| notices[a.notice].notice_id.cmp(&notices[b.notice].notice_id))
            .then_with(|| party_id(a.party).cmp(party_id(b.party)))
            .then(a.notice.cmp(&b.notice))
            .then(a.party.cmp(&b.party))
    });

    let parties = edges.iter().map(|e| e.party).max().map_or(0, |m| m + 1);
    let mut party_done = vec![false; parties];
    let mut notice_done = vec![false; notices.len()];
    let mut accepted = Vec::new();

    for (i, edge) in edges.iter().enumerate() {
        if party_done[edge.party] || notice_done[edge.notice] {
            continue;
        }
        // Tied edges sort adjacent, after this one.
        let ambiguous = edges[i + 1..]
            .iter()
            .take_while(|other| other.ties_with(edge))
            .any(|other| {
                (other.party == edge.party && !notice_done[other.notice])
                    || (other.notice == edge.notice && !party_done[other.party])
            });
        if ambiguous {
            debug!(
                party = party_id(edge.party),
                notice = %notices[edge.notice].notice_id,
                "ambiguous candidate resolved by identifier order"
            );
        }
        party_done[edge.party] = true;
        notice_done[edge.notice] = true;
        accepted.push((*edge, ambiguous));
    }
    accepted
}

fn retain_unclaimed<T: Copy>(pool: Vec<T>, claimed: &[bool]) -> Vec<T> {
    pool.into_iter()
        .zip(claimed)
        .filter(|(_, done)| !**done)
        .map(|(item, _)| item)
        .collect()
}
