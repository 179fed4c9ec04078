//! Merging two alignment lists into one
//!
//! Every strategy answers the same question: which rows of the proposer
//! list pair up with which rows of the reviewer list. `Merger` assigns the
//! roles, runs the configured strategy and assembles the merged list.

pub mod greedy;
pub mod hungarian;
pub mod optimal;
pub mod social;
pub mod stable;

use anyhow::{anyhow, ensure, Result};
use std::fmt;
use std::str::FromStr;

use crate::ownership::FeatureOwnership;
use crate::row::{AlignmentList, AlignmentRow, ListId};
use crate::scoring::Scorer;
use crate::tolerance::ToleranceWindow;

/// Algorithm used to pair rows of two lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingStrategy {
    /// Gale-Shapley deferred acceptance
    Stable,
    /// Maximum total similarity via the Hungarian algorithm
    Optimal,
    /// Each proposer takes its best free reviewer, in list order
    Greedy,
    /// Socially stable matching with promotion
    SociallyConstrained,
}

impl FromStr for MatchingStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stable" | "gale-shapley" => Ok(MatchingStrategy::Stable),
            "optimal" | "hungarian" => Ok(MatchingStrategy::Optimal),
            "greedy" => Ok(MatchingStrategy::Greedy),
            "social" | "socially-constrained" => Ok(MatchingStrategy::SociallyConstrained),
            _ => Err(anyhow!(
                "Invalid matching strategy '{s}'. Use 'stable', 'optimal', 'greedy' or 'social'"
            )),
        }
    }
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingStrategy::Stable => write!(f, "stable"),
            MatchingStrategy::Optimal => write!(f, "optimal"),
            MatchingStrategy::Greedy => write!(f, "greedy"),
            MatchingStrategy::SociallyConstrained => write!(f, "social"),
        }
    }
}

/// Read-only inputs shared by all strategies
pub struct MatchContext<'a> {
    pub scorer: &'a Scorer<'a>,
    pub window: ToleranceWindow,
    pub top_k_friends: usize,
}

impl<'a> MatchContext<'a> {
    pub fn new(scorer: &'a Scorer<'a>, window: ToleranceWindow) -> Self {
        MatchContext {
            scorer,
            window,
            top_k_friends: 10,
        }
    }

    /// A reviewer is admissible when its averages fall in the window
    /// centred on the proposer's averages
    pub fn admissible(&self, proposer: &AlignmentRow, reviewer: &AlignmentRow) -> bool {
        proposer.in_range(reviewer, &self.window)
    }

    /// Admissible reviewers for `proposer`, best score first; equal scores
    /// keep the lower list position first
    pub fn ranked_candidates(
        &self,
        proposer: &AlignmentRow,
        reviewers: &[AlignmentRow],
    ) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = reviewers
            .iter()
            .enumerate()
            .filter(|(_, r)| self.admissible(proposer, r))
            .map(|(index, r)| Candidate {
                index,
                score: self.scorer.row_similarity(proposer, r),
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
        candidates
    }
}

/// A scored admissible partner, by position in the other list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub score: f64,
}

/// Pairs `(proposer index, reviewer index)` chosen by a strategy
pub type RowPairs = Vec<(usize, usize)>;

impl MatchingStrategy {
    pub fn match_rows(
        &self,
        proposers: &[AlignmentRow],
        reviewers: &[AlignmentRow],
        ctx: &MatchContext,
    ) -> Result<RowPairs> {
        match self {
            MatchingStrategy::Stable => stable::match_rows(proposers, reviewers, ctx),
            MatchingStrategy::Optimal => optimal::match_rows(proposers, reviewers, ctx),
            MatchingStrategy::Greedy => greedy::match_rows(proposers, reviewers, ctx),
            MatchingStrategy::SociallyConstrained => {
                social::match_rows(proposers, reviewers, ctx)
            }
        }
    }
}

/// Sequential merge engine. Owns the feature ownership table and hands out
/// list ids; one instance drives a whole progressive alignment.
pub struct Merger<'a> {
    strategy: MatchingStrategy,
    ctx: MatchContext<'a>,
    ownership: FeatureOwnership,
    next_list: u32,
}

impl<'a> Merger<'a> {
    pub fn new(strategy: MatchingStrategy, scorer: &'a Scorer<'a>, window: ToleranceWindow) -> Self {
        Merger {
            strategy,
            ctx: MatchContext::new(scorer, window),
            ownership: FeatureOwnership::new(),
            next_list: 0,
        }
    }

    pub fn with_top_k_friends(mut self, top_k: usize) -> Self {
        self.ctx.top_k_friends = top_k;
        self
    }

    pub fn strategy(&self) -> MatchingStrategy {
        self.strategy
    }

    pub fn ownership(&self) -> &FeatureOwnership {
        &self.ownership
    }

    pub fn next_list_id(&mut self) -> ListId {
        let id = ListId(self.next_list);
        self.next_list += 1;
        id
    }

    /// Merge two lists. An empty side is a no-op: the other list comes
    /// back untouched.
    pub fn merge(
        &mut self,
        name: &str,
        master: AlignmentList,
        child: AlignmentList,
    ) -> Result<AlignmentList> {
        if master.is_empty() {
            return Ok(child);
        }
        if child.is_empty() {
            return Ok(master);
        }

        // larger list proposes; on a tie the child does
        let (proposers, reviewers) = if master.len() > child.len() {
            (master, child)
        } else {
            (child, master)
        };
        log::info!(
            "merging {} with {} matching: {} proposers ({}), {} reviewers ({})",
            name,
            self.strategy,
            proposers.len(),
            proposers.name(),
            reviewers.len(),
            reviewers.name()
        );

        let pairs = self
            .strategy
            .match_rows(proposers.rows(), reviewers.rows(), &self.ctx)?;
        let list_id = self.next_list_id();
        let merged = self.assemble(list_id, name, proposers, reviewers, pairs)?;
        Ok(merged)
    }

    fn assemble(
        &mut self,
        list_id: ListId,
        name: &str,
        proposers: AlignmentList,
        reviewers: AlignmentList,
        mut pairs: RowPairs,
    ) -> Result<AlignmentList> {
        let mut proposer_matched = vec![false; proposers.len()];
        let mut reviewer_matched = vec![false; reviewers.len()];
        for &(p, r) in &pairs {
            ensure!(
                p < proposers.len() && r < reviewers.len(),
                "matched pair ({p}, {r}) is out of range for lists of {} and {} rows",
                proposers.len(),
                reviewers.len()
            );
            ensure!(!proposer_matched[p], "proposer row {p} matched twice");
            ensure!(!reviewer_matched[r], "reviewer row {r} matched twice");
            proposer_matched[p] = true;
            reviewer_matched[r] = true;
        }
        pairs.sort_unstable();

        let mut merged = AlignmentList::new(list_id, name);
        for (id, &(p, r)) in pairs.iter().enumerate() {
            let proposer = &proposers.rows()[p];
            let reviewer = &reviewers.rows()[r];
            let mut row = AlignmentRow::new(list_id, id);
            row.add_features(proposer.features().iter().cloned());
            row.add_features(reviewer.features().iter().cloned());
            self.ownership
                .transfer(&row, &[proposer.key(), reviewer.key()])?;
            merged.add_row(row);
        }

        let matched = pairs.len();
        let proposer_count = proposers.len();
        let reviewer_count = reviewers.len();
        for (row, taken) in proposers.into_rows().into_iter().zip(proposer_matched) {
            if !taken {
                merged.add_row(row);
            }
        }
        for (row, taken) in reviewers.into_rows().into_iter().zip(reviewer_matched) {
            if !taken {
                merged.add_row(row);
            }
        }

        log::debug!(
            "{}: proposers matched={} unmatched={}, reviewers matched={} unmatched={}",
            name,
            matched,
            proposer_count - matched,
            matched,
            reviewer_count - matched
        );
        Ok(merged)
    }
}
