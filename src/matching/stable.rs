// Gale-Shapley deferred acceptance over admissible row pairs
use anyhow::{ensure, Result};
use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet, VecDeque};

use super::{MatchContext, RowPairs};
use crate::row::AlignmentRow;

/// Heap entry: best score on top, lower reviewer position on ties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Preference {
    score: OrderedFloat<f64>,
    reviewer: Reverse<usize>,
}

impl Ord for Preference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then(self.reviewer.cmp(&other.reviewer))
    }
}

impl PartialOrd for Preference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Proposer-optimal stable matching. Reviewers only switch partner for a
/// strictly higher score; proposers that run out of admissible reviewers
/// stay unmatched.
pub fn match_rows(
    proposers: &[AlignmentRow],
    reviewers: &[AlignmentRow],
    ctx: &MatchContext,
) -> Result<RowPairs> {
    let mut preferences: Vec<BinaryHeap<Preference>> = proposers
        .iter()
        .map(|p| {
            reviewers
                .iter()
                .enumerate()
                .filter(|(_, r)| ctx.admissible(p, r))
                .map(|(j, r)| Preference {
                    score: OrderedFloat(ctx.scorer.row_similarity(p, r)),
                    reviewer: Reverse(j),
                })
                .collect()
        })
        .collect();

    let mut engaged: Vec<Option<(usize, f64)>> = vec![None; reviewers.len()];
    let mut proposed: Vec<HashSet<usize>> = vec![HashSet::new(); proposers.len()];
    let mut free: VecDeque<usize> = (0..proposers.len()).collect();
    let max_proposals = proposers.len() * reviewers.len();
    let mut proposals = 0usize;

    while let Some(man) = free.pop_front() {
        let Some(next) = preferences[man].pop() else {
            continue;
        };
        let woman = next.reviewer.0;
        let score = next.score.into_inner();

        proposals += 1;
        ensure!(
            proposals <= max_proposals,
            "stable matching exceeded {} proposals",
            max_proposals
        );
        ensure!(
            proposed[man].insert(woman),
            "proposer {} proposed to reviewer {} twice",
            man,
            woman
        );

        match engaged[woman] {
            None => engaged[woman] = Some((man, score)),
            Some((current, current_score)) => {
                if score > current_score {
                    engaged[woman] = Some((man, score));
                    free.push_back(current);
                } else {
                    free.push_back(man);
                }
            }
        }
    }

    Ok(engaged
        .iter()
        .enumerate()
        .filter_map(|(w, e)| e.map(|(m, _)| (m, w)))
        .collect())
}
