//! Socially stable matching with promotion
//!
//! Only acquainted pairs can block a matching, so reviewers prefer
//! acquainted proposers over strangers. A pair is acquainted when either
//! side lists the other among its `top_k_friends` best admissible partners,
//! or when one side shares an intra-run group with such a friend. Proposers
//! that exhaust their list are promoted once and start again; reviewers
//! prefer promoted proposers over unpromoted ones at the same acquaintance
//! level. This is the usual 3/2-approximation of the maximum socially
//! stable matching.

use anyhow::{ensure, Result};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};

use super::{Candidate, MatchContext, RowPairs};
use crate::row::AlignmentRow;

type RankKey = (bool, bool, OrderedFloat<f64>, Reverse<usize>);

struct Suitor {
    preferences: Vec<Candidate>,
    cursor: usize,
    promoted: bool,
    removed: HashSet<usize>,
    proposed: HashSet<usize>,
}

impl Suitor {
    fn next_choice(&mut self) -> Option<Candidate> {
        while self.cursor < self.preferences.len() {
            let candidate = self.preferences[self.cursor];
            self.cursor += 1;
            if !self.removed.contains(&candidate.index) {
                return Some(candidate);
            }
        }
        None
    }

    fn promote(&mut self) {
        self.promoted = true;
        self.cursor = 0;
        self.removed.clear();
        self.proposed.clear();
    }
}

fn rows_share_group(a: &AlignmentRow, b: &AlignmentRow) -> bool {
    a.features()
        .iter()
        .any(|f| b.features().iter().any(|g| f.shares_group_with(g)))
}

fn acquaintances(
    proposers: &[AlignmentRow],
    reviewers: &[AlignmentRow],
    preferences: &[Vec<Candidate>],
    scores: &HashMap<(usize, usize), f64>,
    top_k: usize,
) -> HashSet<(usize, usize)> {
    let mut friends: HashSet<(usize, usize)> = HashSet::new();
    for (p, prefs) in preferences.iter().enumerate() {
        for c in prefs.iter().take(top_k) {
            friends.insert((p, c.index));
        }
    }

    let mut suitors_of: Vec<Vec<(usize, f64)>> = vec![Vec::new(); reviewers.len()];
    for (&(p, r), &score) in scores {
        suitors_of[r].push((p, score));
    }
    for (r, suitors) in suitors_of.iter_mut().enumerate() {
        suitors.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for &(p, _) in suitors.iter().take(top_k) {
            friends.insert((p, r));
        }
    }

    // friends of friends through shared intra-run groups
    let direct: Vec<(usize, usize)> = friends.iter().copied().collect();
    for (p, r) in direct {
        for c in &preferences[p] {
            if c.index != r && rows_share_group(&reviewers[r], &reviewers[c.index]) {
                friends.insert((p, c.index));
            }
        }
        for &(q, _) in &suitors_of[r] {
            if q != p && rows_share_group(&proposers[p], &proposers[q]) {
                friends.insert((q, r));
            }
        }
    }
    friends
}

pub fn match_rows(
    proposers: &[AlignmentRow],
    reviewers: &[AlignmentRow],
    ctx: &MatchContext,
) -> Result<RowPairs> {
    let preferences: Vec<Vec<Candidate>> = proposers
        .iter()
        .map(|p| ctx.ranked_candidates(p, reviewers))
        .collect();
    let scores: HashMap<(usize, usize), f64> = preferences
        .iter()
        .enumerate()
        .flat_map(|(p, prefs)| prefs.iter().map(move |c| ((p, c.index), c.score)))
        .collect();
    let friends = acquaintances(proposers, reviewers, &preferences, &scores, ctx.top_k_friends);
    log::debug!(
        "social matching: {} acquainted pairs out of {} admissible",
        friends.len(),
        scores.len()
    );

    let mut suitors: Vec<Suitor> = preferences
        .into_iter()
        .map(|preferences| Suitor {
            preferences,
            cursor: 0,
            promoted: false,
            removed: HashSet::new(),
            proposed: HashSet::new(),
        })
        .collect();

    let rank = |suitors: &[Suitor], p: usize, r: usize| -> RankKey {
        (
            friends.contains(&(p, r)),
            suitors[p].promoted,
            OrderedFloat(scores.get(&(p, r)).copied().unwrap_or(0.0)),
            Reverse(p),
        )
    };

    let mut engaged: Vec<Option<usize>> = vec![None; reviewers.len()];
    let mut free: VecDeque<usize> = (0..proposers.len()).collect();
    let max_proposals = 2 * proposers.len() * reviewers.len();
    let mut proposals = 0usize;

    while let Some(man) = free.pop_front() {
        let Some(choice) = suitors[man].next_choice() else {
            if !suitors[man].promoted {
                suitors[man].promote();
                free.push_back(man);
            }
            continue;
        };
        let woman = choice.index;

        proposals += 1;
        ensure!(
            proposals <= max_proposals,
            "social matching exceeded {} proposals",
            max_proposals
        );
        ensure!(
            suitors[man].proposed.insert(woman),
            "proposer {} proposed to reviewer {} twice in one round",
            man,
            woman
        );

        let accepted = match engaged[woman] {
            None => true,
            Some(current) => {
                if rank(&suitors, man, woman) > rank(&suitors, current, woman) {
                    free.push_back(current);
                    true
                } else {
                    false
                }
            }
        };
        if !accepted {
            free.push_back(man);
            continue;
        }

        engaged[woman] = Some(man);
        if friends.contains(&(man, woman)) {
            // she will never take anyone she ranks below her new partner
            let threshold = rank(&suitors, man, woman);
            let below: Vec<usize> = (0..suitors.len())
                .filter(|&q| q != man && scores.contains_key(&(q, woman)))
                .filter(|&q| rank(&suitors, q, woman) < threshold)
                .collect();
            for q in below {
                suitors[q].removed.insert(woman);
            }
        }
    }

    Ok(engaged
        .iter()
        .enumerate()
        .filter_map(|(w, m)| m.map(|m| (m, w)))
        .collect())
}
