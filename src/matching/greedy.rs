// Greedy best-score matching
use anyhow::Result;

use super::{MatchContext, RowPairs};
use crate::row::AlignmentRow;

/// Each proposer, in list order, takes its best admissible reviewer that
/// nobody has taken yet
pub fn match_rows(
    proposers: &[AlignmentRow],
    reviewers: &[AlignmentRow],
    ctx: &MatchContext,
) -> Result<RowPairs> {
    let mut taken = vec![false; reviewers.len()];
    let mut pairs = RowPairs::new();
    for (i, proposer) in proposers.iter().enumerate() {
        let best = ctx
            .ranked_candidates(proposer, reviewers)
            .into_iter()
            .find(|c| !taken[c.index]);
        if let Some(candidate) = best {
            taken[candidate.index] = true;
            pairs.push((i, candidate.index));
        }
    }
    Ok(pairs)
}
