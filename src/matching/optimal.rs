// Maximum total similarity assignment between two row lists
use anyhow::Result;

use super::{hungarian, MatchContext, RowPairs};
use crate::row::AlignmentRow;

/// Score every pair, invert to costs (`max - score`) and solve.
///
/// Pairs outside the tolerance window score 0 in the matrix and are
/// dropped from the result if the solver assigns them anyway.
pub fn match_rows(
    proposers: &[AlignmentRow],
    reviewers: &[AlignmentRow],
    ctx: &MatchContext,
) -> Result<RowPairs> {
    let mut admissible = vec![vec![false; reviewers.len()]; proposers.len()];
    let mut scores = vec![vec![0.0; reviewers.len()]; proposers.len()];
    let mut max_score = 0.0f64;
    for (i, p) in proposers.iter().enumerate() {
        for (j, r) in reviewers.iter().enumerate() {
            if ctx.admissible(p, r) {
                admissible[i][j] = true;
                scores[i][j] = ctx.scorer.row_similarity(p, r);
                max_score = max_score.max(scores[i][j]);
            }
        }
    }

    let cost: Vec<Vec<f64>> = scores
        .iter()
        .map(|row| row.iter().map(|s| max_score - s).collect())
        .collect();
    let assignment = hungarian::solve(&cost)?;

    let pairs: RowPairs = assignment
        .into_iter()
        .enumerate()
        .filter_map(|(i, col)| col.map(|j| (i, j)))
        .filter(|&(i, j)| admissible[i][j])
        .collect();
    Ok(pairs)
}
