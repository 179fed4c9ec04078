//! Minimum-cost assignment (Kuhn-Munkres with row/column potentials)
//!
//! Works on any `m x n` matrix. Every row of the smaller dimension gets a
//! partner; rows left without a column come back as `None`.
use anyhow::{bail, ensure, Result};

pub fn solve(cost: &[Vec<f64>]) -> Result<Vec<Option<usize>>> {
    let rows = cost.len();
    if rows == 0 {
        return Ok(Vec::new());
    }
    let cols = cost[0].len();
    for (i, row) in cost.iter().enumerate() {
        ensure!(
            row.len() == cols,
            "ragged cost matrix: row {} has {} columns, expected {}",
            i,
            row.len(),
            cols
        );
        if let Some(j) = row.iter().position(|v| !v.is_finite()) {
            bail!("non-finite cost at ({}, {})", i, j);
        }
    }
    if cols == 0 {
        return Ok(vec![None; rows]);
    }

    let assignment = if rows <= cols {
        solve_wide(cost, rows, cols)?
    } else {
        let transposed: Vec<Vec<f64>> = (0..cols)
            .map(|j| (0..rows).map(|i| cost[i][j]).collect())
            .collect();
        let by_column = solve_wide(&transposed, cols, rows)?;
        let mut assignment = vec![None; rows];
        for (j, row) in by_column.into_iter().enumerate() {
            if let Some(i) = row {
                assignment[i] = Some(j);
            }
        }
        assignment
    };

    for (i, col) in assignment.iter().enumerate() {
        if let Some(j) = *col {
            ensure!(j < cols, "row {} assigned to column {} of {}", i, j, cols);
        }
    }
    Ok(assignment)
}

/// Sum of the assigned cells
pub fn total_cost(cost: &[Vec<f64>], assignment: &[Option<usize>]) -> f64 {
    assignment
        .iter()
        .enumerate()
        .filter_map(|(i, col)| col.map(|j| cost[i][j]))
        .sum()
}

// n <= m; potentials and the column->row map are 1-based with slot 0 as
// the virtual start column
fn solve_wide(cost: &[Vec<f64>], n: usize, m: usize) -> Result<Vec<Option<usize>>> {
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        owner[0] = i;
        let mut j0 = 0usize;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];
        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;
            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < min_slack[j] {
                    min_slack[j] = reduced;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }
            ensure!(j1 != 0, "no augmenting column found for row {}", i - 1);
            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }
            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }
        // augment along the alternating path
        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![None; n];
    for j in 1..=m {
        let i = owner[j];
        if i != 0 {
            ensure!(i <= n, "column {} assigned to unknown row {}", j - 1, i - 1);
            assignment[i - 1] = Some(j - 1);
        }
    }
    Ok(assignment)
}
