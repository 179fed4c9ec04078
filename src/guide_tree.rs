//! Hierarchical clustering of runs into the guide tree that orders merges
use anyhow::{bail, ensure, Result};
use std::fmt::Write as _;

use crate::feature::AlignmentFile;
use crate::library::ExtendedLibrary;

#[derive(Debug, Clone, PartialEq)]
pub enum GuideTree {
    Leaf {
        /// Position of the run in the input slice
        run: usize,
        name: String,
    },
    Node {
        name: String,
        distance: f64,
        children: Vec<GuideTree>,
    },
}

impl GuideTree {
    pub fn leaf(run: usize, name: impl Into<String>) -> Self {
        GuideTree::Leaf {
            run,
            name: name.into(),
        }
    }

    pub fn node(name: impl Into<String>, distance: f64, children: Vec<GuideTree>) -> Self {
        GuideTree::Node {
            name: name.into(),
            distance,
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GuideTree::Leaf { name, .. } | GuideTree::Node { name, .. } => name,
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            GuideTree::Leaf { .. } => 1,
            GuideTree::Node { children, .. } => children.iter().map(|c| c.leaf_count()).sum(),
        }
    }

    /// Runs in left-to-right leaf order
    pub fn leaves(&self) -> Vec<usize> {
        let mut runs = Vec::new();
        self.collect_leaves(&mut runs);
        runs
    }

    fn collect_leaves(&self, runs: &mut Vec<usize>) {
        match self {
            GuideTree::Leaf { run, .. } => runs.push(*run),
            GuideTree::Node { children, .. } => {
                for child in children {
                    child.collect_leaves(runs);
                }
            }
        }
    }

    /// Agglomerative complete-linkage clustering into a binary tree.
    /// Equal distances merge the lowest cluster index pair first.
    pub fn complete_linkage(distances: &[Vec<f64>], labels: &[String]) -> Result<GuideTree> {
        let n = distances.len();
        if n == 0 {
            bail!("cannot build a guide tree over zero runs");
        }
        ensure!(
            labels.len() == n,
            "{} labels given for a {}x{} distance matrix",
            labels.len(),
            n,
            n
        );
        for (i, row) in distances.iter().enumerate() {
            ensure!(
                row.len() == n,
                "distance matrix is not square: row {} has {} entries, expected {}",
                i,
                row.len(),
                n
            );
            if let Some(j) = row.iter().position(|d| !d.is_finite()) {
                bail!("non-finite distance between runs {} and {}", i, j);
            }
        }

        let mut d: Vec<Vec<f64>> = distances.to_vec();
        let mut clusters: Vec<Option<GuideTree>> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| Some(GuideTree::leaf(i, label.clone())))
            .collect();
        let mut remaining = n;
        let mut counter = 0usize;

        while remaining > 1 {
            let mut best: Option<(usize, usize, f64)> = None;
            for a in 0..n {
                if clusters[a].is_none() {
                    continue;
                }
                for b in a + 1..n {
                    if clusters[b].is_none() {
                        continue;
                    }
                    if best.map_or(true, |(_, _, dist)| d[a][b] < dist) {
                        best = Some((a, b, d[a][b]));
                    }
                }
            }
            let Some((a, b, dist)) = best else {
                bail!("no cluster pair left to join");
            };

            // complete linkage: distance to the union is the larger of the two
            for k in 0..n {
                if k != a && k != b && clusters[k].is_some() {
                    let joined = d[a][k].max(d[b][k]);
                    d[a][k] = joined;
                    d[k][a] = joined;
                }
            }

            let (Some(left), Some(right)) = (clusters[a].take(), clusters[b].take()) else {
                bail!("cluster {} or {} vanished during linkage", a, b);
            };
            counter += 1;
            clusters[a] = Some(GuideTree::node(
                format!("clstr{counter}"),
                dist,
                vec![left, right],
            ));
            remaining -= 1;
        }

        clusters
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| anyhow::anyhow!("linkage produced no root"))
    }

    /// Indented text dump, one line per node
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self {
            GuideTree::Leaf { name, .. } => {
                let _ = writeln!(out, "{indent}- {name}");
            }
            GuideTree::Node {
                name,
                distance,
                children,
            } => {
                let _ = writeln!(out, "{indent}{name} ({distance:.3})");
                for child in children {
                    child.render_into(out, depth + 1);
                }
            }
        }
    }
}

/// Pairwise run distances from the combined library.
///
/// Mean entry scores between runs are normalised by the largest one and
/// turned into distances `1 - score`. Without any scores every pair is at
/// distance 1.
pub fn distance_matrix(files: &[AlignmentFile], library: &ExtendedLibrary) -> Vec<Vec<f64>> {
    let n = files.len();
    let mut scores = vec![vec![0.0; n]; n];
    let mut max_score = 0.0f64;
    for i in 0..n {
        for j in i + 1..n {
            let score = library.score_between_files(files[i].id(), files[j].id());
            scores[i][j] = score;
            scores[j][i] = score;
            max_score = max_score.max(score);
        }
    }

    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let normalised = if max_score > 0.0 {
                scores[i][j] / max_score
            } else {
                0.0
            };
            matrix[i][j] = 1.0 - normalised;
        }
    }
    matrix
}
