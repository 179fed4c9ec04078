// Pairwise similarity between features and rows
use anyhow::{anyhow, bail, Result};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::feature::{AlignmentFile, Feature};
use crate::library::ExtendedLibrary;
use crate::row::AlignmentRow;

/// How candidate pairs are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Euclidean similarity of per-run z-scored mass and RT
    Unweighted,
    /// Accumulated score from the pairwise alignment library
    Weighted,
}

impl FromStr for ScoringMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unweighted" | "euclidean" => Ok(ScoringMode::Unweighted),
            "weighted" | "library" => Ok(ScoringMode::Weighted),
            _ => Err(anyhow!(
                "Invalid scoring mode '{s}'. Use 'unweighted' or 'weighted'"
            )),
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Unweighted => write!(f, "unweighted"),
            ScoringMode::Weighted => write!(f, "weighted"),
        }
    }
}

/// Mean and sample standard deviation of mass and RT over one run.
/// With fewer than two features the deviations are NaN.
#[derive(Debug, Clone, Copy)]
pub struct RunStatistics {
    pub mass_mean: f64,
    pub mass_sd: f64,
    pub rt_mean: f64,
    pub rt_sd: f64,
}

impl RunStatistics {
    pub fn from_file(file: &AlignmentFile) -> Self {
        let masses: Vec<f64> = file.features().iter().map(|f| f.mass()).collect();
        let rts: Vec<f64> = file.features().iter().map(|f| f.rt()).collect();
        RunStatistics {
            mass_mean: masses.iter().mean(),
            mass_sd: masses.iter().std_dev(),
            rt_mean: rts.iter().mean(),
            rt_sd: rts.iter().std_dev(),
        }
    }

    pub fn mass_z(&self, mass: f64) -> f64 {
        (mass - self.mass_mean) / self.mass_sd
    }

    pub fn rt_z(&self, rt: f64) -> f64 {
        (rt - self.rt_mean) / self.rt_sd
    }
}

/// `1 / (1 + d)` where `d` is the Euclidean distance in z-score space.
/// Undefined z-scores (degenerate runs) give the sentinel 0.
pub fn zscore_similarity(
    f1: &Feature,
    stats1: &RunStatistics,
    f2: &Feature,
    stats2: &RunStatistics,
) -> f64 {
    let mass_diff = stats1.mass_z(f1.mass()) - stats2.mass_z(f2.mass());
    let rt_diff = stats1.rt_z(f1.rt()) - stats2.rt_z(f2.rt());
    let dist = (mass_diff * mass_diff + rt_diff * rt_diff).sqrt();
    sanitize(1.0 / (1.0 + dist))
}

#[inline]
fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Scores features and rows; higher is always better
pub struct Scorer<'a> {
    mode: ScoringMode,
    stats: HashMap<usize, RunStatistics>,
    library: Option<&'a ExtendedLibrary>,
}

impl<'a> Scorer<'a> {
    pub fn unweighted(files: &[AlignmentFile]) -> Self {
        Scorer {
            mode: ScoringMode::Unweighted,
            stats: files
                .iter()
                .map(|f| (f.id(), RunStatistics::from_file(f)))
                .collect(),
            library: None,
        }
    }

    pub fn weighted(files: &[AlignmentFile], library: &'a ExtendedLibrary) -> Self {
        let mut scorer = Self::unweighted(files);
        scorer.mode = ScoringMode::Weighted;
        scorer.library = Some(library);
        scorer
    }

    pub fn new(
        mode: ScoringMode,
        files: &[AlignmentFile],
        library: Option<&'a ExtendedLibrary>,
    ) -> Result<Self> {
        match (mode, library) {
            (ScoringMode::Unweighted, _) => Ok(Self::unweighted(files)),
            (ScoringMode::Weighted, Some(library)) => Ok(Self::weighted(files, library)),
            (ScoringMode::Weighted, None) => {
                bail!("weighted scoring requires a pairwise alignment library")
            }
        }
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    pub fn run_statistics(&self, file: usize) -> Option<&RunStatistics> {
        self.stats.get(&file)
    }

    pub fn feature_similarity(&self, f1: &Feature, f2: &Feature) -> f64 {
        match (self.mode, self.library) {
            (ScoringMode::Weighted, Some(library)) => library.entry_score(&f1.key(), &f2.key()),
            _ => match (self.stats.get(&f1.file()), self.stats.get(&f2.file())) {
                (Some(s1), Some(s2)) => zscore_similarity(f1, s1, f2, s2),
                _ => 0.0,
            },
        }
    }

    /// Mean feature similarity over all cross pairs of the two rows
    pub fn row_similarity(&self, r1: &AlignmentRow, r2: &AlignmentRow) -> f64 {
        if r1.is_empty() || r2.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        for f1 in r1.features() {
            for f2 in r2.features() {
                total += self.feature_similarity(f1, f2);
            }
        }
        sanitize(total / (r1.len() * r2.len()) as f64)
    }
}
