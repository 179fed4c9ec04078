//! Pairwise alignment libraries
//!
//! Every unordered pair of runs is aligned independently to produce an
//! `AlignmentLibrary` of scored feature pairs. The libraries are combined
//! into one `ExtendedLibrary` which feeds the guide-tree distances and
//! weighted scoring.

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use crate::feature::{AlignmentFile, FeatureKey};
use crate::scoring::{zscore_similarity, RunStatistics};
use crate::tolerance::ToleranceWindow;

/// One scored feature pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LibraryEntry {
    pub first: FeatureKey,
    pub second: FeatureKey,
    pub score: f64,
    pub weight: f64,
}

impl LibraryEntry {
    pub fn new(first: FeatureKey, second: FeatureKey, score: f64, weight: f64) -> Self {
        LibraryEntry {
            first,
            second,
            score,
            weight,
        }
    }

    fn joins(&self, a: usize, b: usize) -> bool {
        (self.first.file == a && self.second.file == b)
            || (self.first.file == b && self.second.file == a)
    }
}

/// Result of aligning one pair of runs
#[derive(Debug, Clone)]
pub struct AlignmentLibrary {
    pub id: usize,
    pub first_file: usize,
    pub second_file: usize,
    pub entries: Vec<LibraryEntry>,
}

impl AlignmentLibrary {
    pub fn new(id: usize, first_file: usize, second_file: usize) -> Self {
        AlignmentLibrary {
            id,
            first_file,
            second_file,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(&mut self, entry: LibraryEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[inline]
fn pair_key(a: FeatureKey, b: FeatureKey) -> (FeatureKey, FeatureKey) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// All libraries combined, keyed by unordered feature pair
#[derive(Debug, Default, Clone)]
pub struct ExtendedLibrary {
    entries: IndexMap<(FeatureKey, FeatureKey), LibraryEntry>,
}

impl ExtendedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_libraries<'a, I>(libraries: I) -> Self
    where
        I: IntoIterator<Item = &'a AlignmentLibrary>,
    {
        let mut combined = Self::new();
        for library in libraries {
            combined.add_library(library);
        }
        combined
    }

    pub fn add_library(&mut self, library: &AlignmentLibrary) {
        for entry in &library.entries {
            self.put_entry(*entry);
        }
    }

    /// Insert an entry; a pair seen before has its score and weight summed
    pub fn put_entry(&mut self, entry: LibraryEntry) {
        let key = pair_key(entry.first, entry.second);
        self.entries
            .entry(key)
            .and_modify(|existing| {
                existing.score += entry.score;
                existing.weight += entry.weight;
            })
            .or_insert(LibraryEntry::new(key.0, key.1, entry.score, entry.weight));
    }

    pub fn entry(&self, a: &FeatureKey, b: &FeatureKey) -> Option<&LibraryEntry> {
        self.entries.get(&pair_key(*a, *b))
    }

    pub fn entry_score(&self, a: &FeatureKey, b: &FeatureKey) -> f64 {
        self.entry(a, b).map_or(0.0, |e| e.score)
    }

    pub fn entry_weight(&self, a: &FeatureKey, b: &FeatureKey) -> f64 {
        self.entry(a, b).map_or(0.0, |e| e.weight)
    }

    /// Mean entry score over the pairs joining runs `a` and `b`
    pub fn score_between_files(&self, a: usize, b: usize) -> f64 {
        let (total, count) = self
            .entries
            .values()
            .filter(|e| e.joins(a, b))
            .fold((0.0, 0usize), |(t, c), e| (t + e.score, c + 1));
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    pub fn max_weight(&self) -> Option<f64> {
        self.entries.values().map(|e| e.weight).reduce(f64::max)
    }

    pub fn min_weight(&self) -> Option<f64> {
        self.entries.values().map(|e| e.weight).reduce(f64::min)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LibraryEntry> + '_ {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Produces the library for one pair of runs
pub trait PairwiseLibraryBuilder: Sync {
    fn build(
        &self,
        id: usize,
        first: &AlignmentFile,
        second: &AlignmentFile,
        window: &ToleranceWindow,
    ) -> Result<AlignmentLibrary>;
}

/// Greedy join of two runs: features of the first run, most intense
/// first, take their best-scoring free partner in the second run
#[derive(Debug, Clone, Copy)]
pub struct JoinLibraryBuilder {
    pub matched_weight: f64,
}

impl Default for JoinLibraryBuilder {
    fn default() -> Self {
        JoinLibraryBuilder {
            matched_weight: 1.0,
        }
    }
}

impl PairwiseLibraryBuilder for JoinLibraryBuilder {
    fn build(
        &self,
        id: usize,
        first: &AlignmentFile,
        second: &AlignmentFile,
        window: &ToleranceWindow,
    ) -> Result<AlignmentLibrary> {
        let stats1 = RunStatistics::from_file(first);
        let stats2 = RunStatistics::from_file(second);
        let mut library = AlignmentLibrary::new(id, first.id(), second.id());
        let mut taken: HashSet<FeatureKey> = HashSet::new();
        let mut matched: HashSet<FeatureKey> = HashSet::new();

        for feature in first.features_by_intensity() {
            let mut best: Option<(f64, FeatureKey)> = None;
            for candidate in second.features_in_range(feature, window) {
                if taken.contains(&candidate.key()) {
                    continue;
                }
                let score = zscore_similarity(feature, &stats1, &candidate, &stats2);
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, candidate.key()));
                }
            }
            if let Some((score, partner)) = best {
                library.add_entry(LibraryEntry::new(
                    feature.key(),
                    partner,
                    score,
                    self.matched_weight,
                ));
                taken.insert(partner);
                matched.insert(feature.key());
            }
        }

        // remaining in-window pairs are kept with no weight
        for feature in first.features() {
            if matched.contains(&feature.key()) {
                continue;
            }
            for candidate in second.features_in_range(feature, window) {
                if taken.contains(&candidate.key()) {
                    continue;
                }
                let score = zscore_similarity(feature, &stats1, &candidate, &stats2);
                library.add_entry(LibraryEntry::new(feature.key(), candidate.key(), score, 0.0));
            }
        }

        log::debug!(
            "library {} ({} vs {}): {} entries, {} matched",
            id,
            first.name(),
            second.name(),
            library.len(),
            matched.len()
        );
        Ok(library)
    }
}

/// A pair of runs whose library could not be produced
#[derive(Debug)]
pub struct LibraryFailure {
    pub first_file: usize,
    pub second_file: usize,
    pub error: anyhow::Error,
}

impl fmt::Display for LibraryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "runs {} and {}: {:#}",
            self.first_file, self.second_file, self.error
        )
    }
}

#[derive(Debug, Default)]
pub struct LibraryBuild {
    pub libraries: Vec<AlignmentLibrary>,
    pub failures: Vec<LibraryFailure>,
}

impl LibraryBuild {
    pub fn combined(&self) -> ExtendedLibrary {
        ExtendedLibrary::from_libraries(&self.libraries)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Align every unordered pair of runs on the rayon pool.
///
/// Results come back over a channel and are drained once all pairs are
/// done. A pair that errors or panics is logged and reported in
/// `failures`; the other pairs are unaffected.
pub fn build_libraries<B: PairwiseLibraryBuilder>(
    files: &[AlignmentFile],
    builder: &B,
    window: &ToleranceWindow,
) -> LibraryBuild {
    let mut pairs = Vec::new();
    for i in 0..files.len() {
        for j in i + 1..files.len() {
            pairs.push((i, j));
        }
    }

    let (tx, rx) = mpsc::channel();
    rayon::scope(|s| {
        for (id, &(i, j)) in pairs.iter().enumerate() {
            let tx = tx.clone();
            s.spawn(move |_| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    builder.build(id, &files[i], &files[j], window)
                }));
                let result = match outcome {
                    Ok(result) => result,
                    Err(payload) => Err(anyhow!(
                        "pairwise alignment panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                };
                // the receiver outlives the scope
                let _ = tx.send((id, i, j, result));
            });
        }
    });
    drop(tx);

    let mut results: Vec<_> = rx.into_iter().collect();
    results.sort_by_key(|(id, _, _, _)| *id);

    let mut build = LibraryBuild::default();
    for (_, i, j, result) in results {
        match result {
            Ok(library) => build.libraries.push(library),
            Err(error) => {
                let failure = LibraryFailure {
                    first_file: files[i].id(),
                    second_file: files[j].id(),
                    error,
                };
                log::warn!("pairwise library failed for {}", failure);
                build.failures.push(failure);
            }
        }
    }
    log::info!(
        "built {} pairwise libraries ({} failed)",
        build.libraries.len(),
        build.failures.len()
    );
    build
}
