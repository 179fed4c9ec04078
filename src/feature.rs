// Per-run feature records and the run (AlignmentFile) that owns them
use std::fmt;
use std::sync::Arc;

use crate::ownership::FeatureOwnership;
use crate::tolerance::ToleranceWindow;

/// Identity of a feature: owning run plus the peak id within that run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey {
    pub file: usize,
    pub id: u32,
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.id)
    }
}

/// One detected (mass, RT, intensity) peak in a single LC-MS run
#[derive(Debug, Clone)]
pub struct Feature {
    id: u32,
    file: usize,
    mass: f64,
    mass_log: f64,
    rt: f64,
    intensity: f64,
    group_refs: Vec<u32>,
}

impl Feature {
    pub fn new(file: usize, id: u32, mass: f64, rt: f64, intensity: f64) -> Self {
        Feature {
            id,
            file,
            mass,
            mass_log: mass.ln(),
            rt,
            intensity,
            group_refs: Vec::new(),
        }
    }

    /// Attach intra-run group memberships produced by an external grouper
    pub fn with_groups(mut self, groups: Vec<u32>) -> Self {
        self.group_refs = groups;
        self
    }

    pub fn key(&self) -> FeatureKey {
        FeatureKey {
            file: self.file,
            id: self.id,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn file(&self) -> usize {
        self.file
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn mass_log(&self) -> f64 {
        self.mass_log
    }

    /// Keeps `mass_log` in sync with the mass
    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
        self.mass_log = mass.ln();
    }

    pub fn rt(&self) -> f64 {
        self.rt
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    pub fn group_refs(&self) -> &[u32] {
        &self.group_refs
    }

    pub fn shares_group_with(&self, other: &Feature) -> bool {
        self.file == other.file
            && self
                .group_refs
                .iter()
                .any(|g| other.group_refs.contains(g))
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Feature {}

impl std::hash::Hash for Feature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// One LC-MS run: its features in insertion order plus a cached view
/// sorted by intensity (descending)
#[derive(Debug, Clone)]
pub struct AlignmentFile {
    id: usize,
    name: String,
    features: Vec<Arc<Feature>>,
    by_intensity: Vec<usize>,
}

impl AlignmentFile {
    /// Build a run from parsed `(id, mass, rt, intensity)` records.
    /// Every feature is re-owned by this run.
    pub fn new(id: usize, name: impl Into<String>, features: Vec<Feature>) -> Self {
        let features: Vec<Arc<Feature>> = features
            .into_iter()
            .map(|mut f| {
                f.file = id;
                Arc::new(f)
            })
            .collect();
        let by_intensity = intensity_order(&features);
        AlignmentFile {
            id,
            name: name.into(),
            features,
            by_intensity,
        }
    }

    /// Convenience constructor from bare tuples
    pub fn from_tuples(id: usize, name: impl Into<String>, rows: &[(u32, f64, f64, f64)]) -> Self {
        let features = rows
            .iter()
            .map(|&(fid, mass, rt, intensity)| Feature::new(id, fid, mass, rt, intensity))
            .collect();
        Self::new(id, name, features)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[Arc<Feature>] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features ordered by intensity, most intense first
    pub fn features_by_intensity(&self) -> impl Iterator<Item = &Arc<Feature>> + '_ {
        self.by_intensity.iter().map(move |&i| &self.features[i])
    }

    /// All features inside the window centred on `reference`
    pub fn features_in_range(
        &self,
        reference: &Feature,
        window: &ToleranceWindow,
    ) -> Vec<Arc<Feature>> {
        self.features
            .iter()
            .filter(|f| window.contains(reference.mass(), reference.rt(), f.mass(), f.rt()))
            .cloned()
            .collect()
    }

    /// Features inside the window that no row has claimed yet
    pub fn unaligned_features_in_range(
        &self,
        reference: &Feature,
        window: &ToleranceWindow,
        ownership: &FeatureOwnership,
    ) -> Vec<Arc<Feature>> {
        self.features
            .iter()
            .filter(|f| !ownership.is_aligned(&f.key()))
            .filter(|f| window.contains(reference.mass(), reference.rt(), f.mass(), f.rt()))
            .cloned()
            .collect()
    }

    pub fn unaligned_count(&self, ownership: &FeatureOwnership) -> usize {
        self.features
            .iter()
            .filter(|f| !ownership.is_aligned(&f.key()))
            .count()
    }
}

impl PartialEq for AlignmentFile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

fn intensity_order(features: &[Arc<Feature>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..features.len()).collect();
    // stable sort keeps insertion order for equal intensities
    order.sort_by(|&a, &b| {
        features[b]
            .intensity()
            .total_cmp(&features[a].intensity())
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> AlignmentFile {
        AlignmentFile::from_tuples(
            3,
            "run3",
            &[
                (0, 100.0, 10.0, 50.0),
                (1, 100.002, 10.2, 500.0),
                (2, 250.0, 30.0, 500.0),
                (3, 100.004, 40.0, 5.0),
            ],
        )
    }

    #[test]
    fn test_mass_log_tracks_mass() {
        let mut f = Feature::new(0, 1, 100.0, 5.0, 1.0);
        assert!((f.mass_log() - 100.0f64.ln()).abs() < 1e-12);
        f.set_mass(200.0);
        assert!((f.mass_log() - 200.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_features_are_owned_by_their_run() {
        let file = AlignmentFile::new(7, "x", vec![Feature::new(0, 1, 100.0, 5.0, 1.0)]);
        assert_eq!(file.features()[0].file(), 7);
        assert_eq!(file.features()[0].key(), FeatureKey { file: 7, id: 1 });
    }

    #[test]
    fn test_intensity_view_is_descending_and_stable() {
        let file = run();
        let ids: Vec<u32> = file.features_by_intensity().map(|f| f.id()).collect();
        assert_eq!(ids, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_range_query_respects_rt() {
        let file = run();
        let reference = Feature::new(9, 99, 100.001, 10.1, 1.0);
        let window = ToleranceWindow::new(0.01, 1.0, false);
        let hits: Vec<u32> = file
            .features_in_range(&reference, &window)
            .iter()
            .map(|f| f.id())
            .collect();
        assert_eq!(hits, vec![0, 1]);

        let mass_only = ToleranceWindow::new(0.01, -1.0, false);
        assert_eq!(file.features_in_range(&reference, &mass_only).len(), 3);
    }

    #[test]
    fn test_unaligned_query_skips_owned_features() {
        use crate::row::{ListId, RowKey};
        let file = run();
        let mut ownership = FeatureOwnership::new();
        ownership.claim(
            file.features()[0].key(),
            RowKey {
                list: ListId(0),
                id: 0,
            },
        );
        let reference = Feature::new(9, 99, 100.001, 10.1, 1.0);
        let window = ToleranceWindow::new(0.01, 1.0, false);
        let hits = file.unaligned_features_in_range(&reference, &window, &ownership);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), 1);
        assert_eq!(file.unaligned_count(&ownership), 3);
    }
}
