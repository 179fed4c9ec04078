//! Consensus rows and the lists that hold them
//!
//! A row groups features (normally at most one per run) believed to be the
//! same chemical entity. Its averages are cached and refreshed on every
//! mutation. Rows are identified by `(list, id)` where `list` is the list
//! that created the row; a row carried unmatched into a merged list keeps
//! its original key.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::feature::{AlignmentFile, Feature};
use crate::tolerance::ToleranceWindow;

/// Identity of an alignment list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListId(pub u32);

/// Identity of a row: the list that created it plus its id there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub list: ListId,
    pub id: usize,
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.list.0, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct AlignmentRow {
    key: RowKey,
    features: Vec<Arc<Feature>>,
    avg_mz: f64,
    avg_rt: f64,
    abs_rt_diff: f64,
}

impl AlignmentRow {
    pub fn new(list: ListId, id: usize) -> Self {
        AlignmentRow {
            key: RowKey { list, id },
            features: Vec::new(),
            avg_mz: 0.0,
            avg_rt: 0.0,
            abs_rt_diff: 0.0,
        }
    }

    pub fn singleton(list: ListId, id: usize, feature: Arc<Feature>) -> Self {
        let mut row = Self::new(list, id);
        row.add_features([feature]);
        row
    }

    pub fn key(&self) -> RowKey {
        self.key
    }

    pub fn id(&self) -> usize {
        self.key.id
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

    pub fn avg_mz(&self) -> f64 {
        self.avg_mz
    }

    pub fn avg_rt(&self) -> f64 {
        self.avg_rt
    }

    /// Sum of absolute RT deviations from the row mean (0 below two features)
    pub fn abs_rt_diff(&self) -> f64 {
        self.abs_rt_diff
    }

    /// Add features (set semantics) and refresh the cached statistics
    pub fn add_features<I>(&mut self, features: I)
    where
        I: IntoIterator<Item = Arc<Feature>>,
    {
        for feature in features {
            if !self.contains(&feature) {
                self.features.push(feature);
            }
        }
        self.recompute();
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        self.features.iter().any(|f| f.key() == feature.key())
    }

    /// The feature contributed by run `file`, if any
    pub fn feature_from_file(&self, file: usize) -> Option<&Arc<Feature>> {
        self.features.iter().find(|f| f.file() == file)
    }

    /// True when `other`'s averages fall inside the window centred on ours
    pub fn in_range(&self, other: &AlignmentRow, window: &ToleranceWindow) -> bool {
        window.contains(self.avg_mz, self.avg_rt, other.avg_mz, other.avg_rt)
    }

    fn recompute(&mut self) {
        let n = self.features.len();
        if n == 0 {
            self.avg_mz = 0.0;
            self.avg_rt = 0.0;
            self.abs_rt_diff = 0.0;
            return;
        }
        let n = n as f64;
        self.avg_mz = self.features.iter().map(|f| f.mass()).sum::<f64>() / n;
        self.avg_rt = self.features.iter().map(|f| f.rt()).sum::<f64>() / n;
        self.abs_rt_diff = if self.features.len() < 2 {
            0.0
        } else {
            self.features
                .iter()
                .map(|f| (f.rt() - self.avg_rt).abs())
                .sum()
        };
    }
}

impl PartialEq for AlignmentRow {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for AlignmentRow {}

/// Named, ordered collection of rows
#[derive(Debug, Clone)]
pub struct AlignmentList {
    id: ListId,
    name: String,
    rows: Vec<AlignmentRow>,
}

impl AlignmentList {
    pub fn new(id: ListId, name: impl Into<String>) -> Self {
        AlignmentList {
            id,
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// One singleton row per feature, in the run's insertion order
    pub fn from_file(id: ListId, file: &AlignmentFile) -> Self {
        let rows = file
            .features()
            .iter()
            .enumerate()
            .map(|(i, f)| AlignmentRow::singleton(id, i, f.clone()))
            .collect();
        AlignmentList {
            id,
            name: file.name().to_string(),
            rows,
        }
    }

    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[AlignmentRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<AlignmentRow> {
        self.rows
    }

    pub fn add_row(&mut self, row: AlignmentRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    /// Indices of rows whose averages lie inside the window centred on `reference`
    pub fn rows_in_range(&self, reference: &AlignmentRow, window: &ToleranceWindow) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| reference.in_range(row, window))
            .map(|(i, _)| i)
            .collect()
    }

    /// Like `rows_in_range`, skipping rows already claimed by the caller
    pub fn unaligned_rows_in_range(
        &self,
        reference: &AlignmentRow,
        window: &ToleranceWindow,
        claimed: &HashSet<RowKey>,
    ) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !claimed.contains(&row.key()))
            .filter(|(_, row)| reference.in_range(row, window))
            .map(|(i, _)| i)
            .collect()
    }
}
