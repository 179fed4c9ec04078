//! Progressive multi-run alignment along the guide tree
use anyhow::{bail, ensure, Context, Result};

use crate::config::AlignmentConfig;
use crate::feature::AlignmentFile;
use crate::guide_tree::{distance_matrix, GuideTree};
use crate::library::{build_libraries, LibraryFailure, PairwiseLibraryBuilder};
use crate::matching::Merger;
use crate::ownership::FeatureOwnership;
use crate::row::AlignmentList;
use crate::scoring::Scorer;

/// Walks a guide tree bottom-up, folding each node's children into one
/// list with the merger's strategy
pub struct ProgressiveAligner<'a> {
    files: &'a [AlignmentFile],
    merger: Merger<'a>,
    merges: usize,
}

impl<'a> ProgressiveAligner<'a> {
    pub fn new(files: &'a [AlignmentFile], merger: Merger<'a>) -> Self {
        ProgressiveAligner {
            files,
            merger,
            merges: 0,
        }
    }

    pub fn align(&mut self, tree: &GuideTree) -> Result<AlignmentList> {
        self.resolve(tree)
    }

    /// Number of pairwise merges performed so far
    pub fn merge_count(&self) -> usize {
        self.merges
    }

    pub fn ownership(&self) -> &FeatureOwnership {
        self.merger.ownership()
    }

    fn resolve(&mut self, tree: &GuideTree) -> Result<AlignmentList> {
        match tree {
            GuideTree::Leaf { run, name } => {
                let file = self
                    .files
                    .get(*run)
                    .with_context(|| format!("guide tree leaf {name} refers to missing run {run}"))?;
                let id = self.merger.next_list_id();
                Ok(AlignmentList::from_file(id, file))
            }
            GuideTree::Node { name, children, .. } => {
                let mut children = children.iter();
                let Some(first) = children.next() else {
                    bail!("guide tree node {} has no children", name);
                };
                let mut merged = self.resolve(first)?;
                for child in children {
                    let list = self.resolve(child)?;
                    merged = self
                        .merger
                        .merge(name, merged, list)
                        .with_context(|| format!("Failed to merge node {name}"))?;
                    self.merges += 1;
                }
                Ok(merged)
            }
        }
    }
}

/// Everything produced by one alignment run
#[derive(Debug)]
pub struct AlignmentOutcome {
    pub alignment: AlignmentList,
    pub tree: GuideTree,
    pub library_failures: Vec<LibraryFailure>,
    pub merges: usize,
}

/// Full pipeline: pairwise libraries in parallel, guide tree, then the
/// sequential progressive merge
pub fn align_runs<B: PairwiseLibraryBuilder>(
    files: &[AlignmentFile],
    config: &AlignmentConfig,
    builder: &B,
) -> Result<AlignmentOutcome> {
    config.validate()?;
    ensure!(!files.is_empty(), "no runs to align");

    let build = build_libraries(files, builder, &config.library_window());
    let library = build.combined();
    log::debug!("combined library holds {} feature pairs", library.len());

    let distances = distance_matrix(files, &library);
    let labels: Vec<String> = files.iter().map(|f| f.name().to_string()).collect();
    let tree = GuideTree::complete_linkage(&distances, &labels)?;
    log::debug!("guide tree:\n{}", tree.render());

    let scorer = Scorer::new(config.scoring, files, Some(&library))?;
    let merger = Merger::new(config.strategy, &scorer, config.window())
        .with_top_k_friends(config.top_k_friends);
    let mut aligner = ProgressiveAligner::new(files, merger);
    let alignment = aligner.align(&tree)?;
    let merges = aligner.merge_count();
    log::info!(
        "aligned {} runs into {} rows with {} merges",
        files.len(),
        alignment.len(),
        merges
    );

    Ok(AlignmentOutcome {
        alignment,
        tree,
        library_failures: build.failures,
        merges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::JoinLibraryBuilder;
    use crate::matching::MatchingStrategy;
    use crate::tolerance::ToleranceWindow;

    fn runs() -> Vec<AlignmentFile> {
        vec![
            AlignmentFile::from_tuples(0, "a", &[(0, 100.0, 10.0, 1.0), (1, 200.0, 20.0, 1.0)]),
            AlignmentFile::from_tuples(1, "b", &[(0, 100.001, 10.1, 1.0), (1, 200.0, 20.2, 1.0)]),
            AlignmentFile::from_tuples(2, "c", &[(0, 100.0, 10.2, 1.0), (1, 300.0, 30.0, 1.0)]),
        ]
    }

    #[test]
    fn test_multiway_node_folds_left_to_right() {
        let files = runs();
        let scorer = Scorer::unweighted(&files);
        let merger = Merger::new(
            MatchingStrategy::Stable,
            &scorer,
            ToleranceWindow::new(0.01, 1.0, false),
        );
        let tree = GuideTree::node(
            "root",
            1.0,
            vec![
                GuideTree::leaf(0, "a"),
                GuideTree::leaf(1, "b"),
                GuideTree::leaf(2, "c"),
            ],
        );
        let mut aligner = ProgressiveAligner::new(&files, merger);
        let alignment = aligner.align(&tree).unwrap();
        assert_eq!(aligner.merge_count(), 2);
        assert_eq!(alignment.feature_count(), 6);
        // c proposes into the a+b list: the merged row, then c's leftover,
        // then the untouched a+b row
        let sizes: Vec<usize> = alignment.rows().iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![3, 1, 2]);
    }

    #[test]
    fn test_missing_run_is_an_error() {
        let files = runs();
        let scorer = Scorer::unweighted(&files);
        let merger = Merger::new(
            MatchingStrategy::Stable,
            &scorer,
            ToleranceWindow::new(0.01, 1.0, false),
        );
        let mut aligner = ProgressiveAligner::new(&files, merger);
        assert!(aligner.align(&GuideTree::leaf(7, "ghost")).is_err());
        assert!(aligner.align(&GuideTree::node("empty", 0.0, vec![])).is_err());
    }

    #[test]
    fn test_align_runs_end_to_end() {
        let files = runs();
        let config = AlignmentConfig {
            mass_tolerance: 0.01,
            rt_tolerance: 1.0,
            use_ppm: false,
            ..Default::default()
        };
        let outcome = align_runs(&files, &config, &JoinLibraryBuilder::default()).unwrap();
        assert_eq!(outcome.merges, 2);
        assert_eq!(outcome.tree.leaf_count(), 3);
        assert!(outcome.library_failures.is_empty());
        assert_eq!(outcome.alignment.feature_count(), 6);
        assert_eq!(outcome.alignment.len(), 3);
    }

    #[test]
    fn test_align_runs_rejects_bad_config() {
        let config = AlignmentConfig {
            top_k_friends: 0,
            ..Default::default()
        };
        assert!(align_runs(&runs(), &config, &JoinLibraryBuilder::default()).is_err());
        let builder = JoinLibraryBuilder::default();
        assert!(align_runs(&[], &AlignmentConfig::default(), &builder).is_err());
    }
}
