// Library exports for multialign
pub mod config;
pub mod driver;
pub mod feature;
pub mod feature_io;
pub mod guide_tree;
pub mod library;
pub mod matching;
pub mod ownership;
pub mod row;
pub mod scoring;
pub mod tolerance;

pub use config::AlignmentConfig;
pub use driver::{align_runs, AlignmentOutcome, ProgressiveAligner};
pub use feature::{AlignmentFile, Feature, FeatureKey};
pub use matching::{MatchingStrategy, Merger};
pub use row::{AlignmentList, AlignmentRow, ListId, RowKey};
pub use scoring::{Scorer, ScoringMode};
pub use tolerance::{MassTolerance, ToleranceWindow};
