//! Ownership table mapping each aligned feature to the row that holds it.
//!
//! A feature counts as aligned once a merge has placed it in a row; the
//! singleton rows built straight from a run do not claim anything.
use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::feature::FeatureKey;
use crate::row::{AlignmentRow, RowKey};

#[derive(Debug, Default, Clone)]
pub struct FeatureOwnership {
    owners: HashMap<FeatureKey, RowKey>,
}

impl FeatureOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aligned(&self, key: &FeatureKey) -> bool {
        self.owners.contains_key(key)
    }

    pub fn owner(&self, key: &FeatureKey) -> Option<RowKey> {
        self.owners.get(key).copied()
    }

    pub fn claim(&mut self, key: FeatureKey, row: RowKey) -> Option<RowKey> {
        self.owners.insert(key, row)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Hand every feature of `row` to it. Features may only move away from
    /// one of the `consumed` rows (the two rows being merged) or be unowned.
    pub fn transfer(&mut self, row: &AlignmentRow, consumed: &[RowKey]) -> Result<()> {
        for feature in row.features() {
            let key = feature.key();
            if let Some(previous) = self.owners.get(&key) {
                if *previous != row.key() && !consumed.contains(previous) {
                    bail!(
                        "feature {} is already owned by row {} and cannot join row {}",
                        key,
                        previous,
                        row.key()
                    );
                }
            }
            self.owners.insert(key, row.key());
        }
        Ok(())
    }
}
