use anyhow::{bail, Result};

use crate::matching::MatchingStrategy;
use crate::scoring::ScoringMode;
use crate::tolerance::ToleranceWindow;

/// Settings for one multi-run alignment
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentConfig {
    /// Mass tolerance, in ppm when `use_ppm` is set, absolute otherwise
    pub mass_tolerance: f64,
    /// RT tolerance; -1 disables the RT check
    pub rt_tolerance: f64,
    pub use_ppm: bool,
    pub strategy: MatchingStrategy,
    /// Widens the RT window used for the pairwise libraries
    pub rt_window_multiply: f64,
    pub scoring: ScoringMode,
    pub top_k_friends: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        AlignmentConfig {
            mass_tolerance: 10.0,
            rt_tolerance: 30.0,
            use_ppm: true,
            strategy: MatchingStrategy::Stable,
            rt_window_multiply: 1.0,
            scoring: ScoringMode::Unweighted,
            top_k_friends: 10,
        }
    }
}

impl AlignmentConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.mass_tolerance.is_finite() || self.mass_tolerance < 0.0 {
            bail!(
                "Mass tolerance must be a non-negative number, got {}",
                self.mass_tolerance
            );
        }
        if !self.rt_tolerance.is_finite()
            || (self.rt_tolerance < 0.0 && self.rt_tolerance != -1.0)
        {
            bail!(
                "RT tolerance must be non-negative or -1 to disable it, got {}",
                self.rt_tolerance
            );
        }
        if !self.rt_window_multiply.is_finite() || self.rt_window_multiply < 1.0 {
            bail!(
                "RT window multiplier must be at least 1.0, got {}",
                self.rt_window_multiply
            );
        }
        if self.top_k_friends == 0 {
            bail!("top-k friends must be at least 1");
        }
        Ok(())
    }

    /// Window used by the progressive merge
    pub fn window(&self) -> ToleranceWindow {
        ToleranceWindow::new(self.mass_tolerance, self.rt_tolerance, self.use_ppm)
    }

    /// Window used to build the pairwise libraries
    pub fn library_window(&self) -> ToleranceWindow {
        self.window().widen_rt(self.rt_window_multiply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::MassTolerance;

    #[test]
    fn test_defaults_are_valid() {
        let config = AlignmentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window().mass, MassTolerance::Ppm(10.0));
        assert_eq!(config.window().rt, Some(30.0));
    }

    #[test]
    fn test_validation() {
        let bad = [
            AlignmentConfig {
                mass_tolerance: -1.0,
                ..Default::default()
            },
            AlignmentConfig {
                rt_tolerance: -2.0,
                ..Default::default()
            },
            AlignmentConfig {
                rt_tolerance: f64::NAN,
                ..Default::default()
            },
            AlignmentConfig {
                rt_window_multiply: 0.5,
                ..Default::default()
            },
            AlignmentConfig {
                top_k_friends: 0,
                ..Default::default()
            },
        ];
        for config in &bad {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }

        let no_rt = AlignmentConfig {
            rt_tolerance: -1.0,
            ..Default::default()
        };
        no_rt.validate().unwrap();
        assert_eq!(no_rt.window().rt, None);
    }

    #[test]
    fn test_library_window_is_wider() {
        let config = AlignmentConfig {
            rt_window_multiply: 2.5,
            ..Default::default()
        };
        assert_eq!(config.window().rt, Some(30.0));
        assert_eq!(config.library_window().rt, Some(75.0));
        assert_eq!(config.library_window().mass, config.window().mass);
    }
}
