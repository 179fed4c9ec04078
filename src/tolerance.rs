//! Mass and retention-time tolerance windows used by every candidate search
//!
//! Bounds are strict on both axes: a value sitting exactly on the edge of
//! the window is outside it.

/// Mass tolerance, either relative to the reference mass or absolute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MassTolerance {
    /// Parts-per-million of the reference mass
    Ppm(f64),
    /// Absolute mass delta
    Absolute(f64),
}

impl MassTolerance {
    pub fn new(value: f64, use_ppm: bool) -> Self {
        if use_ppm {
            MassTolerance::Ppm(value)
        } else {
            MassTolerance::Absolute(value)
        }
    }

    /// Full width of the window around `mass`
    pub fn delta(&self, mass: f64) -> f64 {
        match *self {
            MassTolerance::Ppm(ppm) => ppm * mass * 1e-6,
            MassTolerance::Absolute(delta) => delta,
        }
    }
}

/// A mass window plus an optional RT window (`None` ignores RT)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceWindow {
    pub mass: MassTolerance,
    pub rt: Option<f64>,
}

impl ToleranceWindow {
    /// Build from raw settings. Any negative RT tolerance (conventionally -1)
    /// disables the RT check.
    pub fn new(mass_tolerance: f64, rt_tolerance: f64, use_ppm: bool) -> Self {
        ToleranceWindow {
            mass: MassTolerance::new(mass_tolerance, use_ppm),
            rt: if rt_tolerance < 0.0 {
                None
            } else {
                Some(rt_tolerance)
            },
        }
    }

    /// Same mass window with the RT window scaled by `factor`
    pub fn widen_rt(&self, factor: f64) -> Self {
        ToleranceWindow {
            mass: self.mass,
            rt: self.rt.map(|rt| rt * factor),
        }
    }

    pub fn mass_bounds(&self, ref_mass: f64) -> (f64, f64) {
        let half = self.mass.delta(ref_mass) / 2.0;
        (ref_mass - half, ref_mass + half)
    }

    pub fn rt_bounds(&self, ref_rt: f64) -> Option<(f64, f64)> {
        self.rt.map(|rt| (ref_rt - rt / 2.0, ref_rt + rt / 2.0))
    }

    /// True when `(mass, rt)` lies strictly inside the window centred on
    /// `(ref_mass, ref_rt)`
    pub fn contains(&self, ref_mass: f64, ref_rt: f64, mass: f64, rt: f64) -> bool {
        let (lower, upper) = self.mass_bounds(ref_mass);
        if !in_range(mass, lower, upper) {
            return false;
        }
        match self.rt_bounds(ref_rt) {
            Some((lower, upper)) => in_range(rt, lower, upper),
            None => true,
        }
    }
}

#[inline]
fn in_range(value: f64, lower: f64, upper: f64) -> bool {
    value > lower && value < upper
}
