//! Density response curve: maps relative population density to a bite-rate
//! multiplier by clamped piecewise-linear interpolation over calibration
//! points.
//!
//! With no points configured the curve is neutral (1.0 everywhere), so the
//! model degenerates to density-independent transmission.

use crate::fixed::{Fixed64, saturating_div_64};

/// A single calibration point: relative density `x`, multiplier `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationPoint {
    pub x: Fixed64,
    pub y: Fixed64,
}

impl CalibrationPoint {
    pub fn new(x: Fixed64, y: Fixed64) -> Self {
        Self { x, y }
    }
}

/// Errors raised when configuring a [`DensityResponseCurve`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    /// Point `index` does not have a strictly larger x than its predecessor.
    #[error("calibration x values must be strictly increasing (point {index})")]
    NotStrictlyIncreasing { index: usize },
}

/// Clamped piecewise-linear lookup over calibration points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DensityResponseCurve {
    points: Vec<CalibrationPoint>,
}

impl DensityResponseCurve {
    /// Build a curve from points sorted by strictly increasing x.
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self, CurveError> {
        let mut curve = Self::default();
        curve.configure(points)?;
        Ok(curve)
    }

    /// Replace the calibration points. On error the previous points are kept.
    pub fn configure(&mut self, points: Vec<CalibrationPoint>) -> Result<(), CurveError> {
        if let Some(index) = points
            .windows(2)
            .position(|w| w[1].x <= w[0].x)
            .map(|i| i + 1)
        {
            return Err(CurveError::NotStrictlyIncreasing { index });
        }
        self.points = points;
        Ok(())
    }

    /// Evaluate the curve at `x`.
    pub fn lookup(&self, x: Fixed64) -> Fixed64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return Fixed64::ONE;
        };
        if x <= first.x {
            return first.y;
        }
        if x >= last.x {
            return last.y;
        }

        // x lies strictly inside (first.x, last.x), so a bracket exists.
        let upper = self.points.partition_point(|p| p.x < x);
        let p1 = self.points[upper];
        if p1.x == x {
            return p1.y;
        }
        let p0 = self.points[upper - 1];

        let t = saturating_div_64(x - p0.x, p1.x - p0.x);
        p0.y.saturating_add(t.saturating_mul(p1.y - p0.y))
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
