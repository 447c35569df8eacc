use nalgebra::DMatrix;

use super::axis::Axis;
use crate::error::{Haa4bError, Result};

/// Dense 2D histogram: bin contents and per-bin uncertainties over fixed binning.
///
/// Matrices are indexed `(ix, iy)` with 0-based bins. Underflow and overflow are not kept.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Grid2D {
    pub x: Axis,
    pub y: Axis,
    pub contents: DMatrix<f64>,
    pub errors: DMatrix<f64>,
}

impl Grid2D {
    pub fn new(x: Axis, y: Axis) -> Self {
        let (nx, ny) = (x.bins(), y.bins());
        Self {
            x,
            y,
            contents: DMatrix::zeros(nx, ny),
            errors: DMatrix::zeros(nx, ny),
        }
    }

    // Create an empty grid with equal width bins on both axes
    pub fn uniform(bins: (usize, usize), range: ((f64, f64), (f64, f64))) -> Self {
        Self::new(Axis::uniform(bins.0, range.0), Axis::uniform(bins.1, range.1))
    }

    /// Build a grid from a closure returning `(content, error)` for every bin.
    pub fn from_fn<F>(x: Axis, y: Axis, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> (f64, f64),
    {
        let mut grid = Self::new(x, y);
        for ix in 0..grid.nx() {
            for iy in 0..grid.ny() {
                let (content, error) = f(ix, iy);
                grid.contents[(ix, iy)] = content;
                grid.errors[(ix, iy)] = error;
            }
        }
        grid
    }

    pub fn nx(&self) -> usize {
        self.contents.nrows()
    }

    pub fn ny(&self) -> usize {
        self.contents.ncols()
    }

    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[(ix, iy)]
    }

    pub fn error(&self, ix: usize, iy: usize) -> f64 {
        self.errors[(ix, iy)]
    }

    pub fn set_content(&mut self, ix: usize, iy: usize, value: f64) {
        self.contents[(ix, iy)] = value;
    }

    pub fn set_error(&mut self, ix: usize, iy: usize, value: f64) {
        self.errors[(ix, iy)] = value;
    }

    pub fn integral(&self) -> f64 {
        self.contents.sum()
    }

    /// Largest bin content (0 for an empty grid).
    pub fn maximum(&self) -> f64 {
        if self.contents.is_empty() {
            0.0
        } else {
            self.contents.max()
        }
    }

    pub fn sum_sq_errors(&self) -> f64 {
        self.errors.iter().map(|e| e * e).sum()
    }

    /// Zero contents and errors, keeping the binning.
    pub fn reset(&mut self) {
        self.contents.fill(0.0);
        self.errors.fill(0.0);
    }

    /// Empty grid with the same binning.
    pub fn empty_like(&self) -> Self {
        Self::new(self.x.clone(), self.y.clone())
    }

    pub fn same_binning(&self, other: &Grid2D) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// Fail with `BinningMismatch` unless both grids share bin counts and edges.
    pub fn check_binning(&self, other: &Grid2D, left: &str, right: &str) -> Result<()> {
        if self.same_binning(other) {
            Ok(())
        } else {
            log::error!(
                "{} is {}x{} spanning [{:.1}-{:.1}] x [{:.1}-{:.1}], {} is {}x{} spanning [{:.1}-{:.1}] x [{:.1}-{:.1}]",
                left,
                self.nx(),
                self.ny(),
                self.x.min(),
                self.x.max(),
                self.y.min(),
                self.y.max(),
                right,
                other.nx(),
                other.ny(),
                other.x.min(),
                other.x.max(),
                other.y.min(),
                other.y.max()
            );
            Err(Haa4bError::BinningMismatch {
                left: left.to_owned(),
                right: right.to_owned(),
            })
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.contents *= factor;
        self.errors *= factor.abs();
    }

    /// Scale so the integral matches `reference`. Returns the applied factor.
    pub fn scale_to(&mut self, reference: &Grid2D) -> f64 {
        let integral = self.integral();
        if integral == 0.0 {
            log::warn!("Cannot scale an empty grid to a reference yield");
            return 1.0;
        }
        let factor = reference.integral() / integral;
        log::info!(
            "Scaling by {:.3} to match reference ({:.1} to {:.1})",
            factor,
            integral,
            reference.integral()
        );
        self.scale(factor);
        factor
    }

    /// `self += c * other`, errors added in quadrature.
    pub fn add_scaled(&mut self, other: &Grid2D, c: f64) -> Result<()> {
        self.check_binning(other, "sum", "addend")?;
        self.contents += &other.contents * c;
        self.errors = self
            .errors
            .zip_map(&other.errors, |e1, e2| (e1 * e1 + c * c * e2 * e2).sqrt());
        Ok(())
    }

    /// Bin-wise ratio with uncorrelated error propagation. Bins with a zero denominator become 0.
    pub fn divide(&mut self, other: &Grid2D) -> Result<()> {
        self.check_binning(other, "numerator", "denominator")?;
        for ix in 0..self.nx() {
            for iy in 0..self.ny() {
                let (c1, e1) = (self.content(ix, iy), self.error(ix, iy));
                let (c2, e2) = (other.content(ix, iy), other.error(ix, iy));
                if c2 == 0.0 {
                    self.set_content(ix, iy, 0.0);
                    self.set_error(ix, iy, 0.0);
                    continue;
                }
                let c2_sq = c2 * c2;
                let error = ((e1 * e1 * c2_sq + e2 * e2 * c1 * c1) / (c2_sq * c2_sq)).sqrt();
                self.set_content(ix, iy, c1 / c2);
                self.set_error(ix, iy, error);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_3x2() -> Grid2D {
        Grid2D::from_fn(
            Axis::uniform(3, (0.0, 3.0)),
            Axis::uniform(2, (0.0, 2.0)),
            |ix, iy| ((ix + 3 * iy) as f64, 1.0),
        )
    }

    #[test]
    fn test_integral_and_maximum() {
        let grid = grid_3x2();
        assert_eq!(grid.nx(), 3);
        assert_eq!(grid.ny(), 2);
        assert!((grid.integral() - 15.0).abs() < 1e-12);
        assert!((grid.maximum() - 5.0).abs() < 1e-12);
        assert!((grid.sum_sq_errors() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_to_reference() {
        let mut grid = grid_3x2();
        let mut reference = grid_3x2();
        reference.scale(2.0);
        let factor = grid.scale_to(&reference);
        assert!((factor - 2.0).abs() < 1e-12);
        assert!((grid.integral() - 30.0).abs() < 1e-12);
        assert!((grid.error(0, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_scaled_errors_in_quadrature() {
        let mut grid = grid_3x2();
        let other = grid_3x2();
        grid.add_scaled(&other, -1.0).unwrap();
        assert!(grid.integral().abs() < 1e-12);
        assert!((grid.error(1, 1) - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_divide_handles_zero_denominator() {
        let mut numerator = grid_3x2();
        let denominator = grid_3x2();
        numerator.divide(&denominator).unwrap();
        assert_eq!(numerator.content(0, 0), 0.0);
        assert!((numerator.content(2, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_binning_is_an_error() {
        let mut grid = Grid2D::uniform((4, 4), ((0.0, 1.0), (0.0, 1.0)));
        let other = Grid2D::uniform((3, 3), ((0.0, 1.0), (0.0, 1.0)));
        assert!(matches!(grid.divide(&other), Err(Haa4bError::BinningMismatch { .. })));
        assert!(matches!(
            grid.add_scaled(&other, 1.0),
            Err(Haa4bError::BinningMismatch { .. })
        ));
    }

    #[test]
    fn test_check_binning() {
        let grid = grid_3x2();
        let other = Grid2D::uniform((3, 2), ((0.0, 3.0), (0.0, 2.5)));
        assert!(grid.check_binning(&grid.empty_like(), "a", "b").is_ok());
        assert!(matches!(
            grid.check_binning(&other, "a", "b"),
            Err(Haa4bError::BinningMismatch { .. })
        ));
    }
}
