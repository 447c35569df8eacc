use nalgebra::DMatrix;

use super::grid::Grid2D;
use super::statistics::{compute_avg_occ_and_err, compute_max_pull, neighbourhood, reset_bin_errors};
use crate::config::{SmoothingConfig, Verbosity};
use crate::error::Result;

/// One smoothing pass over a grid.
pub trait Smoother {
    fn smooth(&self, grid: &mut Grid2D);
}

/// Convolution with a normalised kernel, using only neighbours inside the grid.
///
/// Every bin is recomputed from the unmodified input, so the result does not depend on the scan
/// order. Errors are propagated as sqrt(sum k^2 e^2) / sum k.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSmoother {
    kernel: DMatrix<f64>,
}

impl KernelSmoother {
    /// Kernel with an odd number of rows and columns, centred on the middle element.
    pub fn new(kernel: DMatrix<f64>) -> Self {
        Self { kernel }
    }
}

impl Default for KernelSmoother {
    // 5x5 "k5a" kernel
    fn default() -> Self {
        Self::new(DMatrix::from_row_slice(
            5,
            5,
            &[
                0.0, 0.0, 1.0, 0.0, 0.0, //
                0.0, 2.0, 2.0, 2.0, 0.0, //
                1.0, 2.0, 5.0, 2.0, 1.0, //
                0.0, 2.0, 2.0, 2.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, 0.0,
            ],
        ))
    }
}

impl Smoother for KernelSmoother {
    fn smooth(&self, grid: &mut Grid2D) {
        let contents = grid.contents.clone();
        let errors = grid.errors.clone();
        let (nx, ny) = (grid.nx() as isize, grid.ny() as isize);
        let half_x = (self.kernel.nrows() / 2) as isize;
        let half_y = (self.kernel.ncols() / 2) as isize;

        for ix in 0..nx {
            for iy in 0..ny {
                let (mut sum, mut sum_err_sq, mut norm) = (0.0, 0.0, 0.0);
                for kx in 0..self.kernel.nrows() {
                    for ky in 0..self.kernel.ncols() {
                        let k = self.kernel[(kx, ky)];
                        if k == 0.0 {
                            continue;
                        }
                        let jx = ix + kx as isize - half_x;
                        let jy = iy + ky as isize - half_y;
                        if jx < 0 || jx >= nx || jy < 0 || jy >= ny {
                            continue;
                        }
                        let (jx, jy) = (jx as usize, jy as usize);
                        sum += k * contents[(jx, jy)];
                        sum_err_sq += k * k * errors[(jx, jy)].powi(2);
                        norm += k;
                    }
                }
                if norm > 0.0 {
                    grid.set_content(ix as usize, iy as usize, sum / norm);
                    grid.set_error(ix as usize, iy as usize, sum_err_sq.sqrt() / norm);
                }
            }
        }
    }
}

/// Smooth `grid` until no bin fluctuates by more than `config.max_pull` standard deviations
/// from its neighbours at any of `config.radii`, at most `config.max_iterations` times.
///
/// After every pass the errors are reset against the `unsmoothed` grid. The result is scaled to
/// the `reference` yield. Returns the number of passes.
pub fn smooth_until_stable(
    grid: &mut Grid2D,
    unsmoothed: &Grid2D,
    reference: &Grid2D,
    eff_weight: f64,
    smoother: &impl Smoother,
    config: &SmoothingConfig,
    verbosity: Verbosity,
) -> Result<usize> {
    let mut iterations = 0;
    while iterations < config.max_iterations
        && config
            .radii
            .iter()
            .any(|&d_bin| compute_max_pull(grid, d_bin, Some(eff_weight), verbosity).pull > config.max_pull)
    {
        smoother.smooth(grid);
        reset_bin_errors(grid, unsmoothed, Some(eff_weight), verbosity)?;
        iterations += 1;
    }
    grid.scale_to(reference);
    Ok(iterations)
}

/// Expected content and error of bin `(ix, iy)`.
///
/// Bins whose error exceeds their content are replaced by the distance-weighted average of a
/// growing neighbourhood (radius up to 4, at most 25 bins) until the average is significant.
pub fn get_bin_expectation(
    grid: &Grid2D,
    ix: usize,
    iy: usize,
    eff_weight: f64,
    verbosity: Verbosity,
) -> (f64, f64) {
    let (mut value, mut error) = (grid.content(ix, iy), grid.error(ix, iy));
    if value > error {
        return (value, error);
    }
    let report = verbosity.verbose() && (verbosity.very_verbose() || value > eff_weight);
    if report && error > value {
        log::info!(
            "get_bin_expectation: bin {},{} = {:.3} +/- {:.3}",
            ix,
            iy,
            value,
            error
        );
    }

    let (mut d_bin, mut area) = (0, 1);
    while error > value && area < 25 && d_bin < 4 {
        d_bin += 1;
        let (x_lo, x_hi, y_lo, y_hi) = neighbourhood(grid, d_bin, ix, iy);
        area = (x_hi - x_lo + 1) * (y_hi - y_lo + 1);
        (value, error) = compute_avg_occ_and_err(grid, d_bin, ix, iy, true, true);
        if report {
            log::info!("  - Avg {} bins, now {:.3} +/- {:.3}", area, value, error);
        }
    }
    (value, error)
}

/// Regional averaging of sparse bins in a smoothed grid.
///
/// Bins are visited in order (x outer, y inner). Each one first has a negative content clamped to
/// zero and its error set from the per-bin weight of the `unsmoothed` grid (never below
/// `eff_weight`), then its expectation is taken from `smoothed` as it stands at that point, so
/// bins later in the scan still carry their smoothed contents and errors. The returned grid holds
/// the expectations.
pub fn regional_average(
    smoothed: &mut Grid2D,
    unsmoothed: &Grid2D,
    eff_weight: f64,
    verbosity: Verbosity,
) -> Result<Grid2D> {
    smoothed.check_binning(unsmoothed, "smoothed", "unsmoothed")?;

    let mut averaged = smoothed.empty_like();
    for ix in 0..smoothed.nx() {
        for iy in 0..smoothed.ny() {
            if smoothed.content(ix, iy) < 0.0 {
                smoothed.set_content(ix, iy, 0.0);
            }
            let bin_weight = (unsmoothed.error(ix, iy).powi(2)
                / eff_weight.max(unsmoothed.content(ix, iy)))
            .max(eff_weight);
            let error = (smoothed.content(ix, iy) / bin_weight).max(1.0).sqrt() * bin_weight;
            smoothed.set_error(ix, iy, error);

            let (value, error) = get_bin_expectation(smoothed, ix, iy, eff_weight, verbosity);
            averaged.set_content(ix, iy, value);
            averaged.set_error(ix, iy, error);
        }
    }
    Ok(averaged)
}
