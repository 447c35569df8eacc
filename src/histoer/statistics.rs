use rayon::prelude::*;

use super::grid::Grid2D;
use crate::config::Verbosity;
use crate::error::Result;

/// Effective per-event weight: sum of squared bin errors over the (floored at 1) integral.
///
/// A proxy for the weight of one simulated event populating the grid.
pub fn get_eff_weight(grid: &Grid2D, verbosity: Verbosity) -> f64 {
    let sum_sq_errors = grid.sum_sq_errors();
    let eff_weight = sum_sq_errors / grid.integral().max(1.0);
    if verbosity.verbose() {
        log::info!(
            "get_eff_weight: {}x{} grid has integral {:.1}, sum err^2 = {:.1}, effective weight {:.3}",
            grid.nx(),
            grid.ny(),
            grid.integral(),
            sum_sq_errors,
            eff_weight
        );
    }
    eff_weight
}

/// Raise per-bin errors to at least sqrt(N)*w, where N = content / w is the effective MC statistics
/// (floored at 1). The estimate from `reference` is scaled by the ratio of contents.
///
/// `eff_weight` is computed from `reference` when absent or zero. Errors never decrease.
pub fn reset_bin_errors(
    grid: &mut Grid2D,
    reference: &Grid2D,
    eff_weight: Option<f64>,
    verbosity: Verbosity,
) -> Result<()> {
    grid.check_binning(reference, "grid", "reference")?;
    let eff_weight = match eff_weight {
        Some(w) if w != 0.0 => w,
        _ => get_eff_weight(reference, verbosity),
    };

    for ix in 0..grid.nx() {
        for iy in 0..grid.ny() {
            let value = grid.content(ix, iy);
            let value_ref = reference.content(ix, iy);
            let error = grid.error(ix, iy);

            let error_est = (value / eff_weight).max(1.0).sqrt() * eff_weight;
            let error_ref_est = (value_ref / eff_weight).max(1.0).sqrt() * eff_weight;
            let scale = value.max(eff_weight) / value_ref.max(eff_weight);
            let new_error = error.max(error_est.max(error_ref_est * scale));
            grid.set_error(ix, iy, new_error);

            if verbosity.debug() && error_est > error * 1.5 && value > eff_weight {
                log::debug!(
                    "bin {},{} = {:.3} +/- {:.3}, but effective weight {:.3}; setting error to {:.3}",
                    ix,
                    iy,
                    value,
                    error,
                    eff_weight,
                    new_error
                );
            }
        }
    }
    Ok(())
}

/// Bounds of the square neighbourhood of radius `d_bin` around `(ix, iy)`, clipped to the grid.
/// Returns inclusive `(x_lo, x_hi, y_lo, y_hi)`.
pub fn neighbourhood(grid: &Grid2D, d_bin: usize, ix: usize, iy: usize) -> (usize, usize, usize, usize) {
    (
        ix.saturating_sub(d_bin),
        (ix + d_bin).min(grid.nx() - 1),
        iy.saturating_sub(d_bin),
        (iy + d_bin).min(grid.ny() - 1),
    )
}

fn distance_sq(ix: usize, iy: usize, jx: usize, jy: usize, dist_wgt: bool) -> f64 {
    if !dist_wgt {
        return 1.0;
    }
    let dx = ix as f64 - jx as f64;
    let dy = iy as f64 - jy as f64;
    (dx * dx + dy * dy).max(0.5)
}

/// Distance-weighted average content and propagated error of the bins around `(ix, iy)`.
///
/// With `dist_wgt` each bin is weighted by 1/d^2 (d^2 floored at 0.5), otherwise uniformly.
/// The centre bin is only used with `incl_bin`. An empty neighbourhood gives `(0, 0)`.
pub fn compute_avg_occ_and_err(
    grid: &Grid2D,
    d_bin: usize,
    ix: usize,
    iy: usize,
    incl_bin: bool,
    dist_wgt: bool,
) -> (f64, f64) {
    let (x_lo, x_hi, y_lo, y_hi) = neighbourhood(grid, d_bin, ix, iy);
    let (mut sum_occ, mut sum_err, mut sum_area) = (0.0, 0.0, 0.0);
    for jx in x_lo..=x_hi {
        for jy in y_lo..=y_hi {
            if jx == ix && jy == iy && !incl_bin {
                continue;
            }
            let dist_sq = distance_sq(ix, iy, jx, jy, dist_wgt);
            sum_area += 1.0 / dist_sq;
            sum_occ += grid.content(jx, jy) / dist_sq;
            sum_err += grid.error(jx, jy).powi(2) / dist_sq;
        }
    }

    if sum_area == 0.0 {
        return (0.0, 0.0);
    }
    (sum_occ / sum_area, sum_err.sqrt() / sum_area)
}

/// Distance-weighted RMS deviation of the bins around `(ix, iy)` from `avg`.
pub fn compute_avg_diff(
    grid: &Grid2D,
    d_bin: usize,
    ix: usize,
    iy: usize,
    incl_bin: bool,
    dist_wgt: bool,
    avg: f64,
) -> f64 {
    let (x_lo, x_hi, y_lo, y_hi) = neighbourhood(grid, d_bin, ix, iy);
    let (mut sum_sq_diff, mut sum_area) = (0.0, 0.0);
    for jx in x_lo..=x_hi {
        for jy in y_lo..=y_hi {
            if jx == ix && jy == iy && !incl_bin {
                continue;
            }
            let dist_sq = distance_sq(ix, iy, jx, jy, dist_wgt);
            sum_area += 1.0 / dist_sq;
            sum_sq_diff += (grid.content(jx, jy) - avg).powi(2) / dist_sq;
        }
    }

    if sum_area == 0.0 {
        return 0.0;
    }
    (sum_sq_diff / sum_area).sqrt()
}

/// Largest bin pull found by [`compute_max_pull`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaxPull {
    pub pull: f64,
    pub ix: usize,
    pub iy: usize,
    pub avg: f64,
    pub area: usize,
}

/// Maximum |pull| of any bin w.r.t. its neighbours within `d_bin`.
///
/// The local average excludes the bin itself and is floored at one effective event spread over
/// the neighbourhood; sigma is floored at 10% of sqrt(grid maximum). Bins within one cell of a
/// corner are not smoothed and are skipped.
pub fn compute_max_pull(
    grid: &Grid2D,
    d_bin: usize,
    eff_weight: Option<f64>,
    verbosity: Verbosity,
) -> MaxPull {
    let (nx, ny) = (grid.nx(), grid.ny());
    let eff_weight = match eff_weight {
        Some(w) if w != 0.0 => w,
        _ => get_eff_weight(grid, verbosity),
    };
    let min_sigma = 0.1 * grid.maximum().max(0.0).sqrt();
    let min_avg = eff_weight / ((1 + 2 * d_bin) as f64).powi(2);

    let max_pull = (0..nx * ny)
        .into_par_iter()
        .filter_map(|index| {
            let (ix, iy) = (index / ny, index % ny);
            if ix.min(nx - 1 - ix) + iy.min(ny - 1 - iy) <= 1 {
                return None;
            }
            let avg = compute_avg_occ_and_err(grid, d_bin, ix, iy, false, true)
                .0
                .max(min_avg);
            let sigma = compute_avg_diff(grid, d_bin, ix, iy, false, true, avg).max(min_sigma);
            if sigma <= 0.0 {
                return None;
            }
            let pull = ((grid.content(ix, iy) - avg) / sigma).abs();
            let (x_lo, x_hi, y_lo, y_hi) = neighbourhood(grid, d_bin, ix, iy);
            Some(MaxPull {
                pull,
                ix,
                iy,
                avg,
                area: (x_hi - x_lo + 1) * (y_hi - y_lo + 1),
            })
        })
        // ties keep the lowest bin index so the result does not depend on scheduling
        .reduce(MaxPull::default, |a, b| {
            if b.pull > a.pull || (b.pull == a.pull && (b.ix, b.iy) < (a.ix, a.iy)) {
                b
            } else {
                a
            }
        });

    if verbosity.verbose() {
        log::info!(
            "compute_max_pull: bin {},{} has yield {:.3} vs. {:.3} avg from {} nearby bins (pull = {:.1})",
            max_pull.ix,
            max_pull.iy,
            if nx > 0 && ny > 0 { grid.content(max_pull.ix, max_pull.iy) } else { 0.0 },
            max_pull.avg,
            max_pull.area,
            max_pull.pull
        );
    }
    if verbosity.very_verbose() && max_pull.pull > 0.0 {
        let (x_lo, x_hi, y_lo, y_hi) = neighbourhood(grid, d_bin, max_pull.ix, max_pull.iy);
        for jx in x_lo..=x_hi {
            for jy in y_lo..=y_hi {
                log::debug!(
                    "  - {},{} = {:.4}+/-{:.4}",
                    jx,
                    jy,
                    grid.content(jx, jy),
                    grid.error(jx, jy)
                );
            }
        }
    }

    max_pull
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histoer::axis::Axis;

    fn square(n: usize, f: impl FnMut(usize, usize) -> (f64, f64)) -> Grid2D {
        Grid2D::from_fn(Axis::uniform(n, (0.0, n as f64)), Axis::uniform(n, (0.0, n as f64)), f)
    }

    #[test]
    fn test_eff_weight_diagonal_grid_without_errors() {
        let grid = square(2, |ix, iy| (if ix == iy { 10.0 } else { 0.0 }, 0.0));
        assert_eq!(get_eff_weight(&grid, Verbosity::Quiet), 0.0);
    }

    #[test]
    fn test_eff_weight_invariant_under_more_events() {
        // weight 0.5 per event: content = 0.5 N, error^2 = 0.25 N
        let small = square(4, |ix, iy| {
            let n = (10 + ix + 3 * iy) as f64;
            (0.5 * n, (0.25 * n).sqrt())
        });
        let large = square(4, |ix, iy| {
            let n = 7.0 * (10 + ix + 3 * iy) as f64;
            (0.5 * n, (0.25 * n).sqrt())
        });
        let w_small = get_eff_weight(&small, Verbosity::Quiet);
        let w_large = get_eff_weight(&large, Verbosity::Quiet);
        assert!(w_small >= 0.0);
        assert!((w_small - 0.5).abs() < 1e-9);
        assert!((w_small - w_large).abs() < 1e-9);
    }

    #[test]
    fn test_reset_bin_errors_never_decreases() {
        let reference = square(5, |ix, iy| ((ix * iy) as f64 * 0.7, 0.3 + 0.1 * ix as f64));
        let mut grid = square(5, |ix, iy| ((ix + iy) as f64, if ix == 2 { 50.0 } else { 0.01 }));
        let before = grid.errors.clone();
        reset_bin_errors(&mut grid, &reference, None, Verbosity::Quiet).unwrap();
        for (after, before) in grid.errors.iter().zip(before.iter()) {
            assert!(after >= before);
        }
        // a large existing error is kept
        assert_eq!(grid.error(2, 3), 50.0);
    }

    #[test]
    fn test_reset_bin_errors_floor() {
        let reference = square(3, |_, _| (4.0, 0.0));
        let mut grid = reference.clone();
        reset_bin_errors(&mut grid, &reference, Some(1.0), Verbosity::Quiet).unwrap();
        // sqrt(4 / 1) * 1
        assert!((grid.error(1, 1) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_reset_bin_errors_binning_mismatch() {
        let reference = square(3, |_, _| (1.0, 1.0));
        let mut grid = square(4, |_, _| (1.0, 1.0));
        assert!(reset_bin_errors(&mut grid, &reference, Some(1.0), Verbosity::Quiet).is_err());
    }

    #[test]
    fn test_avg_occ_and_err_unweighted() {
        let grid = square(5, |_, _| (1.0, 1.0));
        let (avg, err) = compute_avg_occ_and_err(&grid, 1, 2, 2, false, false);
        assert!((avg - 1.0).abs() < 1e-12);
        assert!((err - 8.0_f64.sqrt() / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_avg_occ_and_err_distance_weighted() {
        let grid = square(5, |_, _| (1.0, 1.0));
        let (avg, err) = compute_avg_occ_and_err(&grid, 1, 2, 2, false, true);
        // 4 neighbours at d^2 = 1 and 4 at d^2 = 2
        assert!((avg - 1.0).abs() < 1e-12);
        assert!((err - 6.0_f64.sqrt() / 6.0).abs() < 1e-12);

        // including the centre bin, d^2 floored at 0.5
        let (avg, _) = compute_avg_occ_and_err(&grid, 1, 2, 2, true, true);
        assert!((avg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_avg_occ_clipped_at_corner() {
        let grid = square(5, |ix, iy| ((ix + iy) as f64, 0.0));
        let (avg, _) = compute_avg_occ_and_err(&grid, 1, 0, 0, false, false);
        // neighbours (0,1), (1,0), (1,1)
        assert!((avg - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_avg_diff() {
        let grid = square(3, |ix, _| (ix as f64, 0.0));
        let diff = compute_avg_diff(&grid, 1, 1, 1, true, false, 1.0);
        // 3 bins at 0, 3 at 1, 3 at 2 -> mean squared deviation 6/9
        assert!((diff - (6.0_f64 / 9.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_max_pull_flat_grid() {
        let grid = square(8, |_, _| (25.0, 5.0));
        let max_pull = compute_max_pull(&grid, 1, None, Verbosity::Quiet);
        assert_eq!(max_pull.pull, 0.0);
    }

    #[test]
    fn test_max_pull_finds_spike() {
        let grid = square(9, |ix, iy| (if (ix, iy) == (4, 5) { 200.0 } else { 20.0 }, 4.0));
        let max_pull = compute_max_pull(&grid, 1, Some(1.0), Verbosity::Quiet);
        assert_eq!((max_pull.ix, max_pull.iy), (4, 5));
        assert_eq!(max_pull.area, 9);
        assert!(max_pull.pull > 3.0);
    }

    #[test]
    fn test_max_pull_skips_corners() {
        // only the corner bin fluctuates, which the pull scan ignores
        let grid = square(6, |ix, iy| (if (ix, iy) == (0, 0) { 500.0 } else { 10.0 }, 1.0));
        let max_pull = compute_max_pull(&grid, 1, Some(1.0), Verbosity::Quiet);
        assert!((max_pull.ix, max_pull.iy) != (0, 0));
    }
}
