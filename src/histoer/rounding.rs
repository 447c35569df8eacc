use super::grid::Grid2D;
use crate::config::Verbosity;
use crate::error::{Haa4bError, Result};

/// Fill `destination` with an integer-valued copy of `source` whose integral stays close to the
/// source integral.
///
/// Bins are rounded individually first. The leftover (source - rounded) is then redistributed one
/// event at a time over blocks of `rebin x rebin` bins, with `rebin` growing from 2, until the
/// leftover is within 1% of the integral, smaller than 1.5 events, or `rebin` exceeds half the
/// grid. Each event goes to the bin at the leftover-weighted centroid of its block. Errors are
/// set to sqrt(content).
pub fn round_bins(
    name: &str,
    source: &Grid2D,
    destination: &mut Grid2D,
    verbosity: Verbosity,
) -> Result<()> {
    source.check_binning(destination, name, "rounded destination")?;
    let (nx, ny) = (source.nx(), source.ny());

    destination.contents = source.contents.map(|v| v.round_ties_even());
    let mut remainder = source.clone();
    remainder.contents -= &destination.contents;

    let integral = source.integral();
    if integral == 0.0 {
        set_poisson_errors(destination);
        return Ok(());
    }

    let mut rebin = 2;
    while (remainder.integral() / integral).abs() > 0.01
        && remainder.integral().abs() > 1.5
        && rebin <= nx / 2
        && rebin <= ny / 2
    {
        log::info!(
            "{} off by factor of {:.3} ({:.1} events), will rebin by {}",
            name,
            -remainder.integral() / integral,
            -remainder.integral(),
            rebin
        );

        for block_x in (0..nx).step_by(rebin) {
            for block_y in (0..ny).step_by(rebin) {
                let xs = block_x..(block_x + rebin).min(nx);
                let ys = block_y..(block_y + rebin).min(ny);

                let (mut yield_sum, mut weight, mut centre_x, mut centre_y) = (0.0, 0.0, 0.0, 0.0);
                for ix in xs.clone() {
                    for iy in ys.clone() {
                        let leftover = remainder.content(ix, iy);
                        yield_sum += leftover;
                        weight += 0.5 + leftover;
                        centre_x += (0.5 + leftover) * source.x.center(ix);
                        centre_y += (0.5 + leftover) * source.y.center(iy);
                    }
                }
                if yield_sum.abs() <= 0.5 {
                    continue;
                }

                let diff = if yield_sum > 0.0 { 1.0 } else { -1.0 };
                if weight <= 0.0 {
                    return Err(Haa4bError::NonPositiveWeight {
                        name: name.to_owned(),
                        block: (block_x / rebin, block_y / rebin),
                        rebin,
                        weight,
                    });
                }
                let mut target = (
                    source.x.find_bin_clamped(centre_x / weight),
                    source.y.find_bin_clamped(centre_y / weight),
                );

                // never take an event from an empty bin: use the closest filled bin of the block
                if diff < 0.0 && destination.content(target.0, target.1) == 0.0 {
                    let nearest = xs
                        .clone()
                        .flat_map(|ix| ys.clone().map(move |iy| (ix, iy)))
                        .filter(|&(ix, iy)| destination.content(ix, iy) > 0.0)
                        .min_by_key(|&(ix, iy)| {
                            ix.abs_diff(target.0).pow(2) + iy.abs_diff(target.1).pow(2)
                        });
                    if let Some(nearest) = nearest {
                        target = nearest;
                    }
                }
                if diff < 0.0 && destination.content(target.0, target.1) <= 0.0 {
                    continue;
                }

                if verbosity.verbose() {
                    log::info!(
                        "  * Changing bin {},{} by {} (block ({},{})x({},{}))",
                        target.0,
                        target.1,
                        diff,
                        xs.start,
                        xs.end - 1,
                        ys.start,
                        ys.end - 1
                    );
                }
                let (tx, ty) = target;
                destination.set_content(tx, ty, destination.content(tx, ty) + diff);
                remainder.set_content(tx, ty, remainder.content(tx, ty) - diff);
            }
        }
        rebin += 1;
    }

    set_poisson_errors(destination);
    Ok(())
}

fn set_poisson_errors(grid: &mut Grid2D) {
    grid.errors = grid.contents.map(|v| v.max(0.0).sqrt());
}
