use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};

use super::grid::Grid2D;
use crate::config::ToyConfig;
use crate::error::{Haa4bError, Result};
use crate::naming::{Draw, NamedGrid};
use crate::storage::{FileMode, GridStore};

/// Poisson-fluctuate every bin of `expected`. Errors are sqrt(drawn value).
///
/// Non-positive or non-finite expectations always draw 0.
pub fn poisson_draw(expected: &Grid2D, seed: u64) -> Grid2D {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut toy = expected.empty_like();
    for ix in 0..expected.nx() {
        for iy in 0..expected.ny() {
            let lambda = expected.content(ix, iy);
            let drawn = if lambda.is_finite() && lambda > 0.0 {
                match Poisson::new(lambda) {
                    Ok(poisson) => poisson.sample(&mut rng),
                    Err(_) => 0.0,
                }
            } else {
                0.0
            };
            toy.set_content(ix, iy, drawn);
            toy.set_error(ix, iy, drawn.sqrt());
        }
    }
    toy
}

/// Throw `n_toys` Poisson toys from `source`, writing toy `i` to its own file in `output_dir`.
///
/// Returns the toy mean (errors set to the toy standard deviation) and the toy variance, named
/// with [`Draw::ToyAvg`] and [`Draw::ToyVarSq`]. Only smoothed MC and data may seed toys.
pub fn toys_generator(
    source: &NamedGrid,
    n_toys: usize,
    output_dir: &Path,
    mode: FileMode,
    store: &dyn GridStore,
    config: &ToyConfig,
) -> Result<(NamedGrid, NamedGrid)> {
    if !source.id.template().allows_toys() {
        log::error!("Why are you throwing toys from non-smoothed MC?!? ({})", source.key());
        return Err(Haa4bError::NonSmoothedToySource(source.key()));
    }
    if n_toys == 0 {
        return Err(Haa4bError::InvalidToyCount);
    }

    let seed = config.seed.unwrap_or_else(rand::random::<u64>);
    let single_pass = config.accumulation.single_pass(n_toys);
    log::info!(
        "Throwing {} toys from {} (seed {}, {} variance)",
        n_toys,
        source.key(),
        seed,
        if single_pass { "single-pass" } else { "two-pass" }
    );

    let toy_ids: Vec<_> = (0..n_toys).map(|i| source.id.with_draw(Draw::Toy(i))).collect();

    let progress = ProgressBar::new(n_toys as u64);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} toys {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    progress.set_message(source.id.region.as_str());

    let mut sum = source.grid.empty_like();
    let mut sum_sq = source.grid.empty_like();
    for (i, toy_id) in toy_ids.iter().enumerate() {
        let toy = NamedGrid::new(toy_id.clone(), poisson_draw(&source.grid, seed.wrapping_add(i as u64)));
        let path = store.file_path(output_dir, &toy_id.file_stem());
        if i == 0 {
            log::info!("Writing toy #0 to {}", path.display());
        }
        store.write_named(&path, &[&toy], mode)?;

        sum.contents += &toy.grid.contents;
        if single_pass {
            sum_sq.contents += toy.grid.contents.component_mul(&toy.grid.contents);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let n = n_toys as f64;
    let mut mean = sum;
    mean.contents /= n;

    let mut variance = mean.empty_like();
    if single_pass {
        variance.contents = (sum_sq.contents / n - mean.contents.component_mul(&mean.contents))
            .map(|v| v.max(0.0));
    } else {
        for toy_id in &toy_ids {
            let path = store.file_path(output_dir, &toy_id.file_stem());
            let toy = store.read_grid(&path, &toy_id.to_string())?;
            let diff = toy.contents - &mean.contents;
            variance.contents += diff.component_mul(&diff);
        }
        variance.contents /= n;
    }
    mean.errors = variance.contents.map(f64::sqrt);

    Ok((
        NamedGrid::new(source.id.with_draw(Draw::ToyAvg(n_toys)), mean),
        NamedGrid::new(source.id.with_draw(Draw::ToyVarSq(n_toys)), variance),
    ))
}
