use std::path::{Path, PathBuf};

use crate::config::{AnalysisConfig, ToyCategory, ToyConfig};
use crate::error::{Haa4bError, Result};
use crate::histoer::colormaps::{ColorMap, ColormapOptions};
use crate::histoer::grid::Grid2D;
use crate::histoer::rounding::round_bins;
use crate::histoer::smoothing::{KernelSmoother, regional_average, smooth_until_stable};
use crate::histoer::statistics::{get_eff_weight, reset_bin_errors};
use crate::histoer::toys::toys_generator;
use crate::naming::{Draw, GridId, NamedGrid, Region, Template};
use crate::storage::{FileMode, GridStore};
use crate::summary::plot::write_heatmap;

use super::cards::{CardRequest, CardTemplate, write_cards};

/// Which templates seed toys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
pub enum ToySource {
    #[value(name = "MC")]
    Mc,
    #[value(name = "Data")]
    Data,
    #[value(name = "DataAndMC")]
    DataAndMc,
    #[value(name = "None")]
    None,
}

impl ToySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToySource::Mc => "MC",
            ToySource::Data => "Data",
            ToySource::DataAndMc => "DataAndMC",
            ToySource::None => "None",
        }
    }

    pub fn mc_toys(&self) -> bool {
        matches!(self, ToySource::Mc | ToySource::DataAndMc)
    }

    pub fn data_toys(&self) -> bool {
        matches!(self, ToySource::Data | ToySource::DataAndMc)
    }
}

/// A pass/fail pair of templates.
#[derive(Debug, Clone)]
pub struct PassFail {
    pub pass: NamedGrid,
    pub fail: NamedGrid,
}

impl PassFail {
    fn new(id: &GridId, pass: Grid2D, fail: Grid2D) -> Self {
        Self {
            pass: NamedGrid::new(id.with_region(Region::Pass), pass),
            fail: NamedGrid::new(id.with_region(Region::Fail), fail),
        }
    }

    fn retemplated(&self, template: Template) -> (GridId, GridId) {
        (
            self.pass.id.with_template(template.clone()),
            self.fail.id.with_template(template),
        )
    }

    /// The pair, its rebinned versions, and pass/fail ratios at every granularity.
    pub fn with_variants(&self) -> Result<Vec<NamedGrid>> {
        self.pass
            .grid
            .check_binning(&self.fail.grid, &self.pass.key(), &self.fail.key())?;
        let mut grids = vec![self.pass.clone(), self.fail.clone()];
        for rebin in self.pass.grid.diagnostic_rebin_factors() {
            let pass = NamedGrid::new(self.pass.id.with_rebin(rebin), self.pass.grid.rebin2d(rebin, rebin));
            let fail = NamedGrid::new(self.fail.id.with_rebin(rebin), self.fail.grid.rebin2d(rebin, rebin));
            let mut ratio = pass.renamed(pass.id.with_region(Region::Ratio));
            ratio.grid.divide(&fail.grid)?;
            grids.extend([pass, fail, ratio]);
        }
        let mut ratio = self.pass.renamed(self.pass.id.with_region(Region::Ratio));
        ratio.grid.divide(&self.fail.grid)?;
        grids.push(ratio);
        Ok(grids)
    }
}

/// What one run of the toy pipeline produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToyRunSummary {
    pub category: String,
    pub source: ToySource,
    pub n_toys: usize,
    pub smooth_iterations: (usize, usize),
    pub data_yields: (f64, f64),
    pub rounded_yields: (f64, f64),
    pub data_mc_file: PathBuf,
    pub rounded_file: PathBuf,
    pub cards_written: usize,
}

struct ToyPipeline<'a> {
    config: &'a AnalysisConfig,
    store: &'a dyn GridStore,
    category: &'a str,
    toy_category: ToyCategory,
    plots_dir: PathBuf,
}

impl ToyPipeline<'_> {
    fn id(&self, template: Template, working_point: &str) -> GridId {
        GridId::new(
            self.category,
            template,
            &self.config.year,
            &self.config.mass_regression,
            working_point,
            Region::Pass,
        )
    }

    /// Pass and fail grids of `sample`, with the shape taken from the shape working point when
    /// one is configured for the sample.
    fn read_sample(&self, sample: &str) -> Result<PassFail> {
        let input_dir = self
            .config
            .raw_inputs
            .join(format!("2D_in_merged_{}", self.toy_category.super_category));
        let path = self.store.file_path(
            &input_dir,
            &format!("{}_{}_{}", self.toy_category.super_category, sample, self.config.year),
        );
        log::info!("Adding {}", path.display());

        let template = Template::from(sample);
        let id = self.id(template.clone(), &self.toy_category.working_point);
        let read = |id: &GridId| -> Result<Grid2D> { self.store.read_grid(&path, &id.to_string()) };
        let mut pair = PassFail::new(
            &id,
            read(&id.with_region(Region::Pass))?,
            read(&id.with_region(Region::Fail))?,
        );

        let takes_shape = template != Template::Data && !sample.contains("Htoaato4b");
        if takes_shape && let Some(shape_wp) = &self.toy_category.shape_working_point {
            for nominal in [&mut pair.pass, &mut pair.fail] {
                let shape_id = nominal.id.with_working_point(shape_wp);
                let mut shape = read(&shape_id)?;
                log::info!("Taking the shape of {} from {}", nominal.key(), shape_id);
                shape.scale_to(&nominal.grid);
                nominal.grid = shape;
            }
        }
        Ok(pair)
    }

    /// Data, and the sum of the backgrounds renamed to `MC`.
    fn read_inputs(&self) -> Result<(PassFail, PassFail)> {
        let data = self.read_sample("Data")?;
        let mut mc: Option<PassFail> = None;
        for background in &self.toy_category.backgrounds {
            let pair = self.read_sample(background)?;
            mc = Some(match mc.take() {
                None => {
                    let (pass_id, fail_id) = pair.retemplated(Template::Mc);
                    PassFail {
                        pass: pair.pass.renamed(pass_id),
                        fail: pair.fail.renamed(fail_id),
                    }
                }
                Some(mut sum) => {
                    for (total, add) in [(&mut sum.pass, &pair.pass), (&mut sum.fail, &pair.fail)] {
                        total.grid.check_binning(&add.grid, &total.key(), &add.key())?;
                        total.grid.add_scaled(&add.grid, 1.0)?;
                    }
                    sum
                }
            });
        }
        let mc = mc.ok_or_else(|| Haa4bError::NoBackgrounds(self.category.to_owned()))?;
        Ok((data, mc))
    }

    fn throw_toys(&self, source: &PassFail, n_toys: usize, seed_offset: u64) -> Result<(PassFail, PassFail)> {
        // pass and fail (and MC and data) toys get disjoint seed ranges
        let stride = n_toys as u64;
        let config = |k: u64| ToyConfig {
            seed: self
                .config
                .toys
                .seed
                .map(|seed| seed.wrapping_add(stride.wrapping_mul(seed_offset + k))),
            ..self.config.toys.clone()
        };
        let (avg_pass, var_pass) = toys_generator(
            &source.pass,
            n_toys,
            &self.plots_dir,
            FileMode::Recreate,
            self.store,
            &config(0),
        )?;
        let (avg_fail, var_fail) = toys_generator(
            &source.fail,
            n_toys,
            &self.plots_dir,
            FileMode::Update,
            self.store,
            &config(1),
        )?;
        Ok((
            PassFail {
                pass: avg_pass,
                fail: avg_fail,
            },
            PassFail {
                pass: var_pass,
                fail: var_fail,
            },
        ))
    }

    fn write_heatmaps(&self, grids: &[NamedGrid]) -> Result<()> {
        let dir = self.plots_dir.join("heatmaps");
        std::fs::create_dir_all(&dir)?;
        for named in grids {
            let (colormap, options) = match named.id.region {
                Region::Ratio => (
                    ColorMap::SmoothCoolWarm,
                    ColormapOptions {
                        log_norm: false,
                        reverse: false,
                    },
                ),
                _ => (ColorMap::Viridis, ColormapOptions::default()),
            };
            write_heatmap(&dir.join(format!("{}.png", named.key())), &named.grid, colormap, options)?;
        }
        log::info!("Wrote {} heat maps to {}", grids.len(), dir.display());
        Ok(())
    }

    fn card_requests(&self, source: ToySource, n_toys: usize) -> Vec<CardRequest> {
        let category = self.category;
        let mc_dir = self.config.mc_cards.join(category);
        let data_dir = self.config.data_cards.join(category);
        let card = |dir: &Path, suffix: &str, id: GridId| CardRequest {
            path: dir.join(format!("{}_Htoaato4b_{}.json", category, suffix)),
            alias: id.file_stem(),
        };
        let wp = &self.toy_category.working_point;

        let mut requests = vec![
            card(&mc_dir, "MCrounded", self.id(Template::McRounded, wp)),
            card(&data_dir, "Data", self.id(Template::Data, wp)),
        ];
        if source.mc_toys() {
            requests.extend((0..n_toys).map(|i| {
                card(
                    &mc_dir,
                    &format!("mctoy{}", i),
                    self.id(Template::McSmooth2, wp).with_draw(Draw::Toy(i)),
                )
            }));
        }
        if source.data_toys() {
            requests.extend((0..n_toys).map(|i| {
                card(
                    &data_dir,
                    &format!("datatoy{}", i),
                    self.id(Template::Data, wp).with_draw(Draw::Toy(i)),
                )
            }));
        }
        requests
    }
}

/// Build the smoothed and rounded background templates of `category`, throw toys from
/// `source`, and write the fit cards pointing at every pseudo-data variant.
pub fn run_category(
    config: &AnalysisConfig,
    store: &dyn GridStore,
    category: &str,
    n_toys: usize,
    source: ToySource,
) -> Result<ToyRunSummary> {
    let plots_dir = config.plots.join(category);
    if !plots_dir.is_dir() {
        return Err(Haa4bError::MissingDirectory(plots_dir));
    }
    if source != ToySource::None && n_toys == 0 {
        return Err(Haa4bError::InvalidToyCount);
    }
    let verbosity = config.toys.verbosity;
    let pipeline = ToyPipeline {
        config,
        store,
        category,
        toy_category: config.toy_category(category),
        plots_dir,
    };
    log::info!(
        "Running the toy pipeline for {} ({} toys from {})",
        category,
        n_toys,
        source.as_str()
    );
    // fail on a bad card template before any heavy lifting
    let card_template = CardTemplate::load(&config.card_templates, category)?;

    // 1. inputs, MC normalised to data with errors from the effective MC weight
    let (data, mut mc) = pipeline.read_inputs()?;
    data.pass.grid.check_binning(&data.fail.grid, &data.pass.key(), &data.fail.key())?;
    mc.pass.grid.scale_to(&data.pass.grid);
    mc.fail.grid.scale_to(&data.fail.grid);
    let eff_pass = get_eff_weight(&mc.pass.grid, verbosity);
    let eff_fail = get_eff_weight(&mc.fail.grid, verbosity);
    mc.pass.grid.check_binning(&mc.fail.grid, &mc.pass.key(), &mc.fail.key())?;
    for (named, eff_weight) in [(&mut mc.pass, eff_pass), (&mut mc.fail, eff_fail)] {
        let reference = named.grid.clone();
        reset_bin_errors(&mut named.grid, &reference, Some(eff_weight), verbosity)?;
    }

    let data_mc_file = store.file_path(
        &pipeline.plots_dir,
        &format!("{}_{}_{}toys_Data_MC", category, source.as_str(), n_toys),
    );
    store.write_named(&data_mc_file, &[&data.pass, &data.fail, &mc.pass, &mc.fail], FileMode::Recreate)?;

    // 2. smoothing
    let smoother = KernelSmoother::default();
    let (smooth1_pass_id, smooth1_fail_id) = mc.retemplated(Template::McSmooth1);
    let mut smooth1 = PassFail {
        pass: mc.pass.renamed(smooth1_pass_id),
        fail: mc.fail.renamed(smooth1_fail_id),
    };
    let mut iterations = vec![];
    for ((smoothed, unsmoothed), (reference, eff_weight)) in [
        ((&mut smooth1.pass, &mc.pass), (&data.pass, eff_pass)),
        ((&mut smooth1.fail, &mc.fail), (&data.fail, eff_fail)),
    ] {
        iterations.push(smooth_until_stable(
            &mut smoothed.grid,
            &unsmoothed.grid,
            &reference.grid,
            eff_weight,
            &smoother,
            &config.smoothing,
            verbosity,
        )?);
    }
    log::info!(
        "Smoothed {} {} times, {} {} times",
        smooth1.pass.key(),
        iterations[0],
        smooth1.fail.key(),
        iterations[1]
    );

    // 3. regional averaging of sparse bins
    let mut smooth2_pass = regional_average(&mut smooth1.pass.grid, &mc.pass.grid, eff_pass, verbosity)?;
    let mut smooth2_fail = regional_average(&mut smooth1.fail.grid, &mc.fail.grid, eff_fail, verbosity)?;
    smooth2_pass.scale_to(&data.pass.grid);
    smooth2_fail.scale_to(&data.fail.grid);
    let working_point = &pipeline.toy_category.working_point;
    let smooth2 = PassFail::new(
        &pipeline.id(Template::McSmooth2, working_point),
        smooth2_pass,
        smooth2_fail,
    );

    // 4. integer pseudo-data
    let mut rounded = PassFail::new(
        &pipeline.id(Template::McRounded, working_point),
        smooth2.pass.grid.empty_like(),
        smooth2.fail.grid.empty_like(),
    );
    for (source_grid, destination) in [(&smooth2.pass, &mut rounded.pass), (&smooth2.fail, &mut rounded.fail)] {
        let name = source_grid.key();
        round_bins(&name, &source_grid.grid, &mut destination.grid, verbosity)?;
    }

    // 5. toys
    let mut written = vec![smooth1, smooth2.clone(), rounded.clone()];
    if source.mc_toys() {
        let (avg, var) = pipeline.throw_toys(&smooth2, n_toys, 0)?;
        written.extend([avg, var]);
    }
    if source.data_toys() {
        let (avg, var) = pipeline.throw_toys(&data, n_toys, 2)?;
        written.extend([avg, var]);
    }

    // 6. outputs
    let rounded_file = store.file_path(&pipeline.plots_dir, &rounded.pass.id.file_stem());
    store.write_named(&rounded_file, &[&rounded.pass, &rounded.fail], FileMode::Recreate)?;

    let mut variants: Vec<NamedGrid> = vec![];
    for pair in &written {
        variants.extend(pair.with_variants()?);
    }
    let variant_refs: Vec<&NamedGrid> = variants.iter().collect();
    store.write_named(&data_mc_file, &variant_refs, FileMode::Update)?;
    log::info!("Wrote {} templates to {}", variants.len(), data_mc_file.display());

    if config.heatmaps {
        let mut maps = vec![data.pass.clone(), data.fail.clone(), mc.pass.clone(), mc.fail.clone()];
        maps.extend(variants.into_iter().filter(|named| named.id.rebin.is_none()));
        pipeline.write_heatmaps(&maps)?;
    }

    let cards_written = write_cards(&card_template, &pipeline.card_requests(source, n_toys))?;
    log::info!("Wrote {} fit cards for {}", cards_written, category);

    Ok(ToyRunSummary {
        category: category.to_owned(),
        source,
        n_toys,
        smooth_iterations: (iterations[0], iterations[1]),
        data_yields: (data.pass.grid.integral(), data.fail.grid.integral()),
        rounded_yields: (rounded.pass.grid.integral(), rounded.fail.grid.integral()),
        data_mc_file,
        rounded_file,
        cards_written,
    })
}
