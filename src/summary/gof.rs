use std::path::{Path, PathBuf};

use super::histogram1d::Histogram;
use super::limit_tree::{LimitTable, TABLE_EXTENSION};
use super::plot::{BLUE, HistogramPlot, RED};
use crate::config::SummaryConfig;
use crate::error::Result;

/// Goodness-of-fit result for one channel and a-mass.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct GofResult {
    pub channel: String,
    pub mass: String,
    /// Saturated test statistic of the fit to the nominal pseudo-data
    pub expected: f64,
    pub n_toys: u64,
    pub p_value: f64,
    pub plot: PathBuf,
}

pub fn expected_file(input_dir: &Path, channel: &str, mass: &str) -> PathBuf {
    input_dir.join(format!(
        "higgsCombine.goodnessOfFit.mA_{}.{}.GoodnessOfFit.mH125.{}",
        mass, channel, TABLE_EXTENSION
    ))
}

pub fn toys_file(input_dir: &Path, channel: &str, mass: &str) -> PathBuf {
    input_dir.join(format!(
        "higgsCombine.goodnessOfFit.mA_{}.{}.GoodnessOfFit.mH125.123456.{}",
        mass, channel, TABLE_EXTENSION
    ))
}

/// Histogram the toy statistics and compute the p-value of `expected` against them.
pub fn toy_distribution(
    channel: &str,
    mass: &str,
    expected: f64,
    toys: &[f64],
    config: &SummaryConfig,
) -> (Histogram, f64) {
    let mut histogram = Histogram::new(&format!("h_obs_{}_{}", channel, mass), config.bins, config.gof_range);
    for toy in toys {
        histogram.fill(*toy);
    }
    let p_value = histogram.tail_fraction(expected);
    (histogram, p_value)
}

fn read_table(path: &Path) -> Option<LimitTable> {
    match LimitTable::read(path) {
        Ok(table) => Some(table),
        Err(e) => {
            log::warn!("Could not open {}: {}", path.display(), e);
            None
        }
    }
}

fn summarise(channel: &str, mass: &str, config: &SummaryConfig) -> Result<Option<GofResult>> {
    let expected_path = expected_file(&config.gof_input, channel, mass);
    let Some(expected_table) = read_table(&expected_path) else {
        return Ok(None);
    };
    let expected = match expected_table.first_limit() {
        Ok(Some(expected)) => expected,
        Ok(None) => {
            log::warn!("'limit' table is empty in expected file: {}", expected_path.display());
            return Ok(None);
        }
        Err(e) => {
            log::warn!("No usable 'limit' column in {}: {}", expected_path.display(), e);
            return Ok(None);
        }
    };

    let toys_path = toys_file(&config.gof_input, channel, mass);
    let Some(toys_table) = read_table(&toys_path) else {
        return Ok(None);
    };
    let toys = match toys_table.limits() {
        Ok(toys) => toys,
        Err(e) => {
            log::warn!("No usable 'limit' column in {}: {}", toys_path.display(), e);
            return Ok(None);
        }
    };

    let (histogram, p_value) = toy_distribution(channel, mass, expected, &toys, config);
    let plot = config
        .gof_output
        .join(format!("GoodnessOfFit_distribution_{}_{}.png", channel, mass));
    HistogramPlot::new(&format!("Expected and Observed GoF, {} mA = {}", channel, mass), "chi2")
        .series(&histogram, "Observed (toys)", RED)
        .arrow(expected, "Expected (MC)", BLUE)
        .note(format!("p-value = {:.4}", p_value))
        .save(&plot)?;
    log::info!(
        "{} mA = {}: expected {:.2}, {} toys, p-value = {:.4}",
        channel,
        mass,
        expected,
        histogram.entries(),
        p_value
    );

    Ok(Some(GofResult {
        channel: channel.to_owned(),
        mass: mass.to_owned(),
        expected,
        n_toys: histogram.entries(),
        p_value,
        plot,
    }))
}

/// Goodness-of-fit plots and p-values for every channel and a-mass. Missing inputs are skipped.
pub fn run(config: &SummaryConfig) -> Result<Vec<GofResult>> {
    config.validate()?;
    std::fs::create_dir_all(&config.gof_output)?;
    let mut results = vec![];
    for channel in &config.channels {
        for mass in &config.a_masses {
            if let Some(result) = summarise(channel, mass, config)? {
                results.push(result);
            }
        }
    }

    let summary_path = config.gof_output.join("gof_summary.json");
    let writer = std::io::BufWriter::new(std::fs::File::create(&summary_path)?);
    serde_json::to_writer_pretty(writer, &results)?;
    log::info!("Wrote {} GoF results to {}", results.len(), summary_path.display());
    Ok(results)
}
