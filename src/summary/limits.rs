use std::path::{Path, PathBuf};

use regex::Regex;

use super::histogram1d::Histogram;
use super::limit_tree::{LimitTable, TABLE_EXTENSION};
use super::plot::{BLUE, HistogramPlot, RED};
use crate::config::SummaryConfig;
use crate::error::Result;

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct LimitStatistics {
    pub count: u64,
    pub mean: f64,
    pub stdev: f64,
}

impl LimitStatistics {
    fn of(histogram: &Histogram) -> Self {
        let (count, mean, stdev) = histogram.get_statistics();
        Self { count, mean, stdev }
    }
}

/// Toy limit distributions for one channel and a-mass.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct LimitResult {
    pub channel: String,
    pub mass: String,
    pub n_files: usize,
    pub expected: LimitStatistics,
    pub observed: LimitStatistics,
    pub plot: PathBuf,
}

/// Matches the per-toy asymptotic limit files of one channel and a-mass.
pub fn toy_file_pattern(channel: &str, mass: &str) -> Result<Regex> {
    let pattern = format!(
        r"^higgsCombine\.testAsymptoticLimits\.mA_{}\.{}\.toy.*\.AsymptoticLimits\.mH120\.{}$",
        regex::escape(mass),
        regex::escape(channel),
        regex::escape(TABLE_EXTENSION)
    );
    Ok(Regex::new(&pattern)?)
}

/// Sorted paths in `dir` whose file name matches `pattern`. A missing directory gives none.
pub fn matching_files(dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not list {}: {}", dir.display(), e);
            return vec![];
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.is_match(name))
        })
        .collect();
    files.sort();
    files
}

/// Fill expected and observed limit histograms from `files`. Unreadable or malformed files are
/// skipped.
pub fn limit_distributions(
    channel: &str,
    mass: &str,
    files: &[PathBuf],
    limit_max: f64,
    bins: usize,
) -> (Histogram, Histogram) {
    let mut expected = Histogram::new(&format!("h_exp_{}_{}", channel, mass), bins, (0.0, limit_max));
    let mut observed = Histogram::new(&format!("h_obs_{}_{}", channel, mass), bins, (0.0, limit_max));

    for file in files {
        let table = match LimitTable::read(file) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("Skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let limits = (table.expected_limits(), table.observed_limits());
        let (expected_limits, observed_limits) = match limits {
            (Ok(expected_limits), Ok(observed_limits)) => (expected_limits, observed_limits),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Skipping {}: {}", file.display(), e);
                continue;
            }
        };
        for limit in expected_limits {
            expected.fill(limit);
        }
        for limit in observed_limits {
            observed.fill(limit);
        }
    }
    (expected, observed)
}

fn summarise(channel: &str, mass: &str, config: &SummaryConfig) -> Result<Option<LimitResult>> {
    let Some(limit_max) = config.limit_max.get(mass).copied() else {
        log::warn!("No limit range configured for mA = {}, skipping {}", mass, channel);
        return Ok(None);
    };
    let files = matching_files(&config.limit_input, &toy_file_pattern(channel, mass)?);
    if files.is_empty() {
        log::warn!("No toy limit files for {} mA = {} in {}", channel, mass, config.limit_input.display());
        return Ok(None);
    }

    let (expected, observed) = limit_distributions(channel, mass, &files, limit_max, config.bins);
    let plot = config
        .limit_output
        .join(format!("Limit_distribution_{}_{}.png", channel, mass));
    HistogramPlot::new(&format!("Toy limits, {} mA = {}", channel, mass), "limit")
        .series(&expected, "Expected (median, toys)", BLUE)
        .series(&observed, "Observed (toys)", RED)
        .save(&plot)?;

    let result = LimitResult {
        channel: channel.to_owned(),
        mass: mass.to_owned(),
        n_files: files.len(),
        expected: LimitStatistics::of(&expected),
        observed: LimitStatistics::of(&observed),
        plot,
    };
    log::info!(
        "{} mA = {}: {} files, expected mean {:.4} +- {:.4}, observed mean {:.4} +- {:.4}",
        channel,
        mass,
        result.n_files,
        result.expected.mean,
        result.expected.stdev,
        result.observed.mean,
        result.observed.stdev
    );
    Ok(Some(result))
}

/// Expected and observed toy limit distributions for every channel and a-mass.
pub fn run(config: &SummaryConfig) -> Result<Vec<LimitResult>> {
    config.validate()?;
    std::fs::create_dir_all(&config.limit_output)?;
    let mut results = vec![];
    for channel in &config.channels {
        for mass in &config.a_masses {
            if let Some(result) = summarise(channel, mass, config)? {
                results.push(result);
            }
        }
    }

    let summary_path = config.limit_output.join("limit_summary.json");
    let writer = std::io::BufWriter::new(std::fs::File::create(&summary_path)?);
    serde_json::to_writer_pretty(writer, &results)?;
    log::info!("Wrote {} limit summaries to {}", results.len(), summary_path.display());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toy_file_pattern() {
        let pattern = toy_file_pattern("LepHi", "30").unwrap();
        let name = |toy: &str| {
            format!(
                "higgsCombine.testAsymptoticLimits.mA_30.LepHi.{}.AsymptoticLimits.mH120.{}",
                toy, TABLE_EXTENSION
            )
        };
        assert!(pattern.is_match(&name("toy12")));
        assert!(pattern.is_match(&name("toy")));
        assert!(!pattern.is_match(&name("data")));
        assert!(!pattern.is_match(&name("toy12").replace("mA_30", "mA_305")));
        assert!(!pattern.is_match(&name("toy1").replace("LepHi", "LepHix")));
        // the dot in the extension is literal
        assert!(!pattern.is_match(&name("toy1").replace(".mH120.", ".mH120x")));
    }

    #[test]
    fn test_missing_directory() {
        let pattern = toy_file_pattern("LepHi", "30").unwrap();
        assert!(matching_files(Path::new("does/not/exist"), &pattern).is_empty());
    }

    #[cfg(not(feature = "root"))]
    #[test]
    fn test_run() {
        use polars::prelude::*;

        let dir = tempfile::tempdir().unwrap();
        let config = SummaryConfig {
            channels: vec!["LepHi".to_owned()],
            a_masses: vec!["30".to_owned(), "55".to_owned()],
            limit_input: dir.path().join("limits"),
            limit_output: dir.path().join("Plotting/Limits"),
            ..SummaryConfig::default()
        };
        std::fs::create_dir_all(&config.limit_input).unwrap();
        for (toy, median) in [(0, 0.051), (1, 0.071)] {
            let path = config.limit_input.join(format!(
                "higgsCombine.testAsymptoticLimits.mA_30.LepHi.toy{}.AsymptoticLimits.mH120.parquet",
                toy
            ));
            let mut frame = df!(
                "limit" => &[0.02, median, 0.11, 0.09],
                "quantileExpected" => &[0.16_f32, 0.5, 0.975, -1.0],
            )
            .unwrap();
            ParquetWriter::new(std::fs::File::create(path).unwrap())
                .finish(&mut frame)
                .unwrap();
        }
        // not a toy, and not readable either
        std::fs::write(config.limit_input.join("notes.txt"), "nothing").unwrap();
        // a toy without the quantile column
        let mut frame = df!("limit" => &[0.03]).unwrap();
        ParquetWriter::new(
            std::fs::File::create(config.limit_input.join(
                "higgsCombine.testAsymptoticLimits.mA_30.LepHi.toy2.AsymptoticLimits.mH120.parquet",
            ))
            .unwrap(),
        )
        .finish(&mut frame)
        .unwrap();

        let results = run(&config).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.n_files, 3);
        assert_eq!(result.expected.count, 2);
        assert_eq!(result.observed.count, 2);
        // bin width 0.002, both medians sit at bin centres
        assert!((result.expected.mean - 0.061).abs() < 1e-9);
        assert!(result.plot.ends_with("Limit_distribution_LepHi_30.png"));
        assert!(result.plot.exists());
    }
}
