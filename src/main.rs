use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use haa4b::config::{AnalysisConfig, ToyAccumulation, Verbosity};
use haa4b::pipeline::{ToySource, merge, run_category};
use haa4b::storage::default_store;
use haa4b::summary::{gof, limits};
use haa4b::transfer::{ProductionMode, rpf_options};

#[derive(Parser)]
#[command(name = "haa4b")]
#[command(about = "Smoothed background templates, toys and fit summaries for the boosted H->aa->4b search")]
#[command(version)]
struct Cli {
    /// YAML analysis configuration. Built-in defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More detail from the numerical routines (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge input sub-categories into one fit category
    Merge {
        /// Output category, e.g. gg0lIncl, VBFjjIncl, LepHi, LepLo
        category: String,
    },

    /// Smooth the background, build rounded pseudo-data and throw toys
    Toys {
        /// Fit category, e.g. gg0lHi or LepLo
        category: String,

        /// Number of toys per template
        ntoys: usize,

        /// Templates to throw toys from
        #[arg(value_enum)]
        source: ToySource,

        /// Seed of toy 0 (toy i uses seed + i). Random when omitted.
        #[arg(long)]
        seed: Option<u64>,

        /// Keep toy sums in memory instead of re-reading every toy for the variance
        #[arg(long)]
        in_memory: bool,

        /// Also write PNG heat maps of every template
        #[arg(long)]
        heatmaps: bool,
    },

    /// Goodness-of-fit distributions and p-values
    Gof,

    /// Toy expected and observed limit distributions
    Limits,

    /// Print transfer-function forms and parameter constraints as JSON
    Tf {
        /// Form names, e.g. 2d2C or e1x1M. The production mode default when omitted.
        names: Vec<String>,

        #[arg(long, value_enum, default_value = "ggH")]
        mode: ProductionMode,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn print_json<T: serde::Serialize>(value: &T, output: Option<&PathBuf>) -> haa4b::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn run(cli: Cli) -> haa4b::Result<()> {
    let verbosity = Verbosity::from_occurrences(cli.verbose);
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    config.toys.verbosity = verbosity;
    let store = default_store();

    match cli.command {
        Commands::Merge { category } => {
            let summary = merge::merge_category(&config, store.as_ref(), &category)?;
            print_json(&summary, None)
        }
        Commands::Toys {
            category,
            ntoys,
            source,
            seed,
            in_memory,
            heatmaps,
        } => {
            if seed.is_some() {
                config.toys.seed = seed;
            }
            if in_memory {
                config.toys.accumulation = ToyAccumulation::SinglePass;
            }
            config.heatmaps |= heatmaps;
            let summary = run_category(&config, store.as_ref(), &category, ntoys, source)?;
            print_json(&summary, None)
        }
        Commands::Gof => {
            let results = gof::run(&config.summary)?;
            print_json(&results, None)
        }
        Commands::Limits => {
            let results = limits::run(&config.summary)?;
            print_json(&results, None)
        }
        Commands::Tf { names, mode, output } => {
            let names = if names.is_empty() {
                vec![mode.default_fit().to_owned()]
            } else {
                names
            };
            let options = rpf_options(&names, &config.mass_regression, mode)?;
            print_json(&options, output.as_ref())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = Verbosity::from_occurrences(cli.verbose).log_filter();
    // RUST_LOG wins over -v
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter.as_str())).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
