use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Haa4bError, Result};

/// How much detail the numerical routines report.
///
/// Passed explicitly to every routine that logs per-bin detail.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    VeryVerbose,
    Debug,
}

impl Verbosity {
    // number of `-v` flags on the command line
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Verbosity::Quiet,
            1 => Verbosity::Verbose,
            2 => Verbosity::VeryVerbose,
            _ => Verbosity::Debug,
        }
    }

    pub fn verbose(&self) -> bool {
        *self >= Verbosity::Verbose
    }

    pub fn very_verbose(&self) -> bool {
        *self >= Verbosity::VeryVerbose
    }

    pub fn debug(&self) -> bool {
        *self >= Verbosity::Debug
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        match self {
            Verbosity::Quiet => log::LevelFilter::Info,
            Verbosity::Verbose | Verbosity::VeryVerbose => log::LevelFilter::Debug,
            Verbosity::Debug => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Largest allowed fluctuation in the smoothed background (standard deviations)
    pub max_pull: f64,
    pub max_iterations: usize,
    /// Neighbourhood radii checked by the pull criterion
    pub radii: Vec<usize>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            max_pull: 3.0,
            max_iterations: 2,
            radii: vec![1, 2],
        }
    }
}

/// How the toy variance is accumulated.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum ToyAccumulation {
    /// Write every toy, then reopen each one for the variance pass
    TwoPass,
    /// Keep running sums of x and x^2 in memory
    SinglePass,
    /// Single pass up to `max_in_memory` toys, two pass above
    Auto { max_in_memory: usize },
}

impl ToyAccumulation {
    pub fn single_pass(&self, n_toys: usize) -> bool {
        match self {
            ToyAccumulation::TwoPass => false,
            ToyAccumulation::SinglePass => true,
            ToyAccumulation::Auto { max_in_memory } => n_toys <= *max_in_memory,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ToyConfig {
    pub accumulation: ToyAccumulation,
    /// Toy `i` is drawn with seed `seed + i`. A random seed is picked (and logged) when unset.
    pub seed: Option<u64>,
    #[serde(skip)]
    pub verbosity: Verbosity,
}

impl Default for ToyConfig {
    fn default() -> Self {
        Self {
            accumulation: ToyAccumulation::TwoPass,
            seed: None,
            verbosity: Verbosity::Quiet,
        }
    }
}

/// One input sub-category feeding a merged fit category.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SubCategory {
    pub name: String,
    /// Directory relative to the raw input directory
    pub dir: String,
    pub backgrounds: Vec<String>,
    pub signals: Vec<String>,
}

/// Merge recipe for one output fit category.
///
/// `file_template` and `hist_template` accept the placeholders `{cat}`, `{sample}`, `{year}`,
/// `{mass}`, `{wp}`, `{region}` and `{ma_region}`.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct MergeCategory {
    pub masses_h: Vec<String>,
    pub working_points: Vec<String>,
    pub ma_region: String,
    pub a_masses: Vec<String>,
    pub file_template: String,
    pub hist_template: String,
    /// Sample names substituted in input histogram names only
    #[serde(default)]
    pub sample_aliases: BTreeMap<String, String>,
    pub inputs: Vec<SubCategory>,
}

impl MergeCategory {
    pub fn render(template: &str, fields: &TemplateFields<'_>) -> String {
        template
            .replace("{cat}", fields.cat)
            .replace("{sample}", fields.sample)
            .replace("{year}", fields.year)
            .replace("{mass}", fields.mass)
            .replace("{wp}", fields.wp)
            .replace("{region}", fields.region)
            .replace("{ma_region}", fields.ma_region)
    }
}

pub struct TemplateFields<'a> {
    pub cat: &'a str,
    pub sample: &'a str,
    pub year: &'a str,
    pub mass: &'a str,
    pub wp: &'a str,
    pub region: &'a str,
    pub ma_region: &'a str,
}

/// Inputs of the toy pipeline for one category.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ToyCategory {
    /// Names the merged input directory and files
    pub super_category: String,
    pub working_point: String,
    /// Background samples summed into the MC template (empty: no MC template)
    pub backgrounds: Vec<String>,
    /// Take the background shape from this working point, normalised to the nominal one
    pub shape_working_point: Option<String>,
}

impl ToyCategory {
    // gg0l and VBFjj use WP40 with an already summed MC sample, leptonic categories use WP60
    pub fn derive(category: &str) -> Self {
        let mut toy_category = ToyCategory {
            super_category: category.to_owned(),
            working_point: "WP60".to_owned(),
            backgrounds: vec![],
            shape_working_point: None,
        };
        for super_category in ["gg0l", "VBFjj"] {
            if category.contains(super_category) {
                toy_category.super_category = super_category.to_owned();
                toy_category.working_point = "WP40".to_owned();
                toy_category.backgrounds.push("MC".to_owned());
            }
        }
        if category.contains("gg0l") {
            toy_category.shape_working_point = Some("WP60".to_owned());
        }
        if category.contains("Lep") {
            toy_category.backgrounds.extend(["Wlv".to_owned(), "TT1l".to_owned()]);
            if category == "LepHi" {
                toy_category
                    .backgrounds
                    .extend(["Zll".to_owned(), "TT2l".to_owned(), "ZZ".to_owned()]);
            }
        }
        toy_category
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub channels: Vec<String>,
    pub a_masses: Vec<String>,
    pub gof_input: PathBuf,
    pub gof_output: PathBuf,
    pub limit_input: PathBuf,
    pub limit_output: PathBuf,
    pub gof_range: (f64, f64),
    /// Upper edge of the limit histograms for each a-mass
    pub limit_max: BTreeMap<String, f64>,
    pub bins: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            channels: ["LepHi", "LepLo", "gg0lHi", "gg0lLo"].map(String::from).to_vec(),
            a_masses: ["15", "30", "55"].map(String::from).to_vec(),
            gof_input: PathBuf::from("GoF_files"),
            gof_output: PathBuf::from("Plotting/GoF"),
            limit_input: PathBuf::from("limits"),
            limit_output: PathBuf::from("Plotting/Limits"),
            gof_range: (0.0, 600.0),
            limit_max: [("15", 0.1), ("30", 0.2), ("55", 0.4)]
                .into_iter()
                .map(|(mass, max)| (mass.to_owned(), max))
                .collect(),
            bins: 100,
        }
    }
}

impl SummaryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(Haa4bError::InvalidConfig(
                "summary histograms need at least one bin".to_owned(),
            ));
        }
        if self.gof_range.1 <= self.gof_range.0 {
            return Err(Haa4bError::InvalidConfig(format!(
                "empty GoF range [{}, {}]",
                self.gof_range.0, self.gof_range.1
            )));
        }
        if let Some((mass, max)) = self.limit_max.iter().find(|(_, max)| **max <= 0.0) {
            return Err(Haa4bError::InvalidConfig(format!(
                "limit range for mA = {} must end above 0, got {}",
                mass, max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub year: String,
    pub mass_regression: String,
    pub raw_inputs: PathBuf,
    pub plots: PathBuf,
    /// Directory holding the `{category}_Htoaato4b.json` card templates
    pub card_templates: PathBuf,
    pub mc_cards: PathBuf,
    pub data_cards: PathBuf,
    /// Write PNG heat maps of every template written by the toy pipeline
    pub heatmaps: bool,
    pub smoothing: SmoothingConfig,
    pub toys: ToyConfig,
    pub merge: BTreeMap<String, MergeCategory>,
    pub toy_categories: BTreeMap<String, ToyCategory>,
    pub summary: SummaryConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            year: "2018".to_owned(),
            mass_regression: "pnet".to_owned(),
            raw_inputs: PathBuf::from("raw_inputs"),
            plots: PathBuf::from("plots"),
            card_templates: PathBuf::from("."),
            mc_cards: PathBuf::from("mctoysjson"),
            data_cards: PathBuf::from("datatoysjson"),
            heatmaps: false,
            smoothing: SmoothingConfig::default(),
            toys: ToyConfig::default(),
            merge: default_merge_categories(),
            toy_categories: BTreeMap::new(),
            summary: SummaryConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: AnalysisConfig = serde_yaml::from_reader(std::io::BufReader::new(file))?;
        config.summary.validate()?;
        log::info!("Loaded analysis config from {}", path.display());
        Ok(config)
    }

    pub fn merge_category(&self, name: &str) -> Result<&MergeCategory> {
        self.merge
            .get(name)
            .ok_or_else(|| Haa4bError::UnknownCategory(name.to_owned()))
    }

    pub fn toy_category(&self, name: &str) -> ToyCategory {
        self.toy_categories
            .get(name)
            .cloned()
            .unwrap_or_else(|| ToyCategory::derive(name))
    }
}

fn sub_category(name: &str, dir: &str, backgrounds: &[&str], signals: &[&str]) -> SubCategory {
    SubCategory {
        name: name.to_owned(),
        dir: dir.to_owned(),
        backgrounds: backgrounds.iter().map(|s| s.to_string()).collect(),
        signals: signals.iter().map(|s| s.to_string()).collect(),
    }
}

fn default_merge_categories() -> BTreeMap<String, MergeCategory> {
    let a_masses: Vec<String> = ["15", "30", "55"].map(String::from).to_vec();
    let mut categories = BTreeMap::new();

    let gg0l_signals = ["ggHtoaato4b", "VBFHtoaato4b", "WHtoaato4b", "ZHtoaato4b", "ttHtoaato4b"];
    let gg0l_backgrounds = [
        "MC", "QCD_BGen", "QCD_bEnr", "QCD_Incl", "Zqq", "Wqq", "TT0l", "TT1l", "ggH",
    ];
    categories.insert(
        "gg0lIncl".to_owned(),
        MergeCategory {
            masses_h: vec!["pnet".to_owned()],
            working_points: vec!["WP60".to_owned(), "WP40".to_owned()],
            ma_region: "34a".to_owned(),
            a_masses: a_masses.clone(),
            file_template: "{cat}_{sample}_{year}".to_owned(),
            hist_template: "{cat}_{sample}_{year}_{mass}_vs_massA{ma_region}_{wp}_{region}_Nom"
                .to_owned(),
            sample_aliases: [("MC".to_owned(), "Data".to_owned())].into_iter().collect(),
            inputs: vec![
                sub_category("gg0lLo", "2D_in_gg0l_2025_05_02/gg0lLo", &gg0l_backgrounds, &gg0l_signals),
                sub_category("gg0lHi", "2D_in_gg0l_2025_05_02/gg0lHi", &gg0l_backgrounds, &gg0l_signals),
            ],
        },
    );

    categories.insert(
        "VBFjjIncl".to_owned(),
        MergeCategory {
            masses_h: vec!["pnet".to_owned()],
            working_points: vec!["WP40".to_owned()],
            ma_region: "34a".to_owned(),
            a_masses: a_masses.clone(),
            file_template: "{cat}_Xto4bv2_{sample}_{year}".to_owned(),
            hist_template: "{cat}_Xto4bv2_{sample}_{year}_{mass}_{wp}_{region}_Nom".to_owned(),
            sample_aliases: [("MC".to_owned(), "Data".to_owned())].into_iter().collect(),
            inputs: vec![
                sub_category("VBFjjLo", "2D_in_VBFjj_2025_04_06/VBFjjLo", &["MC"], &["VBFHtoaato4b"]),
                sub_category("VBFjjHi", "2D_in_VBFjj_2025_04_06/VBFjjHi", &["MC"], &["VBFHtoaato4b"]),
            ],
        },
    );

    let lepton_category = |inputs: Vec<SubCategory>| MergeCategory {
        masses_h: vec!["pnet".to_owned()],
        working_points: vec!["WP60".to_owned()],
        ma_region: "a".to_owned(),
        a_masses: a_masses.clone(),
        file_template: "{wp}/{cat}_{sample}_{year}".to_owned(),
        hist_template: "{cat}_{sample}_{year}_{mass}_{wp}_{region}_Nom".to_owned(),
        sample_aliases: BTreeMap::new(),
        inputs,
    };
    categories.insert(
        "LepHi".to_owned(),
        lepton_category(vec![
            sub_category("WlvHi", "2D_in_Wlv_ttlv_2025_03_06", &["Wlv", "TT1l"], &["WHtoaato4b"]),
            sub_category("ttbblv", "2D_in_Wlv_ttlv_2025_03_06", &["Wlv", "TT1l"], &["ttHtoaato4b"]),
            sub_category("ttbll", "2D_in_ttll_2025_03_06", &["TT2l"], &["ttHtoaato4b"]),
            sub_category("Zll", "2D_in_Zll_2025_03_06", &["Zll", "ZZ", "TT2l"], &["ZHtoaato4b"]),
        ]),
    );
    categories.insert(
        "LepLo".to_owned(),
        lepton_category(vec![
            sub_category("WlvLo", "2D_in_Wlv_ttlv_2025_03_06", &["Wlv", "TT1l"], &["WHtoaato4b"]),
            sub_category("ttblv", "2D_in_Wlv_ttlv_2025_03_06", &["Wlv", "TT1l"], &["ttHtoaato4b"]),
        ]),
    );

    categories
}
