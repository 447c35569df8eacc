use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{AnalysisConfig, MergeCategory, SubCategory, TemplateFields};
use crate::error::Result;
use crate::histoer::grid::Grid2D;
use crate::naming::{GridId, NamedGrid, Region, Template};
use crate::storage::{FileMode, GridStore};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MergeSummary {
    pub category: String,
    pub grids_read: usize,
    /// Integral of every merged output grid
    pub yields: BTreeMap<String, f64>,
}

/// Output locations of a merge.
pub struct MergeOutputs {
    /// Everything, input to the toy pipeline
    pub merged_dir: PathBuf,
    /// `plots/{category}` and `plots/{sub-category}`
    pub plot_dirs: BTreeMap<String, PathBuf>,
}

impl MergeOutputs {
    pub fn new(config: &AnalysisConfig, category: &str, merge: &MergeCategory) -> Self {
        let merged_dir = config
            .raw_inputs
            .join(format!("2D_in_merged_{}", category.replace("Incl", "")));
        let plot_dirs = std::iter::once(category)
            .chain(merge.inputs.iter().map(|input| input.name.as_str()))
            .map(|name| (name.to_owned(), config.plots.join(name)))
            .collect();
        Self { merged_dir, plot_dirs }
    }

    /// Delete and recreate every output directory.
    pub fn recreate(&self) -> Result<()> {
        for dir in std::iter::once(&self.merged_dir).chain(self.plot_dirs.values()) {
            log::info!("Recreating {}", dir.display());
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn plot_dir(&self, name: &str) -> &Path {
        // every name comes from the category or its inputs, see `new`
        self.plot_dirs.get(name).map_or(self.merged_dir.as_path(), PathBuf::as_path)
    }
}

/// Data, backgrounds, then every signal at every a-mass.
pub fn samples(input: &SubCategory, a_masses: &[String]) -> Vec<String> {
    std::iter::once("Data".to_owned())
        .chain(input.backgrounds.iter().cloned())
        .chain(
            input
                .signals
                .iter()
                .flat_map(|signal| a_masses.iter().map(move |mass| format!("{}_mA_{}", signal, mass))),
        )
        .collect()
}

/// Merge the sub-categories of `category` into one fit category.
///
/// Each input grid is saved under its normalised sub-category name and summed into the output
/// category grid. The merged directory gets both, `plots/{category}` the sums and
/// `plots/{sub-category}` the inputs.
pub fn merge_category(config: &AnalysisConfig, store: &dyn GridStore, category: &str) -> Result<MergeSummary> {
    let merge = config.merge_category(category)?;
    let outputs = MergeOutputs::new(config, category, merge);
    outputs.recreate()?;

    let year = config.year.as_str();
    let file_prefix = category.replace("Incl", "");
    let mut sums: BTreeMap<String, NamedGrid> = BTreeMap::new();
    let mut summary = MergeSummary {
        category: category.to_owned(),
        ..Default::default()
    };

    for input in &merge.inputs {
        let input_dir = config.raw_inputs.join(&input.dir);
        for sample in samples(input, &merge.a_masses) {
            let alias = merge
                .sample_aliases
                .get(&sample)
                .map_or(sample.as_str(), String::as_str);
            for wp in &merge.working_points {
                let mut fields = TemplateFields {
                    cat: &input.name,
                    sample: &sample,
                    year,
                    mass: "",
                    wp,
                    region: "",
                    ma_region: &merge.ma_region,
                };
                let in_path = store.file_path(&input_dir, &MergeCategory::render(&merge.file_template, &fields));
                log::info!("Reading from {}", in_path.display());

                let mut saved = vec![];
                let mut summed_keys = vec![];
                for mass in &merge.masses_h {
                    for region in [Region::Pass, Region::Fail] {
                        fields.sample = alias;
                        fields.mass = mass.as_str();
                        fields.region = region.as_str();
                        let in_key = MergeCategory::render(&merge.hist_template, &fields);
                        let grid: Grid2D = store.read_grid(&in_path, &in_key)?;
                        summary.grids_read += 1;

                        let template = Template::from(sample.as_str());
                        let input_id = GridId::new(&input.name, template.clone(), year, mass, wp, region);
                        let output_id = GridId::new(category, template, year, mass, wp, region);
                        let output_key = output_id.to_string();

                        match sums.get_mut(&output_key) {
                            Some(sum) => {
                                sum.grid.check_binning(&grid, &output_key, &in_key)?;
                                sum.grid.add_scaled(&grid, 1.0)?;
                            }
                            None => {
                                sums.insert(output_key.clone(), NamedGrid::new(output_id, grid.clone()));
                            }
                        }
                        saved.push(NamedGrid::new(input_id, grid));
                        summed_keys.push(output_key);
                    }
                }

                let summed: Vec<&NamedGrid> = summed_keys.iter().filter_map(|key| sums.get(key)).collect();
                let inputs: Vec<&NamedGrid> = saved.iter().collect();
                let all: Vec<&NamedGrid> = inputs.iter().chain(summed.iter()).copied().collect();

                let stem = |cat: &str| format!("{}_{}_{}", cat, sample, year);
                store.write_named(&store.file_path(&outputs.merged_dir, &stem(&file_prefix)), &all, FileMode::Update)?;
                store.write_named(
                    &store.file_path(outputs.plot_dir(category), &stem(category)),
                    &summed,
                    FileMode::Update,
                )?;
                store.write_named(
                    &store.file_path(outputs.plot_dir(&input.name), &stem(&input.name)),
                    &inputs,
                    FileMode::Update,
                )?;
            }
        }
    }

    summary.yields = sums
        .iter()
        .map(|(key, named)| (key.clone(), named.grid.integral()))
        .collect();
    log::info!(
        "Merged {} grids from {} sub-categories into {} {} grids",
        summary.grids_read,
        merge.inputs.len(),
        summary.yields.len(),
        category
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Haa4bError;
    use crate::histoer::axis::Axis;
    use crate::storage::JsonStore;

    fn grid(value: f64, y_max: f64) -> Grid2D {
        Grid2D::from_fn(Axis::uniform(3, (0.0, 3.0)), Axis::uniform(2, (0.0, y_max)), |_, _| {
            (value, value.sqrt())
        })
    }

    fn lepton_config(root: &Path) -> AnalysisConfig {
        let mut config = AnalysisConfig {
            raw_inputs: root.join("raw_inputs"),
            plots: root.join("plots"),
            ..AnalysisConfig::default()
        };
        let mut merge = config.merge["LepLo"].clone();
        merge.a_masses = vec!["30".to_owned()];
        for input in merge.inputs.iter_mut() {
            input.backgrounds = vec!["Wlv".to_owned()];
        }
        config.merge.insert("LepLo".to_owned(), merge);
        config
    }

    // write every input grid of LepLo with content `value`
    fn write_inputs(config: &AnalysisConfig, value: impl Fn(&str) -> f64, y_max: impl Fn(&str) -> f64) {
        let store = JsonStore;
        let merge = &config.merge["LepLo"];
        for input in &merge.inputs {
            for sample in samples(input, &merge.a_masses) {
                let path = store.file_path(
                    &config.raw_inputs.join(&input.dir),
                    &format!("WP60/{}_{}_2018", input.name, sample),
                );
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                let g = grid(value(&input.name), y_max(&input.name));
                let keyed: Vec<(String, &Grid2D)> = ["Pass", "Fail"]
                    .iter()
                    .map(|region| (format!("{}_{}_2018_pnet_WP60_{}_Nom", input.name, sample, region), &g))
                    .collect();
                store.write_grids(&path, &keyed, FileMode::Update).unwrap();
            }
        }
    }

    #[test]
    fn test_samples() {
        let config = AnalysisConfig::default();
        let input = &config.merge["LepHi"].inputs[0];
        let samples = samples(input, &config.merge["LepHi"].a_masses);
        assert_eq!(
            samples,
            vec!["Data", "Wlv", "TT1l", "WHtoaato4b_mA_15", "WHtoaato4b_mA_30", "WHtoaato4b_mA_55"]
        );
    }

    #[test]
    fn test_merge_sums_sub_categories() {
        let dir = tempfile::tempdir().unwrap();
        let config = lepton_config(dir.path());
        write_inputs(&config, |cat| if cat == "WlvLo" { 2.0 } else { 5.0 }, |_| 2.0);

        // stale output is removed
        let stale = config.plots.join("LepLo/stale.json");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "{}").unwrap();

        let store = JsonStore;
        let summary = merge_category(&config, &store, "LepLo").unwrap();
        // 2 sub-categories x (Data, Wlv, one signal) x Pass/Fail
        assert_eq!(summary.grids_read, 12);
        // Data, Wlv and two different signals
        assert_eq!(summary.yields.len(), 8);
        assert!((summary.yields["LepLo_Data_2018_pnet_WP60_Pass_Nom"] - 42.0).abs() < 1e-9);
        assert!(!stale.exists());

        let merged = config.raw_inputs.join("2D_in_merged_LepLo/LepLo_Wlv_2018.json");
        let keys = store.keys(&merged).unwrap();
        assert!(keys.contains(&"LepLo_Wlv_2018_pnet_WP60_Fail_Nom".to_owned()));
        assert!(keys.contains(&"WlvLo_Wlv_2018_pnet_WP60_Fail_Nom".to_owned()));
        assert!(keys.contains(&"ttblv_Wlv_2018_pnet_WP60_Pass_Nom".to_owned()));

        let sum = store
            .read_grid(
                &config.plots.join("LepLo/LepLo_Data_2018.json"),
                "LepLo_Data_2018_pnet_WP60_Pass_Nom",
            )
            .unwrap();
        assert!((sum.content(0, 0) - 7.0).abs() < 1e-12);
        assert!((sum.error(0, 0) - 7.0_f64.sqrt()).abs() < 1e-12);
        let signal = store
            .read_grid(
                &config.plots.join("LepLo/LepLo_WHtoaato4b_mA_30_2018.json"),
                "LepLo_WHtoaato4b_mA_30_2018_pnet_WP60_Pass_Nom",
            )
            .unwrap();
        assert!((signal.content(0, 0) - 2.0).abs() < 1e-12);

        let input_keys = store.keys(&config.plots.join("ttblv/ttblv_Data_2018.json")).unwrap();
        assert_eq!(
            input_keys,
            vec!["ttblv_Data_2018_pnet_WP60_Fail_Nom", "ttblv_Data_2018_pnet_WP60_Pass_Nom"]
        );
    }

    #[test]
    fn test_merge_binning_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = lepton_config(dir.path());
        write_inputs(&config, |_| 1.0, |cat| if cat == "WlvLo" { 2.0 } else { 3.0 });
        assert!(matches!(
            merge_category(&config, &JsonStore, "LepLo"),
            Err(Haa4bError::BinningMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = lepton_config(dir.path());
        assert!(merge_category(&config, &JsonStore, "LepLo").is_err());
    }
}
