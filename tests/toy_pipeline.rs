use std::path::Path;

use haa4b::Haa4bError;
use haa4b::config::{AnalysisConfig, ToyAccumulation};
use haa4b::histoer::{Axis, Grid2D};
use haa4b::pipeline::{ToySource, merge, run_category};
use haa4b::storage::{FileMode, GridStore, JsonStore};

const CARD: &str = r#"{
    "NAME": "LepLo",
    "PROCESSES": {
        "data_obs": {"ALIAS": "LepLo_Data_2018", "TYPE": "DATA"},
        "Wlv": {"TYPE": "BKG"}
    }
}"#;

fn expected(ix: usize, iy: usize) -> f64 {
    30.0 + 2.0 * ix as f64 + iy as f64
}

fn grid(scale: f64, data: bool) -> Grid2D {
    Grid2D::from_fn(Axis::uniform(12, (0.0, 1.0)), Axis::uniform(12, (0.0, 1.0)), |ix, iy| {
        if data {
            let wiggle = ((ix * 7 + iy * 3) % 5) as f64 - 2.0;
            let value = (scale * expected(ix, iy)).round() + wiggle;
            (value, value.sqrt())
        } else {
            let value = scale * expected(ix, iy);
            (value, (0.3 * value).sqrt())
        }
    })
}

fn setup(root: &Path) -> AnalysisConfig {
    let mut config = AnalysisConfig {
        raw_inputs: root.join("raw_inputs"),
        plots: root.join("plots"),
        card_templates: root.join("cards"),
        mc_cards: root.join("mctoysjson"),
        data_cards: root.join("datatoysjson"),
        ..AnalysisConfig::default()
    };
    config.toys.seed = Some(11);
    config.toys.accumulation = ToyAccumulation::TwoPass;

    std::fs::create_dir_all(&config.card_templates).unwrap();
    std::fs::write(config.card_templates.join("LepLo_Htoaato4b.json"), CARD).unwrap();

    // sub-category inputs of LepLo
    let store = JsonStore;
    let merge_config = &config.merge["LepLo"];
    for input in &merge_config.inputs {
        for sample in merge::samples(input, &merge_config.a_masses) {
            let (pass, fail) = match sample.as_str() {
                "Data" => (grid(0.5, true), grid(2.0, true)),
                "Wlv" => (grid(0.3, false), grid(1.2, false)),
                "TT1l" => (grid(0.2, false), grid(0.8, false)),
                _ => (grid(0.01, false), grid(0.01, false)),
            };
            let path = store.file_path(
                &config.raw_inputs.join(&input.dir),
                &format!("WP60/{}_{}_2018", input.name, sample),
            );
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let key = |region: &str| format!("{}_{}_2018_pnet_WP60_{}_Nom", input.name, sample, region);
            store
                .write_grids(&path, &[(key("Pass"), &pass), (key("Fail"), &fail)], FileMode::Recreate)
                .unwrap();
        }
    }
    config
}

#[test]
fn test_merge_then_toys() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let store = JsonStore;

    merge::merge_category(&config, &store, "LepLo").unwrap();
    let n_toys = 4;
    let summary = run_category(&config, &store, "LepLo", n_toys, ToySource::DataAndMc).unwrap();

    // two sub-categories of data, each about half the expected yield
    let (data_pass, data_fail) = summary.data_yields;
    assert!(data_pass > 0.0 && data_fail > 3.0 * data_pass);
    let (rounded_pass, rounded_fail) = summary.rounded_yields;
    assert!((rounded_pass - data_pass).abs() <= (0.01 * data_pass).max(1.5));
    assert!((rounded_fail - data_fail).abs() <= (0.01 * data_fail).max(1.5));
    assert_eq!(summary.cards_written, 2 + 2 * n_toys);

    let plots = config.plots.join("LepLo");
    assert_eq!(summary.data_mc_file, plots.join("LepLo_DataAndMC_4toys_Data_MC.json"));
    let keys = store.keys(&summary.data_mc_file).unwrap();
    for key in [
        "LepLo_Data_2018_pnet_WP60_Pass_Nom",
        "LepLo_MC_2018_pnet_WP60_Fail_Nom",
        "LepLo_MCsmooth1_2018_pnet_WP60_Pass_Nom",
        "LepLo_MCsmooth2_2018_pnet_WP60_Ratio_Nom",
        "LepLo_MCrounded_2018_pnet_WP60_Fail_Nom_rebin4",
        "LepLo_MCsmooth2_4toyAvg_2018_pnet_WP60_Pass_Nom",
        "LepLo_Data_4toyVarSq_2018_pnet_WP60_Ratio_Nom_rebin2",
    ] {
        assert!(keys.contains(&key.to_owned()), "missing {}", key);
    }

    // rounded pseudo-data is integer valued with Poisson errors
    let rounded = store
        .read_grid(&summary.rounded_file, "LepLo_MCrounded_2018_pnet_WP60_Pass_Nom")
        .unwrap();
    assert!(rounded.contents.iter().all(|v| v.fract() == 0.0 && *v >= 0.0));
    assert!((rounded.error(3, 3) - rounded.content(3, 3).sqrt()).abs() < 1e-12);

    // every toy file holds both regions
    for i in 0..n_toys {
        let toy_keys = store
            .keys(&plots.join(format!("LepLo_MCsmooth2_toy{}_2018.json", i)))
            .unwrap();
        assert_eq!(toy_keys.len(), 2);
        assert!(plots.join(format!("LepLo_Data_toy{}_2018.json", i)).exists());
    }

    let card: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.mc_cards.join("LepLo/LepLo_Htoaato4b_mctoy3.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(card["PROCESSES"]["data_obs"]["ALIAS"], "LepLo_MCsmooth2_toy3_2018");
    let card: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.data_cards.join("LepLo/LepLo_Htoaato4b_Data.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(card["PROCESSES"]["data_obs"]["ALIAS"], "LepLo_Data_2018");
    assert!(config.mc_cards.join("LepLo/LepLo_Htoaato4b_MCrounded.json").exists());
}

#[test]
fn test_seeded_toys_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let store = JsonStore;
    merge::merge_category(&config, &store, "LepLo").unwrap();

    let toy_path = config.plots.join("LepLo/LepLo_MCsmooth2_toy1_2018.json");
    let key = "LepLo_MCsmooth2_toy1_2018_pnet_WP60_Fail_Nom";
    run_category(&config, &store, "LepLo", 2, ToySource::Mc).unwrap();
    let first = store.read_grid(&toy_path, key).unwrap();
    run_category(&config, &store, "LepLo", 2, ToySource::Mc).unwrap();
    let second = store.read_grid(&toy_path, key).unwrap();
    assert_eq!(first, second);

    // no data toys or data toy cards for an MC-only run
    assert!(!config.plots.join("LepLo/LepLo_Data_toy0_2018.json").exists());
    assert!(!config.data_cards.join("LepLo/LepLo_Htoaato4b_datatoy0.json").exists());
}

#[test]
fn test_missing_background_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let store = JsonStore;
    merge::merge_category(&config, &store, "LepLo").unwrap();
    std::fs::remove_file(config.raw_inputs.join("2D_in_merged_LepLo/LepLo_TT1l_2018.json")).unwrap();

    assert!(matches!(
        run_category(&config, &store, "LepLo", 2, ToySource::None),
        Err(Haa4bError::File(_))
    ));
}

#[test]
fn test_no_toys_with_heatmaps() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.heatmaps = true;
    let store = JsonStore;
    merge::merge_category(&config, &store, "LepLo").unwrap();

    let summary = run_category(&config, &store, "LepLo", 0, ToySource::None).unwrap();
    assert_eq!(summary.cards_written, 2);
    let keys = store.keys(&summary.data_mc_file).unwrap();
    assert!(!keys.iter().any(|key| key.contains("toyAvg")));

    let heatmaps = config.plots.join("LepLo/heatmaps");
    assert!(heatmaps.join("LepLo_MCrounded_2018_pnet_WP60_Pass_Nom.png").exists());
    assert!(heatmaps.join("LepLo_MCsmooth2_2018_pnet_WP60_Ratio_Nom.png").exists());
    assert!(!heatmaps.join("LepLo_MCsmooth2_2018_pnet_WP60_Ratio_Nom_rebin2.png").exists());
}

#[test]
fn test_data_binning_mismatch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let store = JsonStore;
    merge::merge_category(&config, &store, "LepLo").unwrap();

    let merged = config.raw_inputs.join("2D_in_merged_LepLo/LepLo_Data_2018.json");
    let coarse = Grid2D::uniform((6, 6), ((0.0, 1.0), (0.0, 1.0)));
    store
        .write_grids(
            &merged,
            &[("LepLo_Data_2018_pnet_WP60_Fail_Nom".to_owned(), &coarse)],
            FileMode::Update,
        )
        .unwrap();

    assert!(matches!(
        run_category(&config, &store, "LepLo", 2, ToySource::Data),
        Err(Haa4bError::BinningMismatch { .. })
    ));
}
