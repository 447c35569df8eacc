//! Pass/fail transfer-function forms for the 2D background fit.
//!
//! A form name is a polynomial order `{x}{sep}{y}`, where `x` crosses terms and `d` does not,
//! optionally prefixed with `e` (exponential) and suffixed with `C` (centred), `M` (y as a mass
//! ratio) or `MC` (x centred, y as a centred mass ratio).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Haa4bError, Result};

static PARAMETER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\d+)").expect("parameter pattern compiles"));

const POLYNOMIALS: [(&str, &str); 10] = [
    ("0x0", "@0"),
    ("1x0", "@0*(1+@1*x)"),
    ("0x1", "@0*(1+@1*y)"),
    ("1x1", "@0*((1+@1*x)*(1+@2*y)+@3*x*y)"),
    ("2x1", "@0*((1+@1*x+@4*x*x)*(1+@2*y)+@3*x*y+@5*x*x*y)"),
    ("1x2", "@0*((1+@1*x)*(1+@2*y+@4*y*y)+@3*x*y+@5*x*y*y)"),
    (
        "2x2",
        "@0*((1+@1*x+@4*x*x)*(1+@2*y+@5*y*y)+@3*x*y+@6*x*x*y+@7*x*y*y+@8*x*x*y*y)",
    ),
    ("2d1", "@0*((1+@1*x+@3*x*x)*(1+@2*y))"),
    ("1d2", "@0*((1+@1*x)*(1+@2*y+@3*y*y))"),
    ("2d2", "@0*((1+@1*x+@3*x*x)*(1+@2*y+@4*y*y))"),
];

/// Higgs production mode of the fit, which sets the nominal fail-to-pass transfer factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Deserialize, serde::Serialize)]
pub enum ProductionMode {
    #[value(name = "ggH")]
    GgH,
    #[value(name = "ZH")]
    ZH,
}

impl ProductionMode {
    pub fn nominal_tf(&self) -> f64 {
        match self {
            ProductionMode::GgH => 0.11,
            ProductionMode::ZH => 0.0013,
        }
    }

    pub fn default_fit(&self) -> &'static str {
        match self {
            ProductionMode::GgH => "2d2C",
            ProductionMode::ZH => "0x0",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ParameterConstraint {
    pub min: f64,
    pub max: f64,
    pub nom: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TransferFunction {
    pub form: String,
    pub constraints: BTreeMap<usize, ParameterConstraint>,
}

// m(a)/m(H) with m(a) in [10, 64] and m(H) in [70, 200], or [60, 200] for the soft-drop mass
fn mass_ratio(mass_regression: &str, centred: bool) -> String {
    let offset = if centred { "-(17/54)" } else { "+(10/54)" };
    let x_offset = if mass_regression == "msoft" { "60/140" } else { "70/130" };
    format!("((y{})/(x+({})))", offset, x_offset)
}

/// Expand a form name into its expression in `x`, `y` and the parameters `@k`.
pub fn generate_form(name: &str, mass_regression: &str) -> Result<String> {
    let unknown = || Haa4bError::UnknownFitFunction(name.to_owned());
    let (exponential, body) = match name.strip_prefix('e') {
        Some(body) => (true, body),
        None => (false, name),
    };
    let (order, suffix) = body.split_at_checked(3).ok_or_else(unknown)?;
    let polynomial = POLYNOMIALS
        .iter()
        .find(|(key, _)| *key == order)
        .map(|(_, polynomial)| *polynomial)
        .ok_or_else(unknown)?;

    let mut form = polynomial.to_owned();
    match suffix {
        "" => {}
        "C" => {
            form = form.replace('x', "(x-0.5)").replace('y', "(y-0.5)");
        }
        "MC" => {
            form = form.replace('x', "(x-0.5)");
            form = form.replace('y', &mass_ratio(mass_regression, true));
        }
        "M" => {
            form = form.replace('y', &mass_ratio(mass_regression, false));
        }
        _ => return Err(unknown()),
    }
    if exponential {
        form = format!("exp(-2.32+{})", form);
    }
    log::debug!("Fit function {}: {}", name, form);
    Ok(form)
}

/// Highest parameter index in `form`, plus one.
pub fn parameter_count(form: &str) -> usize {
    PARAMETER_RE
        .captures_iter(form)
        .filter_map(|captures| captures[1].parse::<usize>().ok())
        .max()
        .map_or(0, |k| k + 1)
}

/// Fit ranges and starting values: the normalisation starts at the nominal transfer factor,
/// every shape parameter at 0 with unit error.
pub fn generate_constraints(form: &str, nominal_tf: f64) -> BTreeMap<usize, ParameterConstraint> {
    (0..parameter_count(form))
        .map(|k| {
            let (nom, error) = if k == 0 { (nominal_tf, nominal_tf) } else { (0.0, 1.0) };
            (
                k,
                ParameterConstraint {
                    min: -100.0,
                    max: 100.0,
                    nom,
                    error,
                },
            )
        })
        .collect()
}

/// Transfer-function options for every name in `names`.
pub fn rpf_options(
    names: &[String],
    mass_regression: &str,
    mode: ProductionMode,
) -> Result<BTreeMap<String, TransferFunction>> {
    names
        .iter()
        .map(|name| {
            let form = generate_form(name, mass_regression)?;
            let constraints = generate_constraints(&form, mode.nominal_tf());
            Ok((name.clone(), TransferFunction { form, constraints }))
        })
        .collect()
}
