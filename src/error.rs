use polars::error::PolarsError;
use std::error::Error;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Haa4bError {
    File(std::io::Error),
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
    DataFrame(PolarsError),
    Image(image::ImageError),
    Plot(String),
    Regex(regex::Error),
    Python(String),
    MissingDirectory(PathBuf),
    MissingGrid { file: PathBuf, key: String },
    BinningMismatch { left: String, right: String },
    NonPositiveWeight { name: String, block: (usize, usize), rebin: usize, weight: f64 },
    NonSmoothedToySource(String),
    InvalidName(String),
    UnknownCategory(String),
    UnknownFitFunction(String),
    InvalidToyCount,
    NoBackgrounds(String),
    InvalidCard(PathBuf),
    InvalidConfig(String),
}

impl From<std::io::Error> for Haa4bError {
    fn from(err: std::io::Error) -> Haa4bError {
        Haa4bError::File(err)
    }
}

impl From<serde_json::Error> for Haa4bError {
    fn from(err: serde_json::Error) -> Haa4bError {
        Haa4bError::Json(err)
    }
}

impl From<serde_yaml::Error> for Haa4bError {
    fn from(err: serde_yaml::Error) -> Haa4bError {
        Haa4bError::Yaml(err)
    }
}

impl From<PolarsError> for Haa4bError {
    fn from(err: PolarsError) -> Haa4bError {
        Haa4bError::DataFrame(err)
    }
}

impl From<image::ImageError> for Haa4bError {
    fn from(err: image::ImageError) -> Haa4bError {
        Haa4bError::Image(err)
    }
}

impl<E: Error + Send + Sync> From<plotters::drawing::DrawingAreaErrorKind<E>> for Haa4bError {
    fn from(err: plotters::drawing::DrawingAreaErrorKind<E>) -> Haa4bError {
        Haa4bError::Plot(err.to_string())
    }
}

impl From<regex::Error> for Haa4bError {
    fn from(err: regex::Error) -> Haa4bError {
        Haa4bError::Regex(err)
    }
}

#[cfg(feature = "root")]
impl From<pyo3::PyErr> for Haa4bError {
    fn from(err: pyo3::PyErr) -> Haa4bError {
        Haa4bError::Python(err.to_string())
    }
}

impl Display for Haa4bError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Haa4bError::File(x) => write!(f, "Run had a file I/O error: {}", x),
            Haa4bError::Json(x) => write!(f, "Run had an error reading/writing JSON: {}", x),
            Haa4bError::Yaml(x) => write!(f, "Run had an error parsing the YAML config: {}", x),
            Haa4bError::DataFrame(x) => write!(f, "Run had an error using polars: {}", x),
            Haa4bError::Image(x) => write!(f, "Run had an error writing a plot: {}", x),
            Haa4bError::Plot(x) => write!(f, "Run had an error drawing a chart: {}", x),
            Haa4bError::Regex(x) => write!(f, "Run had an invalid file pattern: {}", x),
            Haa4bError::Python(x) => write!(f, "Run had an error in the python ROOT bridge: {}", x),
            Haa4bError::MissingDirectory(x) => write!(
                f,
                "Output directory {} does not exist! Run the merge step first.",
                x.display()
            ),
            Haa4bError::MissingGrid { file, key } => {
                write!(f, "Could not find grid {} in {}", key, file.display())
            }
            Haa4bError::BinningMismatch { left, right } => {
                write!(f, "{} and {} have different binning!", left, right)
            }
            Haa4bError::NonPositiveWeight {
                name,
                block,
                rebin,
                weight,
            } => write!(
                f,
                "Rebinned {} bin {},{} with factor {} has weight = {:.9}!",
                name, block.0, block.1, rebin, weight
            ),
            Haa4bError::NonSmoothedToySource(x) => write!(
                f,
                "Refusing to throw toys from {}: only smoothed MC or data may be used",
                x
            ),
            Haa4bError::InvalidName(x) => write!(f, "Could not parse grid name: {}", x),
            Haa4bError::UnknownCategory(x) => write!(f, "No category named {} is configured", x),
            Haa4bError::UnknownFitFunction(x) => {
                write!(f, "{} is not a known transfer function form", x)
            }
            Haa4bError::InvalidToyCount => write!(f, "Toy count must be at least 1"),
            Haa4bError::NoBackgrounds(x) => {
                write!(f, "Category {} has no background samples to build MC from", x)
            }
            Haa4bError::InvalidCard(x) => write!(
                f,
                "Card template {} has no PROCESSES.data_obs entry",
                x.display()
            ),
            Haa4bError::InvalidConfig(x) => write!(f, "Invalid analysis config: {}", x),
        }
    }
}

impl Error for Haa4bError {}

pub type Result<T> = std::result::Result<T, Haa4bError>;
