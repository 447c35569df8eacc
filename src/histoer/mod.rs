pub mod axis;
pub mod colormaps;
pub mod grid;
pub mod rebinning;
pub mod rounding;
pub mod smoothing;
pub mod statistics;
pub mod toys;

pub use axis::Axis;
pub use grid::Grid2D;
