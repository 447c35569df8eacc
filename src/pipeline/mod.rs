//! The analysis steps: merging sub-categories, building smoothed templates and toys, and writing
//! the fit cards that point at them.

pub mod cards;
pub mod merge;
pub mod mctoy;

pub use mctoy::{ToySource, run_category};
