pub mod gof;
pub mod histogram1d;
pub mod limit_tree;
pub mod limits;
pub mod plot;
