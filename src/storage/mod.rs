//! Grid files.
//!
//! Every grid file is a keyed container of named 2D grids. The default backend is a JSON
//! container; ROOT files are available through python `uproot` with the `root` feature.

pub mod json_store;
#[cfg(feature = "root")]
pub mod root_store;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::histoer::grid::Grid2D;
use crate::naming::NamedGrid;

pub use json_store::JsonStore;
#[cfg(feature = "root")]
pub use root_store::RootStore;

/// How a grid file is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Replace any existing file
    Recreate,
    /// Add to (and overwrite keys in) an existing file, creating it if needed
    Update,
}

pub trait GridStore {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    fn read_grid(&self, path: &Path, key: &str) -> Result<Grid2D>;

    fn write_grids(&self, path: &Path, grids: &[(String, &Grid2D)], mode: FileMode) -> Result<()>;

    /// `dir/stem.ext`
    fn file_path(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{}.{}", stem, self.extension()))
    }

    fn write_named(&self, path: &Path, grids: &[&NamedGrid], mode: FileMode) -> Result<()> {
        let keyed: Vec<(String, &Grid2D)> = grids.iter().map(|g| (g.key(), &g.grid)).collect();
        self.write_grids(path, &keyed, mode)
    }
}

/// Pick the backend for the current build.
pub fn default_store() -> Box<dyn GridStore> {
    #[cfg(feature = "root")]
    {
        Box::new(RootStore::default())
    }
    #[cfg(not(feature = "root"))]
    {
        Box::new(JsonStore)
    }
}
