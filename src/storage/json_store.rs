use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use fnv::FnvHashMap;

use super::{FileMode, GridStore};
use crate::error::{Haa4bError, Result};
use crate::histoer::grid::Grid2D;

#[derive(Default, serde::Deserialize, serde::Serialize)]
pub struct GridFile {
    pub grids: FnvHashMap<String, Grid2D>,
}

impl GridFile {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

/// Grid files as JSON containers (`.json`).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStore;

impl JsonStore {
    pub fn keys(&self, path: &Path) -> Result<Vec<String>> {
        let mut keys: Vec<String> = GridFile::load(path)?.grids.into_keys().collect();
        keys.sort();
        Ok(keys)
    }
}

impl GridStore for JsonStore {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn read_grid(&self, path: &Path, key: &str) -> Result<Grid2D> {
        let mut file = GridFile::load(path)?;
        file.grids.remove(key).ok_or_else(|| Haa4bError::MissingGrid {
            file: path.to_path_buf(),
            key: key.to_owned(),
        })
    }

    fn write_grids(&self, path: &Path, grids: &[(String, &Grid2D)], mode: FileMode) -> Result<()> {
        let mut file = match mode {
            FileMode::Update if path.exists() => GridFile::load(path)?,
            _ => GridFile::default(),
        };
        for (key, grid) in grids {
            file.grids.insert(key.clone(), (*grid).clone());
        }
        log::debug!("Writing {} grids to {}", grids.len(), path.display());
        file.save(path)
    }
}
