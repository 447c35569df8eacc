use std::ffi::CStr;
use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::PyModule;

use super::{FileMode, GridStore};
use crate::error::{Haa4bError, Result};
use crate::histoer::axis::Axis;
use crate::histoer::grid::Grid2D;

// python3 -m venv .venv
// source .venv/bin/activate
// pip install uproot hist
// export PYO3_PYTHON=$(pwd)/.venv/bin/python
const UPROOT_BRIDGE: &CStr = cr#"
import numpy as np
import uproot
import hist

def read_grid(file_name, key):
    with uproot.open(file_name) as file:
        if key not in file:
            return None
        h = file[key]
        values = h.values(flow=False).tolist()
        errors = h.errors(flow=False).tolist()
        return values, errors, h.axis(0).edges().tolist(), h.axis(1).edges().tolist()

def write_grids(file_name, grids, recreate):
    out = uproot.recreate(file_name) if recreate else uproot.update(file_name)
    for key, values, errors, x_edges, y_edges in grids:
        h = hist.Hist(
            hist.axis.Variable(x_edges),
            hist.axis.Variable(y_edges),
            storage=hist.storage.Weight(),
        )
        view = h.view()
        view.value = np.array(values)
        view.variance = np.array(errors) ** 2
        if key in out:
            del out[key]
        out[key] = h
    out.close()

def read_tree_columns(file_name, tree, columns):
    with uproot.open(file_name) as file:
        if tree not in file:
            return None
        arrays = file[tree].arrays(columns, library="np")
        return [arrays[c].astype(np.float64).tolist() for c in columns]
"#;

type RawGrid = (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>, Vec<f64>);
type RawKeyedGrid = (String, Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>, Vec<f64>);

/// ROOT files (`.root`) read and written through python `uproot`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RootStore;

impl RootStore {
    fn bridge<'py>(py: Python<'py>) -> PyResult<Bound<'py, PyModule>> {
        PyModule::from_code(py, UPROOT_BRIDGE, c"uproot_bridge.py", c"uproot_bridge")
    }

    /// Read numeric branches of a TTree, converted to f64.
    pub fn read_tree_columns(&self, path: &Path, tree: &str, columns: &[&str]) -> Result<Vec<Vec<f64>>> {
        let file_name = path.to_string_lossy().to_string();
        let branches: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let raw: Option<Vec<Vec<f64>>> = Python::attach(|py| -> PyResult<Option<Vec<Vec<f64>>>> {
            let module = Self::bridge(py)?;
            module
                .getattr("read_tree_columns")?
                .call1((file_name.as_str(), tree, branches))?
                .extract()
        })?;
        raw.ok_or_else(|| Haa4bError::MissingGrid {
            file: path.to_path_buf(),
            key: tree.to_owned(),
        })
    }
}

fn rows(matrix: &nalgebra::DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..matrix.nrows())
        .map(|ix| matrix.row(ix).iter().copied().collect())
        .collect()
}

impl GridStore for RootStore {
    fn extension(&self) -> &'static str {
        "root"
    }

    fn read_grid(&self, path: &Path, key: &str) -> Result<Grid2D> {
        let file_name = path.to_string_lossy().to_string();
        let raw: Option<RawGrid> = Python::attach(|py| -> PyResult<Option<RawGrid>> {
            let module = Self::bridge(py)?;
            module
                .getattr("read_grid")?
                .call1((file_name.as_str(), key))?
                .extract()
        })?;

        let Some((values, errors, x_edges, y_edges)) = raw else {
            return Err(Haa4bError::MissingGrid {
                file: path.to_path_buf(),
                key: key.to_owned(),
            });
        };

        Ok(Grid2D::from_fn(
            Axis::from_edges(x_edges),
            Axis::from_edges(y_edges),
            |ix, iy| (values[ix][iy], errors[ix][iy]),
        ))
    }

    fn write_grids(&self, path: &Path, grids: &[(String, &Grid2D)], mode: FileMode) -> Result<()> {
        let file_name = path.to_string_lossy().to_string();
        let recreate = mode == FileMode::Recreate || !path.exists();
        let raw: Vec<RawKeyedGrid> = grids
            .iter()
            .map(|(key, grid)| {
                (
                    key.clone(),
                    rows(&grid.contents),
                    rows(&grid.errors),
                    grid.x.edges.clone(),
                    grid.y.edges.clone(),
                )
            })
            .collect();

        Python::attach(|py| -> PyResult<()> {
            let module = Self::bridge(py)?;
            module
                .getattr("write_grids")?
                .call1((file_name.as_str(), raw, recreate))?;
            Ok(())
        })?;
        log::debug!("Wrote {} grids to {}", grids.len(), path.display());
        Ok(())
    }
}
