use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::Result;

/// Extension of the combine output tables for the current build.
#[cfg(feature = "root")]
pub const TABLE_EXTENSION: &str = "root";
#[cfg(not(feature = "root"))]
pub const TABLE_EXTENSION: &str = "parquet";

/// The `limit` table written by combine: one row per fit, with the fitted `limit` (or test
/// statistic) and its `quantileExpected` tag.
pub struct LimitTable {
    pub frame: DataFrame,
}

impl LimitTable {
    pub fn read(path: &Path) -> Result<Self> {
        #[cfg(feature = "root")]
        if path.extension().is_some_and(|ext| ext == "root") {
            let columns = crate::storage::RootStore.read_tree_columns(
                path,
                "limit",
                &["limit", "quantileExpected"],
            )?;
            let frame = df!(
                "limit" => &columns[0],
                "quantileExpected" => &columns[1],
            )?;
            return Ok(Self { frame });
        }

        let file = File::open(path)?;
        let frame = ParquetReader::new(file).finish()?;
        log::debug!("Read {} rows from {}", frame.height(), path.display());
        Ok(Self { frame })
    }

    fn limit_column(frame: &DataFrame) -> Result<Vec<f64>> {
        let limits = frame.column("limit")?.f64()?;
        Ok(limits.into_iter().flatten().collect())
    }

    /// `limit` of the first row, if any.
    pub fn first_limit(&self) -> Result<Option<f64>> {
        let frame = self
            .frame
            .clone()
            .lazy()
            .limit(1)
            .select([col("limit").cast(DataType::Float64)])
            .collect()?;
        Ok(Self::limit_column(&frame)?.first().copied())
    }

    pub fn limits(&self) -> Result<Vec<f64>> {
        let frame = self
            .frame
            .clone()
            .lazy()
            .select([col("limit").cast(DataType::Float64)])
            .collect()?;
        Self::limit_column(&frame)
    }

    /// Limits of the rows with `predicate` on `quantileExpected`.
    fn limits_where(&self, predicate: Expr) -> Result<Vec<f64>> {
        let frame = self
            .frame
            .clone()
            .lazy()
            .filter(predicate)
            .select([col("limit").cast(DataType::Float64)])
            .collect()?;
        Self::limit_column(&frame)
    }

    /// Median expected limits (`quantileExpected` within 1e-4 of 0.5).
    pub fn expected_limits(&self) -> Result<Vec<f64>> {
        let quantile = col("quantileExpected").cast(DataType::Float64);
        self.limits_where(
            quantile
                .clone()
                .gt(lit(0.5 - 1e-4))
                .and(quantile.lt(lit(0.5 + 1e-4))),
        )
    }

    /// Observed limits (`quantileExpected` == -1).
    pub fn observed_limits(&self) -> Result<Vec<f64>> {
        self.limits_where(col("quantileExpected").cast(DataType::Float64).eq(lit(-1.0)))
    }
}
