//! Typed grid identifiers.
//!
//! Grids are named `{cat}_{sample}_{year}_{mass}_{wp}_{region}_{syst}[_rebin{k}]` in storage,
//! e.g. `gg0lIncl_MCsmooth2_toy12_2018_pnet_WP40_Pass_Nom`. Inside the crate the name is carried
//! as a [`GridId`] and only rendered (or parsed) when a grid is read or written.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Haa4bError, Result};
use crate::histoer::grid::Grid2D;

static GRID_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<cat>[^_]+)_(?P<sample>.+)_(?P<year>\d{4})_(?P<mass>[^_]+)_(?P<wp>WP\d+)_(?P<region>Pass|Fail|Ratio)_(?P<syst>[^_]+)(?:_rebin(?P<rebin>\d+))?$",
    )
    .expect("grid name pattern compiles")
});

static DRAW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<template>.+?)_(?:toy(?P<toy>\d+)|(?P<avg>\d+)toyAvg|(?P<var>\d+)toyVarSq)$")
        .expect("draw pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum Region {
    Pass,
    Fail,
    Ratio,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Pass => "Pass",
            Region::Fail => "Fail",
            Region::Ratio => "Ratio",
        }
    }
}

/// Which template a grid belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum Template {
    Data,
    Mc,
    McSmooth1,
    McSmooth2,
    McRounded,
    /// A single simulated process, e.g. `TT1l` or `WHtoaato4b_mA_30`
    Process(String),
}

impl Template {
    pub fn as_str(&self) -> &str {
        match self {
            Template::Data => "Data",
            Template::Mc => "MC",
            Template::McSmooth1 => "MCsmooth1",
            Template::McSmooth2 => "MCsmooth2",
            Template::McRounded => "MCrounded",
            Template::Process(name) => name,
        }
    }

    /// Only smoothed MC and data may seed toys.
    pub fn allows_toys(&self) -> bool {
        matches!(self, Template::McSmooth1 | Template::McSmooth2 | Template::Data)
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        match value {
            "Data" => Template::Data,
            "MC" => Template::Mc,
            "MCsmooth1" => Template::McSmooth1,
            "MCsmooth2" => Template::McSmooth2,
            "MCrounded" => Template::McRounded,
            other => Template::Process(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum Draw {
    Nominal,
    Toy(usize),
    /// Mean over this many toys
    ToyAvg(usize),
    /// Variance over this many toys
    ToyVarSq(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct Sample {
    pub template: Template,
    pub draw: Draw,
}

impl Sample {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            draw: Draw::Nominal,
        }
    }

    pub fn with_draw(&self, draw: Draw) -> Self {
        Self {
            template: self.template.clone(),
            draw,
        }
    }
}

impl Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let template = self.template.as_str();
        match self.draw {
            Draw::Nominal => write!(f, "{}", template),
            Draw::Toy(index) => write!(f, "{}_toy{}", template, index),
            Draw::ToyAvg(n) => write!(f, "{}_{}toyAvg", template, n),
            Draw::ToyVarSq(n) => write!(f, "{}_{}toyVarSq", template, n),
        }
    }
}

impl FromStr for Sample {
    type Err = Haa4bError;

    fn from_str(s: &str) -> Result<Self> {
        let Some(captures) = DRAW_RE.captures(s) else {
            return Ok(Sample::new(Template::from(s)));
        };
        let template = Template::from(&captures["template"]);
        let number = |name: &str| -> Result<Option<usize>> {
            captures
                .name(name)
                .map(|m| m.as_str().parse::<usize>())
                .transpose()
                .map_err(|_| Haa4bError::InvalidName(s.to_owned()))
        };
        let draw = if let Some(index) = number("toy")? {
            Draw::Toy(index)
        } else if let Some(n) = number("avg")? {
            Draw::ToyAvg(n)
        } else if let Some(n) = number("var")? {
            Draw::ToyVarSq(n)
        } else {
            Draw::Nominal
        };
        Ok(Sample { template, draw })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct GridId {
    pub category: String,
    pub sample: Sample,
    pub year: String,
    pub mass: String,
    pub working_point: String,
    pub region: Region,
    pub syst: String,
    pub rebin: Option<usize>,
}

impl GridId {
    pub fn new(
        category: &str,
        template: Template,
        year: &str,
        mass: &str,
        working_point: &str,
        region: Region,
    ) -> Self {
        Self {
            category: category.to_owned(),
            sample: Sample::new(template),
            year: year.to_owned(),
            mass: mass.to_owned(),
            working_point: working_point.to_owned(),
            region,
            syst: "Nom".to_owned(),
            rebin: None,
        }
    }

    pub fn template(&self) -> &Template {
        &self.sample.template
    }

    pub fn with_template(&self, template: Template) -> Self {
        let mut id = self.clone();
        id.sample = Sample::new(template);
        id
    }

    pub fn with_draw(&self, draw: Draw) -> Self {
        let mut id = self.clone();
        id.sample = self.sample.with_draw(draw);
        id
    }

    pub fn with_region(&self, region: Region) -> Self {
        let mut id = self.clone();
        id.region = region;
        id
    }

    pub fn with_working_point(&self, working_point: &str) -> Self {
        let mut id = self.clone();
        id.working_point = working_point.to_owned();
        id
    }

    pub fn with_rebin(&self, rebin: usize) -> Self {
        let mut id = self.clone();
        id.rebin = Some(rebin);
        id
    }

    /// Stem of the file a single toy (or rounded template) is written to, e.g. `LepHi_MCsmooth2_toy3_2018`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}_{}", self.category, self.sample, self.year)
    }
}

impl Display for GridId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{}_{}",
            self.category,
            self.sample,
            self.year,
            self.mass,
            self.working_point,
            self.region.as_str(),
            self.syst
        )?;
        if let Some(rebin) = self.rebin {
            write!(f, "_rebin{}", rebin)?;
        }
        Ok(())
    }
}

impl FromStr for GridId {
    type Err = Haa4bError;

    fn from_str(s: &str) -> Result<Self> {
        let captures = GRID_NAME_RE
            .captures(s)
            .ok_or_else(|| Haa4bError::InvalidName(s.to_owned()))?;
        let region = match &captures["region"] {
            "Pass" => Region::Pass,
            "Fail" => Region::Fail,
            _ => Region::Ratio,
        };
        let rebin = captures
            .name("rebin")
            .map(|m| m.as_str().parse::<usize>())
            .transpose()
            .map_err(|_| Haa4bError::InvalidName(s.to_owned()))?;
        Ok(GridId {
            category: captures["cat"].to_owned(),
            sample: captures["sample"].parse()?,
            year: captures["year"].to_owned(),
            mass: captures["mass"].to_owned(),
            working_point: captures["wp"].to_owned(),
            region,
            syst: captures["syst"].to_owned(),
            rebin,
        })
    }
}

/// A grid together with its identifier.
#[derive(Debug, Clone)]
pub struct NamedGrid {
    pub id: GridId,
    pub grid: Grid2D,
}

impl NamedGrid {
    pub fn new(id: GridId, grid: Grid2D) -> Self {
        Self { id, grid }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// Copy of the grid under a different identifier.
    pub fn renamed(&self, id: GridId) -> Self {
        Self {
            id,
            grid: self.grid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nominal() {
        let id = GridId::new("gg0lIncl", Template::Mc, "2018", "pnet", "WP40", Region::Pass);
        assert_eq!(id.to_string(), "gg0lIncl_MC_2018_pnet_WP40_Pass_Nom");
        assert_eq!(id.file_stem(), "gg0lIncl_MC_2018");
    }

    #[test]
    fn test_render_toy_variants() {
        let id = GridId::new("LepHi", Template::McSmooth2, "2018", "pnet", "WP60", Region::Fail);
        assert_eq!(
            id.with_draw(Draw::Toy(12)).to_string(),
            "LepHi_MCsmooth2_toy12_2018_pnet_WP60_Fail_Nom"
        );
        assert_eq!(
            id.with_draw(Draw::ToyAvg(500)).to_string(),
            "LepHi_MCsmooth2_500toyAvg_2018_pnet_WP60_Fail_Nom"
        );
        assert_eq!(
            id.with_draw(Draw::ToyVarSq(500)).with_rebin(3).to_string(),
            "LepHi_MCsmooth2_500toyVarSq_2018_pnet_WP60_Fail_Nom_rebin3"
        );
        assert_eq!(id.with_draw(Draw::Toy(4)).file_stem(), "LepHi_MCsmooth2_toy4_2018");
    }

    #[test]
    fn test_parse_process_with_underscores() {
        let id: GridId = "LepLo_WHtoaato4b_mA_30_2018_pnet_WP60_Pass_Nom".parse().unwrap();
        assert_eq!(id.category, "LepLo");
        assert_eq!(
            id.sample.template,
            Template::Process("WHtoaato4b_mA_30".to_owned())
        );
        assert_eq!(id.sample.draw, Draw::Nominal);
        assert_eq!(id.region, Region::Pass);
    }

    #[test]
    fn test_parse_toy_and_rebin() {
        let id: GridId = "gg0lIncl_Data_toy7_2018_pnet_WP40_Ratio_Nom_rebin2".parse().unwrap();
        assert_eq!(id.sample.template, Template::Data);
        assert_eq!(id.sample.draw, Draw::Toy(7));
        assert_eq!(id.region, Region::Ratio);
        assert_eq!(id.rebin, Some(2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "not_a_grid".parse::<GridId>(),
            Err(Haa4bError::InvalidName(_))
        ));
    }

    #[test]
    fn test_toy_sources() {
        assert!(Template::McSmooth2.allows_toys());
        assert!(Template::Data.allows_toys());
        assert!(!Template::Mc.allows_toys());
        assert!(!Template::Process("TT1l".to_owned()).allows_toys());
    }
}
