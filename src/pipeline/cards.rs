//! Fit configuration cards.
//!
//! Every pseudo-data variant gets its own copy of the category card template with
//! `PROCESSES.data_obs.ALIAS` pointing at the variant's grid file stem.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{Haa4bError, Result};

pub struct CardTemplate {
    path: PathBuf,
    card: Value,
}

impl CardTemplate {
    /// Load `{dir}/{category}_Htoaato4b.json`.
    pub fn load(dir: &Path, category: &str) -> Result<Self> {
        let path = dir.join(format!("{}_Htoaato4b.json", category));
        let file = std::fs::File::open(&path)?;
        let card: Value = serde_json::from_reader(std::io::BufReader::new(file))?;
        let template = Self { path, card };
        // fail before writing anything if the alias cannot be set
        template.with_alias("")?;
        Ok(template)
    }

    /// Copy of the card with the observed-data alias replaced.
    pub fn with_alias(&self, alias: &str) -> Result<Value> {
        let mut card = self.card.clone();
        let entry = card
            .get_mut("PROCESSES")
            .and_then(|processes| processes.get_mut("data_obs"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Haa4bError::InvalidCard(self.path.clone()))?;
        entry.insert("ALIAS".to_owned(), Value::String(alias.to_owned()));
        Ok(card)
    }

    /// Write a copy of the card for `alias` to `path`, indented by 4 spaces.
    pub fn write(&self, path: &Path, alias: &str) -> Result<()> {
        let card = self.with_alias(alias)?;
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(file, formatter);
        card.serialize(&mut serializer)?;
        serializer.into_inner().flush()?;
        log::debug!("Wrote {} (data_obs = {})", path.display(), alias);
        Ok(())
    }
}

/// One card to write: output file and the data alias it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct CardRequest {
    pub path: PathBuf,
    pub alias: String,
}

/// Write every requested card from the template. Returns the number of files written.
pub fn write_cards(template: &CardTemplate, requests: &[CardRequest]) -> Result<usize> {
    for request in requests {
        if let Some(parent) = request.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        template.write(&request.path, &request.alias)?;
    }
    Ok(requests.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"{
    "NAME": "LepHi",
    "PROCESSES": {
        "data_obs": {"ALIAS": "LepHi_Data_2018", "TYPE": "DATA", "COLOR": 1},
        "WHtoaato4b_mA_30": {"TYPE": "SIGNAL"}
    },
    "GLOBAL": {"HIST": "LepHi_$process_2018_pnet_WP60_$region_Nom"}
}"#;

    fn template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("LepHi_Htoaato4b.json"), TEMPLATE).unwrap();
        dir
    }

    #[test]
    fn test_alias_rewritten_and_rest_kept() {
        let dir = template_dir();
        let template = CardTemplate::load(dir.path(), "LepHi").unwrap();
        let out = dir.path().join("mctoysjson/LepHi/LepHi_Htoaato4b_mctoy3.json");
        let written = write_cards(
            &template,
            &[CardRequest {
                path: out.clone(),
                alias: "LepHi_MCsmooth2_toy3_2018".to_owned(),
            }],
        )
        .unwrap();
        assert_eq!(written, 1);

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("\n    \"GLOBAL\""));
        let card: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(card["PROCESSES"]["data_obs"]["ALIAS"], "LepHi_MCsmooth2_toy3_2018");
        assert_eq!(card["PROCESSES"]["data_obs"]["TYPE"], "DATA");
        assert_eq!(card["PROCESSES"]["WHtoaato4b_mA_30"]["TYPE"], "SIGNAL");
        assert_eq!(card["GLOBAL"]["HIST"], "LepHi_$process_2018_pnet_WP60_$region_Nom");
    }

    #[test]
    fn test_template_without_data_obs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("LepLo_Htoaato4b.json"), r#"{"PROCESSES": {}}"#).unwrap();
        assert!(matches!(
            CardTemplate::load(dir.path(), "LepLo"),
            Err(Haa4bError::InvalidCard(_))
        ));
    }

    #[test]
    fn test_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CardTemplate::load(dir.path(), "LepLo"),
            Err(Haa4bError::File(_))
        ));
    }
}
