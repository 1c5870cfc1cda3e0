//! Data model for the ensemble docking pipeline.
//!
//! All refs are plain value types identifying an artifact on disk.
//! Identity flows through the pipeline as the
//! `(receptor_id, internal_ligand_id, ligand_name)` key triple: a
//! `MappingEntry` carries the full triple, a `DockResultRef` echoes it
//! back, and the set difference between the two after a batch is what
//! the failure ledger persists.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OxidockError;

/// One `receptor_id,internal_ligand_id` line of the input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPair {
    pub receptor_id: String,
    pub internal_ligand_id: String,
}

/// A downloaded (and possibly single-chain reduced) receptor structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdbStructureRef {
    pub receptor_id: String,
    pub internal_ligand_id: String,
    pub path: PathBuf,
}

/// An energy-minimized receptor structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimizedRef {
    pub receptor_id: String,
    pub internal_ligand_id: String,
    pub path: PathBuf,
}

/// A prepared receptor grid. Immutable once produced by grid generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptorGridRef {
    pub receptor_id: String,
    pub internal_ligand_id: String,
    pub path: PathBuf,
}

/// One independent small-molecule structure to dock.
///
/// `ligand_name` is `{index}-{original_title}`, unique within a run
/// even when the source library contains duplicate titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LigandRef {
    pub ligand_name: String,
    pub path: PathBuf,
}

/// One docking task: a receptor grid paired with a ligand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub grid: ReceptorGridRef,
    pub ligand: LigandRef,
}

impl MappingEntry {
    pub fn key(&self) -> FailureRecord {
        FailureRecord {
            receptor_id: self.grid.receptor_id.clone(),
            internal_ligand_id: self.grid.internal_ligand_id.clone(),
            ligand_name: self.ligand.ligand_name.clone(),
        }
    }
}

/// A task known not to produce a usable result at a given precision.
///
/// Persisted as one `receptor_id,internal_ligand_id,ligand_name` line;
/// fields must not contain commas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureRecord {
    pub receptor_id: String,
    pub internal_ligand_id: String,
    pub ligand_name: String,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.receptor_id, self.internal_ligand_id, self.ligand_name
        )
    }
}

impl FromStr for FailureRecord {
    type Err = OxidockError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split(',').collect();
        match fields.as_slice() {
            [receptor_id, internal_ligand_id, ligand_name] => Ok(Self {
                receptor_id: receptor_id.to_string(),
                internal_ligand_id: internal_ligand_id.to_string(),
                ligand_name: ligand_name.to_string(),
            }),
            _ => Err(OxidockError::Config(format!(
                "malformed ledger line (expected 3 fields): {line:?}"
            ))),
        }
    }
}

/// A completed docking output on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockResultRef {
    pub receptor_id: String,
    pub internal_ligand_id: String,
    pub ligand_name: String,
    pub path: PathBuf,
}

impl DockResultRef {
    pub fn key(&self) -> FailureRecord {
        FailureRecord {
            receptor_id: self.receptor_id.clone(),
            internal_ligand_id: self.internal_ligand_id.clone(),
            ligand_name: self.ligand_name.clone(),
        }
    }
}

/// Docking accuracy tier. Ledgers are kept separately per precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Precision {
    Htvs,
    Sp,
    Xp,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Htvs => "HTVS",
            Precision::Sp => "SP",
            Precision::Xp => "XP",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = OxidockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTVS" => Ok(Precision::Htvs),
            "SP" => Ok(Precision::Sp),
            "XP" => Ok(Precision::Xp),
            other => Err(OxidockError::Config(format!(
                "unknown docking precision: {other:?}"
            ))),
        }
    }
}

/// One structure read out of a multi-structure ligand library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LigandStructure {
    pub title: String,
    /// Experimental activity annotation, when the library carries one.
    pub activity: Option<String>,
    /// Raw structure block, written verbatim to the per-ligand file.
    pub content: String,
}

/// Structured record extracted from one docking result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingData {
    pub receptor_id: String,
    pub internal_ligand_id: String,
    pub ligand_name: String,
    pub precision: Precision,
    pub docking_score: f64,
    pub rmsd: Option<f64>,
    /// Additional per-result fields (MM-GBSA, ADMET, ...), keyed by
    /// whatever the suite reports.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_record_roundtrip() {
        let rec = FailureRecord {
            receptor_id: "3OAP".to_string(),
            internal_ligand_id: "9CR".to_string(),
            ligand_name: "0-Ligand1".to_string(),
        };
        let line = rec.to_string();
        assert_eq!(line, "3OAP,9CR,0-Ligand1");
        assert_eq!(line.parse::<FailureRecord>().unwrap(), rec);
    }

    #[test]
    fn failure_record_rejects_short_line() {
        let err = "3OAP,9CR".parse::<FailureRecord>().unwrap_err();
        assert!(matches!(err, OxidockError::Config(_)));
    }

    #[test]
    fn precision_parse_is_case_insensitive() {
        assert_eq!("sp".parse::<Precision>().unwrap(), Precision::Sp);
        assert_eq!("XP".parse::<Precision>().unwrap(), Precision::Xp);
        assert!("EP".parse::<Precision>().is_err());
    }
}
