//! Engine configuration.
//! Reads oxidock.toml from the current directory or the path in the
//! OXIDOCK_CONFIG env var.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use oxidock_common::{InputPair, OxidockError, Precision, Result};

use crate::runner;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Working directory owning the artifact subdirectories.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Input list of `receptor_id,internal_ligand_id` pairs.
    pub input_list: PathBuf,
    /// Multi-structure ligand library to split and dock.
    pub ligand_library: PathBuf,
    /// Root of the external modeling-suite installation.
    pub suite_root: PathBuf,
    #[serde(default = "runner::default_workers")]
    pub workers: usize,
    /// Per-task wall-clock limit in seconds; absent means unbounded.
    pub task_timeout_secs: Option<u64>,
    #[serde(default = "default_box_size")]
    pub grid_box_size: u32,
    #[serde(default = "default_precision")]
    pub precision: Precision,
    #[serde(default)]
    pub calc_rmsd: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_keep_single_chain")]
    pub keep_single_chain: bool,
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}
fn default_box_size() -> u32 {
    20
}
fn default_precision() -> Precision {
    Precision::Sp
}
fn default_keep_single_chain() -> bool {
    true
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            OxidockError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        toml::from_str(&text).map_err(|e| {
            OxidockError::Config(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Loads from an explicit path, the OXIDOCK_CONFIG env var, or
    /// ./oxidock.toml, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("OXIDOCK_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("oxidock.toml")),
        };
        Self::from_file(&path)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

/// Parses the input list: one `receptor_id,internal_ligand_id` pair
/// per line, blank lines and `#` comments skipped.
pub fn parse_input_list(path: &Path) -> Result<Vec<InputPair>> {
    let text = fs::read_to_string(path).map_err(|e| {
        OxidockError::Config(format!("cannot read input list {}: {e}", path.display()))
    })?;

    let mut pairs = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        match fields.as_slice() {
            [receptor_id, internal_ligand_id]
                if !receptor_id.is_empty() && !internal_ligand_id.is_empty() =>
            {
                pairs.push(InputPair {
                    receptor_id: receptor_id.to_string(),
                    internal_ligand_id: internal_ligand_id.to_string(),
                });
            }
            _ => {
                return Err(OxidockError::Config(format!(
                    "malformed input pair at {}:{}: {line:?}",
                    path.display(),
                    number + 1
                )));
            }
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_fills_defaults() {
        let toml = r#"
            input_list = "input.csv"
            ligand_library = "ligands.sdf"
            suite_root = "/opt/suite"
        "#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.workdir, PathBuf::from("."));
        assert_eq!(cfg.grid_box_size, 20);
        assert_eq!(cfg.precision, Precision::Sp);
        assert!(cfg.workers >= 1);
        assert!(cfg.task_timeout().is_none());
        assert!(!cfg.calc_rmsd);
        assert!(cfg.keep_single_chain);
    }

    #[test]
    fn config_honors_explicit_values() {
        let toml = r#"
            workdir = "/data/run1"
            input_list = "input.csv"
            ligand_library = "ligands.sdf"
            suite_root = "/opt/suite"
            workers = 6
            task_timeout_secs = 900
            precision = "XP"
            calc_rmsd = true
        "#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.workers, 6);
        assert_eq!(cfg.task_timeout(), Some(Duration::from_secs(900)));
        assert_eq!(cfg.precision, Precision::Xp);
        assert!(cfg.calc_rmsd);
    }

    #[test]
    fn input_list_parses_pairs_and_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# receptor,ligand").unwrap();
        writeln!(file, "3OAP,9CR").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "1XLS, 9RA").unwrap();
        let pairs = parse_input_list(file.path()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].receptor_id, "3OAP");
        assert_eq!(pairs[1].internal_ligand_id, "9RA");
    }

    #[test]
    fn input_list_rejects_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3OAP").unwrap();
        assert!(matches!(
            parse_input_list(file.path()),
            Err(OxidockError::Config(_))
        ));
    }
}
