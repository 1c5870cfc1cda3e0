//! Narrow interface to the external molecular-modeling suite.
//!
//! The engine never models chemistry; every computational stage goes
//! through [`DockingSuite`]. [`ExternalSuite`] is the production
//! implementation, shelling out to a suite installation on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use oxidock_common::{
    DockResultRef, DockingData, LigandStructure, MappingEntry, MinimizedRef, OxidockError,
    PdbStructureRef, Precision, ReceptorGridRef, Result,
};

/// Receptor preparation switches passed through to the suite.
#[derive(Debug, Clone)]
pub struct MinimizeOptions {
    pub fill_side_chains: bool,
    pub fill_missing_loops: bool,
    pub del_water: bool,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            fill_side_chains: true,
            fill_missing_loops: true,
            del_water: true,
        }
    }
}

/// Canonical location of one docking output below the dockfiles dir.
///
/// Shared by the docking stage (writer) and the extraction fallback
/// that reconstructs expected outputs without an in-memory dock run.
pub fn dock_output_path(
    dockfiles_dir: &Path,
    receptor_id: &str,
    internal_ligand_id: &str,
    ligand_name: &str,
    precision: Precision,
) -> PathBuf {
    dockfiles_dir.join(receptor_id).join(format!(
        "{receptor_id}_{internal_ligand_id}_dock_{ligand_name}_{precision}.maegz"
    ))
}

/// Operations the pipeline needs from the modeling suite.
#[async_trait]
pub trait DockingSuite: Send + Sync {
    /// Reduces a downloaded structure to its first ligand-bearing chain.
    async fn keep_single_chain(&self, structure: &PdbStructureRef) -> Result<PdbStructureRef>;

    /// Prepares and energy-minimizes one receptor structure.
    async fn minimize(
        &self,
        structure: &PdbStructureRef,
        options: &MinimizeOptions,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<MinimizedRef>;

    /// Generates the docking grid for one minimized receptor.
    async fn generate_grid(
        &self,
        minimized: &MinimizedRef,
        box_size: u32,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<ReceptorGridRef>;

    /// Splits a minimized complex into protein/ligand/complex files.
    async fn split_minimized(
        &self,
        minimized: &MinimizedRef,
        protein_dir: &Path,
        ligand_dir: &Path,
        complex_dir: &Path,
    ) -> Result<()>;

    /// Reads all structures out of a multi-structure ligand library.
    async fn read_ligand_library(&self, library: &Path) -> Result<Vec<LigandStructure>>;

    /// Docks one mapping entry, returning the result file reference.
    async fn dock(
        &self,
        entry: &MappingEntry,
        precision: Precision,
        calc_rmsd: bool,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<DockResultRef>;

    /// Extracts the structured record from one docking result.
    async fn extract_docking_data(&self, result: &DockResultRef) -> Result<DockingData>;
}

// ── External suite adapter ────────────────────────────────────────────────────

/// Shells out to a modeling-suite installation rooted at `root`.
///
/// Command layout follows the usual suite conventions: `utilities/`
/// holds preparation helpers, `glide` does grid generation and
/// docking driven by a written job file.
#[derive(Debug, Clone)]
pub struct ExternalSuite {
    root: PathBuf,
    command_timeout: Option<Duration>,
}

impl ExternalSuite {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            command_timeout: None,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn shell_run(&self, program: PathBuf, args: Vec<String>, cwd: &Path) -> Result<String> {
        debug!(program = %program.display(), ?args, cwd = %cwd.display(), "Running suite command");
        let mut command = tokio::process::Command::new(&program);
        command
            .args(&args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.command_timeout {
            Some(deadline) => tokio::time::timeout(deadline, command.output())
                .await
                .map_err(|_| OxidockError::TaskTimeout(deadline))??,
            None => command.output().await?,
        };

        if !output.status.success() {
            return Err(OxidockError::Task(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DockingSuite for ExternalSuite {
    async fn keep_single_chain(&self, structure: &PdbStructureRef) -> Result<PdbStructureRef> {
        let parent = structure
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let output = parent.join(format!("{}_chain.pdb", structure.receptor_id));
        self.shell_run(
            self.root.join("run"),
            vec![
                "keep_single_chain.py".to_string(),
                structure.path.display().to_string(),
                structure.internal_ligand_id.clone(),
                output.display().to_string(),
            ],
            &parent,
        )
        .await?;
        Ok(PdbStructureRef {
            receptor_id: structure.receptor_id.clone(),
            internal_ligand_id: structure.internal_ligand_id.clone(),
            path: output,
        })
    }

    async fn minimize(
        &self,
        structure: &PdbStructureRef,
        options: &MinimizeOptions,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<MinimizedRef> {
        let output = dest_dir.join(format!(
            "{}_{}_minimized.mae",
            structure.receptor_id, structure.internal_ligand_id
        ));
        if output.exists() && !overwrite {
            debug!(receptor = %structure.receptor_id, "Minimized file exists, skipping");
        } else {
            let mut args = Vec::new();
            if options.fill_side_chains {
                args.push("-fillsidechains".to_string());
            }
            if options.fill_missing_loops {
                args.push("-fillloops".to_string());
            }
            if options.del_water {
                args.push("-delwater".to_string());
            }
            args.push(structure.path.display().to_string());
            args.push(output.display().to_string());
            self.shell_run(self.root.join("utilities/prepwizard"), args, dest_dir)
                .await?;
        }
        Ok(MinimizedRef {
            receptor_id: structure.receptor_id.clone(),
            internal_ligand_id: structure.internal_ligand_id.clone(),
            path: output,
        })
    }

    async fn generate_grid(
        &self,
        minimized: &MinimizedRef,
        box_size: u32,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<ReceptorGridRef> {
        let stem = format!(
            "{}_{}",
            minimized.receptor_id, minimized.internal_ligand_id
        );
        let output = dest_dir.join(format!("{stem}_glide_grid.zip"));
        if output.exists() && !overwrite {
            debug!(grid = %output.display(), "Grid file exists, skipping");
        } else {
            let job_file = dest_dir.join(format!("{stem}_grid.in"));
            let job = format!(
                "GRIDFILE {}\nRECEP_FILE {}\nLIGAND_MOLECULE {}\nINNERBOX 10\nOUTERBOX {}\n",
                output.display(),
                minimized.path.display(),
                minimized.internal_ligand_id,
                box_size,
            );
            tokio::fs::write(&job_file, job).await?;
            self.shell_run(
                self.root.join("glide"),
                vec![job_file.display().to_string(), "-WAIT".to_string()],
                dest_dir,
            )
            .await?;
        }
        Ok(ReceptorGridRef {
            receptor_id: minimized.receptor_id.clone(),
            internal_ligand_id: minimized.internal_ligand_id.clone(),
            path: output,
        })
    }

    async fn split_minimized(
        &self,
        minimized: &MinimizedRef,
        protein_dir: &Path,
        ligand_dir: &Path,
        complex_dir: &Path,
    ) -> Result<()> {
        self.shell_run(
            self.root.join("run"),
            vec![
                "split_complex.py".to_string(),
                minimized.path.display().to_string(),
                minimized.internal_ligand_id.clone(),
                protein_dir.display().to_string(),
                ligand_dir.display().to_string(),
                complex_dir.display().to_string(),
            ],
            protein_dir,
        )
        .await?;
        Ok(())
    }

    async fn read_ligand_library(&self, library: &Path) -> Result<Vec<LigandStructure>> {
        let text = tokio::fs::read_to_string(library).await?;
        Ok(parse_sdf_library(&text))
    }

    async fn dock(
        &self,
        entry: &MappingEntry,
        precision: Precision,
        calc_rmsd: bool,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<DockResultRef> {
        let output = dock_output_path(
            dest_dir,
            &entry.grid.receptor_id,
            &entry.grid.internal_ligand_id,
            &entry.ligand.ligand_name,
            precision,
        );
        let receptor_dir = output.parent().unwrap_or(dest_dir).to_path_buf();
        tokio::fs::create_dir_all(&receptor_dir).await?;

        if output.exists() && !overwrite {
            debug!(result = %output.display(), "Dock result exists, skipping");
        } else {
            let job_file = receptor_dir.join(format!(
                "{}_{}_dock_{}_{precision}.in",
                entry.grid.receptor_id, entry.grid.internal_ligand_id, entry.ligand.ligand_name
            ));
            let mut job = format!(
                "GRIDFILE {}\nLIGANDFILE {}\nPRECISION {precision}\nOUTPUTFILE {}\n",
                entry.grid.path.display(),
                entry.ligand.path.display(),
                output.display(),
            );
            if calc_rmsd {
                job.push_str("CALC_INPUT_RMS TRUE\n");
            }
            tokio::fs::write(&job_file, job).await?;
            self.shell_run(
                self.root.join("glide"),
                vec![job_file.display().to_string(), "-WAIT".to_string()],
                &receptor_dir,
            )
            .await?;
        }
        Ok(DockResultRef {
            receptor_id: entry.grid.receptor_id.clone(),
            internal_ligand_id: entry.grid.internal_ligand_id.clone(),
            ligand_name: entry.ligand.ligand_name.clone(),
            path: output,
        })
    }

    async fn extract_docking_data(&self, result: &DockResultRef) -> Result<DockingData> {
        let cwd = result
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let stdout = self
            .shell_run(
                self.root.join("utilities/proplister"),
                vec![
                    "-all".to_string(),
                    result.path.display().to_string(),
                ],
                &cwd,
            )
            .await?;
        let properties = parse_property_output(&stdout);

        let docking_score = properties
            .get("docking_score")
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| {
                OxidockError::Task(format!(
                    "no docking score in {}",
                    result.path.display()
                ))
            })?;
        let rmsd = properties.get("rmsd").and_then(|v| v.parse::<f64>().ok());
        let precision = precision_from_path(&result.path)?;

        let extra = properties
            .into_iter()
            .filter(|(key, _)| key != "docking_score" && key != "rmsd")
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect();

        Ok(DockingData {
            receptor_id: result.receptor_id.clone(),
            internal_ligand_id: result.internal_ligand_id.clone(),
            ligand_name: result.ligand_name.clone(),
            precision,
            docking_score,
            rmsd,
            extra,
        })
    }
}

/// Recovers the precision tier from a dock-result file name
/// (`..._dock_<ligand>_<precision>.maegz`).
fn precision_from_path(path: &Path) -> Result<Precision> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit('_').next())
        .ok_or_else(|| {
            OxidockError::Task(format!("unrecognized result file name: {}", path.display()))
        })?
        .parse()
}

/// Splits an SDF-format library into its records. Title is the first
/// line of each record; the `activity` data field is carried through
/// when present.
fn parse_sdf_library(text: &str) -> Vec<LigandStructure> {
    text.split("$$$$")
        .map(|block| block.trim_start_matches('\n'))
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let title = block
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            let mut activity = None;
            let mut lines = block.lines();
            while let Some(line) = lines.next() {
                let tag = line.trim().to_ascii_lowercase();
                if tag.starts_with("> ") && tag.contains("<activity>") {
                    activity = lines.next().map(|v| v.trim().to_string());
                    break;
                }
            }
            LigandStructure {
                title,
                activity,
                content: format!("{}\n$$$$\n", block.trim_end()),
            }
        })
        .collect()
}

/// Parses `key = value` property lines from the extraction utility.
fn parse_property_output(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
