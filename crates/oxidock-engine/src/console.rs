//! Ensemble docking console.
//!
//! Owns the working-directory layout and drives the pipeline stages in
//! order: download → single-chain → minimize → grid-generate →
//! ligand-split → map → dock → extract. Each stage feeds the next; a
//! stage invoked before its prerequisite produced output fails with a
//! prerequisite error naming the missing stage. Stages are idempotent
//! at the file level (existing artifacts are kept unless overwrite is
//! set) but re-running a stage replaces its in-memory result list.
//!
//! After docking, the expected key set (the submitted mapping) is
//! reconciled against the produced results and the difference is
//! persisted to the failure ledger for the batch's precision.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use oxidock_common::{
    DockResultRef, DockingData, FailureRecord, InputPair, LigandRef, MappingEntry, MinimizedRef,
    OxidockError, PdbStructureRef, Precision, ReceptorGridRef, Result,
};

use crate::download::PdbDownloader;
use crate::ledger::FailureLedger;
use crate::mapping;
use crate::runner::{self, run_batch, BatchOptions, BatchProgress};
use crate::suite::{dock_output_path, DockingSuite, MinimizeOptions};

/// Fixed artifact directories under the working directory, created
/// eagerly at console construction.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub root: PathBuf,
    pub pdb: PathBuf,
    pub minimize: PathBuf,
    pub grid: PathBuf,
    pub ligands: PathBuf,
    pub complex: PathBuf,
    pub protein: PathBuf,
    pub dockfiles: PathBuf,
    pub result: PathBuf,
}

impl WorkDirs {
    pub fn create(root: &Path) -> Result<Self> {
        let dirs = Self {
            root: root.to_path_buf(),
            pdb: root.join("pdb"),
            minimize: root.join("minimize"),
            grid: root.join("grid"),
            ligands: root.join("ligands"),
            complex: root.join("complex"),
            protein: root.join("protein"),
            dockfiles: root.join("dockfiles"),
            result: root.join("result"),
        };
        for dir in [
            &dirs.pdb,
            &dirs.minimize,
            &dirs.grid,
            &dirs.ligands,
            &dirs.complex,
            &dirs.protein,
            &dirs.dockfiles,
            &dirs.result,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(dirs)
    }
}

pub struct EnsembleConsole {
    suite: Arc<dyn DockingSuite>,
    dirs: WorkDirs,
    pairs: Vec<InputPair>,
    workers: usize,
    task_timeout: Option<Duration>,
    downloader: PdbDownloader,
    ledger: FailureLedger,
    progress: Option<broadcast::Sender<BatchProgress>>,

    pdb_files: Option<Vec<PdbStructureRef>>,
    minimized: Option<Vec<MinimizedRef>>,
    grids: Option<Vec<ReceptorGridRef>>,
    ligands: Option<Vec<LigandRef>>,
    mapping: Option<Vec<MappingEntry>>,
    dock_results: Option<Vec<DockResultRef>>,
}

impl EnsembleConsole {
    pub fn new(
        suite: Arc<dyn DockingSuite>,
        workdir: &Path,
        pairs: Vec<InputPair>,
    ) -> Result<Self> {
        let dirs = WorkDirs::create(workdir)?;
        let ledger = FailureLedger::new(&dirs.result);
        Ok(Self {
            suite,
            dirs,
            pairs,
            workers: runner::default_workers(),
            task_timeout: None,
            downloader: PdbDownloader::new()?,
            ledger,
            progress: None,
            pdb_files: None,
            minimized: None,
            grids: None,
            ligands: None,
            mapping: None,
            dock_results: None,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<BatchProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn dirs(&self) -> &WorkDirs {
        &self.dirs
    }

    pub fn input_pairs(&self) -> &[InputPair] {
        &self.pairs
    }

    pub fn mapping(&self) -> Option<&[MappingEntry]> {
        self.mapping.as_deref()
    }

    /// Unique receptor ids, in input order.
    fn pdb_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pairs
            .iter()
            .filter(|pair| seen.insert(pair.receptor_id.clone()))
            .map(|pair| pair.receptor_id.clone())
            .collect()
    }

    fn batch_options(&self, job_name: &str) -> BatchOptions {
        BatchOptions::new(job_name, self.workers).with_timeout(self.task_timeout)
    }

    /// Downloads every receptor structure on the input list, all
    /// concurrently, and joins before returning.
    pub async fn download_all(&mut self, overwrite: bool) -> Result<()> {
        let ids = self.pdb_ids();
        info!(structures = ids.len(), "Downloading receptor structures");
        self.downloader
            .download_list(&ids, &self.dirs.pdb, overwrite)
            .await?;
        self.pdb_files = Some(
            self.pairs
                .iter()
                .map(|pair| PdbStructureRef {
                    receptor_id: pair.receptor_id.clone(),
                    internal_ligand_id: pair.internal_ligand_id.clone(),
                    path: self.dirs.pdb.join(format!("{}.pdb", pair.receptor_id)),
                })
                .collect(),
        );
        Ok(())
    }

    /// Reduces every downloaded structure to a single ligand-bearing
    /// chain. Sequential; the input list is short.
    pub async fn keep_single_chain(&mut self) -> Result<()> {
        let structures = self
            .pdb_files
            .as_deref()
            .ok_or(OxidockError::Prerequisite("download_all"))?;
        debug!(structures = structures.len(), "Reducing to single chains");
        // The downloaded refs are replaced only once every structure
        // reduced; a mid-loop failure leaves them intact for a retry.
        let mut reduced = Vec::with_capacity(structures.len());
        for structure in structures {
            reduced.push(self.suite.keep_single_chain(structure).await?);
        }
        self.pdb_files = Some(reduced);
        Ok(())
    }

    /// Downloads (and optionally single-chain reduces) the input
    /// structures, then minimizes them through the worker pool.
    pub async fn minimize_all(
        &mut self,
        options: &MinimizeOptions,
        keep_single_chain: bool,
        overwrite: bool,
    ) -> Result<&[MinimizedRef]> {
        info!(pairs = self.pairs.len(), "Preparing and minimizing structures");
        self.download_all(overwrite).await?;
        if keep_single_chain {
            self.keep_single_chain().await?;
        }
        let structures = self
            .pdb_files
            .clone()
            .ok_or(OxidockError::Prerequisite("download_all"))?;

        let suite = self.suite.clone();
        let dest = self.dirs.minimize.clone();
        let options = options.clone();
        let results = run_batch(
            move |structure: PdbStructureRef| {
                let suite = suite.clone();
                let dest = dest.clone();
                let options = options.clone();
                async move { suite.minimize(&structure, &options, &dest, overwrite).await }
            },
            structures,
            &self.batch_options("Minimizing Structures"),
            self.progress.clone(),
        )
        .await?;

        self.minimized = Some(results);
        Ok(self.minimized.as_deref().unwrap_or_default())
    }

    /// Generates a docking grid for every minimized structure.
    pub async fn generate_grids(
        &mut self,
        box_size: u32,
        overwrite: bool,
    ) -> Result<&[ReceptorGridRef]> {
        let minimized = self
            .minimized
            .clone()
            .ok_or(OxidockError::Prerequisite("minimize_all"))?;
        info!(structures = minimized.len(), box_size, "Generating grids");

        let suite = self.suite.clone();
        let dest = self.dirs.grid.clone();
        let results = run_batch(
            move |min: MinimizedRef| {
                let suite = suite.clone();
                let dest = dest.clone();
                async move { suite.generate_grid(&min, box_size, &dest, overwrite).await }
            },
            minimized,
            &self.batch_options("Generating Grids"),
            self.progress.clone(),
        )
        .await?;

        self.grids = Some(results);
        Ok(self.grids.as_deref().unwrap_or_default())
    }

    /// Splits every minimized complex into protein/ligand/complex
    /// files. Sequential, as in the original pipeline.
    pub async fn split_minimized(&self) -> Result<()> {
        let minimized = self
            .minimized
            .as_deref()
            .ok_or(OxidockError::Prerequisite("minimize_all"))?;
        debug!(
            structures = minimized.len(),
            protein_dir = %self.dirs.protein.display(),
            ligand_dir = %self.dirs.ligands.display(),
            complex_dir = %self.dirs.complex.display(),
            "Splitting minimized complexes"
        );
        for min in minimized {
            self.suite
                .split_minimized(min, &self.dirs.protein, &self.dirs.ligands, &self.dirs.complex)
                .await?;
        }
        Ok(())
    }

    /// Splits the external ligand library into independent per-ligand
    /// files named `{index}-{title}`, and writes the label.csv
    /// activity index alongside them.
    ///
    /// Titles are sanitized here, at the single point where ligand
    /// names are minted: the name ends up in comma-delimited ledger
    /// and label lines and in file names, so commas and path
    /// separators are replaced with underscores.
    pub async fn split_ligands(&mut self, library: &Path, overwrite: bool) -> Result<&[LigandRef]> {
        debug!(library = %library.display(), "Splitting ligand library");
        let structures = self.suite.read_ligand_library(library).await?;

        let mut labels = Vec::with_capacity(structures.len());
        let mut ligands = Vec::with_capacity(structures.len());
        for (index, structure) in structures.iter().enumerate() {
            let title = sanitize_title(&structure.title);
            if title != structure.title {
                warn!(
                    original = %structure.title,
                    sanitized = %title,
                    "Ligand title contains reserved characters"
                );
            }
            let name = format!("{index}-{title}");
            labels.push(format!(
                "{name},{}",
                structure.activity.clone().unwrap_or_default()
            ));
            let path = self.dirs.ligands.join(format!("{name}.mae"));
            if !path.exists() || overwrite {
                tokio::fs::write(&path, &structure.content).await?;
            }
            ligands.push(LigandRef {
                ligand_name: name,
                path,
            });
        }
        tokio::fs::write(self.dirs.ligands.join("label.csv"), labels.join("\n")).await?;

        info!(ligands = ligands.len(), "Ligand library split");
        self.ligands = Some(ligands);
        Ok(self.ligands.as_deref().unwrap_or_default())
    }

    /// Builds the full receptor-grid × ligand mapping, excluding pairs
    /// recorded as failed at this precision.
    pub async fn build_mapping(&mut self, precision: Precision) -> Result<&[MappingEntry]> {
        let grids = self
            .grids
            .as_deref()
            .ok_or(OxidockError::Prerequisite("generate_grids"))?;
        let ligands = self
            .ligands
            .as_deref()
            .ok_or(OxidockError::Prerequisite("split_ligands"))?;

        let excluded = self.ledger.load(precision)?;
        let mapping = mapping::build(grids, ligands, &excluded);
        info!(
            entries = mapping.len(),
            excluded = excluded.len(),
            precision = %precision,
            "Mapping built"
        );
        self.mapping = Some(mapping);
        Ok(self.mapping.as_deref().unwrap_or_default())
    }

    /// Docks every mapping entry through the worker pool, then
    /// reconciles expected vs. produced keys into the failure ledger.
    pub async fn dock_all(
        &mut self,
        precision: Precision,
        calc_rmsd: bool,
        overwrite: bool,
    ) -> Result<&[DockResultRef]> {
        let mapping = self
            .mapping
            .clone()
            .ok_or(OxidockError::Prerequisite("build_mapping"))?;
        info!(
            jobs = mapping.len(),
            precision = %precision,
            calc_rmsd,
            workers = self.workers,
            "Starting ensemble docking"
        );

        let suite = self.suite.clone();
        let dest = self.dirs.dockfiles.clone();
        let results = run_batch(
            move |entry: MappingEntry| {
                let suite = suite.clone();
                let dest = dest.clone();
                async move { suite.dock(&entry, precision, calc_rmsd, &dest, overwrite).await }
            },
            mapping.clone(),
            &self.batch_options("Ensemble Docking"),
            self.progress.clone(),
        )
        .await?;

        let expected: HashSet<FailureRecord> = mapping.iter().map(MappingEntry::key).collect();
        let actual: HashSet<FailureRecord> = results.iter().map(DockResultRef::key).collect();
        let newly_failed: HashSet<FailureRecord> =
            expected.difference(&actual).cloned().collect();
        if !newly_failed.is_empty() {
            warn!(
                failed = newly_failed.len(),
                precision = %precision,
                "Some docking tasks produced no result"
            );
        }
        self.ledger.record(precision, &newly_failed)?;

        self.dock_results = Some(results);
        Ok(self.dock_results.as_deref().unwrap_or_default())
    }

    /// Extracts structured records from the docking results. When no
    /// dock run is held in memory, the expected result files are
    /// reconstructed from the input pairs and split ligands, minus the
    /// ledger for this precision.
    pub async fn extract_all(&mut self, precision: Precision) -> Result<Vec<DockingData>> {
        let results = match &self.dock_results {
            Some(results) => results.clone(),
            None => self.reconstruct_dock_results(precision)?,
        };
        info!(results = results.len(), "Extracting docking data");

        let suite = self.suite.clone();
        run_batch(
            move |result: DockResultRef| {
                let suite = suite.clone();
                async move { suite.extract_docking_data(&result).await }
            },
            results,
            &self.batch_options("Extract Docking Data"),
            self.progress.clone(),
        )
        .await
    }

    fn reconstruct_dock_results(&self, precision: Precision) -> Result<Vec<DockResultRef>> {
        let ligands = self
            .ligands
            .as_deref()
            .ok_or(OxidockError::Prerequisite("split_ligands"))?;
        let failed = self.ledger.load(precision)?;

        let mut results = Vec::new();
        for pair in &self.pairs {
            for ligand in ligands {
                let key = FailureRecord {
                    receptor_id: pair.receptor_id.clone(),
                    internal_ligand_id: pair.internal_ligand_id.clone(),
                    ligand_name: ligand.ligand_name.clone(),
                };
                if failed.contains(&key) {
                    debug!(key = %key, "Skipping failed pair during extraction");
                    continue;
                }
                results.push(DockResultRef {
                    path: dock_output_path(
                        &self.dirs.dockfiles,
                        &pair.receptor_id,
                        &pair.internal_ligand_id,
                        &ligand.ligand_name,
                        precision,
                    ),
                    receptor_id: key.receptor_id,
                    internal_ligand_id: key.internal_ligand_id,
                    ligand_name: key.ligand_name,
                });
            }
        }
        Ok(results)
    }
}

fn sanitize_title(title: &str) -> String {
    title.replace([',', '/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_with_reserved_characters_are_rewritten() {
        assert_eq!(sanitize_title("Lig,A"), "Lig_A");
        assert_eq!(sanitize_title("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_title("plain"), "plain");
    }

    #[test]
    fn workdirs_are_created_eagerly_and_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::create(dir.path()).unwrap();
        for sub in ["pdb", "minimize", "grid", "ligands", "complex", "protein", "dockfiles", "result"] {
            assert!(dir.path().join(sub).is_dir(), "missing {sub}");
        }
        // Re-creation over an existing layout must not fail.
        WorkDirs::create(dir.path()).unwrap();
        assert_eq!(dirs.result, dir.path().join("result"));
    }
}
