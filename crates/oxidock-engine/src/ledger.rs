//! Persisted failure ledger.
//!
//! One ledger file per docking precision, living in the result
//! directory as `docking_failed_<precision>.csv`: one
//! `receptor_id,internal_ligand_id,ligand_name` triple per line, no
//! header. Entries gate the mapping builder (excluded pairs are never
//! resubmitted) and are rewritten after each batch's reconciliation.
//!
//! `record` overwrites the file with exactly the set computed for the
//! current run rather than merging with prior content: excluded pairs
//! never re-enter a mapping, so they cannot reappear in a new failure
//! set. No file locking is done; concurrent runs sharing a workdir are
//! unsafe.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use oxidock_common::{FailureRecord, Precision, Result};

#[derive(Debug, Clone)]
pub struct FailureLedger {
    result_dir: PathBuf,
}

impl FailureLedger {
    pub fn new(result_dir: impl Into<PathBuf>) -> Self {
        Self {
            result_dir: result_dir.into(),
        }
    }

    pub fn path_for(&self, precision: Precision) -> PathBuf {
        self.result_dir
            .join(format!("docking_failed_{precision}.csv"))
    }

    /// Reads the ledger for a precision. A missing file is an empty
    /// set, not an error; a malformed line is a configuration error.
    pub fn load(&self, precision: Precision) -> Result<HashSet<FailureRecord>> {
        let path = self.path_for(precision);
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let text = fs::read_to_string(&path)?;
        let records = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.parse::<FailureRecord>())
            .collect::<Result<HashSet<_>>>()?;
        debug!(
            precision = %precision,
            entries = records.len(),
            "Loaded failure ledger"
        );
        Ok(records)
    }

    /// Persists this run's failure set, replacing any previous file.
    /// An empty set performs no write.
    pub fn record(&self, precision: Precision, records: &HashSet<FailureRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut lines: Vec<String> = records.iter().map(ToString::to_string).collect();
        lines.sort_unstable();
        let path = self.path_for(precision);
        fs::write(&path, lines.join("\n"))?;
        warn!(
            precision = %precision,
            entries = records.len(),
            path = %path.display(),
            "Recorded docking failures"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidock_common::OxidockError;

    fn record(r: &str, l: &str, n: &str) -> FailureRecord {
        FailureRecord {
            receptor_id: r.to_string(),
            internal_ligand_id: l.to_string(),
            ligand_name: n.to_string(),
        }
    }

    #[test]
    fn missing_file_loads_as_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path());
        assert!(ledger.load(Precision::Sp).unwrap().is_empty());
    }

    #[test]
    fn record_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path());
        let failed: HashSet<_> = [record("R2", "L2", "2-C"), record("R1", "L1", "0-A")]
            .into_iter()
            .collect();
        ledger.record(Precision::Sp, &failed).unwrap();
        assert_eq!(ledger.load(Precision::Sp).unwrap(), failed);
    }

    #[test]
    fn empty_set_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path());
        ledger.record(Precision::Sp, &HashSet::new()).unwrap();
        assert!(!ledger.path_for(Precision::Sp).exists());
    }

    #[test]
    fn record_overwrites_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path());
        let first: HashSet<_> = [record("R1", "L1", "0-A")].into_iter().collect();
        let second: HashSet<_> = [record("R2", "L2", "2-C")].into_iter().collect();
        ledger.record(Precision::Sp, &first).unwrap();
        ledger.record(Precision::Sp, &second).unwrap();
        assert_eq!(ledger.load(Precision::Sp).unwrap(), second);
    }

    #[test]
    fn ledgers_are_kept_per_precision() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path());
        let failed: HashSet<_> = [record("R1", "L1", "0-A")].into_iter().collect();
        ledger.record(Precision::Xp, &failed).unwrap();
        assert!(ledger.load(Precision::Sp).unwrap().is_empty());
        assert_eq!(ledger.load(Precision::Xp).unwrap(), failed);
    }

    #[test]
    fn malformed_line_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path());
        fs::write(ledger.path_for(Precision::Sp), "R1,L1").unwrap();
        assert!(matches!(
            ledger.load(Precision::Sp),
            Err(OxidockError::Config(_))
        ));
    }
}
