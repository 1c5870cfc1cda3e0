//! Cross-product mapping builder.
//!
//! Pairs every receptor grid with every ligand, skipping pairs whose
//! key triple is in the exclusion set. Runs single-threaded before the
//! batch stage: reconciliation needs the full expected set up front.

use std::collections::HashSet;

use tracing::debug;

use oxidock_common::{FailureRecord, LigandRef, MappingEntry, ReceptorGridRef};

/// Builds the ordered mapping: grids outer, ligands inner. Exclusion
/// is by exact triple equality; wildcards are not supported.
pub fn build(
    grids: &[ReceptorGridRef],
    ligands: &[LigandRef],
    excluded: &HashSet<FailureRecord>,
) -> Vec<MappingEntry> {
    debug!(
        ligands = ligands.len(),
        grids = grids.len(),
        excluded = excluded.len(),
        "Mapping ligands to receptor grids"
    );

    let mut entries = Vec::with_capacity(grids.len() * ligands.len());
    for grid in grids {
        for ligand in ligands {
            let key = FailureRecord {
                receptor_id: grid.receptor_id.clone(),
                internal_ligand_id: grid.internal_ligand_id.clone(),
                ligand_name: ligand.ligand_name.clone(),
            };
            if excluded.contains(&key) {
                debug!(
                    receptor = %grid.receptor_id,
                    internal_ligand = %grid.internal_ligand_id,
                    ligand = %ligand.ligand_name,
                    "Skipping previously failed pair"
                );
                continue;
            }
            entries.push(MappingEntry {
                grid: grid.clone(),
                ligand: ligand.clone(),
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn grid(receptor: &str, ligand: &str) -> ReceptorGridRef {
        ReceptorGridRef {
            receptor_id: receptor.to_string(),
            internal_ligand_id: ligand.to_string(),
            path: PathBuf::from(format!("{receptor}_{ligand}.zip")),
        }
    }

    fn lig(name: &str) -> LigandRef {
        LigandRef {
            ligand_name: name.to_string(),
            path: PathBuf::from(format!("{name}.mae")),
        }
    }

    #[test]
    fn full_cross_product_preserves_nested_order() {
        let grids = vec![grid("R1", "L1"), grid("R2", "L2")];
        let ligands = vec![lig("A"), lig("B"), lig("C")];
        let mapping = build(&grids, &ligands, &HashSet::new());

        assert_eq!(mapping.len(), 6);
        let keys: Vec<String> = mapping
            .iter()
            .map(|m| format!("{}-{}", m.grid.receptor_id, m.ligand.ligand_name))
            .collect();
        assert_eq!(keys, ["R1-A", "R1-B", "R1-C", "R2-A", "R2-B", "R2-C"]);
    }

    #[test]
    fn excluded_triples_are_omitted() {
        let grids = vec![grid("R1", "L1"), grid("R2", "L2")];
        let ligands = vec![lig("A"), lig("B"), lig("C")];
        let excluded: HashSet<_> = ["R2,L2,C".parse().unwrap()].into_iter().collect();

        let mapping = build(&grids, &ligands, &excluded);
        assert_eq!(mapping.len(), 5);
        assert!(mapping.iter().all(|m| !excluded.contains(&m.key())));
    }

    #[test]
    fn exclusions_outside_the_cross_product_change_nothing() {
        let grids = vec![grid("R1", "L1")];
        let ligands = vec![lig("A")];
        let excluded: HashSet<_> = ["R9,L9,Z".parse().unwrap()].into_iter().collect();
        assert_eq!(build(&grids, &ligands, &excluded).len(), 1);
    }

    #[test]
    fn empty_inputs_yield_empty_mapping() {
        assert!(build(&[], &[lig("A")], &HashSet::new()).is_empty());
        assert!(build(&[grid("R1", "L1")], &[], &HashSet::new()).is_empty());
    }

    #[test]
    fn build_is_deterministic() {
        let grids = vec![grid("R1", "L1"), grid("R2", "L2")];
        let ligands = vec![lig("A"), lig("B")];
        let excluded: HashSet<_> = ["R1,L1,B".parse().unwrap()].into_iter().collect();
        assert_eq!(
            build(&grids, &ligands, &excluded),
            build(&grids, &ligands, &excluded)
        );
    }
}
