//! oxidock-common — Shared types and errors used across all oxidock crates.

pub mod error;
pub mod models;

pub use error::{OxidockError, Result};
pub use models::{
    DockResultRef, DockingData, FailureRecord, InputPair, LigandRef, LigandStructure, MappingEntry,
    MinimizedRef, PdbStructureRef, Precision, ReceptorGridRef,
};
