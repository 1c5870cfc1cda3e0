//! oxidock-engine — Ensemble docking batch engine.
//!
//! Maps a collection of prepared receptor grids against a collection of
//! split ligand structures and drives the resulting cross-product
//! through a bounded-parallelism batch runner, with a persisted
//! per-precision failure ledger so that pairs known to fail are never
//! resubmitted.
//!
//! The chemistry itself lives behind the [`suite::DockingSuite`] trait;
//! this crate only orchestrates.

pub mod config;
pub mod console;
pub mod download;
pub mod ledger;
pub mod mapping;
pub mod runner;
pub mod suite;

pub use config::EngineConfig;
pub use console::EnsembleConsole;
pub use ledger::FailureLedger;
pub use runner::{run_batch, BatchOptions, BatchProgress};
pub use suite::{DockingSuite, ExternalSuite, MinimizeOptions};
