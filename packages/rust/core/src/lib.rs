//! Orchestration for rnws.
//!
//! Ties the build server and bundle materialization together into the two
//! run modes: serve (start and keep running) and bundle (start, materialize
//! every platform bundle concurrently, stop, report).

pub mod pipeline;
pub mod plan;

pub use pipeline::{
    BundleOutcome, BundleProgress, SilentProgress, TaskFailure, bundle, run_bundle, serve,
};
pub use rnws_materialize::MaterializedBundle;
pub use plan::{BundleOptions, EntryTarget, classify_entry, plan_tasks};
