// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
// Arc<Mutex> can be more clear than needing to grok Orderings:
#![allow(clippy::mutex_atomic)]

//! An extensible, general-purpose incremental build engine: a declarative graph of targets
//! (named output files or directories produced by user-defined recipes) and their
//! dependencies, resolved into a schedule that skips up-to-date work and runs the rest in
//! dependency order, exploiting parallelism where the graph permits.
//!
//! The crate root wires together the pieces described in each module:
//!
//! - [`path`] / [`pathset`] — the file-vs-directory path model and the lazy path-set
//!   interface concrete recipes use to declare dependencies.
//! - [`target`] — the `Target`/`BuildContext` contracts the core consumes; recipes
//!   (compiling, archiving, copying) live entirely outside this crate.
//! - [`wrapper`] — `TargetWrapper`, the per-target scheduling record.
//! - [`group`] — atomic target groups (`GroupRegistry`).
//! - [`resolver`] — expands declared dependencies into target/non-target edges.
//! - [`fingerprint`] — the implicit-inputs fingerprint format, its bounded diff, and its
//!   on-disk persistence.
//! - [`oracle`] — the up-to-date decision procedure, plus the `run`/`clean`/`internal_clean`
//!   orchestration that manages a wrapper's implicit-inputs file around its recipe.
//! - [`executor`] — the worker-pool abstraction the scheduler spawns recipes onto.
//! - [`scheduler`] — [`BuildGraph`], the public entry point: owns every wrapper and drives
//!   the three-phase build (resolve, up-to-date, build).
//! - [`error`] / [`config`] — the error taxonomy and the typed configuration record threaded
//!   through every entry point.

/// Trace-level logging compiled in only under `cfg(test)`, so scheduler/oracle call sites can
/// log at a granularity too noisy for production without costing anything in a release build.
///
/// Grounded on the teacher's identically-named macro in its `graph` crate.
#[macro_export]
macro_rules! test_trace_log {
    ($($arg:tt)+) => {
        #[cfg(test)]
        {
            log::trace!($($arg)+)
        }
    };
}

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod group;
pub mod oracle;
pub mod path;
pub mod pathset;
pub mod resolver;
pub mod target;
pub mod wrapper;

mod executor;
mod scheduler;
#[cfg(test)]
mod test_support;

pub use crate::config::BuildConfig;
pub use crate::error::BuildError;
pub use crate::executor::Executor;
pub use crate::pathset::{GeneratedDirPathSet, GlobPathSet, PathSet, StaticPathSet};
pub use crate::scheduler::{BuildGraph, BuildReport, TargetOutcome};
pub use crate::target::{BuildContext, Location, Target};
pub use crate::wrapper::{DepFlags, EntryId, NonTargetDep, TargetWrapper};
