// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

/// Default cap on the number of diff lines surfaced when a fingerprint changes, matching
/// xpybuild's `XPYBUILD_IMPLICIT_INPUTS_MAX_DIFF_LINES` default.
pub const DEFAULT_IMPLICIT_INPUTS_MAX_DIFF_LINES: usize = 30;

/// Typed build configuration, constructed once per build and threaded through every core
/// entry point. Replaces the dynamic option bags of the system this crate is modeled on.
///
/// Options specific to a particular kind of recipe (a per-process timeout, output encoding,
/// and the like) are not part of this record — the core treats `Context` as opaque, so those
/// belong on the caller's own `BuildContext` implementation instead.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Cap on diff lines shown when an implicit-inputs fingerprint changes; tail-biased,
    /// split half-and-half between additions and removals.
    pub implicit_inputs_max_diff_lines: usize,
    /// Size of the scheduler's worker pool. Defaults to the number of available CPUs.
    pub worker_threads: usize,
    /// When set, `dirty` is forced on matching wrappers before the up-to-date phase.
    pub force_rebuild: bool,
    /// Passed through to the oracle to allow single-target rebuilds that don't wait on deps.
    pub ignore_deps: bool,
    /// If set, the first error raises the global cancellation signal instead of allowing
    /// independent work to continue.
    pub fail_fast: bool,
}

impl BuildConfig {
    pub fn new(worker_threads: usize) -> Self {
        BuildConfig {
            implicit_inputs_max_diff_lines: DEFAULT_IMPLICIT_INPUTS_MAX_DIFF_LINES,
            worker_threads,
            force_rebuild: false,
            ignore_deps: false,
            fail_fast: false,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        BuildConfig::new(cpus)
    }
}
