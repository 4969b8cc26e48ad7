// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fnv::FnvHashSet;
use parking_lot::Mutex;
use petgraph::stable_graph;

use crate::target::{BuildContext, Target};

/// 2^32 targets ought to be more than enough for anyone.
pub type EntryId = stable_graph::NodeIndex<u32>;

/// How long `TargetWrapper::clean` waits before retrying a failed implicit-inputs-file
/// deletion. Matches the fixed ~10s the original tolerated for anti-virus/file-lock races on
/// Windows; see the Open Question decision in DESIGN.md for why this isn't user-configurable.
pub const CLEAN_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Flags recorded against a non-target file dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepFlags(u8);

impl DepFlags {
    /// The path denotes a directory (trailing-separator semantics), not a file.
    pub const IS_DIR_PATH: DepFlags = DepFlags(0b01);
    /// The originating path set promises this path exists (e.g. it enumerated the
    /// filesystem itself), so the resolver's pre-build existence check may be skipped.
    pub const SKIP_EXISTENCE_CHECK: DepFlags = DepFlags(0b10);

    pub const fn empty() -> Self {
        DepFlags(0)
    }

    pub fn contains(self, other: DepFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DepFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for DepFlags {
    type Output = DepFlags;
    fn bitor(self, rhs: DepFlags) -> DepFlags {
        DepFlags(self.0 | rhs.0)
    }
}

/// A non-target dependency: a raw filesystem path this target waits on, plus the flags
/// recorded for it during resolution (see `resolver.rs`).
#[derive(Debug, Clone)]
pub struct NonTargetDep {
    pub path: PathBuf,
    pub flags: DepFlags,
}

/// Per-target scheduling state. One wrapper exists per declared target, created once during
/// the single-threaded init pass and mutated thereafter only through its own mutex.
///
/// Grounded directly on xpybuild's `internal/targetwrapper.py` `TargetWrapper` class: the
/// field set below is a line-for-line port of its `depCount`, `_targetDependents`
/// (inverted here into `rdeps`), `dirty`, `implicitInputs`, and stampfile handling.
pub struct TargetWrapper<C: BuildContext> {
    pub target: Arc<dyn Target<C>>,
    pub entry_id: EntryId,
    /// Absolute output path, cached from the target for fast comparisons.
    pub path: String,
    pub is_dir_path: bool,
    /// Directory the implicit-inputs fingerprint file for this target lives in (a sibling
    /// of the target's own work directory, never inside it).
    implicit_inputs_dir: PathBuf,

    state: Mutex<WrapperState>,
}

struct WrapperState {
    depcount: usize,
    target_deps: Vec<EntryId>,
    nontarget_deps: Vec<NonTargetDep>,
    rdeps: FnvHashSet<EntryId>,
    dirty: bool,
    effective_priority: i64,
    implicit_inputs_cache: Option<Vec<String>>,
    resolved: bool,
}

impl<C: BuildContext> TargetWrapper<C> {
    pub fn new(target: Arc<dyn Target<C>>, entry_id: EntryId, implicit_inputs_dir: PathBuf) -> Self {
        let path = target.path().to_owned();
        let is_dir_path = target.is_dir_path();
        let priority = target.priority();
        TargetWrapper {
            target,
            entry_id,
            path,
            is_dir_path,
            implicit_inputs_dir,
            state: Mutex::new(WrapperState {
                depcount: 0,
                target_deps: Vec::new(),
                nontarget_deps: Vec::new(),
                rdeps: FnvHashSet::default(),
                dirty: false,
                effective_priority: priority,
                implicit_inputs_cache: None,
                resolved: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }

    /// The file whose mtime represents "this target last completed". For file targets this
    /// is the output path itself; for directory targets it is the implicit-inputs file,
    /// because directory mtimes don't reliably reflect their contents and a downstream
    /// consumer filtering the directory must not be fooled by a partial write.
    pub fn stampfile(&self) -> PathBuf {
        if self.is_dir_path {
            self.implicit_inputs_file()
        } else {
            PathBuf::from(&self.path)
        }
    }

    pub fn implicit_inputs_file(&self) -> PathBuf {
        let basename = crate::path::strip_trailing_sep(&self.path)
            .rsplit(['/', std::path::MAIN_SEPARATOR])
            .next()
            .unwrap_or(&self.path);
        self.implicit_inputs_dir.join(format!("{basename}.txt"))
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().resolved
    }

    pub fn depcount(&self) -> usize {
        self.state.lock().depcount
    }

    pub fn is_ready(&self) -> bool {
        self.depcount() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    pub fn effective_priority(&self) -> i64 {
        self.state.lock().effective_priority
    }

    pub fn target_deps(&self) -> Vec<EntryId> {
        self.state.lock().target_deps.clone()
    }

    pub fn nontarget_deps(&self) -> Vec<NonTargetDep> {
        self.state.lock().nontarget_deps.clone()
    }

    pub fn rdeps(&self) -> Vec<EntryId> {
        self.state.lock().rdeps.iter().copied().collect()
    }

    pub fn cached_implicit_inputs(&self) -> Option<Vec<String>> {
        self.state.lock().implicit_inputs_cache.clone()
    }

    pub fn set_cached_implicit_inputs(&self, inputs: Vec<String>) {
        self.state.lock().implicit_inputs_cache = Some(inputs);
    }

    /// Called once by the resolver. Not concurrency-safe; invoked only during the serial
    /// resolution phase.
    pub fn set_resolution(&self, target_deps: Vec<EntryId>, nontarget_deps: Vec<NonTargetDep>) {
        let mut state = self.state.lock();
        assert!(!state.resolved, "{} resolved twice", self.name());
        let mut target_deps = target_deps;
        target_deps.retain(|&d| d != self.entry_id);
        target_deps.sort();
        target_deps.dedup();
        state.depcount = target_deps.len();
        state.target_deps = target_deps;
        let mut nontarget_deps = nontarget_deps;
        nontarget_deps.sort_by(|a, b| a.path.cmp(&b.path));
        state.nontarget_deps = nontarget_deps;
        state.resolved = true;
    }

    pub fn add_rdep(&self, dependent: EntryId) {
        self.state.lock().rdeps.insert(dependent);
    }

    /// Raises this wrapper's effective priority to at least `at_least`, returning true if the
    /// value actually changed (so callers can decide whether to keep pushing upstream).
    pub fn lift_priority(&self, at_least: i64) -> bool {
        let mut state = self.state.lock();
        if state.effective_priority < at_least {
            state.effective_priority = at_least;
            true
        } else {
            false
        }
    }

    /// Called by the scheduler when one of this wrapper's target deps completes.
    /// Returns the new depcount.
    pub fn dep_completed(&self) -> usize {
        let mut state = self.state.lock();
        state.depcount = state.depcount.saturating_sub(1);
        state.depcount
    }
}
