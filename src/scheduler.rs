// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use fnv::FnvHashMap;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use petgraph::algo::kosaraju_scc;
use petgraph::stable_graph::StableDiGraph;
use tokio::sync::Notify;

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::executor::Executor;
use crate::group::GroupRegistry;
use crate::oracle;
use crate::resolver::{register_reverse_edges, Resolver};
use crate::target::{BuildContext, Target};
use crate::wrapper::{EntryId, TargetWrapper};

/// Outcome of a single target's build attempt, recorded for the final report.
#[derive(Debug)]
pub enum TargetOutcome {
    UpToDate,
    Built,
    Failed(BuildError),
    Skipped(BuildError),
}

/// Summary of a completed (or aborted) build.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub up_to_date: Vec<String>,
    pub built: Vec<String>,
    pub failed: Vec<(String, BuildError)>,
    pub skipped: Vec<(String, BuildError)>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// The top-level build graph: owns every target wrapper, the resolver's lookup tables, and
/// drives the three-phase build (resolve, up-to-date, build) described for the scheduler.
///
/// Grounded on the teacher's `Graph<N>`/`InnerGraph<N>` split in `lib.rs` (graph storage plus
/// a thin public wrapper) and on `task_executor::Executor`-style spawning in `scheduler.rs`
/// itself for the worker pool.
pub struct BuildGraph<C: BuildContext> {
    entries: FnvHashMap<EntryId, Arc<TargetWrapper<C>>>,
    path_to_entry: FnvHashMap<String, EntryId>,
    groups: GroupRegistry,
    graph: StableDiGraph<(), ()>,
    implicit_inputs_root: std::path::PathBuf,
}

impl<C: BuildContext> BuildGraph<C> {
    pub fn new(implicit_inputs_root: impl Into<std::path::PathBuf>) -> Self {
        BuildGraph {
            entries: FnvHashMap::default(),
            path_to_entry: FnvHashMap::default(),
            groups: GroupRegistry::new(),
            graph: StableDiGraph::new(),
            implicit_inputs_root: implicit_inputs_root.into(),
        }
    }

    pub fn define_group(&mut self, members: impl IntoIterator<Item = String>) {
        self.groups.define_group(members);
    }

    /// Registers a target, creating its wrapper. Must be called for every target before
    /// `build` — wrapper creation is a single-threaded init pass, per the data model.
    pub fn add_target(&mut self, target: Arc<dyn Target<C>>) -> EntryId {
        let entry_id = self.graph.add_node(());
        let path = target.path().to_owned();
        let wrapper = Arc::new(TargetWrapper::new(target, entry_id, self.implicit_inputs_root.clone()));
        self.path_to_entry.insert(path, entry_id);
        self.entries.insert(entry_id, wrapper);
        entry_id
    }

    /// Runs the full three-phase build: resolution, priority push + up-to-date evaluation,
    /// and parallel execution. `ctx` is shared read-only by every target's recipe.
    pub async fn build(&mut self, ctx: Arc<C>, config: BuildConfig) -> Result<BuildReport, BuildError> {
        self.resolve_all(&ctx)?;
        self.push_priorities();

        let executor = Executor::owned(config.worker_threads.max(1))
            .map_err(|e| BuildError::Configuration {
                target: "<build>".into(),
                message: format!("failed to start worker pool: {e}"),
            })?;

        if config.force_rebuild {
            for wrapper in self.entries.values() {
                // Best-effort: a forced rebuild should still proceed even if the stale output
                // couldn't be removed up front (e.g. permissions) — the recipe may overwrite it
                // anyway, and `dirty` alone already guarantees the oracle won't skip the rebuild.
                if let Err(e) = oracle::internal_clean(wrapper).await {
                    warn!("{}", e);
                }
                wrapper.mark_dirty();
            }
        }

        let state = Arc::new(SchedulerState {
            entries: self.entries.clone(),
            queue: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            remaining: AtomicUsize::new(self.entries.len()),
            cancelled: AtomicBool::new(false),
            fail_fast: config.fail_fast,
            ignore_deps: config.ignore_deps,
            max_diff_lines: config.implicit_inputs_max_diff_lines,
            ctx,
            executor: executor.clone(),
            outcomes: Mutex::new(FnvHashMap::default()),
        });

        for (&entry_id, wrapper) in &self.entries {
            if wrapper.is_ready() {
                state.enqueue(entry_id, wrapper.effective_priority(), wrapper.name().to_owned());
            }
        }

        let worker_count = config.worker_threads.max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let state = state.clone();
            handles.push(executor.spawn(worker_loop(state)));
        }
        for handle in handles {
            let _ = handle.await;
        }

        Ok(state.into_report(&self.entries))
    }

    fn resolve_all(&mut self, ctx: &C) -> Result<(), BuildError> {
        let resolver = Resolver::new(&self.path_to_entry, &self.groups);
        for wrapper in self.entries.values() {
            resolver.resolve(wrapper, ctx)?;
        }
        register_reverse_edges(&self.entries);

        for wrapper in self.entries.values() {
            for dep in wrapper.target_deps() {
                self.graph.update_edge(dep, wrapper.entry_id, ());
            }
        }

        let sccs = kosaraju_scc(&self.graph);
        for scc in sccs {
            if scc.len() > 1 {
                let names: Vec<String> = scc
                    .iter()
                    .filter_map(|id| self.entries.get(id).map(|w| w.name().to_owned()))
                    .collect();
                return Err(BuildError::Configuration {
                    target: names.first().cloned().unwrap_or_default(),
                    message: format!("dependency cycle: {}", names.join(" -> ")),
                });
            }
        }
        Ok(())
    }

    /// Single-threaded pre-pass: lifts every dependency's effective priority to at least its
    /// dependent's, following the graph in reverse-topological (dependents-before-deps)
    /// order so a lift at the top of a chain reaches every transitive dependency in one pass.
    fn push_priorities(&self) {
        let order = petgraph::algo::toposort(&self.graph, None)
            .expect("cycles are rejected by resolve_all before push_priorities runs");
        for &entry_id in order.iter().rev() {
            let Some(wrapper) = self.entries.get(&entry_id) else { continue };
            let priority = wrapper.effective_priority();
            for dep_entry in wrapper.target_deps() {
                if let Some(dep) = self.entries.get(&dep_entry) {
                    dep.lift_priority(priority);
                }
            }
        }
    }
}

struct SchedulerState<C: BuildContext> {
    entries: FnvHashMap<EntryId, Arc<TargetWrapper<C>>>,
    queue: Mutex<BinaryHeap<QueueItem>>,
    notify: Notify,
    remaining: AtomicUsize,
    cancelled: AtomicBool,
    fail_fast: bool,
    ignore_deps: bool,
    max_diff_lines: usize,
    ctx: Arc<C>,
    executor: Executor,
    outcomes: Mutex<FnvHashMap<EntryId, TargetOutcome>>,
}

impl<C: BuildContext> SchedulerState<C> {
    fn enqueue(&self, entry_id: EntryId, priority: i64, name: String) {
        crate::test_trace_log!("enqueueing {name} at priority {priority}");
        self.queue.lock().push(QueueItem { priority, name, entry_id });
        self.notify.notify_one();
    }

    fn is_done(&self) -> bool {
        self.remaining.load(AtomicOrdering::Acquire) == 0
    }

    /// Records a terminal outcome for `entry_id` unless one is already recorded. Returns
    /// whether this call won the race to record it — callers must gate any further
    /// accounting (decrementing `remaining`, cascading into rdeps) on that result, since
    /// several independent failure/cancellation paths can reach the same entry concurrently
    /// (e.g. two failing ancestors sharing a transitive rdep in a diamond-shaped graph).
    fn record_outcome(&self, entry_id: EntryId, outcome: TargetOutcome) -> bool {
        use std::collections::hash_map::Entry as MapEntry;
        match self.outcomes.lock().entry(entry_id) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(v) => {
                v.insert(outcome);
                true
            }
        }
    }

    fn has_outcome(&self, entry_id: EntryId) -> bool {
        self.outcomes.lock().contains_key(&entry_id)
    }

    fn into_report(&self, entries: &FnvHashMap<EntryId, Arc<TargetWrapper<C>>>) -> BuildReport {
        let mut report = BuildReport::default();
        let outcomes = self.outcomes.lock();
        for (entry_id, outcome) in outcomes.iter() {
            let name = entries
                .get(entry_id)
                .map(|w| w.name().to_owned())
                .unwrap_or_default();
            match outcome {
                TargetOutcome::UpToDate => report.up_to_date.push(name),
                TargetOutcome::Built => report.built.push(name),
                TargetOutcome::Failed(e) => report.failed.push((name, e.clone_for_report())),
                TargetOutcome::Skipped(e) => report.skipped.push((name, e.clone_for_report())),
            }
        }
        report
    }
}

impl BuildError {
    fn clone_for_report(&self) -> BuildError {
        self.clone()
    }
}

#[derive(Debug)]
struct QueueItem {
    priority: i64,
    name: String,
    entry_id: EntryId,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.name == other.name
    }
}
impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; higher priority should sort first, and among equal
        // priorities the scheduler breaks ties deterministically by name, ascending — so we
        // reverse the name comparison to keep "earlier name" on top of the max-heap.
        self.priority.cmp(&other.priority).then_with(|| other.name.cmp(&self.name))
    }
}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

async fn worker_loop<C: BuildContext>(state: Arc<SchedulerState<C>>) {
    loop {
        // Register for the next notification before re-checking the queue, so a wakeup
        // fired between our check and the await is never lost (tokio's recommended pattern
        // for `Notify`-guarded condition checks).
        let notified = state.notify.notified();
        let item = {
            let mut queue = state.queue.lock();
            queue.pop()
        };
        let Some(item) = item else {
            if state.is_done() {
                return;
            }
            notified.await;
            continue;
        };

        if state.cancelled.load(AtomicOrdering::Acquire) {
            let name = state
                .entries
                .get(&item.entry_id)
                .map(|w| w.name().to_owned())
                .unwrap_or_default();
            cancel_and_skip_rdeps(&state, item.entry_id, BuildError::Cancelled { target: name });
            continue;
        }

        let Some(wrapper) = state.entries.get(&item.entry_id).cloned() else {
            continue;
        };

        process_one(&state, &wrapper).await;
    }
}

async fn process_one<C: BuildContext>(state: &Arc<SchedulerState<C>>, wrapper: &Arc<TargetWrapper<C>>) {
    let up_to_date = oracle::uptodate(
        wrapper,
        &state.ctx,
        &state.entries,
        state.ignore_deps,
        state.max_diff_lines,
    );

    if up_to_date {
        debug!("{} is up to date", wrapper.name());
        state.record_outcome(wrapper.entry_id, TargetOutcome::UpToDate);
        complete(state, wrapper.entry_id);
        return;
    }

    if let Err(e) = check_nontarget_deps_exist(wrapper) {
        error!("{}", e);
        state.record_outcome(wrapper.entry_id, TargetOutcome::Failed(e.clone()));
        if state.fail_fast {
            state.cancelled.store(true, AtomicOrdering::Release);
        }
        fail_and_skip_rdeps(state, wrapper.entry_id, e);
        return;
    }

    info!("building {}", wrapper.name());
    let wrapper_for_run = wrapper.clone();
    let state_for_run = state.clone();
    let run_result: Result<(), BuildError> = state
        .executor
        .spawn(async move { oracle::run(&wrapper_for_run, &state_for_run.ctx, &state_for_run.entries).await })
        .await
        .unwrap_or_else(|join_err| {
            Err(BuildError::RecipeFailure {
                target: "<build>".into(),
                detail: format!("recipe task panicked: {join_err}"),
            })
        });

    match run_result {
        Ok(()) => {
            state.record_outcome(wrapper.entry_id, TargetOutcome::Built);
            complete(state, wrapper.entry_id);
        }
        Err(e) => {
            error!("{}", e);
            state.record_outcome(wrapper.entry_id, TargetOutcome::Failed(e.clone()));
            if state.fail_fast {
                state.cancelled.store(true, AtomicOrdering::Release);
            }
            fail_and_skip_rdeps(state, wrapper.entry_id, e);
        }
    }
}

fn check_nontarget_deps_exist<C: BuildContext>(wrapper: &TargetWrapper<C>) -> Result<(), BuildError> {
    for dep in wrapper.nontarget_deps() {
        if dep.flags.contains(crate::wrapper::DepFlags::SKIP_EXISTENCE_CHECK) {
            continue;
        }
        let is_dir = dep.flags.contains(crate::wrapper::DepFlags::IS_DIR_PATH);
        let exists = if is_dir { dep.path.is_dir() } else { dep.path.is_file() };
        if !exists {
            return Err(BuildError::MissingInput {
                target: wrapper.name().to_owned(),
                path: dep.path.clone(),
                detail: if is_dir {
                    "expected a directory".to_owned()
                } else {
                    "expected a file".to_owned()
                },
            });
        }
    }
    Ok(())
}

fn complete<C: BuildContext>(state: &Arc<SchedulerState<C>>, entry_id: EntryId) {
    state.remaining.fetch_sub(1, AtomicOrdering::AcqRel);
    let Some(wrapper) = state.entries.get(&entry_id) else {
        state.notify.notify_waiters();
        return;
    };
    for rdep_entry in wrapper.rdeps() {
        if let Some(rdep) = state.entries.get(&rdep_entry) {
            let remaining = rdep.dep_completed();
            // A concurrent failure/cancellation cascade may have already recorded a terminal
            // (skipped) outcome for this rdep between its dependencies being registered and
            // now — don't resurrect it into the queue on top of that.
            if remaining == 0 && !state.has_outcome(rdep_entry) {
                state.enqueue(rdep_entry, rdep.effective_priority(), rdep.name().to_owned());
            }
        }
    }
    state.notify.notify_waiters();
}

/// Decrements `remaining` for `entry_id` and cascades a skip into every transitive rdep.
///
/// `entry_id` itself is assumed to already have a terminal outcome recorded by the caller (it
/// is only ever dequeued and processed once, so that decrement is unconditional) — but every
/// rdep reached by the cascade is gated on [`SchedulerState::record_outcome`] winning the race
/// to record it, since two independently-failing ancestors can share a transitive rdep in a
/// diamond-shaped graph and would otherwise both decrement `remaining` for it, underflowing
/// the counter and hanging the build forever.
fn fail_and_skip_rdeps<C: BuildContext>(state: &Arc<SchedulerState<C>>, entry_id: EntryId, cause: BuildError) {
    debug_assert!(
        cause.propagates_as_skip(),
        "fail_and_skip_rdeps called with a cause that should not cascade: {cause}"
    );
    state.remaining.fetch_sub(1, AtomicOrdering::AcqRel);
    let mut frontier = vec![entry_id];
    while let Some(current) = frontier.pop() {
        let Some(wrapper) = state.entries.get(&current) else { continue };
        for rdep_entry in wrapper.rdeps() {
            if let Some(rdep) = state.entries.get(&rdep_entry) {
                let skip_err = BuildError::Skipped {
                    target: rdep.name().to_owned(),
                    cause: cause.to_string(),
                };
                if state.record_outcome(rdep_entry, TargetOutcome::Skipped(skip_err)) {
                    warn!("{} skipped transitively", rdep.name());
                    state.remaining.fetch_sub(1, AtomicOrdering::AcqRel);
                    frontier.push(rdep_entry);
                }
            }
        }
    }
    state.notify.notify_waiters();
}

/// A queued wrapper encountered after cancellation was signalled: never built, recorded as
/// skipped, and its own transitive rdeps are cascaded the same way a build failure would be
/// (otherwise they would sit forever at `depcount > 0`, waiting on a dependency that will now
/// never complete, and `remaining` would never reach zero).
fn cancel_and_skip_rdeps<C: BuildContext>(state: &Arc<SchedulerState<C>>, entry_id: EntryId, cause: BuildError) {
    if state.record_outcome(entry_id, TargetOutcome::Skipped(cause.clone())) {
        fail_and_skip_rdeps(state, entry_id, cause);
    }
}
