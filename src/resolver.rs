// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashMap;

use crate::error::BuildError;
use crate::group::GroupRegistry;
use crate::target::BuildContext;
use crate::wrapper::{DepFlags, EntryId, NonTargetDep, TargetWrapper};

/// Resolves every wrapper's dependencies exactly once, populating `target_deps` and
/// `nontarget_deps` via `TargetWrapper::set_resolution`.
///
/// Grounded on `internal/targetwrapper.py`'s dependency-resolution path plus
/// `buildcommon.py::defineAtomicTargetGroup` for the group-expansion step.
pub struct Resolver<'a> {
    path_to_entry: &'a FnvHashMap<String, EntryId>,
    groups: &'a GroupRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(path_to_entry: &'a FnvHashMap<String, EntryId>, groups: &'a GroupRegistry) -> Self {
        Resolver { path_to_entry, groups }
    }

    /// Resolves a single wrapper. Idempotent: a second call on an already-resolved wrapper
    /// is a programming error (the scheduler only calls this once, during the serial
    /// resolution phase) and is guarded by an assertion inside `set_resolution`.
    pub fn resolve<C: BuildContext>(
        &self,
        wrapper: &TargetWrapper<C>,
        ctx: &C,
    ) -> Result<(), BuildError> {
        let deps = wrapper.target.resolve_underlying_dependencies(ctx);

        let mut target_deps: Vec<EntryId> = Vec::new();
        let mut nontarget_deps: Vec<NonTargetDep> = Vec::new();

        for (abspath, pathset) in &deps {
            let abspath_str = abspath.to_string_lossy().into_owned();
            if let Some(&entry) = self.path_to_entry.get(&abspath_str) {
                if !target_deps.contains(&entry) {
                    target_deps.push(entry);
                }
                continue;
            }

            let underlying = pathset
                .resolve_underlying_dependencies(ctx)
                .map_err(|e| BuildError::Configuration {
                    target: wrapper.name().to_owned(),
                    message: format!("failed to resolve path set: {e}"),
                })?;

            for path in underlying {
                let path_str = path.to_string_lossy().into_owned();
                if let Some(&entry) = self.path_to_entry.get(&path_str) {
                    if !target_deps.contains(&entry) {
                        target_deps.push(entry);
                    }
                    continue;
                }

                if self.lies_under_output_dir(&path_str, ctx) {
                    return Err(BuildError::Configuration {
                        target: wrapper.name().to_owned(),
                        message: format!(
                            "depends on output {path_str} which is implicitly created by some \
                             other directory target; use an explicit generated-directory path \
                             set instead of a raw path dependency"
                        ),
                    });
                }

                let mut flags = DepFlags::empty();
                if crate::path::is_dir_path(&path_str) {
                    flags.insert(DepFlags::IS_DIR_PATH);
                }
                if pathset.skip_existence_check() {
                    flags.insert(DepFlags::SKIP_EXISTENCE_CHECK);
                }
                nontarget_deps.push(NonTargetDep { path, flags });
            }
        }

        // Target-group expansion: every sibling in a shared group becomes a dependency too.
        let mut frontier = target_deps.clone();
        while let Some(dep_entry) = frontier.pop() {
            let dep_path = self
                .path_to_entry
                .iter()
                .find(|(_, &e)| e == dep_entry)
                .map(|(p, _)| p.clone());
            let Some(dep_path) = dep_path else { continue };
            for sibling_path in self.groups.siblings_of(&dep_path) {
                if let Some(&sibling_entry) = self.path_to_entry.get(&sibling_path) {
                    if sibling_entry != wrapper.entry_id && !target_deps.contains(&sibling_entry) {
                        target_deps.push(sibling_entry);
                        frontier.push(sibling_entry);
                    }
                }
            }
        }

        wrapper.set_resolution(target_deps, nontarget_deps);
        Ok(())
    }

    fn lies_under_output_dir<C: BuildContext>(&self, path: &str, ctx: &C) -> bool {
        ctx.top_level_output_dirs()
            .iter()
            .any(|dir| path.starts_with(&*dir.to_string_lossy()))
    }
}

/// Registers the reverse edge for every target dep of every resolved wrapper. Must run after
/// every wrapper in the build has been resolved, since a wrapper's `rdeps` are populated by
/// its dependencies, not by itself.
pub fn register_reverse_edges<C: BuildContext>(
    entries: &FnvHashMap<EntryId, std::sync::Arc<TargetWrapper<C>>>,
) {
    let edges: Vec<(EntryId, EntryId)> = entries
        .values()
        .flat_map(|w| w.target_deps().into_iter().map(move |d| (d, w.entry_id)))
        .collect();
    for (dep, dependent) in edges {
        if let Some(dep_wrapper) = entries.get(&dep) {
            dep_wrapper.add_rdep(dependent);
        }
    }
}
