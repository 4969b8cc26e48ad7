// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fnv::FnvHashMap;
use log::{debug, warn};

use crate::error::BuildError;
use crate::fingerprint::{build_fingerprint, diff_fingerprints, read_fingerprint, write_fingerprint};
use crate::target::BuildContext;
use crate::wrapper::{DepFlags, EntryId, TargetWrapper, CLEAN_RETRY_DELAY};

/// Mtime comparisons within this gap still force a rebuild (matching the original's
/// behaviour exactly — see DESIGN.md's Open Question decision) but are logged, since a gap
/// this small is often a filesystem timestamp-resolution artifact rather than a genuine
/// ordering signal.
const SUSPICIOUS_MTIME_GAP: Duration = Duration::from_secs(1);

/// Decides whether `wrapper` needs to be rebuilt. Returns `true` only if it does not.
///
/// `entries` resolves a dependency's `EntryId` back to its wrapper, needed to compare
/// against dependency paths/stampfiles and to build the fingerprint's target-dep section.
///
/// Grounded directly on `internal/targetwrapper.py::uptodate`: the ordered checks below
/// (dirty flag, output existence, stampfile-is-a-regular-file, fingerprint comparison,
/// mtime comparison) mirror that method's control flow exactly, first falsification wins.
pub fn uptodate<C: BuildContext>(
    wrapper: &TargetWrapper<C>,
    ctx: &C,
    entries: &FnvHashMap<EntryId, Arc<TargetWrapper<C>>>,
    ignore_deps: bool,
    max_diff_lines: usize,
) -> bool {
    if wrapper.is_dirty() {
        debug!("{}: dirty flag set, rebuilding", wrapper.name());
        return false;
    }

    let path = std::path::Path::new(&wrapper.path);
    if !path.exists() {
        debug!("{}: output does not exist, rebuilding", wrapper.name());
        wrapper.mark_dirty();
        return false;
    }

    if ignore_deps {
        return true;
    }

    let stampfile = wrapper.stampfile();
    if !stampfile.is_file() {
        debug!(
            "{}: stampfile {} is not a regular file, rebuilding",
            wrapper.name(),
            stampfile.display()
        );
        return false;
    }

    let hashable = wrapper.target.hashable_implicit_inputs(ctx);
    let has_implicit_inputs =
        !wrapper.nontarget_deps().is_empty() || !wrapper.target_deps().is_empty() || !hashable.is_empty();

    if has_implicit_inputs || wrapper.is_dir_path {
        let fingerprint = fingerprint_cached(wrapper, ctx, entries);
        let implicit_inputs_file = wrapper.implicit_inputs_file();
        match read_fingerprint(&implicit_inputs_file) {
            Ok(Some(previous)) => {
                if previous != fingerprint {
                    let diff = diff_fingerprints(&previous, &fingerprint, max_diff_lines);
                    debug!("{}: implicit inputs changed:\n{}", wrapper.name(), diff);
                    return false;
                }
            }
            Ok(None) => {
                debug!(
                    "{}: no implicit-inputs file at {}, rebuilding",
                    wrapper.name(),
                    implicit_inputs_file.display()
                );
                return false;
            }
            Err(e) => {
                warn!(
                    "{}: failed to read implicit-inputs file {}: {e}, rebuilding",
                    wrapper.name(),
                    implicit_inputs_file.display()
                );
                return false;
            }
        }
    }

    let stamp_mtime = match mtime(&stampfile) {
        Some(t) => t,
        None => return false,
    };

    for dep_entry in wrapper.target_deps() {
        let Some(dep) = entries.get(&dep_entry) else { continue };
        let dep_stamp = dep.stampfile();
        if let Some(dep_mtime) = mtime(&dep_stamp) {
            if is_newer(dep_mtime, stamp_mtime, wrapper.name(), dep.name()) {
                return false;
            }
        }
    }

    for dep in wrapper.nontarget_deps() {
        if dep.flags.contains(DepFlags::IS_DIR_PATH) {
            continue;
        }
        if let Some(dep_mtime) = mtime(&dep.path) {
            let label = dep.path.display().to_string();
            if is_newer(dep_mtime, stamp_mtime, wrapper.name(), &label) {
                return false;
            }
        }
    }

    true
}

/// Builds the current implicit-inputs fingerprint for `wrapper`: sorted target-dep paths,
/// sorted non-target-dep paths, then its hashable implicit inputs in declared order. Shared
/// between the oracle's comparison and the scheduler's post-build write so both always agree
/// on what "the fingerprint" means for a given wrapper.
pub fn fingerprint_for<C: BuildContext>(
    wrapper: &TargetWrapper<C>,
    ctx: &C,
    entries: &FnvHashMap<EntryId, Arc<TargetWrapper<C>>>,
) -> Vec<String> {
    let mut target_paths: Vec<String> = wrapper
        .target_deps()
        .iter()
        .filter_map(|id| entries.get(id).map(|w| w.path.clone()))
        .collect();
    target_paths.sort();

    let nontarget_paths: Vec<String> = wrapper
        .nontarget_deps()
        .iter()
        .map(|d| d.path.to_string_lossy().into_owned())
        .collect();

    let hashable = wrapper.target.hashable_implicit_inputs(ctx);
    build_fingerprint(
        target_paths.iter().map(String::as_str),
        nontarget_paths.iter().map(String::as_str),
        hashable,
    )
}

/// Same as `fingerprint_for`, but consults `wrapper`'s per-build cache first so the
/// up-to-date check and the subsequent recipe run (which need the identical value) don't
/// recompute it twice. Safe because a wrapper is built at most once per `BuildGraph::build`
/// call, so nothing can invalidate the cached value mid-build.
fn fingerprint_cached<C: BuildContext>(
    wrapper: &TargetWrapper<C>,
    ctx: &C,
    entries: &FnvHashMap<EntryId, Arc<TargetWrapper<C>>>,
) -> Vec<String> {
    if let Some(cached) = wrapper.cached_implicit_inputs() {
        return cached;
    }
    let fingerprint = fingerprint_for(wrapper, ctx, entries);
    wrapper.set_cached_implicit_inputs(fingerprint.clone());
    fingerprint
}

/// Runs `wrapper`'s recipe, managing its implicit-inputs fingerprint file around the call so
/// that a crash mid-recipe never leaves a stale fingerprint claiming the target is up to date.
///
/// Grounded directly on `internal/targetwrapper.py::run`: delete-before, invoke, write-after.
/// The post-condition existence check is an addition on top of that original, unconditional
/// trust in the recipe's own report of success.
pub async fn run<C: BuildContext>(
    wrapper: &TargetWrapper<C>,
    ctx: &C,
    entries: &FnvHashMap<EntryId, Arc<TargetWrapper<C>>>,
) -> Result<(), BuildError> {
    let fingerprint = fingerprint_cached(wrapper, ctx, entries);
    let has_implicit_inputs = !fingerprint.is_empty();
    let implicit_inputs_file = wrapper.implicit_inputs_file();
    if has_implicit_inputs || wrapper.is_dir_path {
        let _ = remove_file_if_exists(&implicit_inputs_file);
    }

    wrapper.target.run(ctx).await?;

    let path = Path::new(&wrapper.path);
    let exists_ok = if wrapper.is_dir_path { path.is_dir() } else { path.is_file() };
    if !exists_ok {
        return Err(BuildError::PostConditionFailure {
            target: wrapper.name().to_owned(),
            path: path.to_path_buf(),
        });
    }

    if has_implicit_inputs || wrapper.is_dir_path {
        write_fingerprint(&implicit_inputs_file, &fingerprint).map_err(|e| BuildError::RecipeFailure {
            target: wrapper.name().to_owned(),
            detail: format!("failed to write implicit-inputs file: {e}"),
        })?;
    }
    Ok(())
}

/// Runs `wrapper`'s target-specific clean: the implicit-inputs file, then `target.clean`.
///
/// Grounded on `internal/targetwrapper.py::clean`, including the retry-once-after-delay for
/// the implicit-inputs deletion (see DESIGN.md's Open Question decision on the fixed delay).
pub async fn clean<C: BuildContext>(wrapper: &TargetWrapper<C>, ctx: &C) -> Result<(), BuildError> {
    delete_implicit_inputs_file(wrapper).await?;
    wrapper.target.clean(ctx).await
}

/// Runs the scheduler's own preparatory clean ahead of a forced rebuild: the implicit-inputs
/// file, then the output path itself (or, for a directory target, the directory if empty) —
/// never the target-specific `clean`, which may do more than this crate wants to trigger on
/// every forced rebuild.
///
/// Grounded on `internal/targetwrapper.py::internal_clean`.
pub async fn internal_clean<C: BuildContext>(wrapper: &TargetWrapper<C>) -> Result<(), BuildError> {
    delete_implicit_inputs_file(wrapper).await?;
    let path = Path::new(&wrapper.path);
    let result = if wrapper.is_dir_path {
        match fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    } else {
        remove_file_if_exists(path)
    };
    result.map_err(|e| BuildError::RecipeFailure {
        target: wrapper.name().to_owned(),
        detail: format!("failed to remove output {}: {e}", path.display()),
    })
}

async fn delete_implicit_inputs_file<C: BuildContext>(wrapper: &TargetWrapper<C>) -> Result<(), BuildError> {
    let path = wrapper.implicit_inputs_file();
    if remove_file_if_exists(&path).is_ok() {
        return Ok(());
    }
    tokio::time::sleep(CLEAN_RETRY_DELAY).await;
    remove_file_if_exists(&path).map_err(|e| BuildError::RecipeFailure {
        target: wrapper.name().to_owned(),
        detail: format!("failed to delete implicit-inputs file {}: {e}", path.display()),
    })
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn mtime(path: &std::path::Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_newer(candidate: SystemTime, baseline: SystemTime, target_name: &str, dep_name: &str) -> bool {
    match candidate.duration_since(baseline) {
        Ok(gap) if gap > Duration::ZERO => {
            if gap < SUSPICIOUS_MTIME_GAP {
                warn!(
                    "{target_name}: dependency {dep_name} is only {gap:?} newer than the \
                     stampfile; rebuilding anyway, but this gap is suspiciously small and may \
                     indicate coarse filesystem timestamp resolution"
                );
            }
            true
        }
        _ => false,
    }
}
