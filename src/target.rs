// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::BuildError;
use crate::pathset::PathSet;

/// A location in build-definition source, carried only for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Location {
    pub file: String,
    pub line: u32,
}

/// The contract the core consumes from a buildable target. Concrete recipes (compiling,
/// archiving, copying files) implement this; the core never knows or cares which.
///
/// `run`/`clean` are async so that a recipe which shells out to an external tool doesn't tie
/// up a whole worker thread waiting on it; the returned future is otherwise opaque to the
/// core, which neither retries nor inspects its await points.
#[async_trait]
pub trait Target<C: BuildContext>: Send + Sync + 'static {
    /// Canonical name. Ends in a path separator iff this is a directory target.
    fn name(&self) -> &str;

    /// Absolute output path (equal to `name` once resolved against the build root).
    fn path(&self) -> &str;

    /// Absolute work directory, unique to this target, owned exclusively by its recipe.
    fn work_dir(&self) -> &Path;

    /// Declared priority; larger runs earlier, all else equal.
    fn priority(&self) -> i64 {
        0
    }

    fn location(&self) -> Location {
        Location::default()
    }

    /// Whether `path` denotes a directory rather than a file.
    fn is_dir_path(&self) -> bool {
        crate::path::is_dir_path(self.path())
    }

    /// Executes the recipe that produces `path`.
    async fn run(&self, ctx: &C) -> Result<(), BuildError>;

    /// Removes this target's output (and any stamp state); used by `clean` builds and by a
    /// forced rebuild's preparatory delete.
    async fn clean(&self, ctx: &C) -> Result<(), BuildError>;

    /// An ordered, deterministic sequence of strings describing every non-path input that
    /// should force a rebuild when it changes: compiler flags, tool identities, option
    /// values. Order matters — it is concatenated into the fingerprint verbatim.
    fn hashable_implicit_inputs(&self, ctx: &C) -> Vec<String> {
        let _ = ctx;
        Vec::new()
    }

    /// The underlying dependencies this target needs resolved before it can build: a
    /// sequence of (absolute path, originating path set) pairs. A path that is itself a
    /// known target's output becomes a target edge; anything else becomes a raw filesystem
    /// edge.
    fn resolve_underlying_dependencies(&self, ctx: &C) -> Vec<(PathBuf, Box<dyn PathSet>)>;
}

/// The contract the core consumes from the surrounding build context: target-name lookups,
/// output-directory enumeration, variable expansion, and failure-artifact publication.
pub trait BuildContext: Send + Sync + 'static {
    fn is_valid_target(&self, path: &str) -> bool;
    fn top_level_output_dirs(&self) -> &[PathBuf];
    fn expand_property_values(&self, value: &str) -> String {
        value.to_owned()
    }
    fn publish_artifact(&self, _target: &str, _path: &Path) {}
}
