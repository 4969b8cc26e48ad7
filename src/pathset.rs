// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::{Path, PathBuf};

use glob::glob;

use crate::error::BuildError;
use crate::target::BuildContext;

/// A lazy, context-resolved collection of paths.
///
/// `resolve` enumerates the concrete paths the set denotes right now. `resolve_underlying_dependencies`
/// enumerates what the build must wait for / stat before `resolve` can be trusted — for a
/// static list these coincide, but a glob set depends on its root directory existing and a
/// generated-directory set depends on the target that produces its root.
pub trait PathSet: Send + Sync {
    fn resolve(&self, ctx: &dyn BuildContext) -> Result<Vec<PathBuf>, BuildError>;

    fn resolve_underlying_dependencies(&self, ctx: &dyn BuildContext) -> Result<Vec<PathBuf>, BuildError> {
        self.resolve(ctx)
    }

    /// True if the set itself enumerates the filesystem (and so its members are known to
    /// exist by construction), letting the resolver skip a redundant existence check.
    fn skip_existence_check(&self) -> bool {
        false
    }
}

/// A fixed, caller-supplied ordered list of absolute paths (files or directories, mixed).
#[derive(Debug, Clone)]
pub struct StaticPathSet {
    paths: Vec<PathBuf>,
}

impl StaticPathSet {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        StaticPathSet {
            paths: paths.into_iter().collect(),
        }
    }
}

impl PathSet for StaticPathSet {
    fn resolve(&self, _ctx: &dyn BuildContext) -> Result<Vec<PathBuf>, BuildError> {
        Ok(self.paths.clone())
    }
}

/// Walks `root` at resolution time matching `pattern` (a glob, e.g. `**/*.h`).
///
/// The root directory is walked exhaustively by this set itself, so it asserts
/// `skip_existence_check`: the resolver does not need to re-stat paths this set just
/// enumerated.
///
/// Grounded on xpybuild's `FindPaths`, used throughout `targets/native.py` to gather
/// generated-include dependencies for compiler targets.
#[derive(Debug, Clone)]
pub struct GlobPathSet {
    root: PathBuf,
    pattern: String,
}

impl GlobPathSet {
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        GlobPathSet {
            root: root.into(),
            pattern: pattern.into(),
        }
    }
}

impl PathSet for GlobPathSet {
    fn resolve(&self, _ctx: &dyn BuildContext) -> Result<Vec<PathBuf>, BuildError> {
        let full_pattern = self.root.join(&self.pattern);
        let full_pattern = full_pattern.to_string_lossy().into_owned();
        let mut out = Vec::new();
        let entries = glob(&full_pattern).map_err(|e| BuildError::Configuration {
            target: full_pattern.clone(),
            message: format!("invalid glob pattern: {e}"),
        })?;
        for entry in entries {
            let path = entry.map_err(|e| BuildError::Configuration {
                target: full_pattern.clone(),
                message: format!("glob walk failed: {e}"),
            })?;
            out.push(path);
        }
        out.sort();
        Ok(out)
    }

    fn skip_existence_check(&self) -> bool {
        true
    }
}

/// A concrete subpath beneath a directory produced by another target.
///
/// `resolve` yields the concrete file under the generated directory, but
/// `resolve_underlying_dependencies` yields the *generating target's* directory path, so the
/// resolver routes this to a target edge (wait for the whole directory to be rebuilt) rather
/// than a raw filesystem edge on a path that doesn't exist until the generator runs.
///
/// Grounded on `internal/targetwrapper.py`'s non-target-dep-under-output-dir check, whose
/// error message names `DirGeneratedByTarget` as the path set a caller should have used
/// instead of a raw path dependency; `targets/native.py` confirms the shape (a subdirectory
/// of a directory generated by another target). No concrete `DirGeneratedByTarget`
/// implementation exists in the retrieval pack to copy from directly.
#[derive(Debug, Clone)]
pub struct GeneratedDirPathSet {
    generating_target_dir: PathBuf,
    subpath: PathBuf,
}

impl GeneratedDirPathSet {
    pub fn new(generating_target_dir: impl Into<PathBuf>, subpath: impl Into<PathBuf>) -> Self {
        GeneratedDirPathSet {
            generating_target_dir: generating_target_dir.into(),
            subpath: subpath.into(),
        }
    }

    pub fn generating_target_dir(&self) -> &Path {
        &self.generating_target_dir
    }
}

impl PathSet for GeneratedDirPathSet {
    fn resolve(&self, _ctx: &dyn BuildContext) -> Result<Vec<PathBuf>, BuildError> {
        Ok(vec![self.generating_target_dir.join(&self.subpath)])
    }

    fn resolve_underlying_dependencies(&self, _ctx: &dyn BuildContext) -> Result<Vec<PathBuf>, BuildError> {
        Ok(vec![self.generating_target_dir.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct NullContext;
    impl BuildContext for NullContext {
        fn is_valid_target(&self, _path: &str) -> bool {
            false
        }
        fn top_level_output_dirs(&self) -> &[PathBuf] {
            &[]
        }
    }

    #[test]
    fn static_set_resolves_to_its_literal_paths() {
        let set = StaticPathSet::new([PathBuf::from("/a"), PathBuf::from("/b/")]);
        let ctx = NullContext;
        assert_eq!(set.resolve(&ctx).unwrap(), vec![PathBuf::from("/a"), PathBuf::from("/b/")]);
    }

    #[test]
    fn generated_dir_set_routes_dependency_to_the_directory_not_the_subpath() {
        let set = GeneratedDirPathSet::new("/out/gen/", "file.txt");
        let ctx = NullContext;
        assert_eq!(set.resolve(&ctx).unwrap(), vec![PathBuf::from("/out/gen/file.txt")]);
        assert_eq!(
            set.resolve_underlying_dependencies(&ctx).unwrap(),
            vec![PathBuf::from("/out/gen/")]
        );
    }

    #[test]
    fn glob_set_asserts_skip_existence_check() {
        let set = GlobPathSet::new("/does/not/matter", "*.h");
        assert!(set.skip_existence_check());
    }
}
