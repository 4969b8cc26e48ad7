// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;
use std::path::PathBuf;

/// A build-time error, tagged with the kind of failure so the scheduler can decide how to
/// propagate it rather than treating every error as an opaque string.
#[derive(Debug, Clone)]
pub enum BuildError {
    /// Raised during resolution, before any recipe runs: bad path set, dependency cycle,
    /// a non-target dependency nested under a known output directory, and similar.
    Configuration { target: String, message: String },
    /// A required non-target dependency does not exist, or is a file where a directory was
    /// expected (or vice versa), at the point the target is about to be built.
    MissingInput { target: String, path: PathBuf, detail: String },
    /// The target's recipe itself failed (raised, or its subprocess exited non-zero).
    RecipeFailure { target: String, detail: String },
    /// The recipe reported success but its declared output does not exist, or is the wrong
    /// kind of path.
    PostConditionFailure { target: String, path: PathBuf },
    /// This target was never attempted because a dependency failed or was itself skipped.
    Skipped { target: String, cause: String },
    /// The build was cancelled (user interrupt, or fail-fast triggered by an earlier error)
    /// before this target's turn came up.
    Cancelled { target: String },
}

impl BuildError {
    pub fn target(&self) -> &str {
        match self {
            BuildError::Configuration { target, .. }
            | BuildError::MissingInput { target, .. }
            | BuildError::RecipeFailure { target, .. }
            | BuildError::PostConditionFailure { target, .. }
            | BuildError::Skipped { target, .. }
            | BuildError::Cancelled { target, .. } => target,
        }
    }

    /// Whether this error should itself propagate as a `Skipped` cause to dependents, as
    /// opposed to aborting the whole build (only `Configuration` errors do the latter).
    pub fn propagates_as_skip(&self) -> bool {
        !matches!(self, BuildError::Configuration { .. })
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Configuration { target, message } => {
                write!(f, "{target}: configuration error: {message}")
            }
            BuildError::MissingInput { target, path, detail } => {
                write!(f, "{target}: missing input {}: {detail}", path.display())
            }
            BuildError::RecipeFailure { target, detail } => {
                write!(f, "{target}: recipe failed: {detail}")
            }
            BuildError::PostConditionFailure { target, path } => {
                write!(
                    f,
                    "{target}: recipe reported success but {} does not exist or is the wrong kind",
                    path.display()
                )
            }
            BuildError::Skipped { target, cause } => {
                write!(f, "{target}: skipped ({cause})")
            }
            BuildError::Cancelled { target } => {
                write!(f, "{target}: cancelled")
            }
        }
    }
}

impl std::error::Error for BuildError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_do_not_propagate_as_skip() {
        let e = BuildError::Configuration {
            target: "t".into(),
            message: "bad".into(),
        };
        assert!(!e.propagates_as_skip());
    }

    #[test]
    fn recipe_failures_propagate_as_skip() {
        let e = BuildError::RecipeFailure {
            target: "t".into(),
            detail: "nonzero exit".into(),
        };
        assert!(e.propagates_as_skip());
    }
}
