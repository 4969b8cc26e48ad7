// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs;
use std::io;
use std::path::Path;

/// Escapes embedded CR/LF in a fingerprint line so the line-oriented file format stays
/// unambiguous: a literal newline inside a hashable input would otherwise look like a second
/// fingerprint entry.
pub fn escape_line(s: &str) -> String {
    s.replace('\r', "\\r").replace('\n', "\\n")
}

/// Builds the full implicit-inputs fingerprint for a target: target-dep paths (sorted),
/// then non-target-dep paths (sorted), then the target's own hashable implicit inputs, in
/// declared order, each CR/LF-escaped.
pub fn build_fingerprint<'a>(
    target_dep_paths: impl IntoIterator<Item = &'a str>,
    nontarget_dep_paths: impl IntoIterator<Item = &'a str>,
    hashable_implicit_inputs: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let mut out = Vec::new();
    out.extend(target_dep_paths.into_iter().map(escape_line));
    out.extend(nontarget_dep_paths.into_iter().map(escape_line));
    out.extend(hashable_implicit_inputs.into_iter().map(|s| escape_line(&s)));
    out
}

/// Writes `fingerprint` to `path`, one entry per line, using the platform line separator.
/// Creates the parent directory if needed.
pub fn write_fingerprint(path: &Path, fingerprint: &[String]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut contents = fingerprint.join("\n");
    if !fingerprint.is_empty() {
        contents.push('\n');
    }
    fs::write(path, contents)
}

/// Reads a previously-written fingerprint file. Returns `Ok(None)` if it doesn't exist.
pub fn read_fingerprint(path: &Path) -> io::Result<Option<Vec<String>>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(
            contents
                .lines()
                .map(str::to_owned)
                .collect::<Vec<_>>(),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// A bounded, tail-biased diff between an old and new fingerprint: shows at most
/// `max_diff_lines` changed lines total, split half-and-half between additions and removals,
/// keeping the *last* lines of each category (the theory being that the most recent changes
/// tend to be the actual cause).
pub fn diff_fingerprints(old: &[String], new: &[String], max_diff_lines: usize) -> FingerprintDiff {
    let old_set: std::collections::HashSet<&String> = old.iter().collect();
    let new_set: std::collections::HashSet<&String> = new.iter().collect();

    let removed: Vec<String> = old.iter().filter(|l| !new_set.contains(l)).cloned().collect();
    let added: Vec<String> = new.iter().filter(|l| !old_set.contains(l)).cloned().collect();

    let half = (max_diff_lines / 2).max(1);
    let truncated_removed = tail(&removed, half);
    let truncated_added = tail(&added, half);

    FingerprintDiff {
        removed_total: removed.len(),
        added_total: added.len(),
        removed_shown: truncated_removed,
        added_shown: truncated_added,
    }
}

fn tail(items: &[String], n: usize) -> Vec<String> {
    if items.len() <= n {
        items.to_vec()
    } else {
        items[items.len() - n..].to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintDiff {
    pub removed_total: usize,
    pub added_total: usize,
    pub removed_shown: Vec<String>,
    pub added_shown: Vec<String>,
}

impl FingerprintDiff {
    pub fn is_empty(&self) -> bool {
        self.removed_total == 0 && self.added_total == 0
    }
}

impl std::fmt::Display for FingerprintDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.removed_shown {
            writeln!(f, "- {line}")?;
        }
        for line in &self.added_shown {
            writeln!(f, "+ {line}")?;
        }
        if self.removed_total > self.removed_shown.len() || self.added_total > self.added_shown.len() {
            write!(
                f,
                "... ({} removed, {} added, truncated)",
                self.removed_total, self.added_total
            )?;
        }
        Ok(())
    }
}
