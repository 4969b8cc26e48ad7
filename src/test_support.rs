// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Shared fixtures for resolver/oracle/scheduler unit tests. Not compiled outside `cfg(test)`.

#![cfg(test)]

use std::path::PathBuf;
use std::sync::Arc;

use fnv::FnvHashMap;
use petgraph::stable_graph::StableDiGraph;

use crate::error::BuildError;
use crate::group::GroupRegistry;
use crate::pathset::{GeneratedDirPathSet, PathSet, StaticPathSet};
use crate::target::{BuildContext, Target};
use crate::wrapper::{EntryId, TargetWrapper};

pub struct TestContext {
    pub output_dirs: Vec<PathBuf>,
}

impl BuildContext for TestContext {
    fn is_valid_target(&self, _path: &str) -> bool {
        false
    }

    fn top_level_output_dirs(&self) -> &[PathBuf] {
        &self.output_dirs
    }
}

pub struct MockTarget {
    name: String,
    path: String,
    priority: i64,
    deps: Vec<String>,
    /// `(generating_target_dir, subpath)` pairs, each resolved as a `GeneratedDirPathSet`
    /// dependency rather than a raw static path.
    generated_dir_deps: Vec<(String, String)>,
}

#[async_trait::async_trait]
impl Target<TestContext> for MockTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn work_dir(&self) -> &std::path::Path {
        std::path::Path::new("/work")
    }

    fn priority(&self) -> i64 {
        self.priority
    }

    async fn run(&self, _ctx: &TestContext) -> Result<(), BuildError> {
        Ok(())
    }

    async fn clean(&self, _ctx: &TestContext) -> Result<(), BuildError> {
        Ok(())
    }

    fn resolve_underlying_dependencies(
        &self,
        _ctx: &TestContext,
    ) -> Vec<(PathBuf, Box<dyn PathSet>)> {
        let mut out: Vec<(PathBuf, Box<dyn PathSet>)> = self
            .deps
            .iter()
            .map(|p| {
                let path = PathBuf::from(p);
                (path.clone(), Box::new(StaticPathSet::new([path])) as Box<dyn PathSet>)
            })
            .collect();
        out.extend(self.generated_dir_deps.iter().map(|(dir, subpath)| {
            let set = GeneratedDirPathSet::new(dir.clone(), subpath.clone());
            (PathBuf::from(dir).join(subpath), Box::new(set) as Box<dyn PathSet>)
        }));
        out
    }
}

pub struct TargetSpec {
    pub name: &'static str,
    pub path: String,
    pub priority: i64,
    pub deps: Vec<String>,
    pub generated_dir_deps: Vec<(String, String)>,
}

pub fn fixture_target(name: &'static str, target_deps: &[&str], raw_deps: &[&str]) -> TargetSpec {
    fixture_target_with_path(name, &format!("/targets/{name}"), target_deps, raw_deps)
}

pub fn fixture_target_with_path(
    name: &'static str,
    path: &str,
    target_deps: &[&str],
    raw_deps: &[&str],
) -> TargetSpec {
    let mut deps: Vec<String> = target_deps.iter().map(|d| format!("/targets/{d}")).collect();
    deps.extend(raw_deps.iter().map(|d| d.to_string()));
    TargetSpec {
        name,
        path: path.to_string(),
        priority: 0,
        deps,
        generated_dir_deps: Vec::new(),
    }
}

/// A target whose only dependency is a subpath under a directory generated by another
/// target — resolved via `GeneratedDirPathSet` rather than a raw static path, so the resolver
/// must route it to a target edge on `generating_target_dir` instead of a non-target edge.
pub fn fixture_target_with_generated_dir(
    name: &'static str,
    generating_target_dir: &str,
    subpath: &str,
) -> TargetSpec {
    let mut spec = fixture_target(name, &[], &[]);
    spec.generated_dir_deps = vec![(generating_target_dir.to_string(), subpath.to_string())];
    spec
}

pub struct Fixture {
    pub path_to_entry: FnvHashMap<String, EntryId>,
    pub wrappers: FnvHashMap<EntryId, Arc<TargetWrapper<TestContext>>>,
    pub groups: GroupRegistry,
    pub ctx: TestContext,
    graph: StableDiGraph<(), ()>,
}

impl Fixture {
    pub fn new(specs: Vec<TargetSpec>) -> Self {
        Self::with_output_dirs(specs, Vec::new())
    }

    pub fn with_output_dirs(specs: Vec<TargetSpec>, output_dirs: Vec<PathBuf>) -> Self {
        let mut graph = StableDiGraph::new();
        let mut path_to_entry = FnvHashMap::default();
        let mut wrappers = FnvHashMap::default();
        let dir = std::env::temp_dir().join("buildgraph-test-implicit-inputs");

        for spec in specs {
            let entry_id = graph.add_node(());
            let target = Arc::new(MockTarget {
                name: spec.name.to_string(),
                path: spec.path.clone(),
                priority: spec.priority,
                deps: spec.deps,
                generated_dir_deps: spec.generated_dir_deps,
            });
            let wrapper = Arc::new(TargetWrapper::new(target, entry_id, dir.clone()));
            path_to_entry.insert(spec.path, entry_id);
            wrappers.insert(entry_id, wrapper);
        }

        Fixture {
            path_to_entry,
            wrappers,
            groups: GroupRegistry::new(),
            ctx: TestContext { output_dirs },
            graph,
        }
    }

    pub fn entry(&self, name: &str) -> EntryId {
        *self.path_to_entry.get(&format!("/targets/{name}")).unwrap()
    }

    pub fn wrapper(&self, name: &str) -> &TargetWrapper<TestContext> {
        let entry = self
            .path_to_entry
            .get(&format!("/targets/{name}"))
            .copied()
            .unwrap_or_else(|| panic!("no target named {name}"));
        self.wrappers.get(&entry).unwrap()
    }

    pub fn wrapper_by_path(&self, path: &str) -> &TargetWrapper<TestContext> {
        let entry = *self.path_to_entry.get(path).unwrap();
        self.wrappers.get(&entry).unwrap()
    }
}
