// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashMap;

/// Identifies a set of targets that must all be built whenever any one of them is required.
///
/// Grounded on xpybuild's `defineAtomicTargetGroup`, which registers a set of target paths as
/// an atomic barrier: depending on one member pulls in every sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

/// Maps target paths to the group they belong to, and groups to their member paths.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    group_of: FnvHashMap<String, GroupId>,
    members_of: FnvHashMap<GroupId, Vec<String>>,
    next_id: u32,
}

impl GroupRegistry {
    pub fn new() -> Self {
        GroupRegistry::default()
    }

    /// Registers `members` (target paths) as one atomic group. Returns the new group's id.
    ///
    /// Panics if any member is already in another group — groups in this model are
    /// non-overlapping, matching xpybuild's usage (a target belongs to at most one atomic
    /// group).
    pub fn define_group(&mut self, members: impl IntoIterator<Item = String>) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        let members: Vec<String> = members.into_iter().collect();
        for m in &members {
            let prior = self.group_of.insert(m.clone(), id);
            assert!(prior.is_none(), "target {m} already belongs to a group");
        }
        self.members_of.insert(id, members);
        id
    }

    /// Every member of `path`'s group other than `path` itself, or an empty vec if `path`
    /// belongs to no group.
    pub fn siblings_of(&self, path: &str) -> Vec<String> {
        match self.group_of.get(path) {
            Some(id) => self
                .members_of
                .get(id)
                .map(|members| members.iter().filter(|m| m.as_str() != path).cloned().collect())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_exclude_the_queried_target_but_include_every_other_member() {
        let mut reg = GroupRegistry::new();
        reg.define_group(["a".to_string(), "b".to_string(), "c".to_string()]);
        let siblings_of_a = reg.siblings_of("a");
        assert!(!siblings_of_a.contains(&"a".to_string()));
        assert!(siblings_of_a.contains(&"b".to_string()));
        assert!(siblings_of_a.contains(&"c".to_string()));
    }

    #[test]
    fn ungrouped_target_has_no_siblings() {
        let reg = GroupRegistry::new();
        assert!(reg.siblings_of("solo").is_empty());
    }
}
