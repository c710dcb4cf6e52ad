use super::merge_group::MergeGroup;
use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use indexmap::IndexMap;
use std::hash::Hash;

/// A per-class check. Classes failing it leave their group.
pub trait SingleClassPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_merge(&self, app: &AppView, class: &ProgramClass) -> bool;
}

/// A check on a whole group, which may split it into several groups
pub trait MultiClassPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Split `group`. Every returned group keeps the relative order of
    /// `group`, and no class appears twice.
    fn apply(&self, app: &AppView, group: MergeGroup) -> Vec<MergeGroup>;
}

pub enum Policy {
    Single(Box<dyn SingleClassPolicy>),
    Multi(Box<dyn MultiClassPolicy>),
}

impl Policy {
    pub fn single(policy: impl SingleClassPolicy + 'static) -> Self {
        Policy::Single(Box::new(policy))
    }

    pub fn multi(policy: impl MultiClassPolicy + 'static) -> Self {
        Policy::Multi(Box::new(policy))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::Single(policy) => policy.name(),
            Policy::Multi(policy) => policy.name(),
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Split a group by a key. Groups come out in the order their key was first
/// seen, classes in their original order.
pub fn split_by_key<K, F>(app: &AppView, group: MergeGroup, mut key: F) -> Vec<MergeGroup>
where
    K: Hash + Eq,
    F: FnMut(&AppView, &ProgramClass) -> K,
{
    let mut buckets: IndexMap<K, MergeGroup> = IndexMap::new();
    for ty in group.iter() {
        let Some(class) = app.definition_for(ty) else {
            continue;
        };
        buckets.entry(key(app, class)).or_default().push(ty);
    }
    buckets.into_values().collect()
}
