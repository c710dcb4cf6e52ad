use super::merge_group::MergeGroup;
use super::policy::Policy;
use crate::graph::AppView;
use tracing::debug;

/// Runs a list of policies over candidate groups
pub trait PolicyExecutor {
    fn run(&self, app: &AppView, groups: Vec<MergeGroup>) -> Vec<MergeGroup>;
}

/// Applies the policies one after the other, dropping groups that fall
/// below two classes after each policy.
pub struct SimplePolicyExecutor {
    policies: Vec<Policy>,
}

impl SimplePolicyExecutor {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies }
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(Policy::name).collect()
    }

    fn apply(app: &AppView, policy: &Policy, groups: Vec<MergeGroup>) -> Vec<MergeGroup> {
        match policy {
            Policy::Single(policy) => groups
                .into_iter()
                .map(|mut group| {
                    group.retain(|&ty| {
                        app.definition_for(ty)
                            .is_some_and(|class| policy.can_merge(app, class))
                    });
                    group
                })
                .collect(),
            Policy::Multi(policy) => groups
                .into_iter()
                .flat_map(|group| policy.apply(app, group))
                .collect(),
        }
    }
}

impl PolicyExecutor for SimplePolicyExecutor {
    fn run(&self, app: &AppView, mut groups: Vec<MergeGroup>) -> Vec<MergeGroup> {
        groups.retain(|g| !g.is_trivial());
        for policy in &self.policies {
            if groups.is_empty() {
                break;
            }
            groups = Self::apply(app, policy, groups);
            groups.retain(|g| !g.is_trivial());
            debug!(policy = policy.name(), groups = groups.len(), "Applied merge policy");
        }
        groups
    }
}
