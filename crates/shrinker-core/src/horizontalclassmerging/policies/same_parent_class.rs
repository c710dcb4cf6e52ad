use crate::graph::AppView;
use crate::horizontalclassmerging::merge_group::MergeGroup;
use crate::horizontalclassmerging::policy::{split_by_key, MultiClassPolicy};

pub struct SameParentClass;

impl MultiClassPolicy for SameParentClass {
    fn name(&self) -> &'static str {
        "SameParentClass"
    }

    fn apply(&self, app: &AppView, group: MergeGroup) -> Vec<MergeGroup> {
        split_by_key(app, group, |_, class| class.super_type)
    }
}
