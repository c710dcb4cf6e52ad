use crate::graph::AppView;
use crate::horizontalclassmerging::merge_group::MergeGroup;
use crate::horizontalclassmerging::policy::{split_by_key, MultiClassPolicy};
use crate::shaking::LivenessOracle;

/// Instantiated and never-instantiated classes are kept apart
pub struct SameInstantiation;

impl MultiClassPolicy for SameInstantiation {
    fn name(&self) -> &'static str {
        "SameInstantiation"
    }

    fn apply(&self, app: &AppView, group: MergeGroup) -> Vec<MergeGroup> {
        split_by_key(app, group, |app, class| app.is_instantiated(class.ty))
    }
}
