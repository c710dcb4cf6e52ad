use crate::graph::AppView;
use crate::horizontalclassmerging::merge_group::MergeGroup;
use crate::horizontalclassmerging::policy::{split_by_key, MultiClassPolicy};

/// Private access between nest members must survive the merge
pub struct SameNestHost;

impl MultiClassPolicy for SameNestHost {
    fn name(&self) -> &'static str {
        "SameNestHost"
    }

    fn apply(&self, app: &AppView, group: MergeGroup) -> Vec<MergeGroup> {
        let object = app.factory.known().object_type;
        split_by_key(app, group, |_, class| class.nest_host.unwrap_or(object))
    }
}
