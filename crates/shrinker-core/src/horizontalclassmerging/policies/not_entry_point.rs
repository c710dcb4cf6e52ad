use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;
use crate::shaking::LivenessOracle;

/// Pinned classes, and classes with a pinned member
pub struct NotEntryPoint;

impl SingleClassPolicy for NotEntryPoint {
    fn name(&self) -> &'static str {
        "NotEntryPoint"
    }

    fn can_merge(&self, app: &AppView, class: &ProgramClass) -> bool {
        !app.is_pinned(class.ty) && !class.has_pinned_members()
    }
}
