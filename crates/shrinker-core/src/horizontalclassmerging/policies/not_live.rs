use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;
use crate::shaking::LivenessOracle;

/// Dead classes are left to tree shaking
pub struct NotLive;

impl SingleClassPolicy for NotLive {
    fn name(&self) -> &'static str {
        "NotLive"
    }

    fn can_merge(&self, app: &AppView, class: &ProgramClass) -> bool {
        app.is_live_type(class.ty)
    }
}
