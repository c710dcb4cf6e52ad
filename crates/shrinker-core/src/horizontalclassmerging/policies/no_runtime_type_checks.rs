use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;
use crate::shaking::LivenessOracle;

/// Types tested by instance-of, check-cast or loaded as a class constant
pub struct NoRuntimeTypeChecks;

impl SingleClassPolicy for NoRuntimeTypeChecks {
    fn name(&self) -> &'static str {
        "NoRuntimeTypeChecks"
    }

    fn can_merge(&self, app: &AppView, class: &ProgramClass) -> bool {
        !app.is_used_in_runtime_type_check(class.ty)
    }
}
