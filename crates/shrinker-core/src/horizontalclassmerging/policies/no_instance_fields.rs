use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;

/// Restricted mode only
pub struct NoInstanceFields;

impl SingleClassPolicy for NoInstanceFields {
    fn name(&self) -> &'static str {
        "NoInstanceFields"
    }

    fn can_merge(&self, _app: &AppView, class: &ProgramClass) -> bool {
        class.instance_fields().is_empty()
    }
}
