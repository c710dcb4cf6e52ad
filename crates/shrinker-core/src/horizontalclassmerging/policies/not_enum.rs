use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;

pub struct NotEnum;

impl SingleClassPolicy for NotEnum {
    fn name(&self) -> &'static str {
        "NotEnum"
    }

    fn can_merge(&self, _app: &AppView, class: &ProgramClass) -> bool {
        !class.is_enum()
    }
}
