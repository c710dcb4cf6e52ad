use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;

/// Interfaces, and classes implementing any interface
pub struct NoInterfaces;

impl SingleClassPolicy for NoInterfaces {
    fn name(&self) -> &'static str {
        "NoInterfaces"
    }

    fn can_merge(&self, _app: &AppView, class: &ProgramClass) -> bool {
        !class.is_interface() && class.interfaces.is_empty()
    }
}
