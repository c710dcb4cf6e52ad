use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;

/// Native methods are bound by their holder's name
pub struct NoNativeMethods;

impl SingleClassPolicy for NoNativeMethods {
    fn name(&self) -> &'static str {
        "NoNativeMethods"
    }

    fn can_merge(&self, _app: &AppView, class: &ProgramClass) -> bool {
        !class.has_native_methods()
    }
}
