use crate::graph::class::ProgramClass;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;

/// Merging would change when an observable static initializer runs
pub struct NoStaticClassInitializer;

impl SingleClassPolicy for NoStaticClassInitializer {
    fn name(&self) -> &'static str {
        "NoStaticClassInitializer"
    }

    fn can_merge(&self, _app: &AppView, class: &ProgramClass) -> bool {
        class.class_initializer().is_none() || !class.class_initializer_may_have_side_effects
    }
}
