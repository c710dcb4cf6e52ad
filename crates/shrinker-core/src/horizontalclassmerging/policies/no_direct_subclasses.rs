use crate::graph::class::ProgramClass;
use crate::graph::factory::TypeRef;
use crate::graph::AppView;
use crate::horizontalclassmerging::policy::SingleClassPolicy;
use rustc_hash::FxHashSet;

/// Only leaves of the program hierarchy are merged
pub struct NoDirectSubclasses {
    with_subclasses: FxHashSet<TypeRef>,
}

impl NoDirectSubclasses {
    pub fn new(app: &AppView) -> Self {
        let with_subclasses = app
            .program
            .direct_subclasses()
            .into_iter()
            .filter(|(_, subclasses)| !subclasses.is_empty())
            .map(|(ty, _)| ty)
            .collect();
        Self { with_subclasses }
    }
}

impl SingleClassPolicy for NoDirectSubclasses {
    fn name(&self) -> &'static str {
        "NoDirectSubclasses"
    }

    fn can_merge(&self, _app: &AppView, class: &ProgramClass) -> bool {
        !self.with_subclasses.contains(&class.ty)
    }
}
