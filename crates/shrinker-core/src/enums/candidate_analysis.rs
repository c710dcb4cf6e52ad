use super::enum_unboxer::EnumUnboxer;
use super::reason::Reason;
use crate::graph::class::ProgramClass;
use crate::graph::factory::TypeRef;
use crate::graph::AppView;
use crate::shaking::LivenessOracle;
use rustc_hash::FxHashMap;
use tracing::trace;

/// Shape checks run before any code is looked at. An enum passing them
/// becomes a candidate; code analysis can then only take it away.
pub(super) struct EnumUnboxingCandidateAnalysis<'a> {
    app: &'a AppView,
}

impl<'a> EnumUnboxingCandidateAnalysis<'a> {
    pub(super) fn new(app: &'a AppView) -> Self {
        Self { app }
    }

    /// Returns the number of candidates found
    pub(super) fn find_candidates(&self, unboxer: &EnumUnboxer) -> usize {
        let enum_type = self.app.factory.known().enum_type;
        let subclasses = self.app.program.direct_subclasses();
        let mut found = 0;
        for class in self.app.classes() {
            // Constant bodies are enum-flagged subclasses of their enum
            if !class.is_enum() || class.super_type != Some(enum_type) {
                continue;
            }
            match self.check(class, &subclasses) {
                Ok(()) => {
                    unboxer.add_candidate(class.ty);
                    found += 1;
                }
                Err(reason) => {
                    trace!(enum_type = self.app.factory.descriptor(class.ty), %reason, "Not a candidate");
                    unboxer.report_failure(class.ty, reason);
                }
            }
        }
        found
    }

    fn check(&self, class: &ProgramClass, subclasses: &FxHashMap<TypeRef, Vec<TypeRef>>) -> Result<(), Reason> {
        let factory = &self.app.factory;
        if subclasses.get(&class.ty).is_some_and(|s| !s.is_empty()) {
            return Err(Reason::Subtypes);
        }
        if !class.interfaces.is_empty() {
            return Err(Reason::Interface);
        }
        if !class.instance_fields().is_empty() {
            return Err(Reason::InstanceField);
        }
        if !class.virtual_methods().is_empty() {
            return Err(Reason::VirtualMethod);
        }
        let unexpected = class.direct_methods().iter().any(|m| {
            !m.is_instance_initializer()
                && !m.is_class_initializer()
                && !factory.is_enum_values_method(m.reference, class.ty)
                && !factory.is_enum_value_of_method(m.reference, class.ty)
        });
        if unexpected {
            return Err(Reason::UnexpectedDirectMethod);
        }
        if self.app.is_pinned(class.ty) || class.has_pinned_members() {
            return Err(Reason::Pinned);
        }
        Ok(())
    }
}
