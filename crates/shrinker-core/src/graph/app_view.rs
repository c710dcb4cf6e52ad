use super::class::ProgramClass;
use super::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use super::program::{Program, ResolvedField};
use crate::lens::GraphLens;
use crate::shaking::{AppInfoWithLiveness, Enqueuer, EnumValueInfoMap, LivenessOracle};
use std::sync::Arc;

/// The program, its factory, the current liveness facts and the lens chain
/// head, handed from pass to pass.
#[derive(Debug)]
pub struct AppView {
    pub factory: ItemFactory,
    pub program: Program,
    pub app_info: AppInfoWithLiveness,
    graph_lens: Arc<GraphLens>,
}

impl AppView {
    /// Trace liveness from the program's entry points
    pub fn new(factory: ItemFactory, program: Program) -> Self {
        let app_info = Enqueuer::new(&program, &factory).trace();
        Self::with_liveness(factory, program, app_info)
    }

    pub fn with_liveness(factory: ItemFactory, program: Program, app_info: AppInfoWithLiveness) -> Self {
        Self {
            factory,
            program,
            app_info,
            graph_lens: GraphLens::identity(),
        }
    }

    pub fn graph_lens(&self) -> &Arc<GraphLens> {
        &self.graph_lens
    }

    /// Publish a new chain head and bring the liveness facts up to date with
    /// it. The program must already reflect the new lens.
    pub fn set_graph_lens(&mut self, lens: Arc<GraphLens>) {
        let since = self.graph_lens.version();
        self.app_info = self
            .app_info
            .rewritten_with_lens(&self.program, &self.factory, &lens, since);
        self.graph_lens = lens;
    }

    /// Replace the chain without touching liveness, for history-only lenses
    pub(crate) fn replace_graph_lens(&mut self, lens: Arc<GraphLens>) {
        self.graph_lens = lens;
    }

    pub fn definition_for(&self, ty: TypeRef) -> Option<&ProgramClass> {
        self.program.class(ty)
    }
}

impl LivenessOracle for AppView {
    fn is_live_type(&self, ty: TypeRef) -> bool {
        self.app_info.is_live_type(ty)
    }

    fn is_live_field(&self, field: FieldRef) -> bool {
        self.app_info.is_live_field(field)
    }

    fn is_live_method(&self, method: MethodRef) -> bool {
        self.app_info.is_live_method(method)
    }

    fn resolve_field(&self, field: FieldRef) -> Option<ResolvedField> {
        self.program.resolve_field(&self.factory, field)
    }

    fn classes(&self) -> Vec<&ProgramClass> {
        self.program.classes_with_deterministic_order(&self.factory)
    }

    fn enum_value_info_map(&self, ty: TypeRef) -> Option<&EnumValueInfoMap> {
        self.app_info.enum_value_info_map(ty)
    }

    fn is_pinned(&self, ty: TypeRef) -> bool {
        self.app_info.is_pinned(ty) || self.program.class(ty).is_some_and(|c| c.pinned)
    }

    fn is_instantiated(&self, ty: TypeRef) -> bool {
        self.app_info.is_instantiated(ty)
    }

    fn is_used_in_runtime_type_check(&self, ty: TypeRef) -> bool {
        self.app_info.is_used_in_runtime_type_check(ty)
    }
}
