//! Horizontal class merging.
//!
//! Sibling classes with the same shape are folded into one class. Groups
//! are formed from the instance field types, narrowed by a fixed list of
//! policies, and each group is planned before any class is touched. A group
//! whose plan fails is skipped as a whole. The moves of every committed
//! group, and the signature fixups that follow, make up one lens layer.

mod class_merger;
mod field_multiset;
mod merge_group;
pub mod policies;
mod policy;
mod policy_executor;
mod virtual_method_merger;

pub use class_merger::{ClassMerger, MergeAbort, CLASS_ID_FIELD_NAME};
pub use field_multiset::FieldMultiset;
pub use merge_group::MergeGroup;
pub use policy::{split_by_key, MultiClassPolicy, Policy, SingleClassPolicy};
pub use policy_executor::{PolicyExecutor, SimplePolicyExecutor};

use crate::config::HorizontalMergingOptions;
use crate::errors::Result;
use crate::graph::factory::TypeRef;
use crate::graph::AppView;
use crate::lens::NestedLensBuilder;
use crate::shaking::LivenessOracle;
use crate::tree_fixer::TreeFixer;
use indexmap::IndexMap;
use policies::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// What merging changed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HorizontalClassMergingSummary {
    /// Groups that were merged
    pub groups: usize,
    /// Classes removed by merging into a target
    pub merged_classes: usize,
    /// Groups whose plan failed
    pub aborted: usize,
    pub fixed_members: usize,
}

pub struct HorizontalClassMerger {
    restricted: bool,
}

impl HorizontalClassMerger {
    pub fn new(options: &HorizontalMergingOptions) -> Self {
        Self {
            restricted: options.restricted,
        }
    }

    /// The policies, in the order they run
    pub fn policies(&self, app: &AppView) -> Vec<Policy> {
        let mut policies = vec![
            Policy::single(NotLive),
            Policy::single(NoInterfaces),
            Policy::single(NotEnum),
            Policy::single(NoNativeMethods),
            Policy::single(NotEntryPoint),
            Policy::single(NoStaticClassInitializer),
            Policy::single(NoRuntimeTypeChecks),
            Policy::single(NoDirectSubclasses::new(app)),
        ];
        if self.restricted {
            policies.push(Policy::single(NoInstanceFields));
        }
        policies.push(Policy::multi(SameParentClass));
        policies.push(Policy::multi(SameNestHost));
        policies.push(Policy::multi(SameInstantiation));
        policies
    }

    /// One group per field multiset, in program order
    pub fn initial_groups(app: &AppView) -> Vec<MergeGroup> {
        let mut groups: IndexMap<FieldMultiset, MergeGroup> = IndexMap::new();
        for class in app.classes() {
            groups
                .entry(FieldMultiset::new(&app.factory, class))
                .or_default()
                .push(class.ty);
        }
        groups.into_values().filter(|g| !g.is_trivial()).collect()
    }

    pub fn compute_groups(&self, app: &AppView) -> Vec<MergeGroup> {
        let executor = SimplePolicyExecutor::new(self.policies(app));
        executor.run(app, Self::initial_groups(app))
    }

    /// Merge every group that can be merged and publish the resulting lens.
    /// Returns `None` when nothing was merged.
    pub fn run(&self, app: &mut AppView) -> Result<Option<HorizontalClassMergingSummary>> {
        let groups = self.compute_groups(app);
        if groups.is_empty() {
            debug!("No merge groups");
            return Ok(None);
        }

        let mut summary = HorizontalClassMergingSummary::default();
        let mut mergers = Vec::with_capacity(groups.len());
        for group in &groups {
            match ClassMerger::plan(&mut app.factory, &app.program, group) {
                Ok(merger) => mergers.push(merger),
                Err(reason) => {
                    summary.aborted += 1;
                    debug!(group = %group.to_source_string(&app.factory), %reason, "Merge aborted");
                }
            }
        }
        if mergers.is_empty() {
            return Ok(None);
        }

        let mut substitution: FxHashMap<TypeRef, TypeRef> = FxHashMap::default();
        for merger in &mergers {
            for &source in merger.sources() {
                substitution.insert(source, merger.target());
            }
        }
        let removed: FxHashSet<TypeRef> = substitution.keys().copied().collect();
        summary.groups = mergers.len();
        summary.merged_classes = removed.len();

        let mut builder = NestedLensBuilder::new();
        for merger in mergers {
            merger.commit(&mut app.program, &mut builder);
        }
        summary.fixed_members = TreeFixer::new(&mut app.factory, &substitution).fixup_program(
            &mut app.program,
            &removed,
            &mut builder,
        );
        let lens = builder.build(app.graph_lens())?;
        app.set_graph_lens(lens);

        info!(
            groups = summary.groups,
            merged = summary.merged_classes,
            aborted = summary.aborted,
            "Horizontal class merging complete"
        );
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::class::{
        ClassAccessFlags, EncodedField, EncodedMethod, FieldAccessFlags, MethodAccessFlags, ProgramClass,
    };
    use crate::graph::code::{Code, Instruction, InvokeType, MethodBody};
    use crate::graph::factory::{ItemFactory, MethodRef};
    use crate::graph::program::Program;
    use crate::lens::LensVersion;
    use crate::shaking::AppInfoWithLiveness;

    struct Fixture {
        factory: ItemFactory,
        program: Program,
        live: Vec<TypeRef>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                factory: ItemFactory::new(),
                program: Program::new(),
                live: Vec::new(),
            }
        }

        fn class(&mut self, descriptor: &str) -> TypeRef {
            let object = self.factory.known().object_type;
            let ty = self.factory.create_type(descriptor);
            let mut class = ProgramClass::new(ty, ClassAccessFlags::PUBLIC, Some(object));
            class.add_method(self.trivial_constructor(ty));
            self.program.add_class(class);
            self.live.push(ty);
            ty
        }

        fn trivial_constructor(&mut self, ty: TypeRef) -> EncodedMethod {
            let known = self.factory.known().clone();
            let init = self.factory.create_method(ty, known.void_proto, known.init_name);
            let super_init = self.factory.create_method(known.object_type, known.void_proto, known.init_name);
            let mut code = Code::new(LensVersion::IDENTITY);
            let receiver = code.emit_argument(ty);
            code.emit_invoke(InvokeType::Direct, super_init, vec![receiver], None);
            code.emit_return(None);
            EncodedMethod::new(init, MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR, Some(MethodBody::Code(code)))
        }

        fn virtual_method(&mut self, ty: TypeRef, name: &str) -> MethodRef {
            let known = self.factory.known().clone();
            let name = self.factory.intern_string(name);
            let method = self.factory.create_method(ty, known.void_proto, name);
            let mut code = Code::new(LensVersion::IDENTITY);
            code.emit_argument(ty);
            code.emit_return(None);
            if let Some(class) = self.program.class_mut(ty) {
                class.add_method(EncodedMethod::new(method, MethodAccessFlags::PUBLIC, Some(MethodBody::Code(code))));
            }
            method
        }

        fn app(self) -> AppView {
            let mut info = AppInfoWithLiveness::default();
            for &ty in &self.live {
                info.live_types.insert(ty);
                info.instantiated_types.insert(ty);
            }
            AppView::with_liveness(self.factory, self.program, info)
        }
    }

    fn merger() -> HorizontalClassMerger {
        HorizontalClassMerger::new(&HorizontalMergingOptions::default())
    }

    #[test]
    fn test_siblings_form_one_group() {
        let mut f = Fixture::new();
        let a = f.class("Lcom/example/A;");
        let b = f.class("Lcom/example/B;");
        let c = f.class("Lcom/example/C;");
        let app = f.app();
        let groups = merger().compute_groups(&app);
        assert_eq!(groups, vec![MergeGroup::new(vec![a, b, c])]);
    }

    #[test]
    fn test_field_shapes_split_groups() {
        let mut f = Fixture::new();
        let a = f.class("Lcom/example/A;");
        let b = f.class("Lcom/example/B;");
        let c = f.class("Lcom/example/C;");
        let int = f.factory.known().int_type;
        let name = f.factory.intern_string("x");
        let field = f.factory.create_field(b, int, name);
        f.program
            .class_mut(b)
            .unwrap()
            .add_field(EncodedField::new(field, FieldAccessFlags::PRIVATE));
        let app = f.app();
        let groups = merger().compute_groups(&app);
        assert_eq!(groups, vec![MergeGroup::new(vec![a, c])]);
    }

    #[test]
    fn test_excluded_classes_leave_their_group() {
        let mut f = Fixture::new();
        let a = f.class("Lcom/example/A;");
        let b = f.class("Lcom/example/B;");
        let c = f.class("Lcom/example/C;");
        f.program.class_mut(b).unwrap().pinned = true;
        let mut app = f.app();
        app.app_info.pinned_types.insert(b);
        let groups = merger().compute_groups(&app);
        assert_eq!(groups, vec![MergeGroup::new(vec![a, c])]);
    }

    #[test]
    fn test_merge_rewrites_program_and_lens() {
        let mut f = Fixture::new();
        let a = f.class("Lcom/example/A;");
        let b = f.class("Lcom/example/B;");
        let mut app = f.app();

        let summary = merger().run(&mut app).unwrap().unwrap();
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.merged_classes, 1);
        assert!(app.program.contains_class(a));
        assert!(!app.program.contains_class(b));
        assert_eq!(app.graph_lens().lookup_type(b), a);

        // Both trivial constructors collapse into the target's
        let constructors: Vec<_> = app.program.class(a).unwrap().instance_initializers().collect();
        assert_eq!(constructors.len(), 1);
    }

    #[test]
    fn test_shared_virtual_method_gets_dispatch() {
        let mut f = Fixture::new();
        let a = f.class("Lcom/example/A;");
        let b = f.class("Lcom/example/B;");
        let c = f.class("Lcom/example/C;");
        let a_run = f.virtual_method(a, "run");
        let b_run = f.virtual_method(b, "run");
        f.virtual_method(c, "run");
        let mut app = f.app();

        merger().run(&mut app).unwrap().unwrap();
        let class = app.program.class(a).unwrap();
        let dispatch = class
            .lookup_method(a_run)
            .and_then(|m| m.body.as_ref())
            .and_then(|body| match body {
                MethodBody::ClassIdDispatch(dispatch) => Some(dispatch.clone()),
                _ => None,
            })
            .unwrap();
        let ids: Vec<i32> = dispatch.cases.iter().map(|&(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(dispatch.fallback, None);
        assert_eq!(app.factory.method_name(dispatch.cases[1].1), "run$B");

        // Calls to B.run go to the dispatch method
        let lookup = app
            .graph_lens()
            .lookup_method(b_run, None, InvokeType::Virtual);
        assert_eq!(lookup.reference, a_run);

        // Every constructor stores its class id after the receiver
        let stored: Vec<i64> = class
            .instance_initializers()
            .filter_map(|m| m.body.as_ref().and_then(MethodBody::as_code))
            .filter_map(|code| match code.instructions.get(1) {
                Some(Instruction::ConstNumber { value, .. }) => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(stored.len(), 3);
        let mut sorted = stored.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn test_two_class_initializers_abort_the_group() {
        let mut f = Fixture::new();
        let a = f.class("Lcom/example/A;");
        let b = f.class("Lcom/example/B;");
        let known = f.factory.known().clone();
        for ty in [a, b] {
            let clinit = f.factory.create_method(ty, known.void_proto, known.clinit_name);
            let mut code = Code::new(LensVersion::IDENTITY);
            code.emit_return(None);
            f.program.class_mut(ty).unwrap().add_method(EncodedMethod::new(
                clinit,
                MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR,
                Some(MethodBody::Code(code)),
            ));
        }
        let mut app = f.app();
        let before = app.program.class(b).cloned();
        assert_eq!(merger().run(&mut app).unwrap(), None);
        assert_eq!(app.program.class_count(), 2);
        assert_eq!(app.program.class(b).cloned(), before);
        assert!(app.graph_lens().is_identity());
    }
}
