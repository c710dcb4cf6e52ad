use crate::graph::code::InvokeType;
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use crate::graph::program::Program;
use crate::lens::{GraphLens, LensVersion};
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use tracing::debug;

/// Ordinal of every constant of one enum, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumValueInfoMap {
    ordinals: IndexMap<FieldRef, i32, FxBuildHasher>,
}

impl EnumValueInfoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: FieldRef, ordinal: i32) {
        self.ordinals.insert(field, ordinal);
    }

    pub fn ordinal(&self, field: FieldRef) -> Option<i32> {
        self.ordinals.get(&field).copied()
    }

    pub fn contains(&self, field: FieldRef) -> bool {
        self.ordinals.contains_key(&field)
    }

    pub fn size(&self) -> usize {
        self.ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldRef, i32)> + '_ {
        self.ordinals.iter().map(|(&f, &o)| (f, o))
    }
}

/// Reachability results, kept in terms of the current program
#[derive(Debug, Clone, Default)]
pub struct AppInfoWithLiveness {
    pub(crate) live_types: FxHashSet<TypeRef>,
    pub(crate) live_methods: FxHashSet<MethodRef>,
    pub(crate) live_fields: FxHashSet<FieldRef>,
    pub(crate) instantiated_types: FxHashSet<TypeRef>,
    pub(crate) pinned_types: FxHashSet<TypeRef>,
    pub(crate) runtime_type_checks: FxHashSet<TypeRef>,
    pub(crate) enum_value_infos: FxHashMap<TypeRef, EnumValueInfoMap>,
}

impl AppInfoWithLiveness {
    pub fn is_live_type(&self, ty: TypeRef) -> bool {
        self.live_types.contains(&ty)
    }

    pub fn is_live_method(&self, method: MethodRef) -> bool {
        self.live_methods.contains(&method)
    }

    pub fn is_live_field(&self, field: FieldRef) -> bool {
        self.live_fields.contains(&field)
    }

    pub fn is_instantiated(&self, ty: TypeRef) -> bool {
        self.instantiated_types.contains(&ty)
    }

    pub fn is_pinned(&self, ty: TypeRef) -> bool {
        self.pinned_types.contains(&ty)
    }

    pub fn is_used_in_runtime_type_check(&self, ty: TypeRef) -> bool {
        self.runtime_type_checks.contains(&ty)
    }

    pub fn enum_value_info_map(&self, ty: TypeRef) -> Option<&EnumValueInfoMap> {
        self.enum_value_infos.get(&ty)
    }

    pub fn live_type_count(&self) -> usize {
        self.live_types.len()
    }

    pub fn live_method_count(&self) -> usize {
        self.live_methods.len()
    }

    /// Translate the facts through the layers of `lens` newer than `since`.
    /// Anything that no longer names a program class or one of its members is
    /// dropped.
    pub fn rewritten_with_lens(
        &self,
        program: &Program,
        factory: &ItemFactory,
        lens: &GraphLens,
        since: LensVersion,
    ) -> AppInfoWithLiveness {
        if !lens.has_code_rewritings() || lens.version() <= since {
            return self.clone();
        }

        let map_types = |types: &FxHashSet<TypeRef>| -> FxHashSet<TypeRef> {
            types
                .iter()
                .map(|&ty| lens.lookup_type_since(ty, since))
                .filter(|&ty| program.contains_class(ty))
                .collect()
        };
        let is_program_field =
            |field: &FieldRef| program.contains_class(factory.field(*field).holder);
        let is_program_method =
            |method: &MethodRef| program.contains_class(factory.method(*method).holder);

        let live_fields = self
            .live_fields
            .iter()
            .map(|&f| lens.get_renamed_field_signature(f, since))
            .filter(is_program_field)
            .collect();

        // A method stays live both where its body went and where its calls go
        let mut live_methods = FxHashSet::default();
        for &method in &self.live_methods {
            let definition = lens.get_renamed_method_signature(method, since);
            let holder = factory.method(method).holder;
            let invoke_type = match program.class(holder) {
                Some(class) if class.lookup_method(method).is_some_and(|m| m.is_static()) => {
                    InvokeType::Static
                }
                _ => InvokeType::Virtual,
            };
            let target = lens
                .lookup_method_since(method, None, invoke_type, since)
                .reference;
            live_methods.extend([definition, target].into_iter().filter(is_program_method));
        }

        let mut enum_value_infos = FxHashMap::default();
        for (&ty, infos) in &self.enum_value_infos {
            let renamed = lens.lookup_type_since(ty, since);
            if !program.contains_class(renamed) {
                continue;
            }
            let mut rewritten = EnumValueInfoMap::new();
            for (field, ordinal) in infos.iter() {
                rewritten.insert(lens.get_renamed_field_signature(field, since), ordinal);
            }
            enum_value_infos.insert(renamed, rewritten);
        }

        let rewritten = AppInfoWithLiveness {
            live_types: map_types(&self.live_types),
            live_methods,
            live_fields,
            instantiated_types: map_types(&self.instantiated_types),
            pinned_types: map_types(&self.pinned_types),
            runtime_type_checks: map_types(&self.runtime_type_checks),
            enum_value_infos,
        };
        debug!(
            live_types = rewritten.live_types.len(),
            live_methods = rewritten.live_methods.len(),
            "Rewrote liveness through lens {}",
            lens.version().as_u32()
        );
        rewritten
    }
}
