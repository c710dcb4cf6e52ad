//! Signature fixup after a type substitution.
//!
//! Once a pass has decided that some types go away (merged into a target, or
//! unboxed to `int`), every surviving class still names them in its
//! supertypes and member signatures. The tree fixer rewrites those signatures
//! in place and reports each member move to a [`SignatureRecorder`], which is
//! how the moves end up in the pass' lens.

use crate::errors::Result;
use crate::graph::code::MethodBody;
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, ProtoRef, TypeRef};
use crate::graph::program::Program;
use crate::lens::{GraphLens, NestedLensBuilder, RewrittenPrototypeDescription, RewrittenTypeInfo};
use crate::string_interner::StringId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Receives the signature changes made by the tree fixer
pub trait SignatureRecorder {
    fn record_field_move(&mut self, from: FieldRef, to: FieldRef);
    fn record_method_move(&mut self, from: MethodRef, to: MethodRef, changes: RewrittenPrototypeDescription);
}

impl SignatureRecorder for NestedLensBuilder {
    fn record_field_move(&mut self, from: FieldRef, to: FieldRef) {
        self.fixup_field(from, to);
    }

    fn record_method_move(&mut self, from: MethodRef, to: MethodRef, changes: RewrittenPrototypeDescription) {
        self.fixup_method(from, to);
        self.add_prototype_changes_for_target(to, &changes);
    }
}

pub struct TreeFixer<'a> {
    factory: &'a mut ItemFactory,
    substitution: &'a FxHashMap<TypeRef, TypeRef>,
    method_moves: FxHashMap<MethodRef, MethodRef>,
    field_moves: FxHashMap<FieldRef, FieldRef>,
    /// Representative class of the hierarchy each class belongs to
    hierarchies: FxHashMap<TypeRef, TypeRef>,
    /// Method signatures in use in each hierarchy, held by its representative
    reserved: FxHashMap<TypeRef, FxHashSet<MethodRef>>,
    /// New name of a virtual signature, shared by every override in a hierarchy
    virtual_names: FxHashMap<(TypeRef, StringId, ProtoRef), StringId>,
}

impl<'a> TreeFixer<'a> {
    pub fn new(factory: &'a mut ItemFactory, substitution: &'a FxHashMap<TypeRef, TypeRef>) -> Self {
        Self {
            factory,
            substitution,
            method_moves: FxHashMap::default(),
            field_moves: FxHashMap::default(),
            hierarchies: FxHashMap::default(),
            reserved: FxHashMap::default(),
            virtual_names: FxHashMap::default(),
        }
    }

    /// Fix every class not in `removed`, then hand the recorded moves to
    /// `builder`. Returns `None` when no signature changed and the builder
    /// stayed empty.
    pub fn fixup_into_lens(
        mut self,
        program: &mut Program,
        removed: &FxHashSet<TypeRef>,
        mut builder: NestedLensBuilder,
        previous: &Arc<GraphLens>,
    ) -> Result<Option<Arc<GraphLens>>> {
        self.fixup_program(program, removed, &mut builder);
        if builder.is_empty() {
            return Ok(None);
        }
        builder.build(previous).map(Some)
    }

    /// Returns the number of members whose signature changed
    pub fn fixup_program<R: SignatureRecorder>(
        &mut self,
        program: &mut Program,
        removed: &FxHashSet<TypeRef>,
        recorder: &mut R,
    ) -> usize {
        self.reserve_signatures(program, removed);
        let mut changed = 0;
        for ty in program.types() {
            if removed.contains(&ty) {
                continue;
            }
            changed += self.fixup_class(program, ty, recorder);
        }
        self.fixup_dispatch_bodies(program);
        debug!(
            changed,
            fields = self.field_moves.len(),
            methods = self.method_moves.len(),
            "Fixed signatures"
        );
        changed
    }

    pub fn fixup_type(&mut self, ty: TypeRef) -> TypeRef {
        if let Some(&substituted) = self.substitution.get(&ty) {
            return substituted;
        }
        if !self.factory.is_array_type(ty) {
            return ty;
        }
        let base = self.factory.base_type(ty);
        match self.substitution.get(&base) {
            Some(&substituted) => self.factory.replace_base_type(ty, substituted),
            None => ty,
        }
    }

    fn fixup_proto(&mut self, proto: ProtoRef) -> ProtoRef {
        let data = self.factory.proto(proto).clone();
        let return_type = self.fixup_type(data.return_type);
        let parameters: Vec<TypeRef> = data.parameters.iter().map(|&p| self.fixup_type(p)).collect();
        if return_type == data.return_type && parameters[..] == data.parameters[..] {
            return proto;
        }
        self.factory.create_proto(return_type, &parameters)
    }

    pub fn fixup_method_reference(&mut self, method: MethodRef) -> MethodRef {
        let data = self.factory.method(method);
        let holder = self.fixup_type(data.holder);
        let proto = self.fixup_proto(data.proto);
        if holder == data.holder && proto == data.proto {
            return method;
        }
        self.factory.create_method(holder, proto, data.name)
    }

    pub fn fixup_field_reference(&mut self, field: FieldRef) -> FieldRef {
        let data = self.factory.field(field);
        let holder = self.fixup_type(data.holder);
        let ty = self.fixup_type(data.ty);
        if holder == data.holder && ty == data.ty {
            return field;
        }
        self.factory.create_field(holder, ty, data.name)
    }

    /// Group the surviving classes into hierarchies linked by supertypes and
    /// interfaces, and reserve every method signature that stays as it is,
    /// library supertypes included
    fn reserve_signatures(&mut self, program: &Program, removed: &FxHashSet<TypeRef>) {
        let mut parents: FxHashMap<TypeRef, TypeRef> = FxHashMap::default();
        let surviving: Vec<_> = program.classes().filter(|c| !removed.contains(&c.ty)).collect();
        for class in &surviving {
            for &related in class.super_type.iter().chain(&class.interfaces) {
                if program.contains_class(related) && !removed.contains(&related) {
                    union(&mut parents, class.ty, related);
                }
            }
        }

        for class in &surviving {
            let hierarchy = find(&mut parents, class.ty);
            self.hierarchies.insert(class.ty, hierarchy);

            let mut signatures: Vec<MethodRef> = class.methods().map(|m| m.reference).collect();
            let mut pending: Vec<TypeRef> = class
                .super_type
                .iter()
                .chain(&class.interfaces)
                .copied()
                .filter(|&t| !program.contains_class(t))
                .collect();
            while let Some(ty) = pending.pop() {
                if let Some(library) = program.library_class(ty) {
                    signatures.extend(library.methods.iter().map(|m| m.reference));
                    pending.extend(library.super_type);
                    pending.extend(&library.interfaces);
                }
            }

            let mut unchanged = Vec::with_capacity(signatures.len());
            for method in signatures {
                if self.fixup_method_reference(method) == method {
                    unchanged.push(self.factory.method_with_holder(method, hierarchy));
                }
            }
            self.reserved.entry(hierarchy).or_default().extend(unchanged);
        }
    }

    /// `method`, renamed if its signature is already in use in `hierarchy`.
    /// The result is reserved.
    fn reserve_method(&mut self, hierarchy: TypeRef, method: MethodRef) -> MethodRef {
        let holder = self.factory.method(method).holder;
        let key = self.factory.method_with_holder(method, hierarchy);
        let reserved = self.reserved.entry(hierarchy).or_default();
        let key = if reserved.contains(&key) {
            self.factory.fresh_method(key, reserved)
        } else {
            key
        };
        reserved.insert(key);
        self.factory.method_with_holder(key, holder)
    }

    /// Overrides keep overriding each other: the first member of a virtual
    /// signature to be fixed picks the name for the whole hierarchy
    fn fixup_virtual_method(&mut self, hierarchy: TypeRef, old: MethodRef, new: MethodRef) -> MethodRef {
        let data = self.factory.method(old);
        let family = (hierarchy, data.name, data.proto);
        if let Some(&name) = self.virtual_names.get(&family) {
            return self.factory.method_with_name(new, name);
        }
        let new = self.reserve_method(hierarchy, new);
        self.virtual_names.insert(family, self.factory.method(new).name);
        new
    }

    fn fixup_class<R: SignatureRecorder>(&mut self, program: &mut Program, ty: TypeRef, recorder: &mut R) -> usize {
        let Some(class) = program.class_mut(ty) else {
            return 0;
        };

        class.super_type = class.super_type.map(|s| self.fixup_type(s));
        class.nest_host = class.nest_host.map(|h| self.fixup_type(h));
        let interfaces: Vec<TypeRef> = class.interfaces.iter().map(|&i| self.fixup_type(i)).collect();
        let mut deduplicated = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            if !deduplicated.contains(&interface) && interface != class.ty {
                deduplicated.push(interface);
            }
        }
        class.interfaces = deduplicated;

        let mut changed = 0;

        // Fields
        let fields: Vec<(bool, FieldRef)> = class
            .fields()
            .map(|f| (f.is_static(), f.reference))
            .collect();
        let fixed: Vec<FieldRef> = fields.iter().map(|&(_, f)| self.fixup_field_reference(f)).collect();
        let mut taken: FxHashSet<FieldRef> = fields
            .iter()
            .zip(&fixed)
            .filter(|((_, old), new)| old == *new)
            .map(|(_, &new)| new)
            .collect();
        let (mut static_index, mut instance_index) = (0, 0);
        for (&(is_static, old), &new) in fields.iter().zip(&fixed) {
            let index = if is_static { &mut static_index } else { &mut instance_index };
            let position = *index;
            *index += 1;
            if old == new {
                continue;
            }
            let new = if taken.contains(&new) {
                self.factory.fresh_field(new, &taken)
            } else {
                new
            };
            taken.insert(new);
            if is_static {
                let field = class.static_fields()[position].with_reference(new);
                class.set_static_field(position, field);
            } else {
                let field = class.instance_fields()[position].with_reference(new);
                class.set_instance_field(position, field);
            }
            trace!(from = ?old, to = ?new, "Fixed field");
            self.field_moves.insert(old, new);
            recorder.record_field_move(old, new);
            changed += 1;
        }

        // Methods
        let hierarchy = self.hierarchies.get(&ty).copied().unwrap_or(ty);
        let methods: Vec<(MethodRef, bool, bool, bool)> = class
            .methods()
            .map(|m| (m.reference, m.is_static(), m.is_instance_initializer(), m.is_direct()))
            .collect();
        let fixed: Vec<MethodRef> = methods
            .iter()
            .map(|&(m, ..)| self.fixup_method_reference(m))
            .collect();
        let mut taken: FxHashSet<MethodRef> = methods
            .iter()
            .zip(&fixed)
            .filter(|((old, ..), new)| old == *new)
            .map(|(_, &new)| new)
            .collect();
        let mut assigned = Vec::with_capacity(methods.len());
        for (&(old, is_static, is_constructor, is_direct), &new) in methods.iter().zip(&fixed) {
            if old == new {
                assigned.push(old);
                continue;
            }
            let mut extra_parameters = 0;
            let new = if is_constructor {
                if taken.contains(&new) {
                    let (with_extra, extra) = self.factory.constructor_with_extra_parameters(new, &taken);
                    extra_parameters = extra.len();
                    with_extra
                } else {
                    new
                }
            } else if is_direct {
                self.reserve_method(hierarchy, new)
            } else {
                self.fixup_virtual_method(hierarchy, old, new)
            };
            taken.insert(new);
            assigned.push(new);

            let changes = self.prototype_changes(old, new, is_static, extra_parameters);
            trace!(from = ?old, to = ?new, "Fixed method");
            self.method_moves.insert(old, new);
            recorder.record_method_move(old, new, changes);
            changed += 1;
        }
        for (method, new) in class.methods_mut().zip(assigned) {
            method.reference = new;
        }
        changed
    }

    fn prototype_changes(
        &self,
        old: MethodRef,
        new: MethodRef,
        is_static: bool,
        extra_parameters: usize,
    ) -> RewrittenPrototypeDescription {
        let old_proto = self.factory.method_proto(old);
        let new_proto = self.factory.method_proto(new);
        let receiver = usize::from(!is_static);
        let mut changes = RewrittenPrototypeDescription::none();
        for (index, (&old_type, &new_type)) in old_proto
            .parameters
            .iter()
            .zip(new_proto.parameters.iter())
            .enumerate()
        {
            if old_type != new_type {
                changes = changes.with_argument(index + receiver, RewrittenTypeInfo { old_type, new_type });
            }
        }
        if old_proto.return_type != new_proto.return_type {
            changes = changes.with_return(RewrittenTypeInfo {
                old_type: old_proto.return_type,
                new_type: new_proto.return_type,
            });
        }
        if extra_parameters > 0 {
            let object = self.factory.known().object_type;
            changes = changes.with_extra_null_parameters(std::iter::repeat(object).take(extra_parameters));
        }
        changes
    }

    /// Dispatch bodies name methods and the class-id field directly, so they
    /// follow the moves of this pass here rather than in the code rewriter
    fn fixup_dispatch_bodies(&mut self, program: &mut Program) {
        let mut dispatches = Vec::new();
        for class in program.classes() {
            for method in class.methods() {
                if let Some(MethodBody::ClassIdDispatch(dispatch)) = &method.body {
                    dispatches.push((class.ty, method.reference, dispatch.clone()));
                }
            }
        }
        for (ty, method, mut dispatch) in dispatches {
            for (_, target) in &mut dispatch.cases {
                if let Some(&moved) = self.method_moves.get(target) {
                    *target = moved;
                }
            }
            dispatch.fallback = dispatch.fallback.map(|fallback| match self.method_moves.get(&fallback) {
                Some(&moved) => moved,
                None => self.fixup_method_reference(fallback),
            });
            if let Some(&moved) = self.field_moves.get(&dispatch.class_id_field) {
                dispatch.class_id_field = moved;
            }
            if let Some(encoded) = program.class_mut(ty).and_then(|c| c.lookup_method_mut(method)) {
                encoded.body = Some(MethodBody::ClassIdDispatch(dispatch));
            }
        }
    }
}

fn find(parents: &mut FxHashMap<TypeRef, TypeRef>, ty: TypeRef) -> TypeRef {
    let mut root = ty;
    while let Some(&parent) = parents.get(&root) {
        if parent == root {
            break;
        }
        root = parent;
    }
    let mut current = ty;
    while current != root {
        match parents.insert(current, root) {
            Some(next) => current = next,
            None => break,
        }
    }
    root
}

/// The smaller type represents the merged set
fn union(parents: &mut FxHashMap<TypeRef, TypeRef>, a: TypeRef, b: TypeRef) {
    let (a, b) = (find(parents, a), find(parents, b));
    if a != b {
        parents.insert(a.max(b), a.min(b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::class::{
        ClassAccessFlags, EncodedField, EncodedMethod, FieldAccessFlags, MethodAccessFlags, ProgramClass,
    };
    use crate::graph::code::{ClassIdDispatch, InvokeType};
    use crate::lens::LensVersion;

    struct Fixture {
        factory: ItemFactory,
        program: Program,
        a: TypeRef,
        b: TypeRef,
        c: TypeRef,
    }

    fn fixture() -> Fixture {
        let mut factory = ItemFactory::new();
        let object = factory.known().object_type;
        let a = factory.create_type("Lcom/example/A;");
        let b = factory.create_type("Lcom/example/B;");
        let c = factory.create_type("Lcom/example/C;");
        let mut program = Program::new();
        program.add_class(ProgramClass::new(a, ClassAccessFlags::PUBLIC, Some(object)));
        program.add_class(ProgramClass::new(c, ClassAccessFlags::PUBLIC, Some(object)));
        Fixture {
            factory,
            program,
            a,
            b,
            c,
        }
    }

    fn substitution(from: TypeRef, to: TypeRef) -> FxHashMap<TypeRef, TypeRef> {
        let mut map = FxHashMap::default();
        map.insert(from, to);
        map
    }

    #[test]
    fn test_nothing_to_fix_returns_none() {
        let mut f = fixture();
        let map = substitution(f.b, f.a);
        let lens = TreeFixer::new(&mut f.factory, &map)
            .fixup_into_lens(
                &mut f.program,
                &FxHashSet::default(),
                NestedLensBuilder::new(),
                &GraphLens::identity(),
            )
            .unwrap();
        assert!(lens.is_none());
    }

    #[test]
    fn test_colliding_methods_get_fresh_names() {
        let mut f = fixture();
        let void_type = f.factory.known().void_type;
        let takes_a = f.factory.create_proto(void_type, &[f.a]);
        let takes_b = f.factory.create_proto(void_type, &[f.b]);
        let name = f.factory.intern_string("m");
        let m_a = f.factory.create_method(f.c, takes_a, name);
        let m_b = f.factory.create_method(f.c, takes_b, name);
        let class = f.program.class_mut(f.c).unwrap();
        class.add_method(EncodedMethod::new(m_a, MethodAccessFlags::PUBLIC, None));
        class.add_method(EncodedMethod::new(m_b, MethodAccessFlags::PUBLIC, None));

        let map = substitution(f.b, f.a);
        let lens = TreeFixer::new(&mut f.factory, &map)
            .fixup_into_lens(
                &mut f.program,
                &FxHashSet::default(),
                NestedLensBuilder::new(),
                &GraphLens::identity(),
            )
            .unwrap()
            .unwrap();

        let renamed = lens.get_renamed_method_signature(m_b, LensVersion::IDENTITY);
        assert_eq!(f.factory.method_name(renamed), "m$1");
        assert_eq!(f.factory.method_proto(renamed).parameters[..], [f.a]);
        assert_eq!(lens.get_original_method_signature(renamed), m_b);
        assert!(f.program.class(f.c).unwrap().lookup_method(m_a).is_some());
    }

    /// `c` extends `a`; `b` is unboxed to `int`. Returns `a.m(B)`, `c.m(B)`
    /// and the fixed lens.
    fn override_pair(f: &mut Fixture, int_on_super: bool) -> (MethodRef, MethodRef, Arc<GraphLens>) {
        let void_type = f.factory.known().void_type;
        let int_type = f.factory.known().int_type;
        let takes_b = f.factory.create_proto(void_type, &[f.b]);
        let takes_int = f.factory.create_proto(void_type, &[int_type]);
        let name = f.factory.intern_string("m");
        let super_m = f.factory.create_method(f.a, takes_b, name);
        let sub_m = f.factory.create_method(f.c, takes_b, name);
        let int_holder = if int_on_super { f.a } else { f.c };
        let int_m = f.factory.create_method(int_holder, takes_int, name);

        f.program.class_mut(f.c).unwrap().super_type = Some(f.a);
        for method in [super_m, sub_m, int_m] {
            let holder = f.factory.method(method).holder;
            f.program
                .class_mut(holder)
                .unwrap()
                .add_method(EncodedMethod::new(method, MethodAccessFlags::PUBLIC, None));
        }

        let map = substitution(f.b, int_type);
        let lens = TreeFixer::new(&mut f.factory, &map)
            .fixup_into_lens(
                &mut f.program,
                &FxHashSet::default(),
                NestedLensBuilder::new(),
                &GraphLens::identity(),
            )
            .unwrap()
            .unwrap();
        (super_m, sub_m, lens)
    }

    #[test]
    fn test_override_follows_rename_forced_by_subclass() {
        let mut f = fixture();
        let (super_m, sub_m, lens) = override_pair(&mut f, false);

        let fixed_super = lens.lookup_method(super_m, None, InvokeType::Virtual).reference;
        let fixed_sub = lens.lookup_method(sub_m, None, InvokeType::Virtual).reference;
        assert_eq!(f.factory.method_name(fixed_super), "m$1");
        assert_eq!(f.factory.method_name(fixed_sub), "m$1");
        assert!(f.factory.same_signature(fixed_super, fixed_sub));
        // The subclass' own m(int) does not turn into an override of a.m(B)
        let int_type = f.factory.known().int_type;
        let c = f.program.class(f.c).unwrap();
        assert_eq!(c.virtual_methods().len(), 2);
        assert!(c
            .virtual_methods()
            .iter()
            .any(|m| f.factory.method_name(m.reference) == "m"
                && f.factory.method_proto(m.reference).parameters[..] == [int_type]));
    }

    #[test]
    fn test_override_follows_rename_forced_by_superclass() {
        let mut f = fixture();
        let (super_m, sub_m, lens) = override_pair(&mut f, true);

        let fixed_super = lens.lookup_method(super_m, None, InvokeType::Virtual).reference;
        let fixed_sub = lens.lookup_method(sub_m, None, InvokeType::Virtual).reference;
        assert_eq!(f.factory.method_name(fixed_sub), "m$1");
        assert!(f.factory.same_signature(fixed_super, fixed_sub));
        assert_eq!(f.factory.method(fixed_sub).holder, f.c);
    }

    #[test]
    fn test_colliding_constructor_gets_extra_parameter() {
        let mut f = fixture();
        let void_type = f.factory.known().void_type;
        let object = f.factory.known().object_type;
        let init = f.factory.known().init_name;
        let takes_a = f.factory.create_proto(void_type, &[f.a]);
        let takes_b = f.factory.create_proto(void_type, &[f.b]);
        let init_a = f.factory.create_method(f.c, takes_a, init);
        let init_b = f.factory.create_method(f.c, takes_b, init);
        let access = MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR;
        let class = f.program.class_mut(f.c).unwrap();
        class.add_method(EncodedMethod::new(init_a, access, None));
        class.add_method(EncodedMethod::new(init_b, access, None));

        let map = substitution(f.b, f.a);
        let lens = TreeFixer::new(&mut f.factory, &map)
            .fixup_into_lens(
                &mut f.program,
                &FxHashSet::default(),
                NestedLensBuilder::new(),
                &GraphLens::identity(),
            )
            .unwrap()
            .unwrap();

        let lookup = lens.lookup_method(init_b, None, InvokeType::Direct);
        assert_eq!(f.factory.method_proto(lookup.reference).parameters[..], [f.a, object]);
        assert_eq!(lookup.prototype_changes.extra_null_parameters(), &[object]);
        assert_eq!(
            lookup.prototype_changes.argument(1).map(|i| i.new_type),
            Some(f.a)
        );
    }

    #[test]
    fn test_array_fields_and_dispatch_are_fixed() {
        let mut f = fixture();
        let void_proto = f.factory.known().void_proto;
        let int_type = f.factory.known().int_type;
        let b_array = f.factory.create_type("[Lcom/example/B;");
        let name = f.factory.intern_string("values");
        let field = f.factory.create_field(f.c, b_array, name);
        let run = f.factory.intern_string("run");
        let run_c = f.factory.create_method(f.c, void_proto, run);
        let id_name = f.factory.known().class_id_name;
        let class_id = f.factory.create_field(f.c, int_type, id_name);
        let takes_b = f.factory.create_proto(int_type, &[f.b]);
        let impl_name = f.factory.intern_string("run$C");
        let implementation = f.factory.create_method(f.c, takes_b, impl_name);

        let class = f.program.class_mut(f.c).unwrap();
        class.add_field(EncodedField::new(field, FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC));
        class.add_field(EncodedField::new(class_id, FieldAccessFlags::PRIVATE));
        class.add_method(EncodedMethod::new(
            implementation,
            MethodAccessFlags::PRIVATE,
            None,
        ));
        class.add_method(EncodedMethod::new(
            run_c,
            MethodAccessFlags::PUBLIC,
            Some(MethodBody::ClassIdDispatch(ClassIdDispatch {
                class_id_field: class_id,
                cases: vec![(0, implementation)],
                fallback: None,
            })),
        ));

        let map = substitution(f.b, f.a);
        let mut builder = NestedLensBuilder::new();
        let mut fixer = TreeFixer::new(&mut f.factory, &map);
        let changed = fixer.fixup_program(&mut f.program, &FxHashSet::default(), &mut builder);
        assert_eq!(changed, 2);

        let fixed_field = f.program.class(f.c).unwrap().static_fields()[0].reference;
        assert_eq!(f.factory.descriptor(f.factory.field(fixed_field).ty), "[Lcom/example/A;");

        let dispatch = f
            .program
            .class(f.c)
            .unwrap()
            .lookup_method(run_c)
            .and_then(|m| m.body.as_ref())
            .cloned();
        match dispatch {
            Some(MethodBody::ClassIdDispatch(dispatch)) => {
                assert_ne!(dispatch.cases[0].1, implementation);
                assert_eq!(f.factory.method_proto(dispatch.cases[0].1).parameters[..], [f.a]);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }
}
