use super::merge_group::MergeGroup;
use super::virtual_method_merger::VirtualMethodMerger;
use crate::graph::class::{
    ClassAccessFlags, EncodedField, EncodedMethod, FieldAccessFlags, ProgramClass,
};
use crate::graph::code::{Code, Instruction, InvokeType, MethodBody, ValueType};
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, ProtoRef, TypeRef};
use crate::string_interner::StringId;
use crate::graph::program::Program;
use crate::lens::{NestedLensBuilder, RewrittenPrototypeDescription};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::trace;

pub const CLASS_ID_FIELD_NAME: &str = "$classId";

/// Why a group was left alone. Raised during planning, before anything
/// in the program changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeAbort {
    #[error("group has no classes")]
    EmptyGroup,

    #[error("not a program class")]
    MissingClass(TypeRef),

    #[error("more than one class initializer")]
    MultipleClassInitializers,

    #[error("virtual method collides with a non-virtual member")]
    VirtualCollidesWithDirect(MethodRef),

    #[error("abstract method cannot be dispatched")]
    AbstractMethod(MethodRef),

    #[error("superclass hierarchy is not fully known")]
    UnknownSuperType(TypeRef),
}

#[derive(Debug, Clone, Copy)]
enum FieldMove {
    /// The field is added to the target under a new reference
    Relocate { from: FieldRef, to: FieldRef },
    /// The target already has a field of the same type that takes its place
    Share { from: FieldRef, to: FieldRef },
}

#[derive(Debug, Clone)]
enum MethodMove {
    Relocate { from: MethodRef, to: MethodRef },
    /// Constructor whose signature was taken; callers pass `null` for `extra`
    WithExtraParameters {
        from: MethodRef,
        to: MethodRef,
        extra: Vec<TypeRef>,
    },
    /// Trivial constructor replaced by an identical one already on the target
    Collapse { from: MethodRef, into: MethodRef },
}

/// The merge of one group, planned against the unchanged program and
/// applied by [`ClassMerger::commit`].
#[derive(Debug)]
pub struct ClassMerger {
    target: TypeRef,
    sources: Vec<TypeRef>,
    target_access: ClassAccessFlags,
    int_type: TypeRef,
    field_moves: Vec<FieldMove>,
    method_moves: Vec<MethodMove>,
    kept_definitions: Vec<MethodRef>,
    virtual_mergers: Vec<VirtualMethodMerger>,
    class_id_field: Option<FieldRef>,
    /// Every constructor of the merged class and the class id it stores
    constructor_class_ids: Vec<(MethodRef, i32)>,
}

impl ClassMerger {
    /// Plan the merge of `group`. Only the factory is touched, to intern the
    /// new member references.
    pub fn plan(factory: &mut ItemFactory, program: &Program, group: &MergeGroup) -> Result<Self, MergeAbort> {
        let target = group.target().ok_or(MergeAbort::EmptyGroup)?;
        let classes: Vec<&ProgramClass> = group
            .iter()
            .map(|ty| program.class(ty).ok_or(MergeAbort::MissingClass(ty)))
            .collect::<Result<_, _>>()?;
        let target_class = classes[0];

        let initializers = classes
            .iter()
            .filter(|c| c.class_initializer().is_some())
            .count();
        if initializers > 1 {
            return Err(MergeAbort::MultipleClassInitializers);
        }

        let all_abstract = classes.iter().all(|c| c.is_abstract());
        let mut virtuals: IndexMap<(StringId, ProtoRef), Vec<(usize, &ProgramClass, &EncodedMethod)>> =
            IndexMap::new();
        for (index, &class) in classes.iter().enumerate() {
            for method in class.virtual_methods() {
                let data = factory.method(method.reference);
                virtuals
                    .entry((data.name, data.proto))
                    .or_default()
                    .push((index, class, method));
            }
        }
        // Members without a declaration inherit one, so a declaration that
        // overrides it can only take the signature behind a dispatch
        let mut inherited: Vec<Option<MethodRef>> = Vec::with_capacity(virtuals.len());
        for definitions in virtuals.values() {
            let (_, _, first) = definitions[0];
            inherited.push(if definitions.len() < classes.len() {
                inherited_implementation(factory, program, target_class, first.reference)?
            } else {
                None
            });
            let collides = classes
                .iter()
                .flat_map(|c| c.direct_methods())
                .any(|m| factory.same_signature(m.reference, first.reference));
            if collides {
                return Err(MergeAbort::VirtualCollidesWithDirect(first.reference));
            }
            if !all_abstract {
                if let Some(&(_, _, method)) = definitions.iter().find(|(_, _, m)| m.is_abstract()) {
                    return Err(MergeAbort::AbstractMethod(method.reference));
                }
            }
        }
        let dispatched: Vec<bool> = virtuals
            .values()
            .zip(&inherited)
            .map(|(definitions, inherited)| definitions.len() > 1 || inherited.is_some())
            .collect();
        let needs_class_id = dispatched.iter().any(|&d| d);

        let mut taken_fields: FxHashSet<FieldRef> = target_class.fields().map(|f| f.reference).collect();
        let mut taken_methods: FxHashSet<MethodRef> = target_class.methods().map(|m| m.reference).collect();
        let mut method_moves = Vec::new();

        // Virtual signatures first, so direct methods rename around them
        let mut virtual_mergers = Vec::new();
        for ((definitions, &fallback), &dispatch) in virtuals.values().zip(&inherited).zip(&dispatched) {
            if dispatch {
                virtual_mergers.push(VirtualMethodMerger::plan(
                    factory,
                    target_class,
                    definitions,
                    fallback,
                    &mut taken_methods,
                )?);
                continue;
            }
            let (index, _, method) = definitions[0];
            if index > 0 {
                let to = factory.method_with_holder(method.reference, target);
                taken_methods.insert(to);
                method_moves.push(MethodMove::Relocate {
                    from: method.reference,
                    to,
                });
            }
        }

        // Fields
        let mut field_moves = Vec::new();
        let target_instance_fields: Vec<(FieldRef, TypeRef)> = target_class
            .instance_fields()
            .iter()
            .map(|f| (f.reference, factory.field(f.reference).ty))
            .collect();
        for source in &classes[1..] {
            let mut free = target_instance_fields.clone();
            for field in source.fields() {
                let from = field.reference;
                if !field.is_static() {
                    let ty = factory.field(from).ty;
                    if let Some(position) = free.iter().position(|&(_, t)| t == ty) {
                        let (to, _) = free.remove(position);
                        field_moves.push(FieldMove::Share { from, to });
                        continue;
                    }
                }
                let to = factory.field_with_holder(from, target);
                let to = if taken_fields.contains(&to) {
                    factory.fresh_field(to, &taken_fields)
                } else {
                    to
                };
                taken_fields.insert(to);
                field_moves.push(FieldMove::Relocate { from, to });
            }
        }

        let class_id_field = if needs_class_id {
            let name = factory.intern_string(CLASS_ID_FIELD_NAME);
            let int_type = factory.known().int_type;
            let field = factory.create_field(target, int_type, name);
            let field = if taken_fields.contains(&field) {
                factory.fresh_field(field, &taken_fields)
            } else {
                field
            };
            taken_fields.insert(field);
            Some(field)
        } else {
            None
        };

        // Direct methods and constructors
        let mut constructor_class_ids = Vec::new();
        let mut trivial_constructors: FxHashSet<MethodRef> = FxHashSet::default();
        let mut kept_definitions = Vec::new();
        for constructor in target_class.instance_initializers() {
            constructor_class_ids.push((constructor.reference, 0));
            if !needs_class_id && is_trivial_constructor(factory, target_class, constructor) {
                trivial_constructors.insert(constructor.reference);
            }
        }
        for (index, source) in classes.iter().enumerate().skip(1) {
            let class_id = index as i32;
            for method in source.direct_methods() {
                let from = method.reference;
                let to = factory.method_with_holder(from, target);
                if !method.is_instance_initializer() {
                    let to = if taken_methods.contains(&to) {
                        factory.fresh_method(to, &taken_methods)
                    } else {
                        to
                    };
                    taken_methods.insert(to);
                    method_moves.push(MethodMove::Relocate { from, to });
                    continue;
                }

                let trivial = !needs_class_id && is_trivial_constructor(factory, source, method);
                if !taken_methods.contains(&to) {
                    taken_methods.insert(to);
                    if trivial {
                        trivial_constructors.insert(to);
                    }
                    constructor_class_ids.push((to, class_id));
                    method_moves.push(MethodMove::Relocate { from, to });
                } else if trivial && trivial_constructors.contains(&to) {
                    if target_class.lookup_method(to).is_some() && !kept_definitions.contains(&to) {
                        kept_definitions.push(to);
                    }
                    method_moves.push(MethodMove::Collapse { from, into: to });
                } else {
                    let (extended, extra) = factory.constructor_with_extra_parameters(to, &taken_methods);
                    taken_methods.insert(extended);
                    constructor_class_ids.push((extended, class_id));
                    method_moves.push(MethodMove::WithExtraParameters {
                        from,
                        to: extended,
                        extra,
                    });
                }
            }
        }
        if !needs_class_id {
            constructor_class_ids.clear();
        }

        let mut target_access = target_class.access;
        if !all_abstract {
            target_access -= ClassAccessFlags::ABSTRACT;
        }
        if classes.iter().any(|c| c.access.contains(ClassAccessFlags::PUBLIC)) {
            target_access |= ClassAccessFlags::PUBLIC;
        }

        Ok(Self {
            target,
            sources: group.sources().to_vec(),
            target_access,
            int_type: factory.known().int_type,
            field_moves,
            method_moves,
            kept_definitions,
            virtual_mergers,
            class_id_field,
            constructor_class_ids,
        })
    }

    pub fn target(&self) -> TypeRef {
        self.target
    }

    pub fn sources(&self) -> &[TypeRef] {
        &self.sources
    }

    pub fn class_id_field(&self) -> Option<FieldRef> {
        self.class_id_field
    }

    /// Signatures that get a class-id dispatch body
    pub fn dispatch_signatures(&self) -> Vec<MethodRef> {
        self.virtual_mergers
            .iter()
            .map(VirtualMethodMerger::signature)
            .collect()
    }

    /// Move every source member into the target, remove the sources and
    /// record the moves in `builder`.
    pub fn commit(self, program: &mut Program, builder: &mut NestedLensBuilder) {
        builder.map_type(self.target, self.target);
        for &source in &self.sources {
            builder.map_type(source, self.target);
        }

        let mut fields: FxHashMap<FieldRef, EncodedField> = FxHashMap::default();
        let mut methods: FxHashMap<MethodRef, EncodedMethod> = FxHashMap::default();
        for &source in &self.sources {
            if let Some(mut class) = program.remove_class(source) {
                let (source_fields, source_methods) = class.take_members();
                fields.extend(source_fields.into_iter().map(|f| (f.reference, f)));
                methods.extend(source_methods.into_iter().map(|m| (m.reference, m)));
            }
        }
        let Some(target) = program.class_mut(self.target) else {
            return;
        };
        target.access = self.target_access;

        for field_move in &self.field_moves {
            match *field_move {
                FieldMove::Relocate { from, to } => {
                    if let Some(field) = fields.remove(&from) {
                        target.add_field(field.with_reference(to));
                    }
                    builder.move_field(from, to);
                }
                FieldMove::Share { from, to } => {
                    if let Some(field) = fields.remove(&from) {
                        relax_shared_field(target, to, field.access);
                    }
                    builder.keep_field(to);
                    builder.move_field(from, to);
                }
            }
        }
        if let Some(class_id_field) = self.class_id_field {
            target.add_field(EncodedField::new(
                class_id_field,
                FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC,
            ));
        }

        for &kept in &self.kept_definitions {
            builder.keep_method_definition(kept);
        }
        for method_move in self.method_moves {
            match method_move {
                MethodMove::Relocate { from, to } => {
                    if let Some(method) = methods.remove(&from) {
                        target.add_method(method.with_reference(to));
                    }
                    builder.move_method(from, to);
                }
                MethodMove::WithExtraParameters { from, to, extra } => {
                    if let Some(method) = methods.remove(&from) {
                        target.add_method(method.with_reference(to));
                    }
                    builder.move_method(from, to);
                    builder.add_prototype_changes(
                        from,
                        RewrittenPrototypeDescription::none().with_extra_null_parameters(extra),
                    );
                }
                MethodMove::Collapse { from, into } => {
                    methods.remove(&from);
                    builder.move_method(from, into);
                }
            }
        }

        if let Some(class_id_field) = self.class_id_field {
            for merger in self.virtual_mergers {
                merger.commit(target, &mut methods, class_id_field, builder);
            }
            for &(constructor, class_id) in &self.constructor_class_ids {
                let code = target
                    .lookup_method_mut(constructor)
                    .and_then(|m| m.body.as_mut())
                    .and_then(MethodBody::as_code_mut);
                if let Some(code) = code {
                    assign_class_id(code, class_id_field, class_id, self.int_type);
                }
            }
        }
        trace!(target = ?self.target, sources = self.sources.len(), "Committed merge");
    }
}

/// The non-abstract implementation `method` resolves to above the group,
/// or `None` when no superclass declares it
fn inherited_implementation(
    factory: &ItemFactory,
    program: &Program,
    target: &ProgramClass,
    method: MethodRef,
) -> Result<Option<MethodRef>, MergeAbort> {
    let mut current = target.super_type;
    while let Some(ty) = current {
        if let Some(class) = program.class(ty) {
            let found = class
                .virtual_methods()
                .iter()
                .find(|m| factory.same_signature(m.reference, method));
            if let Some(found) = found {
                return Ok((!found.is_abstract()).then_some(found.reference));
            }
            current = class.super_type;
        } else if let Some(class) = program.library_class(ty) {
            if let Some(found) = class.lookup_method_by_signature(factory, method) {
                return Ok(Some(found.reference));
            }
            current = class.super_type;
        } else {
            return Err(MergeAbort::UnknownSuperType(ty));
        }
    }
    Ok(None)
}

/// `this.$classId = id` right after the arguments
fn assign_class_id(code: &mut Code, field: FieldRef, class_id: i32, int_type: TypeRef) {
    let Some(receiver) = code.arguments().next() else {
        return;
    };
    let value = code.new_value(ValueType::Type(int_type));
    code.insert_after_arguments(vec![
        Instruction::ConstNumber {
            out: value,
            value: i64::from(class_id),
        },
        Instruction::InstancePut {
            object: receiver,
            value,
            field,
        },
    ]);
}

/// A shared field must admit the writes and the visibility of every field
/// folded into it
fn relax_shared_field(target: &mut ProgramClass, field: FieldRef, access: FieldAccessFlags) {
    let Some(index) = target.instance_fields().iter().position(|f| f.reference == field) else {
        return;
    };
    let mut shared = target.instance_fields()[index].clone();
    if !access.contains(FieldAccessFlags::FINAL) {
        shared.access -= FieldAccessFlags::FINAL;
    }
    if !access.contains(FieldAccessFlags::PRIVATE) && shared.access.contains(FieldAccessFlags::PRIVATE) {
        shared.access -= FieldAccessFlags::PRIVATE;
    }
    if access.contains(FieldAccessFlags::PUBLIC) {
        shared.access -= FieldAccessFlags::PROTECTED;
        shared.access |= FieldAccessFlags::PUBLIC;
    }
    target.set_instance_field(index, shared);
}

/// `this.<init>` that only calls the no-argument super constructor
fn is_trivial_constructor(factory: &ItemFactory, class: &ProgramClass, method: &EncodedMethod) -> bool {
    if !factory.method_proto(method.reference).parameters.is_empty() {
        return false;
    }
    let Some(code) = method.body.as_ref().and_then(MethodBody::as_code) else {
        return false;
    };
    let Some(super_type) = class.super_type else {
        return false;
    };
    match code.instructions.as_slice() {
        [Instruction::Argument { out: receiver }, Instruction::Invoke {
            kind: InvokeType::Direct,
            method: callee,
            arguments,
            out: None,
        }, Instruction::Return { value: None }] => {
            let callee_data = factory.method(*callee);
            callee_data.holder == super_type
                && callee_data.name == factory.known().init_name
                && callee_data.proto == factory.known().void_proto
                && arguments.as_slice() == [*receiver]
        }
        _ => false,
    }
}
