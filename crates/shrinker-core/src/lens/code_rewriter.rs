//! Rewrites method bodies through the lens layers they have not seen yet.

use super::{GraphLens, LensVersion};
use crate::graph::class::ProgramClass;
use crate::graph::code::{Code, Instruction, MethodBody, ValueType};
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use crate::graph::program::Program;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Array types keyed by the lens version of the code they appear in.
/// Interning a rewritten array type needs the factory mutably, so these are
/// resolved before the parallel phase.
type ArrayRewrites = FxHashMap<(TypeRef, LensVersion), TypeRef>;

/// References the lens maps no member for, but whose holder or signature
/// names a mapped type: a call to an inherited method through a merged
/// class, for instance. Interned up front for the same reason as arrays.
#[derive(Default)]
struct MemberRewrites {
    arrays: ArrayRewrites,
    methods: FxHashMap<(MethodRef, LensVersion), MethodRef>,
    fields: FxHashMap<(FieldRef, LensVersion), FieldRef>,
}

impl MemberRewrites {
    fn method(&self, method: MethodRef, since: LensVersion) -> MethodRef {
        self.methods.get(&(method, since)).copied().unwrap_or(method)
    }

    fn field(&self, field: FieldRef, since: LensVersion) -> FieldRef {
        self.fields.get(&(field, since)).copied().unwrap_or(field)
    }
}

pub struct LensCodeRewriter<'a> {
    lens: &'a GraphLens,
}

impl<'a> LensCodeRewriter<'a> {
    pub fn new(lens: &'a GraphLens) -> Self {
        Self { lens }
    }

    /// Rewrite every body that is behind the lens head. Returns the number of
    /// bodies rewritten.
    pub fn rewrite_program(&self, program: &mut Program, factory: &mut ItemFactory) -> usize {
        let mut members = MemberRewrites {
            arrays: self.prepare_array_types(program, factory),
            ..MemberRewrites::default()
        };
        self.prepare_member_references(program, factory, &mut members);
        let factory: &ItemFactory = factory;
        let rewritten: usize = program
            .par_classes_mut()
            .map(|class| self.rewrite_class(class, factory, &members))
            .sum();
        debug!(
            rewritten,
            lens_version = self.lens.version().as_u32(),
            "Rewrote method bodies"
        );
        rewritten
    }

    fn prepare_array_types(&self, program: &Program, factory: &mut ItemFactory) -> ArrayRewrites {
        let mut pending: FxHashSet<(TypeRef, LensVersion)> = FxHashSet::default();
        for (_, method) in program.methods() {
            let Some(code) = method.body.as_ref().and_then(MethodBody::as_code) else {
                continue;
            };
            if code.lens_version >= self.lens.version() {
                continue;
            }
            let referenced = code.instructions.iter().filter_map(Instruction::referenced_type);
            let values = code.value_types().iter().filter_map(|t| t.as_type());
            for ty in referenced.chain(values) {
                if factory.is_array_type(ty) {
                    pending.insert((ty, code.lens_version));
                }
            }
        }

        let mut arrays = ArrayRewrites::default();
        for (array, since) in pending {
            let base = factory.base_type(array);
            let mapped = self.lens.lookup_type_since(base, since);
            if mapped != base {
                arrays.insert((array, since), factory.replace_base_type(array, mapped));
            }
        }
        arrays
    }

    fn prepare_member_references(&self, program: &Program, factory: &mut ItemFactory, members: &mut MemberRewrites) {
        let mut methods: FxHashSet<(MethodRef, LensVersion)> = FxHashSet::default();
        let mut fields: FxHashSet<(FieldRef, LensVersion)> = FxHashSet::default();
        for (_, method) in program.methods() {
            let Some(code) = method.body.as_ref().and_then(MethodBody::as_code) else {
                continue;
            };
            let since = code.lens_version;
            if since >= self.lens.version() {
                continue;
            }
            for instruction in &code.instructions {
                match instruction {
                    Instruction::Invoke { kind, method: target, .. } => {
                        let lookup = self
                            .lens
                            .lookup_method_since(*target, Some(method.reference), *kind, since);
                        if lookup.reference == *target {
                            methods.insert((*target, since));
                        }
                    }
                    Instruction::StaticGet { field, .. }
                    | Instruction::InstanceGet { field, .. }
                    | Instruction::StaticPut { field, .. }
                    | Instruction::InstancePut { field, .. } => {
                        if self.lens.lookup_field_since(*field, since) == *field {
                            fields.insert((*field, since));
                        }
                    }
                    _ => {}
                }
            }
        }

        for (method, since) in methods {
            let data = factory.method(method);
            let proto = factory.proto(data.proto).clone();
            let holder = self.map_type_interning(data.holder, since, factory);
            let return_type = self.map_type_interning(proto.return_type, since, factory);
            let parameters: Vec<TypeRef> = proto
                .parameters
                .iter()
                .map(|&p| self.map_type_interning(p, since, factory))
                .collect();
            if holder == data.holder && return_type == proto.return_type && parameters[..] == proto.parameters[..] {
                continue;
            }
            let proto = factory.create_proto(return_type, &parameters);
            members
                .methods
                .insert((method, since), factory.create_method(holder, proto, data.name));
        }
        for (field, since) in fields {
            let data = factory.field(field);
            let holder = self.map_type_interning(data.holder, since, factory);
            let ty = self.map_type_interning(data.ty, since, factory);
            if holder != data.holder || ty != data.ty {
                members
                    .fields
                    .insert((field, since), factory.create_field(holder, ty, data.name));
            }
        }
    }

    fn map_type_interning(&self, ty: TypeRef, since: LensVersion, factory: &mut ItemFactory) -> TypeRef {
        if !factory.is_array_type(ty) {
            return self.lens.lookup_type_since(ty, since);
        }
        let base = factory.base_type(ty);
        let mapped = self.lens.lookup_type_since(base, since);
        if mapped == base {
            ty
        } else {
            factory.replace_base_type(ty, mapped)
        }
    }

    fn rewrite_class(&self, class: &mut ProgramClass, factory: &ItemFactory, members: &MemberRewrites) -> usize {
        let mut rewritten = 0;
        for method in class.methods_mut() {
            let context = method.reference;
            if let Some(MethodBody::Code(code)) = &mut method.body {
                if code.lens_version < self.lens.version() {
                    self.rewrite_code(code, context, factory, members);
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    fn map_type(&self, ty: TypeRef, since: LensVersion, factory: &ItemFactory, arrays: &ArrayRewrites) -> TypeRef {
        if factory.is_array_type(ty) {
            return arrays.get(&(ty, since)).copied().unwrap_or(ty);
        }
        self.lens.lookup_type_since(ty, since)
    }

    fn rewrite_code(
        &self,
        code: &mut Code,
        context: MethodRef,
        factory: &ItemFactory,
        members: &MemberRewrites,
    ) {
        let arrays = &members.arrays;
        let since = code.lens_version;
        let lens = self.lens;

        for value in code.value_types_mut() {
            if let ValueType::Type(ty) = value {
                *ty = self.map_type(*ty, since, factory, arrays);
            }
        }

        let instructions = std::mem::take(&mut code.instructions);
        let mut rewritten = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            let instruction = match instruction {
                Instruction::Invoke {
                    kind,
                    method,
                    mut arguments,
                    out,
                } => {
                    let lookup = lens.lookup_method_since(method, Some(context), kind, since);
                    for _ in lookup.prototype_changes.extra_null_parameters() {
                        let null = code.new_value(ValueType::Null);
                        rewritten.push(Instruction::ConstNull { out: null });
                        arguments.push(null);
                    }
                    Instruction::Invoke {
                        kind: lookup.invoke_type,
                        method: members.method(lookup.reference, since),
                        arguments,
                        out,
                    }
                }
                Instruction::StaticGet { out, field } => Instruction::StaticGet {
                    out,
                    field: members.field(lens.lookup_field_since(field, since), since),
                },
                Instruction::InstanceGet { out, object, field } => Instruction::InstanceGet {
                    out,
                    object,
                    field: members.field(lens.lookup_field_since(field, since), since),
                },
                Instruction::StaticPut { value, field } => Instruction::StaticPut {
                    value,
                    field: members.field(lens.lookup_field_since(field, since), since),
                },
                Instruction::InstancePut {
                    object,
                    value,
                    field,
                } => Instruction::InstancePut {
                    object,
                    value,
                    field: members.field(lens.lookup_field_since(field, since), since),
                },
                Instruction::ConstClass { out, class } => Instruction::ConstClass {
                    out,
                    class: self.map_type(class, since, factory, arrays),
                },
                Instruction::NewInstance { out, class } => Instruction::NewInstance {
                    out,
                    class: self.map_type(class, since, factory, arrays),
                },
                Instruction::InstanceOf { out, value, class } => Instruction::InstanceOf {
                    out,
                    value,
                    class: self.map_type(class, since, factory, arrays),
                },
                Instruction::CheckCast { out, value, class } => Instruction::CheckCast {
                    out,
                    value,
                    class: self.map_type(class, since, factory, arrays),
                },
                other => other,
            };
            rewritten.push(instruction);
        }
        code.instructions = rewritten;

        let changes = lens.prototype_changes_for_definition(context, since);
        if !changes.is_empty() {
            let arguments: Vec<_> = code.arguments().collect();
            for &(index, info) in changes.arguments() {
                if let Some(&argument) = arguments.get(index) {
                    code.set_value_type(argument, ValueType::Type(info.new_type));
                }
            }
            let extra: Vec<Instruction> = changes
                .extra_null_parameters()
                .iter()
                .map(|&ty| Instruction::Argument {
                    out: code.new_value(ValueType::Type(ty)),
                })
                .collect();
            code.insert_after_arguments(extra);
        }
        code.lens_version = lens.version();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::class::{ClassAccessFlags, EncodedMethod, MethodAccessFlags};
    use crate::graph::code::InvokeType;
    use crate::lens::{NestedLensBuilder, RewrittenPrototypeDescription};

    #[test]
    fn test_rewrite_inserts_null_for_extra_parameters() {
        let mut factory = ItemFactory::new();
        let object = factory.known().object_type;
        let a = factory.create_type("Lcom/example/A;");
        let b = factory.create_type("Lcom/example/B;");
        let main = factory.create_type("Lcom/example/Main;");
        let void_proto = factory.known().void_proto;
        let init_name = factory.known().init_name;
        let void_type = factory.known().void_type;
        let extended_proto = factory.create_proto(void_type, &[object]);
        let main_name = factory.intern_string("main");

        let b_init = factory.create_method(b, void_proto, init_name);
        let a_init = factory.create_method(a, extended_proto, init_name);
        let main_method = factory.create_method(main, void_proto, main_name);

        let mut code = Code::new(LensVersion::IDENTITY);
        let instance = code.emit_new_instance(b);
        code.emit_invoke(InvokeType::Direct, b_init, vec![instance], None);
        code.emit_return(None);

        let mut class = ProgramClass::new(main, ClassAccessFlags::PUBLIC, Some(object));
        class.add_method(EncodedMethod::new(
            main_method,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some(MethodBody::Code(code)),
        ));
        let mut program = Program::new();
        program.add_class(class);

        let mut builder = NestedLensBuilder::new();
        builder.map_type(a, a);
        builder.map_type(b, a);
        builder.move_method(b_init, a_init);
        builder.add_prototype_changes(
            b_init,
            RewrittenPrototypeDescription::none().with_extra_null_parameters([object]),
        );
        let lens = builder.build(&GraphLens::identity()).unwrap();

        let rewritten = LensCodeRewriter::new(&lens).rewrite_program(&mut program, &mut factory);
        assert_eq!(rewritten, 1);

        let code = program.class(main).unwrap().direct_methods()[0]
            .body
            .as_ref()
            .and_then(MethodBody::as_code)
            .unwrap();
        assert_eq!(code.lens_version, lens.version());
        assert!(matches!(code.instructions[0], Instruction::NewInstance { class, .. } if class == a));
        assert!(matches!(code.instructions[1], Instruction::ConstNull { .. }));
        match &code.instructions[2] {
            Instruction::Invoke { method, arguments, .. } => {
                assert_eq!(*method, a_init);
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("unexpected instruction {other:?}"),
        }

        // A second pass through the same lens is a no-op
        let again = LensCodeRewriter::new(&lens).rewrite_program(&mut program, &mut factory);
        assert_eq!(again, 0);
    }

    #[test]
    fn test_inherited_method_follows_merged_holder() {
        let mut factory = ItemFactory::new();
        let object = factory.known().object_type;
        let string = factory.known().string_type;
        let a = factory.create_type("Lcom/example/A;");
        let b = factory.create_type("Lcom/example/B;");
        let main = factory.create_type("Lcom/example/Main;");
        let to_string_name = factory.intern_string("toString");
        let to_string_proto = factory.create_proto(string, &[]);
        let b_to_string = factory.create_method(b, to_string_proto, to_string_name);
        let a_to_string = factory.create_method(a, to_string_proto, to_string_name);
        let void_proto = factory.known().void_proto;
        let main_name = factory.intern_string("main");
        let main_method = factory.create_method(main, void_proto, main_name);

        let mut code = Code::new(LensVersion::IDENTITY);
        let instance = code.emit_new_instance(b);
        code.emit_invoke(InvokeType::Virtual, b_to_string, vec![instance], Some(string));
        code.emit_return(None);
        let mut class = ProgramClass::new(main, ClassAccessFlags::PUBLIC, Some(object));
        class.add_method(EncodedMethod::new(
            main_method,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some(MethodBody::Code(code)),
        ));
        let mut program = Program::new();
        program.add_class(class);

        let mut builder = NestedLensBuilder::new();
        builder.map_type(a, a);
        builder.map_type(b, a);
        let lens = builder.build(&GraphLens::identity()).unwrap();
        LensCodeRewriter::new(&lens).rewrite_program(&mut program, &mut factory);

        let code = program.class(main).unwrap().direct_methods()[0]
            .body
            .as_ref()
            .and_then(MethodBody::as_code)
            .unwrap();
        assert!(matches!(code.instructions[1], Instruction::Invoke { method, .. } if method == a_to_string));
    }
}
