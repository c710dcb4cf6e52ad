//! Rewrites the boxed uses of unboxed enums, before the tree fixer retypes
//! them.
//!
//! An unboxed enum value is `ordinal + 1`, so that `0` still encodes `null`.

use crate::errors::{CompilationError, Result};
use crate::graph::class::{ClassAccessFlags, EncodedMethod, MethodAccessFlags, ProgramClass};
use crate::graph::code::{ArithmeticOp, Code, Instruction, InvokeType, MethodBody, ValueId, ValueType};
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use crate::graph::program::Program;
use crate::graph::AppView;
use crate::shaking::LivenessOracle;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

pub const UTILITY_CLASS_DESCRIPTOR: &str = "Lshrinker/EnumUnboxingUtility;";

pub struct EnumUnboxingRewriter {
    unboxed: FxHashSet<TypeRef>,
    ordinals: FxHashMap<FieldRef, i32>,
    int_type: TypeRef,
    /// `static int ordinal(int)` on the utility class, if any call needs it
    ordinal_method: Option<MethodRef>,
}

impl EnumUnboxingRewriter {
    /// Collect the constant ordinals of `unboxed` and synthesize the utility
    /// class when one of `methods` calls `ordinal()` on an unboxed value
    pub fn new(app: &mut AppView, unboxed: &[TypeRef], methods: &[MethodRef]) -> Result<Self> {
        let mut ordinals = FxHashMap::default();
        for &ty in unboxed {
            let infos = app.enum_value_info_map(ty).ok_or_else(|| {
                CompilationError::InvariantViolation(format!(
                    "unboxed enum {} has no value info map",
                    app.factory.descriptor(ty)
                ))
            })?;
            ordinals.extend(infos.iter());
        }
        let mut rewriter = Self {
            unboxed: unboxed.iter().copied().collect(),
            ordinals,
            int_type: app.factory.known().int_type,
            ordinal_method: None,
        };

        let needs_utility = methods.iter().any(|&method| {
            code_of(&app.program, &app.factory, method).is_some_and(|code| {
                code.instructions
                    .iter()
                    .any(|i| rewriter.is_ordinal_call(i, code, &app.factory))
            })
        });
        if needs_utility {
            let method = rewriter.synthesize_utility_class(app)?;
            rewriter.ordinal_method = Some(method);
        }
        Ok(rewriter)
    }

    pub fn utility_ordinal_method(&self) -> Option<MethodRef> {
        self.ordinal_method
    }

    fn synthesize_utility_class(&self, app: &mut AppView) -> Result<MethodRef> {
        let lens_version = app.graph_lens().version();
        let factory = &mut app.factory;
        let utility = factory.create_type(UTILITY_CLASS_DESCRIPTOR);
        if app.program.contains_class(utility) {
            return Err(CompilationError::Unsupported(format!(
                "{UTILITY_CLASS_DESCRIPTOR} is already defined by the program"
            )));
        }
        let int = self.int_type;
        let object = factory.known().object_type;
        let proto = factory.create_proto(int, &[int]);
        let name = factory.intern_string("ordinal");
        let method = factory.create_method(utility, proto, name);

        let mut code = Code::new(lens_version);
        let argument = code.emit_argument(int);
        let one = code.emit_const_number(1, int);
        let out = code.new_value(ValueType::Type(int));
        code.emit(Instruction::Arithmetic {
            op: ArithmeticOp::Sub,
            out,
            lhs: argument,
            rhs: one,
        });
        code.emit_return(Some(out));

        let mut class = ProgramClass::new(
            utility,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SYNTHETIC,
            Some(object),
        );
        class.add_method(EncodedMethod::new(
            method,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
            Some(MethodBody::Code(code)),
        ));
        app.program.add_class(class);
        app.app_info.live_types.insert(utility);
        app.app_info.live_methods.insert(method);
        debug!(method = %factory.method_to_source_string(method, true), "Synthesized enum unboxing utility");
        Ok(method)
    }

    /// Rewrite the bodies of `methods`. Returns the number of instructions
    /// replaced.
    pub fn rewrite_methods(&self, app: &mut AppView, methods: &[MethodRef]) -> usize {
        let AppView { factory, program, .. } = app;
        let mut replaced = 0;
        for &method in methods {
            let holder = factory.method(method).holder;
            let return_type = factory.method_proto(method).return_type;
            let Some(code) = program
                .class_mut(holder)
                .and_then(|c| c.lookup_method_mut(method))
                .and_then(|m| m.body.as_mut())
                .and_then(MethodBody::as_code_mut)
            else {
                continue;
            };
            replaced += self.rewrite_code(code, return_type, factory);
        }
        debug!(methods = methods.len(), replaced, "Rewrote enum uses");
        replaced
    }

    fn rewrite_code(&self, code: &mut Code, return_type: TypeRef, factory: &ItemFactory) -> usize {
        let mut replaced = self.rewrite_null_uses(code, return_type, factory);

        let mut retyped = Vec::new();
        for index in 0..code.instructions.len() {
            let instruction = &code.instructions[index];
            let replacement = match instruction {
                Instruction::StaticGet { out, field } => self.ordinals.get(field).map(|&ordinal| {
                    retyped.push(*out);
                    Instruction::ConstNumber {
                        out: *out,
                        value: i64::from(ordinal) + 1,
                    }
                }),
                Instruction::Invoke { arguments, out, .. } if self.is_ordinal_call(instruction, code, factory) => {
                    self.ordinal_method.map(|method| Instruction::Invoke {
                        kind: InvokeType::Static,
                        method,
                        arguments: arguments.clone(),
                        out: *out,
                    })
                }
                _ => None,
            };
            if let Some(replacement) = replacement {
                code.instructions[index] = replacement;
                replaced += 1;
            }
        }
        for value in retyped {
            code.set_value_type(value, ValueType::Type(self.int_type));
        }
        replaced
    }

    fn is_ordinal_call(&self, instruction: &Instruction, code: &Code, factory: &ItemFactory) -> bool {
        let Instruction::Invoke { method, arguments, .. } = instruction else {
            return false;
        };
        if !factory.same_signature(*method, factory.known().enum_ordinal) {
            return false;
        }
        arguments
            .first()
            .and_then(|&receiver| code.value_type(receiver).as_type())
            .is_some_and(|ty| self.unboxed.contains(&ty))
    }

    /// Give every `null` flowing into an unboxed position its own `0`
    fn rewrite_null_uses(&self, code: &mut Code, return_type: TypeRef, factory: &ItemFactory) -> usize {
        let mut uses = Vec::new();
        for (index, instruction) in code.instructions.iter().enumerate() {
            for (slot, value) in self.unboxed_operands(instruction, return_type, factory) {
                if code.value_type(value).is_null() {
                    uses.push((index, slot, value));
                }
            }
        }
        if uses.is_empty() {
            return 0;
        }

        let mut zeros: FxHashMap<ValueId, ValueId> = FxHashMap::default();
        for &(_, _, null) in &uses {
            if !zeros.contains_key(&null) {
                let zero = code.new_value(ValueType::Type(self.int_type));
                zeros.insert(null, zero);
            }
        }
        for &(index, slot, null) in &uses {
            set_operand(&mut code.instructions[index], slot, zeros[&null]);
        }

        // Define each zero right after its null, walking backwards so earlier
        // positions stay valid
        let mut definitions: Vec<(usize, ValueId)> = code
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(index, i)| match i {
                Instruction::ConstNull { out } => zeros.get(out).map(|&zero| (index, zero)),
                _ => None,
            })
            .collect();
        definitions.sort_by(|a, b| b.0.cmp(&a.0));
        for (index, zero) in definitions {
            code.instructions
                .insert(index + 1, Instruction::ConstNumber { out: zero, value: 0 });
        }
        uses.len()
    }

    /// Operands read in a position typed with an unboxed enum
    fn unboxed_operands(
        &self,
        instruction: &Instruction,
        return_type: TypeRef,
        factory: &ItemFactory,
    ) -> Vec<(usize, ValueId)> {
        match instruction {
            Instruction::Invoke {
                kind,
                method,
                arguments,
                ..
            } => {
                let receiver = usize::from(kind.has_receiver());
                let parameters = &factory.method_proto(*method).parameters;
                arguments
                    .iter()
                    .enumerate()
                    .skip(receiver)
                    .filter(|&(index, _)| {
                        parameters
                            .get(index - receiver)
                            .is_some_and(|p| self.unboxed.contains(p))
                    })
                    .map(|(index, &value)| (index, value))
                    .collect()
            }
            Instruction::StaticPut { value, field } | Instruction::InstancePut { value, field, .. }
                if self.unboxed.contains(&factory.field(*field).ty) =>
            {
                vec![(0, *value)]
            }
            Instruction::Return { value: Some(value) } if self.unboxed.contains(&return_type) => {
                vec![(0, *value)]
            }
            _ => Vec::new(),
        }
    }
}

fn set_operand(instruction: &mut Instruction, slot: usize, replacement: ValueId) {
    match instruction {
        Instruction::Invoke { arguments, .. } => arguments[slot] = replacement,
        Instruction::StaticPut { value, .. }
        | Instruction::InstancePut { value, .. }
        | Instruction::Return { value: Some(value) } => *value = replacement,
        _ => {}
    }
}

fn code_of<'p>(program: &'p Program, factory: &ItemFactory, method: MethodRef) -> Option<&'p Code> {
    program
        .class(factory.method(method).holder)?
        .lookup_method(method)?
        .body
        .as_ref()?
        .as_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::class::{EncodedField, FieldAccessFlags};
    use crate::shaking::{AppInfoWithLiveness, EnumValueInfoMap};
    use crate::lens::LensVersion;

    struct Fixture {
        app: AppView,
        color: TypeRef,
        user: MethodRef,
        paint: MethodRef,
    }

    /// `Color { RED, GREEN }` and `User.run()` calling `paint(GREEN)`,
    /// `paint(null)` and `GREEN.ordinal()`
    fn fixture() -> Fixture {
        let mut factory = ItemFactory::new();
        let object = factory.known().object_type;
        let enum_type = factory.known().enum_type;
        let int = factory.known().int_type;
        let void_proto = factory.known().void_proto;
        let ordinal = factory.known().enum_ordinal;
        let color = factory.create_type("Lcom/example/Color;");
        let user_type = factory.create_type("Lcom/example/User;");

        let mut infos = EnumValueInfoMap::new();
        let mut color_class = ProgramClass::new(color, ClassAccessFlags::ENUM, Some(enum_type));
        for (index, name) in ["RED", "GREEN"].iter().enumerate() {
            let name = factory.intern_string(name);
            let field = factory.create_field(color, color, name);
            color_class.add_field(EncodedField::new(
                field,
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::ENUM,
            ));
            infos.insert(field, index as i32);
        }
        let green = infos.iter().nth(1).map(|(f, _)| f).unwrap();

        let void = factory.known().void_type;
        let paint_proto = factory.create_proto(void, &[color]);
        let paint_name = factory.intern_string("paint");
        let paint = factory.create_method(user_type, paint_proto, paint_name);
        let run_name = factory.intern_string("run");
        let run = factory.create_method(user_type, void_proto, run_name);

        let mut code = Code::new(LensVersion::IDENTITY);
        let value = code.emit_static_get(green, color);
        code.emit_invoke(InvokeType::Static, paint, vec![value], None);
        let null = code.emit_const_null();
        code.emit_invoke(InvokeType::Static, paint, vec![null], None);
        code.emit_invoke(InvokeType::Virtual, ordinal, vec![value], Some(int));
        code.emit_return(None);

        let mut user_class = ProgramClass::new(user_type, ClassAccessFlags::PUBLIC, Some(object));
        user_class.add_method(EncodedMethod::new(
            run,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some(MethodBody::Code(code)),
        ));

        let mut program = Program::new();
        program.add_class(color_class);
        program.add_class(user_class);
        let mut info = AppInfoWithLiveness::default();
        info.enum_value_infos.insert(color, infos);

        Fixture {
            app: AppView::with_liveness(factory, program, info),
            color,
            user: run,
            paint,
        }
    }

    #[test]
    fn test_constants_nulls_and_ordinal_calls_are_rewritten() {
        let Fixture {
            mut app,
            color,
            user,
            paint,
        } = fixture();

        let rewriter = EnumUnboxingRewriter::new(&mut app, &[color], &[user]).unwrap();
        let utility = rewriter.utility_ordinal_method().unwrap();
        let replaced = rewriter.rewrite_methods(&mut app, &[user]);
        assert_eq!(replaced, 3);

        let code = code_of(&app.program, &app.factory, user).unwrap();
        assert!(matches!(code.instructions[0], Instruction::ConstNumber { value: 2, .. }));
        assert!(matches!(code.instructions[3], Instruction::ConstNumber { value: 0, .. }));
        match &code.instructions[4] {
            Instruction::Invoke { method, arguments, .. } => {
                assert_eq!(*method, paint);
                assert_eq!(code.value_type(arguments[0]), ValueType::Type(app.factory.known().int_type));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &code.instructions[5] {
            Instruction::Invoke { kind, method, .. } => {
                assert_eq!(*kind, InvokeType::Static);
                assert_eq!(*method, utility);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(app.program.contains_class(app.factory.method(utility).holder));
    }

    #[test]
    fn test_no_utility_without_ordinal_calls() {
        let Fixture { mut app, color, .. } = fixture();
        let rewriter = EnumUnboxingRewriter::new(&mut app, &[color], &[]).unwrap();
        assert!(rewriter.utility_ordinal_method().is_none());
        assert_eq!(app.program.class_count(), 2);
    }
}
