use super::app_info::{AppInfoWithLiveness, EnumValueInfoMap};
use crate::graph::code::{Instruction, InvokeType, MethodBody};
use crate::graph::factory::{ItemFactory, MethodRef, TypeRef};
use crate::graph::program::Program;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::debug;

/// Worklist-based reachability tracer.
///
/// Roots are pinned classes (all their members) and pinned methods. A live
/// method makes everything its code names live; a live type makes its
/// supertypes and its static initializer live.
pub struct Enqueuer<'a> {
    program: &'a Program,
    factory: &'a ItemFactory,
    info: AppInfoWithLiveness,
    worklist: VecDeque<MethodRef>,
    /// Virtual signatures invoked somewhere, matched against overrides in
    /// types that become live later
    invoked_virtuals: FxHashSet<MethodRef>,
}

impl<'a> Enqueuer<'a> {
    pub fn new(program: &'a Program, factory: &'a ItemFactory) -> Self {
        Self {
            program,
            factory,
            info: AppInfoWithLiveness::default(),
            worklist: VecDeque::new(),
            invoked_virtuals: FxHashSet::default(),
        }
    }

    pub fn trace(mut self) -> AppInfoWithLiveness {
        let program = self.program;
        for class in program.classes() {
            if class.pinned {
                self.info.pinned_types.insert(class.ty);
                self.mark_type_live(class.ty);
                for field in class.fields() {
                    self.info.live_fields.insert(field.reference);
                }
                for method in class.methods() {
                    self.mark_method_live(method.reference);
                }
            } else {
                for method in class.methods().filter(|m| m.pinned) {
                    self.mark_type_live(class.ty);
                    self.mark_method_live(method.reference);
                }
                for field in class.fields().filter(|f| f.pinned) {
                    self.mark_type_live(class.ty);
                    self.info.live_fields.insert(field.reference);
                }
            }
        }

        while let Some(method) = self.worklist.pop_front() {
            self.trace_method(method);
        }

        self.compute_enum_value_infos();
        debug!(
            live_types = self.info.live_types.len(),
            live_methods = self.info.live_methods.len(),
            live_fields = self.info.live_fields.len(),
            "Traced program liveness"
        );
        self.info
    }

    fn mark_type_live(&mut self, ty: TypeRef) {
        let program = self.program;
        let ty = self.factory.base_type(ty);
        if !program.contains_class(ty) || !self.info.live_types.insert(ty) {
            return;
        }
        let Some(class) = program.class(ty) else {
            return;
        };
        if let Some(clinit) = class.class_initializer() {
            self.mark_method_live(clinit.reference);
        }
        let overrides: Vec<MethodRef> = class
            .virtual_methods()
            .iter()
            .filter(|m| {
                self.invoked_virtuals
                    .iter()
                    .any(|&invoked| self.factory.same_signature(invoked, m.reference))
            })
            .map(|m| m.reference)
            .collect();
        let supertypes: Vec<TypeRef> = class
            .super_type
            .into_iter()
            .chain(class.interfaces.iter().copied())
            .collect();
        for method in overrides {
            self.mark_method_live(method);
        }
        for supertype in supertypes {
            self.mark_type_live(supertype);
        }
    }

    fn mark_method_live(&mut self, method: MethodRef) {
        if self.info.live_methods.insert(method) {
            self.worklist.push_back(method);
        }
    }

    fn trace_method(&mut self, method: MethodRef) {
        let program = self.program;
        let holder = self.factory.method(method).holder;
        let Some(body) = program
            .class(holder)
            .and_then(|c| c.lookup_method(method))
            .and_then(|m| m.body.as_ref())
        else {
            return;
        };
        match body {
            MethodBody::Code(code) => {
                for instruction in &code.instructions {
                    self.trace_instruction(instruction);
                }
            }
            MethodBody::ClassIdDispatch(dispatch) => {
                self.info.live_fields.insert(dispatch.class_id_field);
                for &(_, target) in &dispatch.cases {
                    self.mark_method_live(target);
                }
                if let Some(fallback) = dispatch.fallback {
                    self.trace_invoke(InvokeType::Super, fallback);
                }
            }
            MethodBody::Throwing => {}
        }
    }

    fn trace_instruction(&mut self, instruction: &Instruction) {
        match instruction {
            Instruction::NewInstance { class, .. } => {
                self.info.instantiated_types.insert(*class);
                self.mark_type_live(*class);
            }
            Instruction::Invoke { kind, method, .. } => self.trace_invoke(*kind, *method),
            Instruction::StaticGet { field, .. }
            | Instruction::StaticPut { field, .. }
            | Instruction::InstanceGet { field, .. }
            | Instruction::InstancePut { field, .. } => {
                let resolved = self.program.resolve_field(self.factory, *field);
                if let Some(resolved) = resolved {
                    self.info.live_fields.insert(resolved.reference);
                    self.mark_type_live(resolved.holder);
                }
            }
            Instruction::ConstClass { class, .. }
            | Instruction::InstanceOf { class, .. }
            | Instruction::CheckCast { class, .. } => {
                let base = self.factory.base_type(*class);
                self.info.runtime_type_checks.insert(base);
                self.mark_type_live(base);
            }
            _ => {}
        }
    }

    fn trace_invoke(&mut self, kind: InvokeType, method: MethodRef) {
        let holder = self.factory.method(method).holder;
        self.mark_type_live(holder);
        if let Some(resolved) = self.program.resolve_method(self.factory, method) {
            if resolved.is_program() {
                self.mark_type_live(resolved.holder);
                self.mark_method_live(resolved.reference);
            }
        }
        if matches!(kind, InvokeType::Virtual | InvokeType::Interface)
            && self.invoked_virtuals.insert(method)
        {
            let overrides: Vec<MethodRef> = self
                .program
                .classes()
                .filter(|c| self.info.live_types.contains(&c.ty) && self.program.is_subtype(c.ty, holder))
                .filter_map(|c| c.lookup_method_by_signature(self.factory, method))
                .filter(|m| m.is_virtual())
                .map(|m| m.reference)
                .collect();
            for method in overrides {
                self.mark_method_live(method);
            }
        }
    }

    fn compute_enum_value_infos(&mut self) {
        for class in self.program.classes() {
            if !class.is_enum() || !self.info.live_types.contains(&class.ty) {
                continue;
            }
            let mut infos = EnumValueInfoMap::new();
            let constants = class
                .static_fields()
                .iter()
                .filter(|f| f.is_enum_constant() && self.factory.field(f.reference).ty == class.ty);
            for (ordinal, field) in constants.enumerate() {
                infos.insert(field.reference, ordinal as i32);
            }
            self.info.enum_value_infos.insert(class.ty, infos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::class::{ClassAccessFlags, EncodedMethod, MethodAccessFlags, ProgramClass};
    use crate::graph::code::Code;
    use crate::lens::LensVersion;

    #[test]
    fn test_traces_from_pinned_methods() {
        let mut factory = ItemFactory::new();
        let object = factory.known().object_type;
        let void_proto = factory.known().void_proto;
        let init_name = factory.known().init_name;
        let main = factory.create_type("Lcom/example/Main;");
        let a = factory.create_type("Lcom/example/A;");
        let dead = factory.create_type("Lcom/example/Dead;");
        let main_name = factory.intern_string("main");
        let main_method = factory.create_method(main, void_proto, main_name);
        let a_init = factory.create_method(a, void_proto, init_name);

        let mut code = Code::new(LensVersion::IDENTITY);
        let instance = code.emit_new_instance(a);
        code.emit_invoke(InvokeType::Direct, a_init, vec![instance], None);
        code.emit_return(None);
        let mut entry = EncodedMethod::new(
            main_method,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some(MethodBody::Code(code)),
        );
        entry.pinned = true;

        let mut main_class = ProgramClass::new(main, ClassAccessFlags::PUBLIC, Some(object));
        main_class.add_method(entry);
        let mut a_class = ProgramClass::new(a, ClassAccessFlags::PUBLIC, Some(object));
        a_class.add_method(EncodedMethod::new(
            a_init,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
            None,
        ));

        let mut program = Program::new();
        program.add_class(main_class);
        program.add_class(a_class);
        program.add_class(ProgramClass::new(dead, ClassAccessFlags::PUBLIC, Some(object)));

        let info = Enqueuer::new(&program, &factory).trace();
        assert!(info.is_live_type(main));
        assert!(info.is_live_type(a));
        assert!(info.is_instantiated(a));
        assert!(info.is_live_method(a_init));
        assert!(!info.is_live_type(dead));
        assert!(!info.is_pinned(main));
    }
}
