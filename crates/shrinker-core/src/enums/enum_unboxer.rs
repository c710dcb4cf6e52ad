use super::candidate_analysis::EnumUnboxingCandidateAnalysis;
use super::lens::EnumUnboxingLensBuilder;
use super::reason::Reason;
use super::rewriter::EnumUnboxingRewriter;
use crate::config::EnumUnboxingOptions;
use crate::diagnostics::DiagnosticHandler;
use crate::errors::Result;
use crate::graph::class::EncodedMethod;
use crate::graph::code::{Code, Instruction, MethodBody, ValueId, ValueType};
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use crate::graph::AppView;
use crate::shaking::LivenessOracle;
use crate::tree_fixer::TreeFixer;
use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, info};

const ORIGIN: &str = "enum-unboxing";

/// What unboxing changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumUnboxingSummary {
    pub unboxed: Vec<TypeRef>,
    pub rewritten_methods: usize,
    pub fixed_members: usize,
}

/// Replaces enums whose values are only compared, stored and passed around
/// by their ordinal.
///
/// Analysis runs on worker threads against the immutable program. Each enum
/// starts as a candidate and can only lose that status; the methods that
/// would have to change if it is unboxed are collected along the way.
pub struct EnumUnboxer {
    /// candidate -> methods to rewrite when it is unboxed
    candidates: DashMap<TypeRef, FxHashSet<MethodRef>>,
    /// first disqualification of every enum, when debug logs are enabled
    debug_log: Option<DashMap<TypeRef, Reason>>,
    diagnostics: Arc<dyn DiagnosticHandler>,
}

impl EnumUnboxer {
    pub fn new(options: &EnumUnboxingOptions, diagnostics: Arc<dyn DiagnosticHandler>) -> Self {
        Self {
            candidates: DashMap::new(),
            debug_log: options.debug_logs.then(DashMap::new),
            diagnostics,
        }
    }

    pub(super) fn add_candidate(&self, ty: TypeRef) {
        self.candidates.entry(ty).or_default();
    }

    pub(super) fn report_failure(&self, ty: TypeRef, reason: Reason) {
        if let Some(log) = &self.debug_log {
            log.entry(ty).or_insert(reason);
        }
    }

    pub fn is_candidate(&self, ty: TypeRef) -> bool {
        self.candidates.contains_key(&ty)
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Remaining candidates sorted by descriptor
    pub fn candidate_types(&self, factory: &ItemFactory) -> Vec<TypeRef> {
        let mut types: Vec<TypeRef> = self.candidates.iter().map(|entry| *entry.key()).collect();
        types.sort_by(|&a, &b| factory.descriptor(a).cmp(factory.descriptor(b)));
        types
    }

    /// Methods recorded as depending on `ty`, in id order
    pub fn dependencies(&self, ty: TypeRef) -> Vec<MethodRef> {
        let mut methods: Vec<MethodRef> = self
            .candidates
            .get(&ty)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default();
        methods.sort();
        methods
    }

    /// The recorded disqualification, if debug logs are enabled
    pub fn failure_reason(&self, ty: TypeRef) -> Option<Reason> {
        self.debug_log.as_ref()?.get(&ty).map(|reason| *reason)
    }

    /// Disqualify `ty`. Once removed an enum never becomes a candidate again.
    pub fn mark_enum_as_unboxable(&self, reason: Reason, ty: TypeRef) {
        if self.candidates.remove(&ty).is_some() {
            self.report_failure(ty, reason);
        }
    }

    /// Find candidates, check every method outside them in parallel, then
    /// apply the whole-class checks
    pub fn analyze_enums(&self, app: &AppView) {
        let found = EnumUnboxingCandidateAnalysis::new(app).find_candidates(self);
        if found == 0 {
            return;
        }

        let skipped: FxHashSet<TypeRef> = self.candidates.iter().map(|entry| *entry.key()).collect();
        let methods: Vec<&EncodedMethod> = app
            .program
            .classes()
            .filter(|class| !skipped.contains(&class.ty))
            .flat_map(|class| class.methods())
            .collect();
        methods.par_iter().for_each(|method| self.analyze_method(app, method));

        self.finish_analysis(app);
        debug!(
            found,
            remaining = self.candidates.len(),
            methods = methods.len(),
            "Analyzed enums"
        );
    }

    pub fn analyze_method(&self, app: &AppView, method: &EncodedMethod) {
        let Some(code) = method.body.as_ref().and_then(MethodBody::as_code) else {
            return;
        };
        let factory = &app.factory;
        let mut eligible: FxHashSet<TypeRef> = FxHashSet::default();

        for instruction in &code.instructions {
            self.check_referenced_types(app, instruction);

            let Some(out) = instruction.out_value() else {
                continue;
            };
            match code.value_type(out) {
                ValueType::Null => self.add_null_dependencies(app, code, out, &mut eligible),
                ValueType::Type(ty) => {
                    let base = factory.base_type(ty);
                    if !self.is_candidate(base) {
                        continue;
                    }
                    match self.validate_enum_usages(app, code, method.reference, out, base) {
                        Ok(()) => {
                            eligible.insert(base);
                        }
                        Err(reason) => self.mark_enum_as_unboxable(reason, base),
                    }
                }
            }
        }

        for ty in eligible {
            if let Some(mut dependencies) = self.candidates.get_mut(&ty) {
                dependencies.insert(method.reference);
            }
        }
    }

    /// Instructions that name a candidate type or one of its fields directly
    fn check_referenced_types(&self, app: &AppView, instruction: &Instruction) {
        let factory = &app.factory;
        match instruction {
            Instruction::ConstClass { class, .. } => {
                let base = factory.base_type(*class);
                if self.is_candidate(base) {
                    self.mark_enum_as_unboxable(Reason::ConstClass, base);
                }
            }
            Instruction::InstanceOf { class, .. } | Instruction::CheckCast { class, .. } => {
                let base = factory.base_type(*class);
                if self.is_candidate(base) {
                    self.mark_enum_as_unboxable(Reason::RuntimeTypeCheck, base);
                }
            }
            Instruction::StaticGet { field, .. } | Instruction::StaticPut { field, .. } => {
                let holder = factory.field(*field).holder;
                if !self.is_candidate(holder) {
                    return;
                }
                // Only enum constants survive as ordinals
                let resolved = app.resolve_field(*field).map(|f| f.reference);
                let is_constant = resolved.is_some_and(|f| {
                    app.enum_value_info_map(holder)
                        .is_some_and(|infos| infos.contains(f))
                });
                if !is_constant || matches!(instruction, Instruction::StaticPut { .. }) {
                    self.mark_enum_as_unboxable(Reason::OtherUnsupportedInstruction, holder);
                }
            }
            _ => {}
        }
    }

    fn validate_enum_usages(
        &self,
        app: &AppView,
        code: &Code,
        context: MethodRef,
        value: ValueId,
        enum_type: TypeRef,
    ) -> std::result::Result<(), Reason> {
        for user in code.users(value) {
            self.instruction_allows_enum(app, code, context, &code.instructions[user], value, enum_type)?;
        }
        Ok(())
    }

    fn instruction_allows_enum(
        &self,
        app: &AppView,
        code: &Code,
        context: MethodRef,
        user: &Instruction,
        value: ValueId,
        enum_type: TypeRef,
    ) -> std::result::Result<(), Reason> {
        let factory = &app.factory;
        match user {
            Instruction::Invoke { method, arguments, .. } => {
                self.invoke_allows_enum(app, code, *method, arguments, value)
            }
            Instruction::StaticPut { value: put, field, .. }
            | Instruction::InstancePut { value: put, field, .. }
                if *put == value =>
            {
                self.field_put_allows_enum(app, *field, code.value_type(value))
            }
            Instruction::If { lhs, rhs, .. } => match rhs {
                None => Ok(()),
                Some(rhs) if code.value_type(*lhs) == code.value_type(*rhs) => Ok(()),
                Some(_) => Err(Reason::InvalidIfTypes),
            },
            Instruction::Return { .. } => {
                let return_type = factory.method_proto(context).return_type;
                if return_type == enum_type || factory.base_type(return_type) == enum_type {
                    Ok(())
                } else {
                    Err(Reason::ImplicitUpCastInReturn)
                }
            }
            Instruction::InstanceOf { .. } | Instruction::CheckCast { .. } => Err(Reason::RuntimeTypeCheck),
            Instruction::Phi { operands, .. } => {
                let expected = code.value_type(value);
                if operands.iter().all(|&operand| code.value_type(operand) == expected) {
                    Ok(())
                } else {
                    Err(Reason::InvalidPhi)
                }
            }
            _ => Err(Reason::OtherUnsupportedInstruction),
        }
    }

    fn invoke_allows_enum(
        &self,
        app: &AppView,
        code: &Code,
        method: MethodRef,
        arguments: &[ValueId],
        value: ValueId,
    ) -> std::result::Result<(), Reason> {
        let factory = &app.factory;
        let known = factory.known();
        let data = factory.method(method);
        if factory.is_array_type(data.holder) {
            return if data.name == known.clone_name {
                Ok(())
            } else {
                Err(Reason::InvalidInvokeOnArray)
            };
        }

        let Some(resolved) = app.program.resolve_method(factory, method) else {
            return Err(Reason::InvalidInvoke);
        };
        if resolved.is_program() {
            if factory.is_enum_values_method(resolved.reference, resolved.holder) {
                return Err(Reason::ValuesInvoke);
            }
            if factory.is_enum_value_of_method(resolved.reference, resolved.holder) {
                return Err(Reason::ValueOfInvoke);
            }
            // Passing the value where another type is declared would need a
            // conversion once it is an int
            let receiver = usize::from(!resolved.is_static());
            let parameters = &factory.method_proto(resolved.reference).parameters;
            let declared = code.value_type(value).as_type();
            for (index, &argument) in arguments.iter().enumerate().skip(receiver) {
                if argument == value && parameters.get(index - receiver).copied() != declared {
                    return Err(Reason::InvalidInvoke);
                }
            }
            return Ok(());
        }

        if resolved.holder != known.enum_type {
            return Err(Reason::UnsupportedLibraryCall);
        }
        if factory.same_signature(resolved.reference, known.enum_ordinal) {
            return Ok(());
        }
        if self.debug_log.is_some() {
            if factory.same_signature(resolved.reference, known.enum_compare_to) {
                return Err(Reason::CompareToInvoke);
            }
            if factory.same_signature(resolved.reference, known.enum_name) {
                return Err(Reason::NameInvoke);
            }
            if factory.same_signature(resolved.reference, known.enum_to_string) {
                return Err(Reason::ToStringInvoke);
            }
        }
        Err(Reason::UnsupportedLibraryCall)
    }

    fn field_put_allows_enum(
        &self,
        app: &AppView,
        field: FieldRef,
        value_type: ValueType,
    ) -> std::result::Result<(), Reason> {
        let Some(resolved) = app.resolve_field(field) else {
            return Err(Reason::InvalidFieldPut);
        };
        let Some(holder) = app.program.class(resolved.holder) else {
            return Err(Reason::InvalidFieldPut);
        };
        if holder.is_enum() {
            return Err(Reason::FieldPutOnEnum);
        }
        if Some(app.factory.field(resolved.reference).ty) != value_type.as_type() {
            return Err(Reason::TypeMismatchFieldPut);
        }
        Ok(())
    }

    /// A `null` reaching a candidate-typed parameter, field or return turns
    /// into `0` when the candidate is unboxed
    fn add_null_dependencies(
        &self,
        app: &AppView,
        code: &Code,
        null: ValueId,
        eligible: &mut FxHashSet<TypeRef>,
    ) {
        let factory = &app.factory;
        for user in code.users(null) {
            match &code.instructions[user] {
                Instruction::Invoke {
                    kind,
                    method,
                    arguments,
                    ..
                } => {
                    let holder = factory.method(*method).holder;
                    let receiver = usize::from(kind.has_receiver());
                    if receiver == 1 && arguments.first() == Some(&null) && self.is_candidate(holder) {
                        self.mark_enum_as_unboxable(Reason::EnumMethodCalledWithNullReceiver, holder);
                    }
                    let parameters = &factory.method_proto(*method).parameters;
                    for (index, &argument) in arguments.iter().enumerate().skip(receiver) {
                        if argument != null {
                            continue;
                        }
                        if let Some(&parameter) = parameters.get(index - receiver) {
                            if self.is_candidate(parameter) {
                                eligible.insert(parameter);
                            }
                        }
                    }
                }
                Instruction::StaticPut { value, field } | Instruction::InstancePut { value, field, .. }
                    if *value == null =>
                {
                    let ty = factory.field(*field).ty;
                    if self.is_candidate(ty) {
                        eligible.insert(ty);
                    }
                }
                _ => {}
            }
        }
    }

    /// Whole-class requirements, checked once code analysis is done
    pub fn finish_analysis(&self, app: &AppView) {
        let factory = &app.factory;
        let known = factory.known();
        for ty in self.candidate_types(factory) {
            let Some(class) = app.program.class(ty) else {
                continue;
            };
            let initializer = class
                .instance_initializers()
                .find(|m| factory.method(m.reference).proto == known.enum_init_proto);
            let reason = match initializer {
                None => Some(Reason::NoInit),
                Some(init) if init.optimization_info.may_have_side_effects => Some(Reason::InvalidInit),
                Some(_) if class.class_initializer_may_have_side_effects => Some(Reason::InvalidClinit),
                Some(_) => match app.enum_value_info_map(ty) {
                    None => Some(Reason::MissingInfoMap),
                    Some(infos) if infos.size() + 1 != class.static_fields().len() => {
                        Some(Reason::UnexpectedStaticField)
                    }
                    Some(_) => None,
                },
            };
            if let Some(reason) = reason {
                self.mark_enum_as_unboxable(reason, ty);
            }
        }
    }

    /// Unbox every remaining candidate and publish the lens. Returns `None`
    /// when nothing was unboxed.
    pub fn unbox_enums(self, app: &mut AppView) -> Result<Option<EnumUnboxingSummary>> {
        let enums = self.candidate_types(&app.factory);
        self.report_debug_log(&app.factory, &enums);
        if enums.is_empty() {
            return Ok(None);
        }

        let mut methods: Vec<MethodRef> = enums.iter().flat_map(|&ty| self.dependencies(ty)).collect();
        methods.sort();
        methods.dedup();

        let rewriter = EnumUnboxingRewriter::new(app, &enums, &methods)?;
        rewriter.rewrite_methods(app, &methods);

        for &ty in &enums {
            app.program.remove_class(ty);
        }
        let int = app.factory.known().int_type;
        let substitution: FxHashMap<TypeRef, TypeRef> = enums.iter().map(|&ty| (ty, int)).collect();
        let mut builder = EnumUnboxingLensBuilder::new(&enums, int);
        let fixed_members = TreeFixer::new(&mut app.factory, &substitution).fixup_program(
            &mut app.program,
            &FxHashSet::default(),
            &mut builder,
        );
        let lens = builder.build(app.graph_lens())?;
        app.set_graph_lens(lens);
        if let Some(ordinal) = rewriter.utility_ordinal_method() {
            app.app_info.live_types.insert(app.factory.method(ordinal).holder);
            app.app_info.live_methods.insert(ordinal);
        }

        info!(
            unboxed = enums.len(),
            methods = methods.len(),
            fixed_members,
            "Unboxed enums"
        );
        Ok(Some(EnumUnboxingSummary {
            unboxed: enums,
            rewritten_methods: methods.len(),
            fixed_members,
        }))
    }

    fn report_debug_log(&self, factory: &ItemFactory, unboxed: &[TypeRef]) {
        let Some(log) = &self.debug_log else {
            return;
        };
        let names: Vec<String> = unboxed.iter().map(|&ty| factory.java_type_name(ty)).collect();
        self.diagnostics.info(
            ORIGIN,
            &format!(
                "Unboxed enums (Unboxing succeeded {}): {}",
                unboxed.len(),
                names.join(", ")
            ),
        );

        let mut boxed: Vec<(String, Reason)> = log
            .iter()
            .filter(|entry| !unboxed.contains(entry.key()))
            .map(|entry| (factory.java_type_name(*entry.key()), *entry.value()))
            .collect();
        boxed.sort_by(|a, b| a.0.cmp(&b.0));
        let failures: Vec<String> = boxed
            .iter()
            .map(|(name, reason)| format!("{name} ({reason})"))
            .collect();
        self.diagnostics.info(
            ORIGIN,
            &format!(
                "Boxed enums (Unboxing failed {}): {}",
                boxed.len(),
                failures.join(", ")
            ),
        );
    }
}
