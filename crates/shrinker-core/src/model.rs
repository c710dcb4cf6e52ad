//! Serialized program model.
//!
//! Programs are read and written as JSON or YAML documents. Types are JVM
//! descriptors (`Lcom/example/A;`), members use the `holder->name` notation
//! (`Lcom/example/A;->run(I)V`, `Lcom/example/A;->count:I`) and access flags
//! are lowercase flag names.

use crate::errors::CompilationError;
use crate::graph::class::{EncodedField, EncodedMethod, LibraryClass, LibraryMethod, MethodAccessFlags, ProgramClass};
use crate::graph::code::{ClassIdDispatch, Code, Instruction, MethodBody, ValueId, ValueType};
use crate::graph::factory::{is_valid_descriptor, FieldRef, ItemFactory, MethodRef, TypeRef};
use crate::graph::program::Program;
use crate::lens::LensVersion;
use bitflags::Flags;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to parse JSON program: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML program: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid type descriptor '{0}'")]
    InvalidDescriptor(String),

    #[error("Invalid member reference '{0}'")]
    InvalidReference(String),

    #[error("Unknown access flag '{0}'")]
    UnknownFlag(String),

    #[error("Unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("Value v{value} used but never defined in {method}")]
    UndefinedValue { value: u32, method: String },

    #[error("Value v{value} defined twice in {method}")]
    DuplicateValue { value: u32, method: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramModel {
    #[serde(default)]
    pub classes: Vec<ClassModel>,
    #[serde(default)]
    pub library_classes: Vec<LibraryClassModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassModel {
    pub descriptor: String,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nest_host: Option<String>,
    /// Kept as is and traced as an entry point
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub class_initializer_has_side_effects: bool,
    #[serde(default)]
    pub fields: Vec<FieldModel>,
    #[serde(default)]
    pub methods: Vec<MethodModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldModel {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodModel {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    pub return_type: String,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub may_have_side_effects: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BodyModel {
    Code {
        instructions: Vec<InstructionModel>,
    },
    #[serde(rename_all = "camelCase")]
    ClassIdDispatch {
        class_id_field: String,
        cases: Vec<DispatchCaseModel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
    Throwing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchCaseModel {
    pub id: i32,
    pub method: String,
}

/// One instruction. Values are numbered per method; every value is defined
/// by exactly one instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum InstructionModel {
    Argument {
        out: u32,
        #[serde(rename = "type")]
        ty: String,
    },
    ConstNull {
        out: u32,
    },
    ConstNumber {
        out: u32,
        value: i64,
        #[serde(rename = "type", default = "default_number_type")]
        ty: String,
    },
    ConstString {
        out: u32,
        value: String,
    },
    ConstClass {
        out: u32,
        class: String,
    },
    Arithmetic {
        operation: String,
        out: u32,
        lhs: u32,
        rhs: u32,
    },
    StaticGet {
        out: u32,
        field: String,
    },
    InstanceGet {
        out: u32,
        object: u32,
        field: String,
    },
    StaticPut {
        value: u32,
        field: String,
    },
    InstancePut {
        object: u32,
        value: u32,
        field: String,
    },
    Invoke {
        kind: String,
        method: String,
        #[serde(default)]
        arguments: Vec<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        out: Option<u32>,
    },
    NewInstance {
        out: u32,
        class: String,
    },
    InstanceOf {
        out: u32,
        value: u32,
        class: String,
    },
    CheckCast {
        out: u32,
        value: u32,
        class: String,
    },
    If {
        kind: String,
        lhs: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rhs: Option<u32>,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<u32>,
    },
    Throw {
        value: u32,
    },
    /// Untyped phis only merge `null`
    Phi {
        out: u32,
        operands: Vec<u32>,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        ty: Option<String>,
    },
}

fn default_number_type() -> String {
    "I".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryClassModel {
    pub descriptor: String,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub methods: Vec<LibraryMethodModel>,
    #[serde(default)]
    pub fields: Vec<FieldModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryMethodModel {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    pub return_type: String,
    #[serde(default)]
    pub access: Vec<String>,
}

impl ProgramModel {
    pub fn from_json(content: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ModelError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ModelError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    pub fn to_yaml(&self) -> Result<String, ModelError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read a JSON or YAML program, picked by extension
    pub fn from_file(path: &Path) -> Result<Self, CompilationError> {
        let content = std::fs::read_to_string(path)?;
        let model = if is_yaml_path(path) {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };
        Ok(model)
    }

    pub fn write_file(&self, path: &Path) -> Result<(), CompilationError> {
        let content = if is_yaml_path(path) {
            self.to_yaml()?
        } else {
            self.to_json(true)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Intern every item into `factory` and build the program graph
    pub fn to_program(&self, factory: &mut ItemFactory) -> Result<Program, ModelError> {
        let mut program = Program::new();
        for class in &self.library_classes {
            program.add_library_class(library_class_from_model(factory, class)?);
        }
        for class in &self.classes {
            program.add_class(class_from_model(factory, class)?);
        }
        Ok(program)
    }

    /// Describe `program`, classes in deterministic order
    pub fn from_program(program: &Program, factory: &ItemFactory) -> Self {
        let mut library_classes: Vec<LibraryClassModel> = program
            .library_classes()
            .map(|class| library_class_to_model(factory, class))
            .collect();
        library_classes.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));
        let classes = program
            .classes_with_deterministic_order(factory)
            .into_iter()
            .map(|class| class_to_model(factory, class))
            .collect();
        Self {
            classes,
            library_classes,
        }
    }
}

fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    )
}

// -------------------------------------------------------------------------
// Names and references
// -------------------------------------------------------------------------

fn parse_type(factory: &mut ItemFactory, descriptor: &str) -> Result<TypeRef, ModelError> {
    if !is_valid_descriptor(descriptor) {
        return Err(ModelError::InvalidDescriptor(descriptor.to_string()));
    }
    Ok(factory.create_type(descriptor))
}

fn parse_flags<F: Flags>(names: &[String]) -> Result<F, ModelError> {
    let mut flags = F::empty();
    for name in names {
        let flag = F::from_name(&name.to_uppercase()).ok_or_else(|| ModelError::UnknownFlag(name.clone()))?;
        flags.insert(flag);
    }
    Ok(flags)
}

fn flag_names<F: Flags>(flags: &F) -> Vec<String> {
    flags.iter_names().map(|(name, _)| name.to_lowercase()).collect()
}

fn parse_name<T: std::str::FromStr>(kind: &'static str, name: &str) -> Result<T, ModelError> {
    name.parse().map_err(|_| ModelError::UnknownName {
        kind,
        name: name.to_string(),
    })
}

/// Split `I[Ljava/lang/String;Z` into its descriptors
fn split_descriptors(list: &str) -> Option<Vec<&str>> {
    let bytes = list.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = start;
        while bytes.get(end) == Some(&b'[') {
            end += 1;
        }
        match bytes.get(end)? {
            b'L' => end += list[end..].find(';')? + 1,
            _ => end += 1,
        }
        parts.push(&list[start..end]);
        start = end;
    }
    Some(parts)
}

fn parse_method_reference(factory: &mut ItemFactory, reference: &str) -> Result<MethodRef, ModelError> {
    let invalid = || ModelError::InvalidReference(reference.to_string());
    let (holder, signature) = reference.split_once("->").ok_or_else(invalid)?;
    let (name, rest) = signature.split_once('(').ok_or_else(invalid)?;
    let (parameters, return_type) = rest.split_once(')').ok_or_else(invalid)?;
    let parameters = split_descriptors(parameters).ok_or_else(invalid)?;
    let holder = parse_type(factory, holder)?;
    let return_type = parse_type(factory, return_type)?;
    let parameters = parameters
        .into_iter()
        .map(|p| parse_type(factory, p))
        .collect::<Result<Vec<_>, _>>()?;
    let proto = factory.create_proto(return_type, &parameters);
    let name = factory.intern_string(name);
    Ok(factory.create_method(holder, proto, name))
}

fn parse_field_reference(factory: &mut ItemFactory, reference: &str) -> Result<FieldRef, ModelError> {
    let invalid = || ModelError::InvalidReference(reference.to_string());
    let (holder, signature) = reference.split_once("->").ok_or_else(invalid)?;
    let (name, ty) = signature.split_once(':').ok_or_else(invalid)?;
    let holder = parse_type(factory, holder)?;
    let ty = parse_type(factory, ty)?;
    let name = factory.intern_string(name);
    Ok(factory.create_field(holder, ty, name))
}

fn method_reference_string(factory: &ItemFactory, method: MethodRef) -> String {
    let data = factory.method(method);
    let proto = factory.proto(data.proto);
    let parameters: String = proto
        .parameters
        .iter()
        .map(|&p| factory.descriptor(p))
        .collect();
    format!(
        "{}->{}({}){}",
        factory.descriptor(data.holder),
        factory.string(data.name),
        parameters,
        factory.descriptor(proto.return_type)
    )
}

fn field_reference_string(factory: &ItemFactory, field: FieldRef) -> String {
    let data = factory.field(field);
    format!(
        "{}->{}:{}",
        factory.descriptor(data.holder),
        factory.string(data.name),
        factory.descriptor(data.ty)
    )
}

// -------------------------------------------------------------------------
// Model -> program
// -------------------------------------------------------------------------

fn class_from_model(factory: &mut ItemFactory, model: &ClassModel) -> Result<ProgramClass, ModelError> {
    let ty = parse_type(factory, &model.descriptor)?;
    let super_type = model
        .super_type
        .as_deref()
        .map(|s| parse_type(factory, s))
        .transpose()?;
    let mut class = ProgramClass::new(ty, parse_flags(&model.access)?, super_type);
    class.interfaces = model
        .interfaces
        .iter()
        .map(|i| parse_type(factory, i))
        .collect::<Result<_, _>>()?;
    class.nest_host = model
        .nest_host
        .as_deref()
        .map(|h| parse_type(factory, h))
        .transpose()?;
    class.pinned = model.pinned;
    class.class_initializer_may_have_side_effects = model.class_initializer_has_side_effects;

    for field in &model.fields {
        let field_type = parse_type(factory, &field.ty)?;
        let name = factory.intern_string(&field.name);
        let reference = factory.create_field(ty, field_type, name);
        let mut encoded = EncodedField::new(reference, parse_flags(&field.access)?);
        encoded.pinned = field.pinned;
        class.add_field(encoded);
    }
    for method in &model.methods {
        let parameters = method
            .parameters
            .iter()
            .map(|p| parse_type(factory, p))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = parse_type(factory, &method.return_type)?;
        let proto = factory.create_proto(return_type, &parameters);
        let name = factory.intern_string(&method.name);
        let reference = factory.create_method(ty, proto, name);
        let body = method
            .body
            .as_ref()
            .map(|body| body_from_model(factory, reference, body))
            .transpose()?;
        let mut encoded = EncodedMethod::new(reference, parse_flags::<MethodAccessFlags>(&method.access)?, body);
        encoded.pinned = method.pinned;
        encoded.optimization_info.may_have_side_effects = method.may_have_side_effects;
        class.add_method(encoded);
    }
    Ok(class)
}

fn library_class_from_model(factory: &mut ItemFactory, model: &LibraryClassModel) -> Result<LibraryClass, ModelError> {
    let ty = parse_type(factory, &model.descriptor)?;
    let super_type = model
        .super_type
        .as_deref()
        .map(|s| parse_type(factory, s))
        .transpose()?;
    let mut class = LibraryClass::new(ty, super_type);
    class.access = parse_flags(&model.access)?;
    class.interfaces = model
        .interfaces
        .iter()
        .map(|i| parse_type(factory, i))
        .collect::<Result<_, _>>()?;
    for method in &model.methods {
        let parameters = method
            .parameters
            .iter()
            .map(|p| parse_type(factory, p))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = parse_type(factory, &method.return_type)?;
        let proto = factory.create_proto(return_type, &parameters);
        let name = factory.intern_string(&method.name);
        class.methods.push(LibraryMethod {
            reference: factory.create_method(ty, proto, name),
            access: parse_flags(&method.access)?,
        });
    }
    for field in &model.fields {
        let field_type = parse_type(factory, &field.ty)?;
        let name = factory.intern_string(&field.name);
        class.fields.push(factory.create_field(ty, field_type, name));
    }
    Ok(class)
}

fn body_from_model(factory: &mut ItemFactory, method: MethodRef, model: &BodyModel) -> Result<MethodBody, ModelError> {
    match model {
        BodyModel::Code { instructions } => code_from_model(factory, method, instructions).map(MethodBody::Code),
        BodyModel::ClassIdDispatch {
            class_id_field,
            cases,
            fallback,
        } => Ok(MethodBody::ClassIdDispatch(ClassIdDispatch {
            class_id_field: parse_field_reference(factory, class_id_field)?,
            cases: cases
                .iter()
                .map(|case| Ok((case.id, parse_method_reference(factory, &case.method)?)))
                .collect::<Result<_, ModelError>>()?,
            fallback: fallback
                .as_deref()
                .map(|f| parse_method_reference(factory, f))
                .transpose()?,
        })),
        BodyModel::Throwing => Ok(MethodBody::Throwing),
    }
}

/// Type of the value an instruction defines, when it can be told from the
/// instruction alone
fn defined_value(
    factory: &mut ItemFactory,
    instruction: &InstructionModel,
) -> Result<Option<(u32, Option<ValueType>)>, ModelError> {
    let typed = |ty: TypeRef| Some(ValueType::Type(ty));
    let defined = match instruction {
        InstructionModel::Argument { out, ty } => Some((*out, typed(parse_type(factory, ty)?))),
        InstructionModel::ConstNull { out } => Some((*out, Some(ValueType::Null))),
        InstructionModel::ConstNumber { out, ty, .. } => Some((*out, typed(parse_type(factory, ty)?))),
        InstructionModel::ConstString { out, .. } => Some((*out, typed(factory.known().string_type))),
        InstructionModel::ConstClass { out, .. } => Some((*out, typed(factory.known().class_type))),
        InstructionModel::StaticGet { out, field } | InstructionModel::InstanceGet { out, field, .. } => {
            let field = parse_field_reference(factory, field)?;
            Some((*out, typed(factory.field(field).ty)))
        }
        InstructionModel::Invoke {
            out: Some(out),
            method,
            ..
        } => {
            let method = parse_method_reference(factory, method)?;
            Some((*out, typed(factory.method_proto(method).return_type)))
        }
        InstructionModel::NewInstance { out, class } | InstructionModel::CheckCast { out, class, .. } => {
            Some((*out, typed(parse_type(factory, class)?)))
        }
        InstructionModel::InstanceOf { out, .. } => Some((*out, typed(factory.known().boolean_type))),
        InstructionModel::Phi { out, ty, .. } => {
            let ty = match ty {
                Some(ty) => ValueType::Type(parse_type(factory, ty)?),
                None => ValueType::Null,
            };
            Some((*out, Some(ty)))
        }
        // Takes the type of its left operand
        InstructionModel::Arithmetic { out, .. } => Some((*out, None)),
        _ => None,
    };
    Ok(defined)
}

fn code_from_model(
    factory: &mut ItemFactory,
    method: MethodRef,
    instructions: &[InstructionModel],
) -> Result<Code, ModelError> {
    let method_name = method_reference_string(factory, method);
    let mut code = Code::new(LensVersion::IDENTITY);
    let mut values: FxHashMap<u32, ValueId> = FxHashMap::default();

    // Values first, so phis may name values defined further down
    let mut arithmetic = Vec::new();
    for instruction in instructions {
        let Some((out, ty)) = defined_value(factory, instruction)? else {
            continue;
        };
        if values.contains_key(&out) {
            return Err(ModelError::DuplicateValue {
                value: out,
                method: method_name,
            });
        }
        values.insert(out, code.new_value(ty.unwrap_or(ValueType::Null)));
        if let (None, InstructionModel::Arithmetic { out, lhs, .. }) = (ty, instruction) {
            arithmetic.push((*out, *lhs));
        }
    }

    let get = |v: u32| {
        values.get(&v).copied().ok_or_else(|| ModelError::UndefinedValue {
            value: v,
            method: method_name.clone(),
        })
    };

    for (out, lhs) in arithmetic {
        let lhs_type = code.value_type(get(lhs)?);
        code.set_value_type(get(out)?, lhs_type);
    }

    for instruction in instructions {
        let converted = match instruction {
            InstructionModel::Argument { out, .. } => Instruction::Argument { out: get(*out)? },
            InstructionModel::ConstNull { out } => Instruction::ConstNull { out: get(*out)? },
            InstructionModel::ConstNumber { out, value, .. } => Instruction::ConstNumber {
                out: get(*out)?,
                value: *value,
            },
            InstructionModel::ConstString { out, value } => Instruction::ConstString {
                out: get(*out)?,
                value: value.clone(),
            },
            InstructionModel::ConstClass { out, class } => Instruction::ConstClass {
                out: get(*out)?,
                class: parse_type(factory, class)?,
            },
            InstructionModel::Arithmetic { operation, out, lhs, rhs } => Instruction::Arithmetic {
                op: parse_name("arithmetic operation", operation)?,
                out: get(*out)?,
                lhs: get(*lhs)?,
                rhs: get(*rhs)?,
            },
            InstructionModel::StaticGet { out, field } => Instruction::StaticGet {
                out: get(*out)?,
                field: parse_field_reference(factory, field)?,
            },
            InstructionModel::InstanceGet { out, object, field } => Instruction::InstanceGet {
                out: get(*out)?,
                object: get(*object)?,
                field: parse_field_reference(factory, field)?,
            },
            InstructionModel::StaticPut { value, field } => Instruction::StaticPut {
                value: get(*value)?,
                field: parse_field_reference(factory, field)?,
            },
            InstructionModel::InstancePut { object, value, field } => Instruction::InstancePut {
                object: get(*object)?,
                value: get(*value)?,
                field: parse_field_reference(factory, field)?,
            },
            InstructionModel::Invoke {
                kind,
                method: target,
                arguments,
                out,
            } => Instruction::Invoke {
                kind: parse_name("invoke kind", kind)?,
                method: parse_method_reference(factory, target)?,
                arguments: arguments.iter().map(|&a| get(a)).collect::<Result<_, _>>()?,
                out: out.map(get).transpose()?,
            },
            InstructionModel::NewInstance { out, class } => Instruction::NewInstance {
                out: get(*out)?,
                class: parse_type(factory, class)?,
            },
            InstructionModel::InstanceOf { out, value, class } => Instruction::InstanceOf {
                out: get(*out)?,
                value: get(*value)?,
                class: parse_type(factory, class)?,
            },
            InstructionModel::CheckCast { out, value, class } => Instruction::CheckCast {
                out: get(*out)?,
                value: get(*value)?,
                class: parse_type(factory, class)?,
            },
            InstructionModel::If { kind, lhs, rhs } => Instruction::If {
                kind: parse_name("branch kind", kind)?,
                lhs: get(*lhs)?,
                rhs: rhs.map(get).transpose()?,
            },
            InstructionModel::Return { value } => Instruction::Return {
                value: value.map(get).transpose()?,
            },
            InstructionModel::Throw { value } => Instruction::Throw { value: get(*value)? },
            InstructionModel::Phi { out, operands, .. } => Instruction::Phi {
                out: get(*out)?,
                operands: operands.iter().map(|&o| get(o)).collect::<Result<_, _>>()?,
            },
        };
        code.emit(converted);
    }
    Ok(code)
}

// -------------------------------------------------------------------------
// Program -> model
// -------------------------------------------------------------------------

fn class_to_model(factory: &ItemFactory, class: &ProgramClass) -> ClassModel {
    ClassModel {
        descriptor: factory.descriptor(class.ty).to_string(),
        access: flag_names(&class.access),
        super_type: class.super_type.map(|s| factory.descriptor(s).to_string()),
        interfaces: class
            .interfaces
            .iter()
            .map(|&i| factory.descriptor(i).to_string())
            .collect(),
        nest_host: class.nest_host.map(|h| factory.descriptor(h).to_string()),
        pinned: class.pinned,
        class_initializer_has_side_effects: class.class_initializer_may_have_side_effects,
        fields: class
            .fields()
            .map(|field| FieldModel {
                name: factory.field_name(field.reference).to_string(),
                ty: factory.descriptor(factory.field(field.reference).ty).to_string(),
                access: flag_names(&field.access),
                pinned: field.pinned,
            })
            .collect(),
        methods: class
            .methods()
            .map(|method| {
                let proto = factory.method_proto(method.reference);
                MethodModel {
                    name: factory.method_name(method.reference).to_string(),
                    parameters: proto
                        .parameters
                        .iter()
                        .map(|&p| factory.descriptor(p).to_string())
                        .collect(),
                    return_type: factory.descriptor(proto.return_type).to_string(),
                    access: flag_names(&method.access),
                    pinned: method.pinned,
                    may_have_side_effects: method.optimization_info.may_have_side_effects,
                    body: method.body.as_ref().map(|body| body_to_model(factory, body)),
                }
            })
            .collect(),
    }
}

fn library_class_to_model(factory: &ItemFactory, class: &LibraryClass) -> LibraryClassModel {
    LibraryClassModel {
        descriptor: factory.descriptor(class.ty).to_string(),
        access: flag_names(&class.access),
        super_type: class.super_type.map(|s| factory.descriptor(s).to_string()),
        interfaces: class
            .interfaces
            .iter()
            .map(|&i| factory.descriptor(i).to_string())
            .collect(),
        methods: class
            .methods
            .iter()
            .map(|method| {
                let proto = factory.method_proto(method.reference);
                LibraryMethodModel {
                    name: factory.method_name(method.reference).to_string(),
                    parameters: proto
                        .parameters
                        .iter()
                        .map(|&p| factory.descriptor(p).to_string())
                        .collect(),
                    return_type: factory.descriptor(proto.return_type).to_string(),
                    access: flag_names(&method.access),
                }
            })
            .collect(),
        fields: class
            .fields
            .iter()
            .map(|&field| FieldModel {
                name: factory.field_name(field).to_string(),
                ty: factory.descriptor(factory.field(field).ty).to_string(),
                access: Vec::new(),
                pinned: false,
            })
            .collect(),
    }
}

fn body_to_model(factory: &ItemFactory, body: &MethodBody) -> BodyModel {
    match body {
        MethodBody::Code(code) => BodyModel::Code {
            instructions: code
                .instructions
                .iter()
                .map(|instruction| instruction_to_model(factory, code, instruction))
                .collect(),
        },
        MethodBody::ClassIdDispatch(dispatch) => BodyModel::ClassIdDispatch {
            class_id_field: field_reference_string(factory, dispatch.class_id_field),
            cases: dispatch
                .cases
                .iter()
                .map(|&(id, method)| DispatchCaseModel {
                    id,
                    method: method_reference_string(factory, method),
                })
                .collect(),
            fallback: dispatch.fallback.map(|f| method_reference_string(factory, f)),
        },
        MethodBody::Throwing => BodyModel::Throwing,
    }
}

fn instruction_to_model(factory: &ItemFactory, code: &Code, instruction: &Instruction) -> InstructionModel {
    let v = |value: ValueId| value.index() as u32;
    let type_of = |value: ValueId| {
        code.value_type(value)
            .as_type()
            .map(|ty| factory.descriptor(ty).to_string())
    };
    let descriptor = |ty: TypeRef| factory.descriptor(ty).to_string();
    match instruction {
        Instruction::Argument { out } => InstructionModel::Argument {
            out: v(*out),
            ty: type_of(*out).unwrap_or_else(|| "Ljava/lang/Object;".to_string()),
        },
        Instruction::ConstNull { out } => InstructionModel::ConstNull { out: v(*out) },
        Instruction::ConstNumber { out, value } => InstructionModel::ConstNumber {
            out: v(*out),
            value: *value,
            ty: type_of(*out).unwrap_or_else(default_number_type),
        },
        Instruction::ConstString { out, value } => InstructionModel::ConstString {
            out: v(*out),
            value: value.clone(),
        },
        Instruction::ConstClass { out, class } => InstructionModel::ConstClass {
            out: v(*out),
            class: descriptor(*class),
        },
        Instruction::Arithmetic { op, out, lhs, rhs } => InstructionModel::Arithmetic {
            operation: op.to_string(),
            out: v(*out),
            lhs: v(*lhs),
            rhs: v(*rhs),
        },
        Instruction::StaticGet { out, field } => InstructionModel::StaticGet {
            out: v(*out),
            field: field_reference_string(factory, *field),
        },
        Instruction::InstanceGet { out, object, field } => InstructionModel::InstanceGet {
            out: v(*out),
            object: v(*object),
            field: field_reference_string(factory, *field),
        },
        Instruction::StaticPut { value, field } => InstructionModel::StaticPut {
            value: v(*value),
            field: field_reference_string(factory, *field),
        },
        Instruction::InstancePut { object, value, field } => InstructionModel::InstancePut {
            object: v(*object),
            value: v(*value),
            field: field_reference_string(factory, *field),
        },
        Instruction::Invoke {
            kind,
            method,
            arguments,
            out,
        } => InstructionModel::Invoke {
            kind: kind.to_string(),
            method: method_reference_string(factory, *method),
            arguments: arguments.iter().map(|&a| v(a)).collect(),
            out: out.map(v),
        },
        Instruction::NewInstance { out, class } => InstructionModel::NewInstance {
            out: v(*out),
            class: descriptor(*class),
        },
        Instruction::InstanceOf { out, value, class } => InstructionModel::InstanceOf {
            out: v(*out),
            value: v(*value),
            class: descriptor(*class),
        },
        Instruction::CheckCast { out, value, class } => InstructionModel::CheckCast {
            out: v(*out),
            value: v(*value),
            class: descriptor(*class),
        },
        Instruction::If { kind, lhs, rhs } => InstructionModel::If {
            kind: kind.to_string(),
            lhs: v(*lhs),
            rhs: rhs.map(v),
        },
        Instruction::Return { value } => InstructionModel::Return { value: value.map(v) },
        Instruction::Throw { value } => InstructionModel::Throw { value: v(*value) },
        Instruction::Phi { out, operands } => InstructionModel::Phi {
            out: v(*out),
            operands: operands.iter().map(|&o| v(o)).collect(),
            ty: type_of(*out),
        },
    }
}
