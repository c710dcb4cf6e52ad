//! A minimal typed instruction list.
//!
//! Bodies are not in SSA form and carry no control-flow edges; phis only name
//! the values that may reach them. That is all the rewriting passes need.

use super::factory::{FieldRef, MethodRef, TypeRef};
use crate::lens::LensVersion;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// The type of the `null` constant, assignable to any reference type
    Null,
    Type(TypeRef),
}

impl ValueType {
    pub fn as_type(self) -> Option<TypeRef> {
        match self {
            ValueType::Null => None,
            ValueType::Type(ty) => Some(ty),
        }
    }

    pub fn is_null(self) -> bool {
        self == ValueType::Null
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum InvokeType {
    Static,
    Direct,
    Virtual,
    Interface,
    Super,
}

impl InvokeType {
    pub fn has_receiver(self) -> bool {
        self != InvokeType::Static
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum IfKind {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ArithmeticOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Argument {
        out: ValueId,
    },
    ConstNull {
        out: ValueId,
    },
    ConstNumber {
        out: ValueId,
        value: i64,
    },
    ConstString {
        out: ValueId,
        value: String,
    },
    ConstClass {
        out: ValueId,
        class: TypeRef,
    },
    Arithmetic {
        op: ArithmeticOp,
        out: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },
    StaticGet {
        out: ValueId,
        field: FieldRef,
    },
    InstanceGet {
        out: ValueId,
        object: ValueId,
        field: FieldRef,
    },
    StaticPut {
        value: ValueId,
        field: FieldRef,
    },
    InstancePut {
        object: ValueId,
        value: ValueId,
        field: FieldRef,
    },
    Invoke {
        kind: InvokeType,
        method: MethodRef,
        arguments: Vec<ValueId>,
        out: Option<ValueId>,
    },
    NewInstance {
        out: ValueId,
        class: TypeRef,
    },
    InstanceOf {
        out: ValueId,
        value: ValueId,
        class: TypeRef,
    },
    CheckCast {
        out: ValueId,
        value: ValueId,
        class: TypeRef,
    },
    /// `rhs == None` compares `lhs` against zero or null
    If {
        kind: IfKind,
        lhs: ValueId,
        rhs: Option<ValueId>,
    },
    Return {
        value: Option<ValueId>,
    },
    Throw {
        value: ValueId,
    },
    Phi {
        out: ValueId,
        operands: Vec<ValueId>,
    },
}

impl Instruction {
    pub fn out_value(&self) -> Option<ValueId> {
        match self {
            Instruction::Argument { out }
            | Instruction::ConstNull { out }
            | Instruction::ConstNumber { out, .. }
            | Instruction::ConstString { out, .. }
            | Instruction::ConstClass { out, .. }
            | Instruction::Arithmetic { out, .. }
            | Instruction::StaticGet { out, .. }
            | Instruction::InstanceGet { out, .. }
            | Instruction::NewInstance { out, .. }
            | Instruction::InstanceOf { out, .. }
            | Instruction::CheckCast { out, .. }
            | Instruction::Phi { out, .. } => Some(*out),
            Instruction::Invoke { out, .. } => *out,
            Instruction::StaticPut { .. }
            | Instruction::InstancePut { .. }
            | Instruction::If { .. }
            | Instruction::Return { .. }
            | Instruction::Throw { .. } => None,
        }
    }

    pub fn in_values(&self) -> Vec<ValueId> {
        match self {
            Instruction::Argument { .. }
            | Instruction::ConstNull { .. }
            | Instruction::ConstNumber { .. }
            | Instruction::ConstString { .. }
            | Instruction::ConstClass { .. }
            | Instruction::StaticGet { .. }
            | Instruction::NewInstance { .. } => Vec::new(),
            Instruction::Arithmetic { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::InstanceGet { object, .. } => vec![*object],
            Instruction::StaticPut { value, .. } => vec![*value],
            Instruction::InstancePut { object, value, .. } => vec![*object, *value],
            Instruction::Invoke { arguments, .. } => arguments.clone(),
            Instruction::InstanceOf { value, .. } | Instruction::CheckCast { value, .. } => {
                vec![*value]
            }
            Instruction::If { lhs, rhs, .. } => std::iter::once(*lhs).chain(*rhs).collect(),
            Instruction::Return { value } => value.iter().copied().collect(),
            Instruction::Throw { value } => vec![*value],
            Instruction::Phi { operands, .. } => operands.clone(),
        }
    }

    pub fn uses(&self, value: ValueId) -> bool {
        self.in_values().contains(&value)
    }

    /// The type named directly by the instruction, if any
    pub fn referenced_type(&self) -> Option<TypeRef> {
        match self {
            Instruction::ConstClass { class, .. }
            | Instruction::NewInstance { class, .. }
            | Instruction::InstanceOf { class, .. }
            | Instruction::CheckCast { class, .. } => Some(*class),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub instructions: Vec<Instruction>,
    values: Vec<ValueType>,
    /// The lens this body was last rewritten against
    pub lens_version: LensVersion,
}

impl Code {
    pub fn new(lens_version: LensVersion) -> Self {
        Self {
            instructions: Vec::new(),
            values: Vec::new(),
            lens_version,
        }
    }

    pub fn new_value(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn value_type(&self, value: ValueId) -> ValueType {
        self.values[value.index()]
    }

    pub fn set_value_type(&mut self, value: ValueId, ty: ValueType) {
        self.values[value.index()] = ty;
    }

    pub fn value_types(&self) -> &[ValueType] {
        &self.values
    }

    pub fn value_types_mut(&mut self) -> &mut [ValueType] {
        &mut self.values
    }

    pub fn arguments(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.instructions.iter().filter_map(|i| match i {
            Instruction::Argument { out } => Some(*out),
            _ => None,
        })
    }

    /// Indices of the instructions reading `value`
    pub fn users(&self, value: ValueId) -> Vec<usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| i.uses(value))
            .map(|(index, _)| index)
            .collect()
    }

    /// Insert instructions right after the leading argument block
    pub fn insert_after_arguments(&mut self, instructions: Vec<Instruction>) {
        let position = self
            .instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Argument { .. }))
            .count();
        self.instructions.splice(position..position, instructions);
    }

    pub fn emit_argument(&mut self, ty: TypeRef) -> ValueId {
        let out = self.new_value(ValueType::Type(ty));
        self.instructions.push(Instruction::Argument { out });
        out
    }

    pub fn emit_const_null(&mut self) -> ValueId {
        let out = self.new_value(ValueType::Null);
        self.instructions.push(Instruction::ConstNull { out });
        out
    }

    pub fn emit_const_number(&mut self, value: i64, ty: TypeRef) -> ValueId {
        let out = self.new_value(ValueType::Type(ty));
        self.instructions.push(Instruction::ConstNumber { out, value });
        out
    }

    pub fn emit_static_get(&mut self, field: FieldRef, ty: TypeRef) -> ValueId {
        let out = self.new_value(ValueType::Type(ty));
        self.instructions.push(Instruction::StaticGet { out, field });
        out
    }

    pub fn emit_new_instance(&mut self, class: TypeRef) -> ValueId {
        let out = self.new_value(ValueType::Type(class));
        self.instructions.push(Instruction::NewInstance { out, class });
        out
    }

    /// Emit an invoke; `out` is the result type, `None` for void methods
    pub fn emit_invoke(
        &mut self,
        kind: InvokeType,
        method: MethodRef,
        arguments: Vec<ValueId>,
        out: Option<TypeRef>,
    ) -> Option<ValueId> {
        let out = out.map(|ty| self.new_value(ValueType::Type(ty)));
        self.instructions.push(Instruction::Invoke {
            kind,
            method,
            arguments,
            out,
        });
        out
    }

    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn emit_return(&mut self, value: Option<ValueId>) {
        self.instructions.push(Instruction::Return { value });
    }
}

/// Synthesized virtual method that switches on the class-id field of the
/// receiver and forwards to the implementation of the matching merged class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassIdDispatch {
    pub class_id_field: FieldRef,
    pub cases: Vec<(i32, MethodRef)>,
    /// Called for class ids without a case
    pub fallback: Option<MethodRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodBody {
    Code(Code),
    ClassIdDispatch(ClassIdDispatch),
    Throwing,
}

impl MethodBody {
    pub fn as_code(&self) -> Option<&Code> {
        match self {
            MethodBody::Code(code) => Some(code),
            _ => None,
        }
    }

    pub fn as_code_mut(&mut self) -> Option<&mut Code> {
        match self {
            MethodBody::Code(code) => Some(code),
            _ => None,
        }
    }
}
