use super::code::MethodBody;
use super::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassAccessFlags: u32 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const BRIDGE = 0x0040;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const CONSTRUCTOR = 0x10000;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedField {
    pub reference: FieldRef,
    pub access: FieldAccessFlags,
    pub pinned: bool,
}

impl EncodedField {
    pub fn new(reference: FieldRef, access: FieldAccessFlags) -> Self {
        Self {
            reference,
            access,
            pinned: false,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }

    pub fn is_enum_constant(&self) -> bool {
        self.access
            .contains(FieldAccessFlags::STATIC | FieldAccessFlags::ENUM)
    }

    pub fn with_reference(&self, reference: FieldRef) -> Self {
        Self {
            reference,
            ..self.clone()
        }
    }
}

/// Facts computed about a method by earlier optimization passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MethodOptimizationInfo {
    pub may_have_side_effects: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMethod {
    pub reference: MethodRef,
    pub access: MethodAccessFlags,
    /// `None` for abstract and native methods
    pub body: Option<MethodBody>,
    pub optimization_info: MethodOptimizationInfo,
    pub pinned: bool,
}

impl EncodedMethod {
    pub fn new(reference: MethodRef, access: MethodAccessFlags, body: Option<MethodBody>) -> Self {
        Self {
            reference,
            access,
            body,
            optimization_info: MethodOptimizationInfo::default(),
            pinned: false,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_instance_initializer(&self) -> bool {
        self.access.contains(MethodAccessFlags::CONSTRUCTOR) && !self.is_static()
    }

    pub fn is_class_initializer(&self) -> bool {
        self.access
            .contains(MethodAccessFlags::CONSTRUCTOR | MethodAccessFlags::STATIC)
    }

    /// Static, private and constructor methods are dispatched directly
    pub fn is_direct(&self) -> bool {
        self.access.intersects(
            MethodAccessFlags::STATIC | MethodAccessFlags::PRIVATE | MethodAccessFlags::CONSTRUCTOR,
        )
    }

    pub fn is_virtual(&self) -> bool {
        !self.is_direct()
    }

    pub fn with_reference(&self, reference: MethodRef) -> Self {
        Self {
            reference,
            ..self.clone()
        }
    }
}

/// A class whose code is part of the program being optimized
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramClass {
    pub ty: TypeRef,
    pub access: ClassAccessFlags,
    pub super_type: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub nest_host: Option<TypeRef>,
    pub pinned: bool,
    pub class_initializer_may_have_side_effects: bool,
    static_fields: Vec<EncodedField>,
    instance_fields: Vec<EncodedField>,
    direct_methods: Vec<EncodedMethod>,
    virtual_methods: Vec<EncodedMethod>,
}

impl ProgramClass {
    pub fn new(ty: TypeRef, access: ClassAccessFlags, super_type: Option<TypeRef>) -> Self {
        Self {
            ty,
            access,
            super_type,
            interfaces: Vec::new(),
            nest_host: None,
            pinned: false,
            class_initializer_may_have_side_effects: false,
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: Vec::new(),
            virtual_methods: Vec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_enum(&self) -> bool {
        self.access.contains(ClassAccessFlags::ENUM)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn is_in_nest(&self) -> bool {
        self.nest_host.is_some()
    }

    pub fn static_fields(&self) -> &[EncodedField] {
        &self.static_fields
    }

    pub fn instance_fields(&self) -> &[EncodedField] {
        &self.instance_fields
    }

    pub fn fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn direct_methods(&self) -> &[EncodedMethod] {
        &self.direct_methods
    }

    pub fn virtual_methods(&self) -> &[EncodedMethod] {
        &self.virtual_methods
    }

    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }

    pub fn methods_mut(&mut self) -> impl Iterator<Item = &mut EncodedMethod> {
        self.direct_methods
            .iter_mut()
            .chain(self.virtual_methods.iter_mut())
    }

    pub fn add_field(&mut self, field: EncodedField) {
        if field.is_static() {
            self.static_fields.push(field);
        } else {
            self.instance_fields.push(field);
        }
    }

    pub fn add_method(&mut self, method: EncodedMethod) {
        if method.is_direct() {
            self.direct_methods.push(method);
        } else {
            self.virtual_methods.push(method);
        }
    }

    pub fn set_static_field(&mut self, index: usize, field: EncodedField) {
        self.static_fields[index] = field;
    }

    pub fn set_instance_field(&mut self, index: usize, field: EncodedField) {
        self.instance_fields[index] = field;
    }

    pub fn set_direct_method(&mut self, index: usize, method: EncodedMethod) {
        self.direct_methods[index] = method;
    }

    pub fn set_virtual_method(&mut self, index: usize, method: EncodedMethod) {
        self.virtual_methods[index] = method;
    }

    pub fn remove_method(&mut self, reference: MethodRef) -> Option<EncodedMethod> {
        if let Some(index) = self
            .direct_methods
            .iter()
            .position(|m| m.reference == reference)
        {
            return Some(self.direct_methods.remove(index));
        }
        let index = self
            .virtual_methods
            .iter()
            .position(|m| m.reference == reference)?;
        Some(self.virtual_methods.remove(index))
    }

    /// Detach every member, leaving an empty shell
    pub fn take_members(&mut self) -> (Vec<EncodedField>, Vec<EncodedMethod>) {
        let mut fields = std::mem::take(&mut self.static_fields);
        fields.append(&mut self.instance_fields);
        let mut methods = std::mem::take(&mut self.direct_methods);
        methods.append(&mut self.virtual_methods);
        (fields, methods)
    }

    pub fn lookup_field(&self, reference: FieldRef) -> Option<&EncodedField> {
        self.fields().find(|f| f.reference == reference)
    }

    pub fn lookup_method(&self, reference: MethodRef) -> Option<&EncodedMethod> {
        self.methods().find(|m| m.reference == reference)
    }

    pub fn lookup_method_mut(&mut self, reference: MethodRef) -> Option<&mut EncodedMethod> {
        self.methods_mut().find(|m| m.reference == reference)
    }

    /// Find a method with the same name and prototype, whatever its holder
    pub fn lookup_method_by_signature(
        &self,
        factory: &ItemFactory,
        method: MethodRef,
    ) -> Option<&EncodedMethod> {
        self.methods()
            .find(|m| factory.same_signature(m.reference, method))
    }

    pub fn class_initializer(&self) -> Option<&EncodedMethod> {
        self.direct_methods
            .iter()
            .find(|m| m.is_class_initializer())
    }

    pub fn instance_initializers(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods
            .iter()
            .filter(|m| m.is_instance_initializer())
    }

    pub fn has_native_methods(&self) -> bool {
        self.methods().any(EncodedMethod::is_native)
    }

    pub fn has_pinned_members(&self) -> bool {
        self.methods().any(|m| m.pinned) || self.fields().any(|f| f.pinned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryMethod {
    pub reference: MethodRef,
    pub access: MethodAccessFlags,
}

/// A class stub from the runtime library. Only signatures are known.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryClass {
    pub ty: TypeRef,
    pub access: ClassAccessFlags,
    pub super_type: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub methods: Vec<LibraryMethod>,
    pub fields: Vec<FieldRef>,
}

impl LibraryClass {
    pub fn new(ty: TypeRef, super_type: Option<TypeRef>) -> Self {
        Self {
            ty,
            access: ClassAccessFlags::PUBLIC,
            super_type,
            interfaces: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn is_enum(&self) -> bool {
        self.access.contains(ClassAccessFlags::ENUM)
    }

    pub fn lookup_method_by_signature(
        &self,
        factory: &ItemFactory,
        method: MethodRef,
    ) -> Option<&LibraryMethod> {
        self.methods
            .iter()
            .find(|m| factory.same_signature(m.reference, method))
    }
}
