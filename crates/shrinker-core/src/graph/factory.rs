//! Interned program references.
//!
//! Every type, prototype, field and method reference is hash-consed into the
//! [`ItemFactory`] and handed out as a small `Copy` id. Two references are
//! equal exactly when their ids are equal, which keeps the lens tables and the
//! policy keys cheap to hash and compare.

use crate::string_interner::{StringId, StringInterner};
use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashSet};

macro_rules! reference_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

reference_id!(
    /// A type descriptor such as `I`, `Lcom/example/A;` or `[Lcom/example/A;`
    TypeRef
);
reference_id!(
    /// A method prototype (return type and parameter types)
    ProtoRef
);
reference_id!(
    /// A field reference: holder, type and name
    FieldRef
);
reference_id!(
    /// A method reference: holder, prototype and name
    MethodRef
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Primitive,
    Class,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proto {
    pub return_type: TypeRef,
    pub parameters: Box<[TypeRef]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldData {
    pub holder: TypeRef,
    pub ty: TypeRef,
    pub name: StringId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodData {
    pub holder: TypeRef,
    pub proto: ProtoRef,
    pub name: StringId,
}

/// Well-known references created eagerly by [`ItemFactory::new`]
#[derive(Debug, Clone, Default)]
pub struct KnownItems {
    pub void_type: TypeRef,
    pub boolean_type: TypeRef,
    pub int_type: TypeRef,
    pub object_type: TypeRef,
    pub string_type: TypeRef,
    pub class_type: TypeRef,
    pub enum_type: TypeRef,

    pub init_name: StringId,
    pub clinit_name: StringId,
    pub values_name: StringId,
    pub value_of_name: StringId,
    pub clone_name: StringId,
    pub class_id_name: StringId,

    pub void_proto: ProtoRef,
    /// `(Ljava/lang/String;I)V`, the constructor every enum declares
    pub enum_init_proto: ProtoRef,

    pub enum_ordinal: MethodRef,
    pub enum_compare_to: MethodRef,
    pub enum_name: MethodRef,
    pub enum_to_string: MethodRef,
}

#[derive(Debug, Clone)]
pub struct ItemFactory {
    strings: StringInterner,
    types: IndexSet<StringId, FxBuildHasher>,
    protos: IndexSet<Proto, FxBuildHasher>,
    fields: IndexSet<FieldData, FxBuildHasher>,
    methods: IndexSet<MethodData, FxBuildHasher>,
    known: KnownItems,
}

impl Default for ItemFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemFactory {
    pub fn new() -> Self {
        let mut factory = Self {
            strings: StringInterner::new(),
            types: IndexSet::default(),
            protos: IndexSet::default(),
            fields: IndexSet::default(),
            methods: IndexSet::default(),
            known: KnownItems::default(),
        };
        factory.known = factory.create_known_items();
        factory
    }

    fn create_known_items(&mut self) -> KnownItems {
        let void_type = self.create_type("V");
        let boolean_type = self.create_type("Z");
        let int_type = self.create_type("I");
        let object_type = self.create_type("Ljava/lang/Object;");
        let string_type = self.create_type("Ljava/lang/String;");
        let class_type = self.create_type("Ljava/lang/Class;");
        let enum_type = self.create_type("Ljava/lang/Enum;");

        let void_proto = self.create_proto(void_type, &[]);
        let enum_init_proto = self.create_proto(void_type, &[string_type, int_type]);
        let int_proto = self.create_proto(int_type, &[]);
        let string_proto = self.create_proto(string_type, &[]);
        let compare_proto = self.create_proto(int_type, &[enum_type]);

        let ordinal = self.intern_string("ordinal");
        let compare_to = self.intern_string("compareTo");
        let name = self.intern_string("name");
        let to_string = self.intern_string("toString");

        KnownItems {
            void_type,
            boolean_type,
            int_type,
            object_type,
            string_type,
            class_type,
            enum_type,
            init_name: self.intern_string("<init>"),
            clinit_name: self.intern_string("<clinit>"),
            values_name: self.intern_string("values"),
            value_of_name: self.intern_string("valueOf"),
            clone_name: self.intern_string("clone"),
            class_id_name: self.intern_string("$classId"),
            void_proto,
            enum_init_proto,
            enum_ordinal: self.create_method(enum_type, int_proto, ordinal),
            enum_compare_to: self.create_method(enum_type, compare_proto, compare_to),
            enum_name: self.create_method(enum_type, string_proto, name),
            enum_to_string: self.create_method(enum_type, string_proto, to_string),
        }
    }

    pub fn known(&self) -> &KnownItems {
        &self.known
    }

    // ---------------------------------------------------------------------
    // Strings
    // ---------------------------------------------------------------------

    pub fn intern_string(&mut self, s: &str) -> StringId {
        self.strings.intern(s)
    }

    pub fn lookup_string(&self, s: &str) -> Option<StringId> {
        self.strings.get(s)
    }

    pub fn string(&self, id: StringId) -> &str {
        self.strings.resolve(id)
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    /// Intern a type descriptor. Array element types are interned as well so
    /// that [`ItemFactory::array_element_type`] never has to allocate.
    pub fn create_type(&mut self, descriptor: &str) -> TypeRef {
        debug_assert!(
            is_valid_descriptor(descriptor),
            "invalid type descriptor `{descriptor}`"
        );
        if let Some(element) = descriptor.strip_prefix('[') {
            self.create_type(element);
        }
        let id = self.strings.intern(descriptor);
        let (index, _) = self.types.insert_full(id);
        TypeRef(index as u32)
    }

    pub fn lookup_type(&self, descriptor: &str) -> Option<TypeRef> {
        let id = self.strings.get(descriptor)?;
        self.types.get_index_of(&id).map(|i| TypeRef(i as u32))
    }

    pub fn descriptor(&self, ty: TypeRef) -> &str {
        let id = self.types[ty.index()];
        self.strings.resolve(id)
    }

    pub fn type_kind(&self, ty: TypeRef) -> TypeKind {
        match self.descriptor(ty).as_bytes()[0] {
            b'V' => TypeKind::Void,
            b'L' => TypeKind::Class,
            b'[' => TypeKind::Array,
            _ => TypeKind::Primitive,
        }
    }

    pub fn is_class_type(&self, ty: TypeRef) -> bool {
        self.type_kind(ty) == TypeKind::Class
    }

    pub fn is_array_type(&self, ty: TypeRef) -> bool {
        self.type_kind(ty) == TypeKind::Array
    }

    pub fn is_primitive_type(&self, ty: TypeRef) -> bool {
        self.type_kind(ty) == TypeKind::Primitive
    }

    pub fn is_reference_type(&self, ty: TypeRef) -> bool {
        matches!(self.type_kind(ty), TypeKind::Class | TypeKind::Array)
    }

    pub fn array_element_type(&self, ty: TypeRef) -> Option<TypeRef> {
        let element = self.descriptor(ty).strip_prefix('[')?;
        self.lookup_type(element)
    }

    /// The innermost element type of an array, or the type itself
    pub fn base_type(&self, ty: TypeRef) -> TypeRef {
        let descriptor = self.descriptor(ty);
        let base = descriptor.trim_start_matches('[');
        if base.len() == descriptor.len() {
            return ty;
        }
        self.lookup_type(base).unwrap_or(ty)
    }

    pub fn array_dimensions(&self, ty: TypeRef) -> usize {
        self.descriptor(ty).bytes().take_while(|&b| b == b'[').count()
    }

    /// `[[LA;` with base `I` becomes `[[I`
    pub fn replace_base_type(&mut self, ty: TypeRef, base: TypeRef) -> TypeRef {
        let dimensions = self.array_dimensions(ty);
        if dimensions == 0 {
            return base;
        }
        let descriptor = format!("{}{}", "[".repeat(dimensions), self.descriptor(base));
        self.create_type(&descriptor)
    }

    /// `Lcom/example/Outer$Inner;` becomes `com.example.Outer$Inner`
    pub fn java_type_name(&self, ty: TypeRef) -> String {
        descriptor_to_java_name(self.descriptor(ty))
    }

    /// `Lcom/example/A;` becomes `A`
    pub fn simple_name(&self, ty: TypeRef) -> &str {
        let descriptor = self.descriptor(ty);
        let inner = descriptor
            .strip_prefix('L')
            .and_then(|d| d.strip_suffix(';'))
            .unwrap_or(descriptor);
        inner.rsplit('/').next().unwrap_or(inner)
    }

    /// `Lcom/example/A;` with suffix `$Utility` becomes `Lcom/example/A$Utility;`
    pub fn create_type_with_suffix(&mut self, ty: TypeRef, suffix: &str) -> TypeRef {
        let descriptor = self.descriptor(ty);
        let inner = descriptor
            .strip_prefix('L')
            .and_then(|d| d.strip_suffix(';'))
            .unwrap_or(descriptor);
        let descriptor = format!("L{inner}{suffix};");
        self.create_type(&descriptor)
    }

    // ---------------------------------------------------------------------
    // Prototypes
    // ---------------------------------------------------------------------

    pub fn create_proto(&mut self, return_type: TypeRef, parameters: &[TypeRef]) -> ProtoRef {
        let proto = Proto {
            return_type,
            parameters: parameters.into(),
        };
        let (index, _) = self.protos.insert_full(proto);
        ProtoRef(index as u32)
    }

    pub fn proto(&self, proto: ProtoRef) -> &Proto {
        &self.protos[proto.index()]
    }

    // ---------------------------------------------------------------------
    // Fields
    // ---------------------------------------------------------------------

    pub fn create_field(&mut self, holder: TypeRef, ty: TypeRef, name: StringId) -> FieldRef {
        let (index, _) = self.fields.insert_full(FieldData { holder, ty, name });
        FieldRef(index as u32)
    }

    pub fn lookup_field(&self, data: &FieldData) -> Option<FieldRef> {
        self.fields.get_index_of(data).map(|i| FieldRef(i as u32))
    }

    pub fn field(&self, field: FieldRef) -> FieldData {
        self.fields[field.index()]
    }

    pub fn field_name(&self, field: FieldRef) -> &str {
        self.string(self.field(field).name)
    }

    pub fn field_with_holder(&mut self, field: FieldRef, holder: TypeRef) -> FieldRef {
        let data = self.field(field);
        self.create_field(holder, data.ty, data.name)
    }

    pub fn field_with_type(&mut self, field: FieldRef, ty: TypeRef) -> FieldRef {
        let data = self.field(field);
        self.create_field(data.holder, ty, data.name)
    }

    // ---------------------------------------------------------------------
    // Methods
    // ---------------------------------------------------------------------

    pub fn create_method(&mut self, holder: TypeRef, proto: ProtoRef, name: StringId) -> MethodRef {
        let (index, _) = self.methods.insert_full(MethodData {
            holder,
            proto,
            name,
        });
        MethodRef(index as u32)
    }

    pub fn lookup_method(&self, data: &MethodData) -> Option<MethodRef> {
        self.methods.get_index_of(data).map(|i| MethodRef(i as u32))
    }

    pub fn method(&self, method: MethodRef) -> MethodData {
        self.methods[method.index()]
    }

    pub fn method_proto(&self, method: MethodRef) -> &Proto {
        self.proto(self.method(method).proto)
    }

    pub fn method_name(&self, method: MethodRef) -> &str {
        self.string(self.method(method).name)
    }

    pub fn method_with_holder(&mut self, method: MethodRef, holder: TypeRef) -> MethodRef {
        let data = self.method(method);
        self.create_method(holder, data.proto, data.name)
    }

    pub fn method_with_name(&mut self, method: MethodRef, name: StringId) -> MethodRef {
        let data = self.method(method);
        self.create_method(data.holder, data.proto, name)
    }

    /// `name$1`, `name$2`, ... until the field is not in `taken`
    pub(crate) fn fresh_field(&mut self, field: FieldRef, taken: &FxHashSet<FieldRef>) -> FieldRef {
        let data = self.field(field);
        let base = self.string(data.name).to_string();
        let mut suffix = 1;
        loop {
            let name = self.intern_string(&format!("{base}${suffix}"));
            let candidate = self.create_field(data.holder, data.ty, name);
            if !taken.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// `name$1`, `name$2`, ... until the method is not in `taken`
    pub(crate) fn fresh_method(&mut self, method: MethodRef, taken: &FxHashSet<MethodRef>) -> MethodRef {
        let base = self.method_name(method).to_string();
        let mut suffix = 1;
        loop {
            let name = self.intern_string(&format!("{base}${suffix}"));
            let candidate = self.method_with_name(method, name);
            if !taken.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Constructors cannot be renamed. Append unused object parameters until
    /// the signature is not in `taken`, and return the appended types.
    pub(crate) fn constructor_with_extra_parameters(
        &mut self,
        constructor: MethodRef,
        taken: &FxHashSet<MethodRef>,
    ) -> (MethodRef, Vec<TypeRef>) {
        let data = self.method(constructor);
        let proto = self.proto(data.proto).clone();
        let object = self.known.object_type;
        let mut parameters = proto.parameters.to_vec();
        let mut extra = Vec::new();
        loop {
            parameters.push(object);
            extra.push(object);
            let extended = self.create_proto(proto.return_type, &parameters);
            let candidate = self.create_method(data.holder, extended, data.name);
            if !taken.contains(&candidate) {
                return (candidate, extra);
            }
        }
    }

    /// Same name and prototype, holder ignored
    pub fn same_signature(&self, a: MethodRef, b: MethodRef) -> bool {
        let (a, b) = (self.method(a), self.method(b));
        a.name == b.name && a.proto == b.proto
    }

    pub fn is_instance_initializer(&self, method: MethodRef) -> bool {
        self.method(method).name == self.known.init_name
    }

    pub fn is_class_initializer(&self, method: MethodRef) -> bool {
        self.method(method).name == self.known.clinit_name
    }

    /// `static E[] values()` declared on the enum `holder`
    pub fn is_enum_values_method(&self, method: MethodRef, holder: TypeRef) -> bool {
        let data = self.method(method);
        if data.holder != holder || data.name != self.known.values_name {
            return false;
        }
        let proto = self.proto(data.proto);
        proto.parameters.is_empty()
            && self.array_dimensions(proto.return_type) == 1
            && self.base_type(proto.return_type) == holder
    }

    /// `static E valueOf(String)` declared on the enum `holder`
    pub fn is_enum_value_of_method(&self, method: MethodRef, holder: TypeRef) -> bool {
        let data = self.method(method);
        if data.holder != holder || data.name != self.known.value_of_name {
            return false;
        }
        let proto = self.proto(data.proto);
        proto.return_type == holder && proto.parameters[..] == [self.known.string_type]
    }

    // ---------------------------------------------------------------------
    // Formatting
    // ---------------------------------------------------------------------

    /// `int f(java.lang.String,int)`, optionally with the holder qualified
    pub fn method_to_source_string(&self, method: MethodRef, qualified: bool) -> String {
        let data = self.method(method);
        let proto = self.proto(data.proto);
        let parameters = proto
            .parameters
            .iter()
            .map(|&p| self.java_type_name(p))
            .collect::<Vec<_>>()
            .join(",");
        let name = self.string(data.name);
        if qualified {
            format!(
                "{} {}.{}({})",
                self.java_type_name(proto.return_type),
                self.java_type_name(data.holder),
                name,
                parameters
            )
        } else {
            format!(
                "{} {}({})",
                self.java_type_name(proto.return_type),
                name,
                parameters
            )
        }
    }

    pub fn field_to_source_string(&self, field: FieldRef, qualified: bool) -> String {
        let data = self.field(field);
        let name = self.string(data.name);
        if qualified {
            format!(
                "{} {}.{}",
                self.java_type_name(data.ty),
                self.java_type_name(data.holder),
                name
            )
        } else {
            format!("{} {}", self.java_type_name(data.ty), name)
        }
    }
}

/// `V`, a primitive letter, `Lname;` or `[` followed by a non-void descriptor
pub fn is_valid_descriptor(descriptor: &str) -> bool {
    match descriptor.as_bytes().first() {
        Some(b'V' | b'Z' | b'B' | b'S' | b'C' | b'I' | b'J' | b'F' | b'D') => descriptor.len() == 1,
        Some(b'L') => descriptor.len() > 2 && descriptor.ends_with(';'),
        Some(b'[') => {
            let element = &descriptor[1..];
            element != "V" && is_valid_descriptor(element)
        }
        _ => false,
    }
}

pub fn descriptor_to_java_name(descriptor: &str) -> String {
    if let Some(element) = descriptor.strip_prefix('[') {
        return format!("{}[]", descriptor_to_java_name(element));
    }
    match descriptor {
        "V" => "void".to_string(),
        "Z" => "boolean".to_string(),
        "B" => "byte".to_string(),
        "S" => "short".to_string(),
        "C" => "char".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "F" => "float".to_string(),
        "D" => "double".to_string(),
        _ => descriptor
            .strip_prefix('L')
            .and_then(|d| d.strip_suffix(';'))
            .unwrap_or(descriptor)
            .replace('/', "."),
    }
}
