use super::class::{ClassAccessFlags, EncodedMethod, LibraryClass, LibraryMethod, MethodAccessFlags, ProgramClass};
use super::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Program,
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub holder: TypeRef,
    pub reference: MethodRef,
    pub access: MethodAccessFlags,
    pub kind: DefinitionKind,
}

impl ResolvedMethod {
    pub fn is_program(&self) -> bool {
        self.kind == DefinitionKind::Program
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    pub holder: TypeRef,
    pub reference: FieldRef,
    pub is_static: bool,
    pub kind: DefinitionKind,
}

/// The whole program: program classes in insertion order plus library stubs
#[derive(Debug, Clone, Default)]
pub struct Program {
    classes: IndexMap<TypeRef, ProgramClass, FxBuildHasher>,
    library_classes: FxHashMap<TypeRef, LibraryClass>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, class: ProgramClass) {
        self.classes.insert(class.ty, class);
    }

    pub fn add_library_class(&mut self, class: LibraryClass) {
        self.library_classes.insert(class.ty, class);
    }

    /// Register stubs for `java.lang.Object` and `java.lang.Enum` unless the
    /// input already described them
    pub fn add_runtime_library(&mut self, factory: &mut ItemFactory) {
        let known = factory.known().clone();
        if !self.library_classes.contains_key(&known.object_type) {
            let mut object = LibraryClass::new(known.object_type, None);
            let init = factory.create_method(known.object_type, known.void_proto, known.init_name);
            let to_string = factory.method_with_holder(known.enum_to_string, known.object_type);
            for (reference, access) in [
                (init, MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR),
                (to_string, MethodAccessFlags::PUBLIC),
            ] {
                object.methods.push(LibraryMethod { reference, access });
            }
            self.add_library_class(object);
        }
        if !self.library_classes.contains_key(&known.enum_type) {
            let mut enum_class = LibraryClass::new(known.enum_type, Some(known.object_type));
            enum_class.access |= ClassAccessFlags::ABSTRACT;
            let init = factory.create_method(known.enum_type, known.enum_init_proto, known.init_name);
            enum_class.methods.push(LibraryMethod {
                reference: init,
                access: MethodAccessFlags::PROTECTED | MethodAccessFlags::CONSTRUCTOR,
            });
            for reference in [known.enum_ordinal, known.enum_name, known.enum_to_string, known.enum_compare_to] {
                enum_class.methods.push(LibraryMethod {
                    reference,
                    access: MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL,
                });
            }
            self.add_library_class(enum_class);
        }
    }

    /// Remove a program class, keeping the order of the remaining ones
    pub fn remove_class(&mut self, ty: TypeRef) -> Option<ProgramClass> {
        self.classes.shift_remove(&ty)
    }

    pub fn class(&self, ty: TypeRef) -> Option<&ProgramClass> {
        self.classes.get(&ty)
    }

    pub fn class_mut(&mut self, ty: TypeRef) -> Option<&mut ProgramClass> {
        self.classes.get_mut(&ty)
    }

    pub fn library_class(&self, ty: TypeRef) -> Option<&LibraryClass> {
        self.library_classes.get(&ty)
    }

    pub fn library_classes(&self) -> impl Iterator<Item = &LibraryClass> {
        self.library_classes.values()
    }

    pub fn contains_class(&self, ty: TypeRef) -> bool {
        self.classes.contains_key(&ty)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ProgramClass> {
        self.classes.values()
    }

    pub fn classes_mut(&mut self) -> impl Iterator<Item = &mut ProgramClass> {
        self.classes.values_mut()
    }

    pub fn par_classes_mut(&mut self) -> indexmap::map::rayon::ParValuesMut<'_, TypeRef, ProgramClass> {
        self.classes.par_values_mut()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn types(&self) -> Vec<TypeRef> {
        self.classes.keys().copied().collect()
    }

    /// Program classes sorted by descriptor, independent of insertion order
    pub fn classes_with_deterministic_order(&self, factory: &ItemFactory) -> Vec<&ProgramClass> {
        let mut classes: Vec<&ProgramClass> = self.classes.values().collect();
        classes.sort_by(|a, b| factory.descriptor(a.ty).cmp(factory.descriptor(b.ty)));
        classes
    }

    pub fn methods(&self) -> impl Iterator<Item = (&ProgramClass, &EncodedMethod)> {
        self.classes
            .values()
            .flat_map(|class| class.methods().map(move |method| (class, method)))
    }

    pub fn super_type(&self, ty: TypeRef) -> Option<TypeRef> {
        match self.classes.get(&ty) {
            Some(class) => class.super_type,
            None => self.library_classes.get(&ty).and_then(|c| c.super_type),
        }
    }

    /// Whether `sub` is `sup` or extends it, through program and library classes
    pub fn is_subtype(&self, sub: TypeRef, sup: TypeRef) -> bool {
        let mut current = Some(sub);
        while let Some(ty) = current {
            if ty == sup {
                return true;
            }
            let interfaces = match self.classes.get(&ty) {
                Some(class) => &class.interfaces[..],
                None => match self.library_classes.get(&ty) {
                    Some(class) => &class.interfaces[..],
                    None => &[],
                },
            };
            if interfaces.iter().any(|&i| self.is_subtype(i, sup)) {
                return true;
            }
            current = self.super_type(ty);
        }
        false
    }

    /// Direct program subclasses keyed by their superclass
    pub fn direct_subclasses(&self) -> FxHashMap<TypeRef, Vec<TypeRef>> {
        let mut subclasses: FxHashMap<TypeRef, Vec<TypeRef>> = FxHashMap::default();
        for class in self.classes.values() {
            if let Some(super_type) = class.super_type {
                subclasses.entry(super_type).or_default().push(class.ty);
            }
        }
        subclasses
    }

    /// Resolve a method by walking the superclass chain from its holder
    pub fn resolve_method(&self, factory: &ItemFactory, method: MethodRef) -> Option<ResolvedMethod> {
        let mut current = Some(factory.method(method).holder);
        while let Some(ty) = current {
            if let Some(class) = self.classes.get(&ty) {
                if let Some(found) = class.lookup_method_by_signature(factory, method) {
                    return Some(ResolvedMethod {
                        holder: ty,
                        reference: found.reference,
                        access: found.access,
                        kind: DefinitionKind::Program,
                    });
                }
                current = class.super_type;
            } else if let Some(class) = self.library_classes.get(&ty) {
                if let Some(found) = class.lookup_method_by_signature(factory, method) {
                    return Some(ResolvedMethod {
                        holder: ty,
                        reference: found.reference,
                        access: found.access,
                        kind: DefinitionKind::Library,
                    });
                }
                current = class.super_type;
            } else {
                return None;
            }
        }
        None
    }

    pub fn resolve_field(&self, factory: &ItemFactory, field: FieldRef) -> Option<ResolvedField> {
        let data = factory.field(field);
        let mut current = Some(data.holder);
        while let Some(ty) = current {
            if let Some(class) = self.classes.get(&ty) {
                let found = class.fields().find(|f| {
                    let candidate = factory.field(f.reference);
                    candidate.name == data.name && candidate.ty == data.ty
                });
                if let Some(found) = found {
                    return Some(ResolvedField {
                        holder: ty,
                        reference: found.reference,
                        is_static: found.is_static(),
                        kind: DefinitionKind::Program,
                    });
                }
                current = class.super_type;
            } else if let Some(class) = self.library_classes.get(&ty) {
                let found = class.fields.iter().copied().find(|&f| {
                    let candidate = factory.field(f);
                    candidate.name == data.name && candidate.ty == data.ty
                });
                if let Some(found) = found {
                    return Some(ResolvedField {
                        holder: ty,
                        reference: found,
                        is_static: false,
                        kind: DefinitionKind::Library,
                    });
                }
                current = class.super_type;
            } else {
                return None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::class::ClassAccessFlags;

    #[test]
    fn test_resolve_method_walks_to_library() {
        let mut factory = ItemFactory::new();
        let object = factory.known().object_type;
        let a = factory.create_type("Lcom/example/A;");
        let void_proto = factory.known().void_proto;
        let name = factory.intern_string("hashCode");
        let on_object = factory.create_method(object, void_proto, name);
        let on_a = factory.create_method(a, void_proto, name);

        let mut program = Program::new();
        program.add_class(ProgramClass::new(a, ClassAccessFlags::PUBLIC, Some(object)));
        let mut object_class = LibraryClass::new(object, None);
        object_class.methods.push(LibraryMethod {
            reference: on_object,
            access: MethodAccessFlags::PUBLIC,
        });
        program.add_library_class(object_class);

        let resolved = program.resolve_method(&factory, on_a).unwrap();
        assert_eq!(resolved.reference, on_object);
        assert_eq!(resolved.kind, DefinitionKind::Library);
        assert!(program.is_subtype(a, object));
    }

    #[test]
    fn test_deterministic_order_ignores_insertion_order() {
        let mut factory = ItemFactory::new();
        let b = factory.create_type("Lcom/example/B;");
        let a = factory.create_type("Lcom/example/A;");

        let mut program = Program::new();
        program.add_class(ProgramClass::new(b, ClassAccessFlags::PUBLIC, None));
        program.add_class(ProgramClass::new(a, ClassAccessFlags::PUBLIC, None));

        let order: Vec<TypeRef> = program
            .classes_with_deterministic_order(&factory)
            .iter()
            .map(|c| c.ty)
            .collect();
        assert_eq!(order, vec![a, b]);
    }
}
