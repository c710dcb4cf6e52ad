//! Test fixtures - small programs built in code
//!
//! [`ProgramBuilder`] creates classes with the shapes the passes care about
//! and an entry point `com.example.Main.main()` that instantiates and calls
//! into them, so liveness is traced the way it is for real inputs.

use shrinker_core::graph::class::{
    ClassAccessFlags, EncodedField, EncodedMethod, FieldAccessFlags, LibraryClass, LibraryMethod,
    MethodAccessFlags, ProgramClass,
};
use shrinker_core::graph::code::{Code, Instruction, InvokeType, MethodBody, ValueId, ValueType};
use shrinker_core::graph::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use shrinker_core::graph::program::Program;
use shrinker_core::graph::AppView;
use shrinker_core::lens::LensVersion;

pub const MAIN_DESCRIPTOR: &str = "Lcom/example/Main;";

pub struct ProgramBuilder {
    pub factory: ItemFactory,
    pub program: Program,
    main: Code,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut factory = ItemFactory::new();
        let mut program = Program::new();
        program.add_runtime_library(&mut factory);
        Self {
            factory,
            program,
            main: Code::new(LensVersion::IDENTITY),
        }
    }

    pub fn ty(&mut self, descriptor: &str) -> TypeRef {
        self.factory.create_type(descriptor)
    }

    /// `public class C extends Object` with a trivial constructor
    pub fn class(&mut self, descriptor: &str) -> TypeRef {
        let object = self.factory.known().object_type;
        self.class_extending(descriptor, object)
    }

    pub fn class_extending(&mut self, descriptor: &str, super_type: TypeRef) -> TypeRef {
        let ty = self.factory.create_type(descriptor);
        let mut class = ProgramClass::new(ty, ClassAccessFlags::PUBLIC, Some(super_type));
        class.add_method(self.trivial_constructor(ty, super_type));
        self.program.add_class(class);
        ty
    }

    pub fn class_mut(&mut self, ty: TypeRef) -> &mut ProgramClass {
        self.program.class_mut(ty).expect("class was added by the builder")
    }

    /// `<init>()V` calling the super constructor
    pub fn trivial_constructor(&mut self, ty: TypeRef, super_type: TypeRef) -> EncodedMethod {
        let known = self.factory.known().clone();
        let init = self.factory.create_method(ty, known.void_proto, known.init_name);
        let super_init = self.factory.create_method(super_type, known.void_proto, known.init_name);
        let mut code = Code::new(LensVersion::IDENTITY);
        let receiver = code.emit_argument(ty);
        code.emit_invoke(InvokeType::Direct, super_init, vec![receiver], None);
        code.emit_return(None);
        EncodedMethod::new(
            init,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
            Some(MethodBody::Code(code)),
        )
    }

    /// A private instance field
    pub fn field(&mut self, holder: TypeRef, name: &str, ty: TypeRef) -> FieldRef {
        let name = self.factory.intern_string(name);
        let field = self.factory.create_field(holder, ty, name);
        self.class_mut(holder)
            .add_field(EncodedField::new(field, FieldAccessFlags::PRIVATE));
        field
    }

    /// `public void name()` with an empty body
    pub fn virtual_method(&mut self, holder: TypeRef, name: &str) -> MethodRef {
        let void = self.factory.known().void_type;
        self.method(holder, name, &[], void, MethodAccessFlags::PUBLIC, |_, code, _| {
            code.emit_return(None);
        })
    }

    /// Add a method whose body is written by `body`. The arguments, the
    /// receiver first for instance methods, are already emitted.
    pub fn method<F>(
        &mut self,
        holder: TypeRef,
        name: &str,
        parameters: &[TypeRef],
        return_type: TypeRef,
        access: MethodAccessFlags,
        body: F,
    ) -> MethodRef
    where
        F: FnOnce(&mut ItemFactory, &mut Code, &[ValueId]),
    {
        let proto = self.factory.create_proto(return_type, parameters);
        let name = self.factory.intern_string(name);
        let method = self.factory.create_method(holder, proto, name);
        let mut code = Code::new(LensVersion::IDENTITY);
        let mut arguments = Vec::with_capacity(parameters.len() + 1);
        if !access.contains(MethodAccessFlags::STATIC) {
            arguments.push(code.emit_argument(holder));
        }
        for &parameter in parameters {
            arguments.push(code.emit_argument(parameter));
        }
        body(&mut self.factory, &mut code, &arguments);
        self.class_mut(holder)
            .add_method(EncodedMethod::new(method, access, Some(MethodBody::Code(code))));
        method
    }

    /// An unboxable enum: constants, `$VALUES`, the `(String, int)`
    /// constructor and a static initializer creating the constants
    pub fn enum_class(&mut self, descriptor: &str, constants: &[&str]) -> (TypeRef, Vec<FieldRef>) {
        let known = self.factory.known().clone();
        let ty = self.factory.create_type(descriptor);
        let mut class = ProgramClass::new(
            ty,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::ENUM,
            Some(known.enum_type),
        );

        let mut fields = Vec::with_capacity(constants.len());
        for name in constants {
            let name = self.factory.intern_string(name);
            let field = self.factory.create_field(ty, ty, name);
            class.add_field(EncodedField::new(
                field,
                FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL | FieldAccessFlags::ENUM,
            ));
            fields.push(field);
        }
        let array = self.factory.create_type(&format!("[{descriptor}"));
        let values_name = self.factory.intern_string("$VALUES");
        let values = self.factory.create_field(ty, array, values_name);
        class.add_field(EncodedField::new(
            values,
            FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC,
        ));

        let init = self.factory.create_method(ty, known.enum_init_proto, known.init_name);
        let super_init = self
            .factory
            .create_method(known.enum_type, known.enum_init_proto, known.init_name);
        let mut code = Code::new(LensVersion::IDENTITY);
        let receiver = code.emit_argument(ty);
        let name = code.emit_argument(known.string_type);
        let ordinal = code.emit_argument(known.int_type);
        code.emit_invoke(InvokeType::Direct, super_init, vec![receiver, name, ordinal], None);
        code.emit_return(None);
        class.add_method(EncodedMethod::new(
            init,
            MethodAccessFlags::PRIVATE | MethodAccessFlags::CONSTRUCTOR,
            Some(MethodBody::Code(code)),
        ));

        let clinit = self
            .factory
            .create_method(ty, known.void_proto, known.clinit_name);
        let mut code = Code::new(LensVersion::IDENTITY);
        for (index, (&field, constant)) in fields.iter().zip(constants).enumerate() {
            let instance = code.emit_new_instance(ty);
            let name = code.new_value(ValueType::Type(known.string_type));
            code.emit(Instruction::ConstString {
                out: name,
                value: constant.to_string(),
            });
            let ordinal = code.emit_const_number(index as i64, known.int_type);
            code.emit_invoke(InvokeType::Direct, init, vec![instance, name, ordinal], None);
            code.emit(Instruction::StaticPut { value: instance, field });
        }
        code.emit_return(None);
        class.add_method(EncodedMethod::new(
            clinit,
            MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR,
            Some(MethodBody::Code(code)),
        ));

        self.program.add_class(class);
        (ty, fields)
    }

    /// A library class with static methods of the given signatures
    pub fn library_class(&mut self, descriptor: &str, methods: &[(&str, &[TypeRef], TypeRef)]) -> Vec<MethodRef> {
        let object = self.factory.known().object_type;
        let ty = self.factory.create_type(descriptor);
        let mut class = LibraryClass::new(ty, Some(object));
        let mut references = Vec::with_capacity(methods.len());
        for &(name, parameters, return_type) in methods {
            let proto = self.factory.create_proto(return_type, parameters);
            let name = self.factory.intern_string(name);
            let reference = self.factory.create_method(ty, proto, name);
            class.methods.push(LibraryMethod {
                reference,
                access: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            });
            references.push(reference);
        }
        self.program.add_library_class(class);
        references
    }

    /// Append to the body of `Main.main()`
    pub fn main<F>(&mut self, body: F)
    where
        F: FnOnce(&mut ItemFactory, &mut Code),
    {
        body(&mut self.factory, &mut self.main);
    }

    /// `new C()` in `Main.main()`
    pub fn instantiate(&mut self, ty: TypeRef) -> ValueId {
        let known = self.factory.known().clone();
        let init = self.factory.create_method(ty, known.void_proto, known.init_name);
        let instance = self.main.emit_new_instance(ty);
        self.main
            .emit_invoke(InvokeType::Direct, init, vec![instance], None);
        instance
    }

    /// `receiver.method()` in `Main.main()`
    pub fn call_virtual(&mut self, receiver: ValueId, method: MethodRef) {
        self.main
            .emit_invoke(InvokeType::Virtual, method, vec![receiver], None);
    }

    /// Add `Main` with its pinned entry point and return the program parts
    pub fn finish(mut self) -> (ItemFactory, Program) {
        let known = self.factory.known().clone();
        let main_type = self.factory.create_type(MAIN_DESCRIPTOR);
        let name = self.factory.intern_string("main");
        let main = self.factory.create_method(main_type, known.void_proto, name);
        self.main.emit_return(None);
        let mut entry = EncodedMethod::new(
            main,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some(MethodBody::Code(self.main)),
        );
        entry.pinned = true;
        let mut class = ProgramClass::new(main_type, ClassAccessFlags::PUBLIC, Some(known.object_type));
        class.add_method(entry);
        self.program.add_class(class);
        (self.factory, self.program)
    }

    /// [`ProgramBuilder::finish`] and trace liveness
    pub fn build(self) -> AppView {
        let (factory, program) = self.finish();
        AppView::new(factory, program)
    }
}

/// The code of `method`, if it has an instruction list
pub fn code_of<'a>(app: &'a AppView, method: MethodRef) -> Option<&'a Code> {
    let holder = app.factory.method(method).holder;
    app.program
        .class(holder)?
        .lookup_method(method)?
        .body
        .as_ref()?
        .as_code()
}
