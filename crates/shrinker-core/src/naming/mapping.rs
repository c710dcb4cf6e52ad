use crate::errors::Result;
use crate::graph::factory::{FieldRef, MethodRef, TypeRef};
use crate::graph::AppView;
use std::fmt::Write as _;
use std::path::Path;
use tracing::debug;

/// Writes a ProGuard-style mapping for the current program.
///
/// ```text
/// com.example.A -> com.example.A:
/// # merged: com.example.B
///     void com.example.B.run() -> run$B
/// ```
pub struct MappingWriter<'a> {
    app: &'a AppView,
    include_unchanged_members: bool,
}

impl<'a> MappingWriter<'a> {
    pub fn new(app: &'a AppView) -> Self {
        Self {
            app,
            include_unchanged_members: false,
        }
    }

    pub fn include_unchanged_members(mut self, include: bool) -> Self {
        self.include_unchanged_members = include;
        self
    }

    pub fn write_to_string(&self) -> String {
        let factory = &self.app.factory;
        let lens = self.app.graph_lens();
        let mut out = String::new();
        for class in self.app.program.classes_with_deterministic_order(factory) {
            let originals = lens.get_original_types(class.ty);
            let original = originals.first().copied().unwrap_or(class.ty);
            let _ = writeln!(
                out,
                "{} -> {}:",
                factory.java_type_name(original),
                factory.java_type_name(class.ty)
            );
            for &merged in originals.iter().skip(1) {
                let _ = writeln!(out, "# merged: {}", factory.java_type_name(merged));
            }
            for field in class.fields() {
                self.write_field(&mut out, original, field.reference);
            }
            for method in class.methods() {
                self.write_method(&mut out, original, method.reference);
            }
        }
        out
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let mapping = self.write_to_string();
        std::fs::write(path, &mapping)?;
        debug!(path = %path.display(), bytes = mapping.len(), "Wrote mapping");
        Ok(())
    }

    fn write_field(&self, out: &mut String, class_original: TypeRef, field: FieldRef) {
        let factory = &self.app.factory;
        let original = self.app.graph_lens().get_original_field_signature(field);
        if original == field && !self.include_unchanged_members {
            return;
        }
        let qualified = factory.field(original).holder != class_original;
        let _ = writeln!(
            out,
            "    {} -> {}",
            factory.field_to_source_string(original, qualified),
            factory.field_name(field)
        );
    }

    fn write_method(&self, out: &mut String, class_original: TypeRef, method: MethodRef) {
        let factory = &self.app.factory;
        let lens = self.app.graph_lens();
        let originals = lens.get_original_method_signatures(method);
        let changed = originals.iter().any(|&o| o != method);
        if !changed && !self.include_unchanged_members {
            return;
        }
        for original in originals {
            let qualified = factory.method(original).holder != class_original;
            let _ = writeln!(
                out,
                "    {} -> {}",
                factory.method_to_source_string(original, qualified),
                factory.method_name(method)
            );
        }
    }
}
