use crate::errors::Result;
use crate::graph::factory::{FieldRef, MethodRef, TypeRef};
use crate::lens::{GraphLens, LensKind, MethodLookupResult, NestedLens, NestedLensBuilder, RewrittenPrototypeDescription};
use crate::tree_fixer::SignatureRecorder;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// The lens published by enum unboxing: a nested renaming whose type map sends
/// every unboxed enum to `int`, plus the set of unboxed types.
#[derive(Debug)]
pub struct EnumUnboxingLens {
    nested: NestedLens,
    unboxed: FxHashSet<TypeRef>,
}

impl EnumUnboxingLens {
    pub fn nested(&self) -> &NestedLens {
        &self.nested
    }

    pub fn is_unboxed(&self, ty: TypeRef) -> bool {
        self.unboxed.contains(&ty)
    }

    pub fn unboxed_types(&self) -> impl Iterator<Item = TypeRef> + '_ {
        self.unboxed.iter().copied()
    }

    /// Unboxed enums keep no methods, so invoke kinds never change here; only
    /// the signature moves and their prototype changes apply.
    pub fn lookup_method(&self, previous: MethodLookupResult) -> MethodLookupResult {
        self.nested.lookup_method(previous)
    }
}

pub struct EnumUnboxingLensBuilder {
    nested: NestedLensBuilder,
    unboxed: FxHashSet<TypeRef>,
}

impl EnumUnboxingLensBuilder {
    /// Map each of `unboxed` to `int_type`
    pub fn new(unboxed: &[TypeRef], int_type: TypeRef) -> Self {
        let mut nested = NestedLensBuilder::new();
        for &ty in unboxed {
            nested.map_type(ty, int_type);
        }
        Self {
            nested,
            unboxed: unboxed.iter().copied().collect(),
        }
    }

    pub fn build(self, previous: &Arc<GraphLens>) -> Result<Arc<GraphLens>> {
        let lens = EnumUnboxingLens {
            nested: self.nested.build_nested()?,
            unboxed: self.unboxed,
        };
        Ok(GraphLens::push(previous, LensKind::EnumUnboxing(lens)))
    }
}

impl SignatureRecorder for EnumUnboxingLensBuilder {
    fn record_field_move(&mut self, from: FieldRef, to: FieldRef) {
        self.nested.record_field_move(from, to);
    }

    fn record_method_move(&mut self, from: MethodRef, to: MethodRef, changes: RewrittenPrototypeDescription) {
        self.nested.record_method_move(from, to, changes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::code::InvokeType;
    use crate::graph::factory::ItemFactory;
    use crate::lens::RewrittenTypeInfo;

    #[test]
    fn test_unboxed_type_maps_to_int_without_inverse() {
        let mut factory = ItemFactory::new();
        let int = factory.known().int_type;
        let color = factory.create_type("Lcom/example/Color;");

        let lens = EnumUnboxingLensBuilder::new(&[color], int)
            .build(&GraphLens::identity())
            .unwrap();

        assert_eq!(lens.lookup_type(color), int);
        assert!(lens.is_unboxed_enum(color));
        assert!(!lens.is_unboxed_enum(int));
        assert_eq!(lens.get_original_type(int), int);
        assert!(lens.has_code_rewritings());
    }

    #[test]
    fn test_retyped_method_carries_prototype_changes() {
        let mut factory = ItemFactory::new();
        let int = factory.known().int_type;
        let void = factory.known().void_type;
        let color = factory.create_type("Lcom/example/Color;");
        let user = factory.create_type("Lcom/example/User;");
        let paint = factory.intern_string("paint");
        let boxed_proto = factory.create_proto(void, &[color]);
        let unboxed_proto = factory.create_proto(void, &[int]);
        let boxed = factory.create_method(user, boxed_proto, paint);
        let unboxed = factory.create_method(user, unboxed_proto, paint);

        let mut builder = EnumUnboxingLensBuilder::new(&[color], int);
        let changes = RewrittenPrototypeDescription::none().with_argument(
            0,
            RewrittenTypeInfo {
                old_type: color,
                new_type: int,
            },
        );
        builder.record_method_move(boxed, unboxed, changes);
        let lens = builder.build(&GraphLens::identity()).unwrap();

        let lookup = lens.lookup_method(boxed, None, InvokeType::Static);
        assert_eq!(lookup.reference, unboxed);
        assert_eq!(lookup.invoke_type, InvokeType::Static);
        assert_eq!(lookup.prototype_changes.argument(0).map(|i| i.new_type), Some(int));
        assert_eq!(lens.get_original_method_signature(unboxed), boxed);
    }
}
