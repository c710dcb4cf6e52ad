use super::class_merger::MergeAbort;
use crate::graph::class::{EncodedMethod, MethodAccessFlags, ProgramClass};
use crate::graph::code::{ClassIdDispatch, MethodBody};
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef};
use crate::lens::NestedLensBuilder;
use rustc_hash::{FxHashMap, FxHashSet};

/// One virtual signature declared by several classes of a group.
///
/// Every declaration becomes a private method on the target named after its
/// class, and the shared signature gets a [`ClassIdDispatch`] body that
/// picks the right one from the receiver's class id.
#[derive(Debug)]
pub(super) struct VirtualMethodMerger {
    signature: MethodRef,
    access: MethodAccessFlags,
    /// (class id, previous declaration, private copy on the target)
    definitions: Vec<(i32, MethodRef, MethodRef)>,
    fallback: Option<MethodRef>,
}

impl VirtualMethodMerger {
    /// `definitions` pairs the group index of each declaring class with the
    /// declaration, in group order. Classes of the group without a
    /// declaration run `fallback`.
    pub(super) fn plan(
        factory: &mut ItemFactory,
        target: &ProgramClass,
        definitions: &[(usize, &ProgramClass, &EncodedMethod)],
        fallback: Option<MethodRef>,
        taken: &mut FxHashSet<MethodRef>,
    ) -> Result<Self, MergeAbort> {
        let Some(&(_, _, first)) = definitions.first() else {
            return Err(MergeAbort::EmptyGroup);
        };
        if let Some(&(_, _, method)) = definitions.iter().find(|(_, _, m)| m.is_abstract()) {
            return Err(MergeAbort::AbstractMethod(method.reference));
        }

        let signature = factory.method_with_holder(first.reference, target.ty);
        taken.insert(signature);

        let base_name = factory.method_name(first.reference).to_string();
        let mut planned = Vec::with_capacity(definitions.len());
        for &(index, class, method) in definitions {
            let class_name = factory.simple_name(class.ty).to_string();
            let name = factory.intern_string(&format!("{base_name}${class_name}"));
            let renamed = factory.method_with_name(signature, name);
            let renamed = if taken.contains(&renamed) {
                factory.fresh_method(renamed, taken)
            } else {
                renamed
            };
            taken.insert(renamed);
            planned.push((index as i32, method.reference, renamed));
        }

        Ok(Self {
            signature,
            access: first.access - MethodAccessFlags::FINAL,
            definitions: planned,
            fallback,
        })
    }

    pub(super) fn signature(&self) -> MethodRef {
        self.signature
    }

    /// Install the private copies and the dispatch method on `target`.
    /// Source declarations are taken from `detached`.
    pub(super) fn commit(
        self,
        target: &mut ProgramClass,
        detached: &mut FxHashMap<MethodRef, EncodedMethod>,
        class_id_field: FieldRef,
        builder: &mut NestedLensBuilder,
    ) {
        let mut cases = Vec::with_capacity(self.definitions.len());
        for &(class_id, previous, renamed) in &self.definitions {
            let declaration = if previous == self.signature {
                target.remove_method(previous)
            } else {
                detached.remove(&previous)
            };
            if let Some(declaration) = declaration {
                let mut access = declaration.access
                    - MethodAccessFlags::PUBLIC
                    - MethodAccessFlags::PROTECTED;
                access |= MethodAccessFlags::PRIVATE;
                target.add_method(EncodedMethod {
                    access,
                    ..declaration.with_reference(renamed)
                });
            }
            builder.map_method_invocation(previous, self.signature);
            builder.record_method_definition(previous, renamed);
            cases.push((class_id, renamed));
        }

        let dispatch = ClassIdDispatch {
            class_id_field,
            cases,
            fallback: self.fallback,
        };
        target.add_method(EncodedMethod::new(
            self.signature,
            self.access,
            Some(MethodBody::ClassIdDispatch(dispatch)),
        ));
    }
}
