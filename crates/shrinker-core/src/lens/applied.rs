use super::GraphLens;
use crate::collections::{BidirectionalManyToOneRepresentativeMap, BidirectionalOneToOneMap};
use crate::errors::{CompilationError, Result};
use crate::graph::factory::{FieldRef, ItemFactory, MethodRef, TypeRef};
use crate::graph::program::Program;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// A history-only lens that replaces a whole chain.
///
/// It maps pre-pipeline identifiers straight to current ones and back. Once
/// every method body has been rewritten against the chain it replaces, no
/// code needs to be rewritten through it.
#[derive(Debug, Default)]
pub struct AppliedLens {
    /// original type -> current type
    renamed_type_names: BidirectionalManyToOneRepresentativeMap<TypeRef, TypeRef>,
    /// current field -> original field
    original_field_signatures: BidirectionalOneToOneMap<FieldRef, FieldRef>,
    /// original method -> current method
    original_method_signatures: BidirectionalManyToOneRepresentativeMap<MethodRef, MethodRef>,
    /// current method -> original method already claimed by another current
    /// method
    extra_original_method_signatures: FxHashMap<MethodRef, MethodRef>,
}

impl AppliedLens {
    /// Fold `lens` into a single applied lens over the current `program`
    pub fn new(program: &Program, factory: &ItemFactory, lens: &GraphLens) -> Self {
        let mut applied = AppliedLens::default();

        for class in program.classes_with_deterministic_order(factory) {
            for original in lens.get_original_types(class.ty) {
                applied.renamed_type_names.put(original, class.ty);
            }
            applied
                .renamed_type_names
                .set_representative(class.ty, lens.get_original_type(class.ty));

            for field in class.fields() {
                let original = lens.get_original_field_signature(field.reference);
                if original != field.reference {
                    applied
                        .original_field_signatures
                        .force_put(field.reference, original);
                }
            }

            for method in class.methods() {
                let current = method.reference;
                let originals = lens.get_original_method_signatures(current);
                let mut claimed = false;
                for original in originals {
                    if applied.original_method_signatures.contains_key(&original) {
                        continue;
                    }
                    applied.original_method_signatures.put(original, current);
                    claimed = true;
                }
                if claimed {
                    let representative = lens.get_original_method_signature(current);
                    if applied.original_method_signatures.get(&representative) == Some(current) {
                        applied
                            .original_method_signatures
                            .set_representative(current, representative);
                    }
                } else {
                    let original = lens.get_original_method_signature(current);
                    if original != current {
                        applied
                            .extra_original_method_signatures
                            .insert(current, original);
                    }
                }
            }
        }

        applied.renamed_type_names.remove_identity_mappings();
        applied.original_method_signatures.remove_identity_mappings();
        debug!(
            types = applied.renamed_type_names.len(),
            fields = applied.original_field_signatures.len(),
            methods = applied.original_method_signatures.len(),
            extra_methods = applied.extra_original_method_signatures.len(),
            "Built applied lens"
        );
        applied
    }

    /// Replace the chain ending at `head` with this lens, after checking that
    /// it implies no code rewriting for `program`.
    pub fn install(self, program: &Program, head: &Arc<GraphLens>) -> Result<Arc<GraphLens>> {
        self.verify_no_code_rewritings(program)?;
        Ok(GraphLens::replace_chain(head, self))
    }

    /// Current types and fields must be fixed points of the forward maps.
    /// Method definitions may sit apart from the signature calls use, since
    /// calls are never routed through this lens.
    pub fn verify_no_code_rewritings(&self, program: &Program) -> Result<()> {
        let check = |result: std::result::Result<(), String>| {
            result.map_err(CompilationError::InvariantViolation)
        };
        check(self.renamed_type_names.check_invariants())?;
        check(self.original_field_signatures.check_invariants())?;
        check(self.original_method_signatures.check_invariants())?;

        for class in program.classes() {
            let renamed = self.lookup_type(class.ty);
            if renamed != class.ty {
                return Err(CompilationError::InvariantViolation(format!(
                    "applied lens maps live type {:?} to {renamed:?}",
                    class.ty
                )));
            }
            for field in class.fields() {
                let renamed = self.lookup_field(field.reference);
                if renamed != field.reference {
                    return Err(CompilationError::InvariantViolation(format!(
                        "applied lens maps live field {:?} to {renamed:?}",
                        field.reference
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn lookup_type(&self, original: TypeRef) -> TypeRef {
        self.renamed_type_names.get(&original).unwrap_or(original)
    }

    pub fn lookup_field(&self, original: FieldRef) -> FieldRef {
        self.original_field_signatures
            .get_key(&original)
            .unwrap_or(original)
    }

    /// The current definition of an original method
    pub fn lookup_method(&self, original: MethodRef) -> MethodRef {
        self.original_method_signatures
            .get(&original)
            .unwrap_or(original)
    }

    pub fn original_type(&self, current: TypeRef) -> TypeRef {
        self.renamed_type_names
            .representative_key(&current)
            .unwrap_or(current)
    }

    pub fn original_types(&self, current: TypeRef) -> Vec<TypeRef> {
        let types = self.renamed_type_names.keys_representative_first(&current);
        if types.is_empty() {
            vec![current]
        } else {
            types
        }
    }

    pub fn original_field_signature(&self, current: FieldRef) -> FieldRef {
        self.original_field_signatures.get(&current).unwrap_or(current)
    }

    pub fn original_method_signature(&self, current: MethodRef) -> MethodRef {
        self.original_method_signatures
            .representative_key(&current)
            .or_else(|| self.extra_original_method_signatures.get(&current).copied())
            .unwrap_or(current)
    }

    pub fn original_method_signatures(&self, current: MethodRef) -> Vec<MethodRef> {
        let methods = self.original_method_signatures.keys_representative_first(&current);
        if methods.is_empty() {
            vec![self.original_method_signature(current)]
        } else {
            methods
        }
    }
}
