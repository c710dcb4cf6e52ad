use super::prototype_changes::RewrittenPrototypeDescription;
use super::{GraphLens, LensKind, MethodLookupResult};
use crate::collections::BidirectionalManyToOneRepresentativeMap;
use crate::errors::{CompilationError, Result};
use crate::graph::factory::{FieldRef, MethodRef, TypeRef};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A renaming layer produced by a structural pass.
///
/// Call sites and definitions are tracked separately: when merged classes
/// share a virtual method, calls to every copy go to the dispatch method while
/// each body is moved to its own fresh name.
#[derive(Debug, Default)]
pub struct NestedLens {
    /// previous type -> new type
    type_map: BidirectionalManyToOneRepresentativeMap<TypeRef, TypeRef>,
    /// previous field -> new field
    field_map: BidirectionalManyToOneRepresentativeMap<FieldRef, FieldRef>,
    /// previous method -> method that call sites now target
    method_map: BidirectionalManyToOneRepresentativeMap<MethodRef, MethodRef>,
    /// previous method -> where its definition now lives
    method_definitions: BidirectionalManyToOneRepresentativeMap<MethodRef, MethodRef>,
    /// new method -> previous method, for methods created on a signature whose
    /// previous definition moved elsewhere
    extra_original_method_signatures: FxHashMap<MethodRef, MethodRef>,
    /// keyed by the previous method
    prototype_changes: FxHashMap<MethodRef, RewrittenPrototypeDescription>,
}

impl NestedLens {
    pub fn is_empty(&self) -> bool {
        self.type_map.is_empty()
            && self.field_map.is_empty()
            && self.method_map.is_empty()
            && self.method_definitions.is_empty()
            && self.extra_original_method_signatures.is_empty()
    }

    pub fn lookup_type(&self, ty: TypeRef) -> TypeRef {
        self.type_map.get(&ty).unwrap_or(ty)
    }

    pub fn lookup_field(&self, field: FieldRef) -> FieldRef {
        self.field_map.get(&field).unwrap_or(field)
    }

    pub fn lookup_method(&self, previous: MethodLookupResult) -> MethodLookupResult {
        let reference = self
            .method_map
            .get(&previous.reference)
            .unwrap_or(previous.reference);
        let prototype_changes = match self.prototype_changes.get(&previous.reference) {
            Some(changes) => previous.prototype_changes.combine(changes),
            None => previous.prototype_changes,
        };
        MethodLookupResult {
            reference,
            invoke_type: previous.invoke_type,
            prototype_changes,
        }
    }

    pub fn prototype_changes(&self, previous: MethodRef) -> Option<&RewrittenPrototypeDescription> {
        self.prototype_changes.get(&previous)
    }

    pub fn renamed_method_signature(&self, previous: MethodRef) -> MethodRef {
        self.method_definitions.get(&previous).unwrap_or(previous)
    }

    pub fn previous_type(&self, ty: TypeRef) -> TypeRef {
        self.type_map.representative_key(&ty).unwrap_or(ty)
    }

    pub fn previous_types(&self, ty: TypeRef) -> Vec<TypeRef> {
        let types = self.type_map.keys_representative_first(&ty);
        if types.is_empty() {
            vec![ty]
        } else {
            types
        }
    }

    pub fn previous_field_signature(&self, field: FieldRef) -> FieldRef {
        self.field_map.representative_key(&field).unwrap_or(field)
    }

    pub fn previous_method_signature(&self, method: MethodRef) -> MethodRef {
        self.method_definitions
            .representative_key(&method)
            .or_else(|| self.extra_original_method_signatures.get(&method).copied())
            .unwrap_or(method)
    }

    pub fn previous_method_signatures(&self, method: MethodRef) -> Vec<MethodRef> {
        let methods = self.method_definitions.keys_representative_first(&method);
        if methods.is_empty() {
            vec![self.previous_method_signature(method)]
        } else {
            methods
        }
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeRef, TypeRef)> + '_ {
        self.type_map.iter()
    }

    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.type_map.check_invariants()?;
        self.field_map.check_invariants()?;
        self.method_map.check_invariants()?;
        self.method_definitions.check_invariants()?;
        for (new, previous) in &self.extra_original_method_signatures {
            if self.method_definitions.contains_value(new) {
                return Err(format!(
                    "{new:?} has both an extra original {previous:?} and regular originals"
                ));
            }
        }
        Ok(())
    }
}

/// Collects the mappings of one pass and produces an immutable [`NestedLens`].
///
/// Structural passes record moves with the `map_*`/`move_*` methods. The
/// signature fixups that follow go through the `fixup_*` methods, which chain
/// onto earlier moves so the lens maps previous references straight to the
/// final ones.
#[derive(Debug, Default)]
pub struct NestedLensBuilder {
    lens: NestedLens,
}

impl NestedLensBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lens.is_empty()
    }

    pub fn map_type(&mut self, from: TypeRef, to: TypeRef) {
        self.lens.type_map.put(from, to);
    }

    pub fn lookup_type(&self, ty: TypeRef) -> TypeRef {
        self.lens.lookup_type(ty)
    }

    pub fn move_field(&mut self, from: FieldRef, to: FieldRef) {
        if from != to {
            self.lens.field_map.put(from, to);
        }
    }

    /// `field` stays where it is while fields of other classes are mapped
    /// onto it, so later fixups re-point all of them together
    pub fn keep_field(&mut self, field: FieldRef) {
        if !self.lens.field_map.contains_key(&field) {
            self.lens.field_map.put(field, field);
        }
    }

    /// Move a definition; calls follow it
    pub fn move_method(&mut self, from: MethodRef, to: MethodRef) {
        self.map_method_invocation(from, to);
        self.record_method_definition(from, to);
    }

    /// Redirect calls to `from` without moving its definition
    pub fn map_method_invocation(&mut self, from: MethodRef, to: MethodRef) {
        self.lens.method_map.put(from, to);
    }

    /// Record that the definition of `from` now lives at `to`
    pub fn record_method_definition(&mut self, from: MethodRef, to: MethodRef) {
        if from != to {
            self.lens.method_definitions.put(from, to);
        }
    }

    /// `method` keeps its definition while others collapse into it. Without
    /// this the first collapsed definition would represent it.
    pub fn keep_method_definition(&mut self, method: MethodRef) {
        self.lens.method_definitions.put(method, method);
    }

    /// A type of the current program changed. If `from` is already the result
    /// of a mapping in this pass the earlier mappings are re-pointed.
    pub fn fixup_type(&mut self, from: TypeRef, to: TypeRef) {
        if self.lens.type_map.contains_value(&from) {
            self.lens.type_map.rename_value(from, to);
        } else {
            self.lens.type_map.put(from, to);
        }
    }

    pub fn fixup_field(&mut self, from: FieldRef, to: FieldRef) {
        if from == to {
            return;
        }
        if self.lens.field_map.contains_value(&from) {
            self.lens.field_map.rename_value(from, to);
        } else if !self.lens.field_map.contains_key(&from) {
            self.lens.field_map.put(from, to);
        }
    }

    /// A method of the current program changed signature
    pub fn fixup_method(&mut self, from: MethodRef, to: MethodRef) {
        if from == to {
            return;
        }
        let calls = &mut self.lens.method_map;
        if calls.contains_value(&from) {
            calls.rename_value(from, to);
        } else if !calls.contains_key(&from) {
            calls.put(from, to);
        }

        let definitions = &mut self.lens.method_definitions;
        if definitions.contains_value(&from) {
            definitions.rename_value(from, to);
        } else if let Some(previous) = self.lens.extra_original_method_signatures.remove(&from) {
            self.lens.extra_original_method_signatures.insert(to, previous);
        } else if definitions.contains_key(&from) {
            // A method created on a signature whose definition moved away
            self.lens.extra_original_method_signatures.insert(to, from);
        } else {
            definitions.put(from, to);
        }
    }

    /// Pin which previous method represents `new` among several collapsed
    /// definitions. Without a call the first recorded one wins.
    pub fn set_representative_method(&mut self, new: MethodRef, previous: MethodRef) {
        self.lens.method_definitions.set_representative(new, previous);
    }

    /// Record prototype changes for calls to `previous`
    pub fn add_prototype_changes(&mut self, previous: MethodRef, changes: RewrittenPrototypeDescription) {
        if changes.is_empty() {
            return;
        }
        let entry = self.lens.prototype_changes.entry(previous).or_default();
        *entry = entry.combine(&changes);
    }

    /// Record prototype changes for every previous method whose calls now
    /// reach `new`
    pub fn add_prototype_changes_for_target(&mut self, new: MethodRef, changes: &RewrittenPrototypeDescription) {
        if changes.is_empty() {
            return;
        }
        let previous: Vec<MethodRef> = self.lens.method_map.keys(&new).collect();
        for method in previous {
            self.add_prototype_changes(method, changes.clone());
        }
    }

    pub fn build(self, previous: &Arc<GraphLens>) -> Result<Arc<GraphLens>> {
        let lens = self.build_nested()?;
        Ok(GraphLens::push(previous, LensKind::Nested(lens)))
    }

    pub fn build_nested(self) -> Result<NestedLens> {
        self.lens
            .check_invariants()
            .map_err(CompilationError::InvariantViolation)?;
        Ok(self.lens)
    }
}
