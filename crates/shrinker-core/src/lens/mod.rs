//! The graph lens chain.
//!
//! Every pass that renames, merges or retypes program items pushes one
//! immutable [`GraphLens`] on the chain. Forward lookups translate a reference
//! from some earlier program version to the current one; original lookups go
//! back to the identifier the item had before the pipeline started.
//!
//! The set of lens kinds is closed and dispatched with `match`.

mod applied;
pub mod code_rewriter;
mod nested;
mod prototype_changes;

pub use applied::AppliedLens;
pub use nested::{NestedLens, NestedLensBuilder};
pub use prototype_changes::{RewrittenPrototypeDescription, RewrittenTypeInfo};

use crate::enums::EnumUnboxingLens;
use crate::graph::code::InvokeType;
use crate::graph::factory::{FieldRef, MethodRef, TypeRef};
use std::sync::Arc;

/// Monotonic id of a lens in the chain. Code bodies record the version they
/// were last rewritten against so later rewrites only apply newer layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LensVersion(u32);

impl LensVersion {
    pub const IDENTITY: LensVersion = LensVersion(0);

    fn next(self) -> LensVersion {
        LensVersion(self.0 + 1)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
pub enum LensKind {
    Identity,
    /// History only, never requires code rewriting
    Applied(AppliedLens),
    Nested(NestedLens),
    EnumUnboxing(EnumUnboxingLens),
}

/// Result of a forward method lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLookupResult {
    pub reference: MethodRef,
    pub invoke_type: InvokeType,
    pub prototype_changes: RewrittenPrototypeDescription,
}

impl MethodLookupResult {
    pub fn unchanged(reference: MethodRef, invoke_type: InvokeType) -> Self {
        Self {
            reference,
            invoke_type,
            prototype_changes: RewrittenPrototypeDescription::none(),
        }
    }
}

#[derive(Debug)]
pub struct GraphLens {
    version: LensVersion,
    kind: LensKind,
    previous: Option<Arc<GraphLens>>,
}

/// Which layers a forward lookup walks through
#[derive(Debug, Clone, Copy)]
enum LookupScope {
    /// Every layer, starting from pre-pipeline references
    Original,
    /// Only layers newer than the version that rewrite code
    CodeSince(LensVersion),
}

impl GraphLens {
    pub fn identity() -> Arc<GraphLens> {
        Arc::new(GraphLens {
            version: LensVersion::IDENTITY,
            kind: LensKind::Identity,
            previous: None,
        })
    }

    /// Push a new layer on top of `previous`
    pub fn push(previous: &Arc<GraphLens>, kind: LensKind) -> Arc<GraphLens> {
        Arc::new(GraphLens {
            version: previous.version.next(),
            kind,
            previous: Some(Arc::clone(previous)),
        })
    }

    /// Replace the whole chain below `head` by a single applied lens
    pub(crate) fn replace_chain(head: &Arc<GraphLens>, applied: AppliedLens) -> Arc<GraphLens> {
        Arc::new(GraphLens {
            version: head.version.next(),
            kind: LensKind::Applied(applied),
            previous: Some(GraphLens::identity()),
        })
    }

    pub fn version(&self) -> LensVersion {
        self.version
    }

    pub fn kind(&self) -> &LensKind {
        &self.kind
    }

    pub fn previous(&self) -> Option<&Arc<GraphLens>> {
        self.previous.as_ref()
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, LensKind::Identity)
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.kind, LensKind::Applied(_))
    }

    /// Number of lenses in the chain, identity included
    pub fn chain_len(&self) -> usize {
        1 + self.previous.as_ref().map_or(0, |p| p.chain_len())
    }

    pub fn has_code_rewritings(&self) -> bool {
        match &self.kind {
            LensKind::Identity | LensKind::Applied(_) => false,
            LensKind::Nested(_) | LensKind::EnumUnboxing(_) => true,
        }
    }

    /// Whether method lookups ignore the calling context. Merging routes every
    /// call through a dispatch method with the shared signature, so every
    /// kind answers from the reference alone.
    pub fn is_context_free_for_methods(&self) -> bool {
        let here = match &self.kind {
            LensKind::Identity
            | LensKind::Applied(_)
            | LensKind::Nested(_)
            | LensKind::EnumUnboxing(_) => true,
        };
        here && self
            .previous
            .as_ref()
            .map_or(true, |p| p.is_context_free_for_methods())
    }

    /// Types that this chain maps to a primitive representation
    pub fn is_unboxed_enum(&self, ty: TypeRef) -> bool {
        let here = match &self.kind {
            LensKind::EnumUnboxing(lens) => lens.is_unboxed(ty),
            _ => false,
        };
        here || self.previous.as_ref().is_some_and(|p| p.is_unboxed_enum(ty))
    }

    fn in_scope(&self, scope: LookupScope) -> bool {
        match scope {
            LookupScope::Original => true,
            LookupScope::CodeSince(version) => self.version > version,
        }
    }

    fn rewrites_in_scope(&self, scope: LookupScope) -> bool {
        match scope {
            LookupScope::Original => true,
            LookupScope::CodeSince(_) => self.has_code_rewritings(),
        }
    }

    // ---------------------------------------------------------------------
    // Forward lookups
    // ---------------------------------------------------------------------

    /// Translate a pre-pipeline type to the current program
    pub fn lookup_type(&self, ty: TypeRef) -> TypeRef {
        self.lookup_type_in(ty, LookupScope::Original)
    }

    /// Translate a type seen in code last rewritten against `since`
    pub fn lookup_type_since(&self, ty: TypeRef, since: LensVersion) -> TypeRef {
        self.lookup_type_in(ty, LookupScope::CodeSince(since))
    }

    fn lookup_type_in(&self, ty: TypeRef, scope: LookupScope) -> TypeRef {
        if !self.in_scope(scope) {
            return ty;
        }
        let previous = match &self.previous {
            Some(previous) => previous.lookup_type_in(ty, scope),
            None => ty,
        };
        if !self.rewrites_in_scope(scope) {
            return previous;
        }
        match &self.kind {
            LensKind::Identity => previous,
            LensKind::Applied(lens) => lens.lookup_type(previous),
            LensKind::Nested(lens) => lens.lookup_type(previous),
            LensKind::EnumUnboxing(lens) => lens.nested().lookup_type(previous),
        }
    }

    pub fn lookup_field(&self, field: FieldRef) -> FieldRef {
        self.lookup_field_in(field, LookupScope::Original)
    }

    pub fn lookup_field_since(&self, field: FieldRef, since: LensVersion) -> FieldRef {
        self.lookup_field_in(field, LookupScope::CodeSince(since))
    }

    fn lookup_field_in(&self, field: FieldRef, scope: LookupScope) -> FieldRef {
        if !self.in_scope(scope) {
            return field;
        }
        let previous = match &self.previous {
            Some(previous) => previous.lookup_field_in(field, scope),
            None => field,
        };
        if !self.rewrites_in_scope(scope) {
            return previous;
        }
        match &self.kind {
            LensKind::Identity => previous,
            LensKind::Applied(lens) => lens.lookup_field(previous),
            LensKind::Nested(lens) => lens.lookup_field(previous),
            LensKind::EnumUnboxing(lens) => lens.nested().lookup_field(previous),
        }
    }

    /// Translate a pre-pipeline method reference used by an invoke in
    /// `context`
    pub fn lookup_method(
        &self,
        method: MethodRef,
        context: Option<MethodRef>,
        invoke_type: InvokeType,
    ) -> MethodLookupResult {
        debug_assert!(context.is_some() || self.is_context_free_for_methods());
        self.lookup_method_in(
            MethodLookupResult::unchanged(method, invoke_type),
            LookupScope::Original,
        )
    }

    pub fn lookup_method_since(
        &self,
        method: MethodRef,
        context: Option<MethodRef>,
        invoke_type: InvokeType,
        since: LensVersion,
    ) -> MethodLookupResult {
        debug_assert!(context.is_some() || self.is_context_free_for_methods());
        self.lookup_method_in(
            MethodLookupResult::unchanged(method, invoke_type),
            LookupScope::CodeSince(since),
        )
    }

    fn lookup_method_in(&self, lookup: MethodLookupResult, scope: LookupScope) -> MethodLookupResult {
        if !self.in_scope(scope) {
            return lookup;
        }
        let previous = match &self.previous {
            Some(previous) => previous.lookup_method_in(lookup, scope),
            None => lookup,
        };
        if !self.rewrites_in_scope(scope) {
            return previous;
        }
        match &self.kind {
            LensKind::Identity => previous,
            LensKind::Applied(lens) => MethodLookupResult {
                reference: lens.lookup_method(previous.reference),
                ..previous
            },
            LensKind::Nested(lens) => lens.lookup_method(previous),
            LensKind::EnumUnboxing(lens) => lens.lookup_method(previous),
        }
    }

    /// Prototype changes a method definition went through in the layers newer
    /// than `since`, so that its own arguments can be retyped.
    pub fn prototype_changes_for_definition(
        &self,
        method: MethodRef,
        since: LensVersion,
    ) -> RewrittenPrototypeDescription {
        if self.version <= since {
            return RewrittenPrototypeDescription::none();
        }
        let (previous_signature, here) = if self.has_code_rewritings() {
            let previous_signature = self.previous_method_signature(method);
            let here = match &self.kind {
                LensKind::Nested(lens) => lens.prototype_changes(previous_signature),
                LensKind::EnumUnboxing(lens) => lens.nested().prototype_changes(previous_signature),
                LensKind::Identity | LensKind::Applied(_) => None,
            };
            (previous_signature, here)
        } else {
            (method, None)
        };
        let earlier = match &self.previous {
            Some(previous) => previous.prototype_changes_for_definition(previous_signature, since),
            None => RewrittenPrototypeDescription::none(),
        };
        match here {
            Some(here) => earlier.combine(here),
            None => earlier,
        }
    }

    // ---------------------------------------------------------------------
    // Original lookups
    // ---------------------------------------------------------------------

    fn previous_type(&self, ty: TypeRef) -> TypeRef {
        match &self.kind {
            LensKind::Identity => ty,
            LensKind::Applied(lens) => lens.original_type(ty),
            LensKind::Nested(lens) => lens.previous_type(ty),
            // Unboxed enums share `int`; the mapping is not inverted
            LensKind::EnumUnboxing(_) => ty,
        }
    }

    fn previous_field_signature(&self, field: FieldRef) -> FieldRef {
        match &self.kind {
            LensKind::Identity => field,
            LensKind::Applied(lens) => lens.original_field_signature(field),
            LensKind::Nested(lens) => lens.previous_field_signature(field),
            LensKind::EnumUnboxing(lens) => lens.nested().previous_field_signature(field),
        }
    }

    fn previous_method_signature(&self, method: MethodRef) -> MethodRef {
        match &self.kind {
            LensKind::Identity => method,
            LensKind::Applied(lens) => lens.original_method_signature(method),
            LensKind::Nested(lens) => lens.previous_method_signature(method),
            LensKind::EnumUnboxing(lens) => lens.nested().previous_method_signature(method),
        }
    }

    pub fn get_original_type(&self, ty: TypeRef) -> TypeRef {
        let previous = self.previous_type(ty);
        match &self.previous {
            Some(lens) => lens.get_original_type(previous),
            None => previous,
        }
    }

    /// Every pre-pipeline type merged into `ty`, representative first
    pub fn get_original_types(&self, ty: TypeRef) -> Vec<TypeRef> {
        let previous = match &self.kind {
            LensKind::Applied(lens) => lens.original_types(ty),
            LensKind::Nested(lens) => lens.previous_types(ty),
            LensKind::Identity | LensKind::EnumUnboxing(_) => vec![ty],
        };
        match &self.previous {
            Some(lens) => {
                let mut originals = Vec::new();
                for ty in previous {
                    for original in lens.get_original_types(ty) {
                        if !originals.contains(&original) {
                            originals.push(original);
                        }
                    }
                }
                originals
            }
            None => previous,
        }
    }

    pub fn get_original_field_signature(&self, field: FieldRef) -> FieldRef {
        let previous = self.previous_field_signature(field);
        match &self.previous {
            Some(lens) => lens.get_original_field_signature(previous),
            None => previous,
        }
    }

    pub fn get_original_method_signature(&self, method: MethodRef) -> MethodRef {
        let previous = self.previous_method_signature(method);
        match &self.previous {
            Some(lens) => lens.get_original_method_signature(previous),
            None => previous,
        }
    }

    /// Every pre-pipeline method whose definition collapsed into `method`,
    /// representative first
    pub fn get_original_method_signatures(&self, method: MethodRef) -> Vec<MethodRef> {
        let previous = match &self.kind {
            LensKind::Applied(lens) => lens.original_method_signatures(method),
            LensKind::Nested(lens) => lens.previous_method_signatures(method),
            LensKind::EnumUnboxing(lens) => lens.nested().previous_method_signatures(method),
            LensKind::Identity => vec![method],
        };
        match &self.previous {
            Some(lens) => {
                let mut originals = Vec::new();
                for method in previous {
                    for original in lens.get_original_method_signatures(method) {
                        if !originals.contains(&original) {
                            originals.push(original);
                        }
                    }
                }
                originals
            }
            None => previous,
        }
    }

    // ---------------------------------------------------------------------
    // Renamed lookups
    // ---------------------------------------------------------------------

    /// Where the definition of `original` lives after the layers newer than
    /// `up_to`. Passing this lens' own version returns `original` unchanged.
    pub fn get_renamed_field_signature(&self, original: FieldRef, up_to: LensVersion) -> FieldRef {
        if self.version <= up_to {
            return original;
        }
        let renamed = match &self.previous {
            Some(previous) => previous.get_renamed_field_signature(original, up_to),
            None => original,
        };
        match &self.kind {
            LensKind::Identity => renamed,
            LensKind::Applied(lens) => lens.lookup_field(renamed),
            LensKind::Nested(lens) => lens.lookup_field(renamed),
            LensKind::EnumUnboxing(lens) => lens.nested().lookup_field(renamed),
        }
    }

    pub fn get_renamed_method_signature(&self, original: MethodRef, up_to: LensVersion) -> MethodRef {
        if self.version <= up_to {
            return original;
        }
        let renamed = match &self.previous {
            Some(previous) => previous.get_renamed_method_signature(original, up_to),
            None => original,
        };
        match &self.kind {
            LensKind::Identity => renamed,
            LensKind::Applied(lens) => lens.lookup_method(renamed),
            LensKind::Nested(lens) => lens.renamed_method_signature(renamed),
            LensKind::EnumUnboxing(lens) => lens.nested().renamed_method_signature(renamed),
        }
    }
}
