//! Liveness facts the transformations consult.
//!
//! The [`Enqueuer`] traces the program from its entry points once, and the
//! resulting [`AppInfoWithLiveness`] is rewritten through every lens the
//! pipeline publishes afterwards.

mod app_info;
mod enqueuer;

pub use app_info::{AppInfoWithLiveness, EnumValueInfoMap};
pub use enqueuer::Enqueuer;

use crate::graph::class::ProgramClass;
use crate::graph::factory::{FieldRef, MethodRef, TypeRef};
use crate::graph::program::ResolvedField;

/// What the core needs to know about reachability
pub trait LivenessOracle {
    fn is_live_type(&self, ty: TypeRef) -> bool;
    fn is_live_field(&self, field: FieldRef) -> bool;
    fn is_live_method(&self, method: MethodRef) -> bool;

    fn resolve_field(&self, field: FieldRef) -> Option<ResolvedField>;

    /// Program classes in an order that does not depend on how the program
    /// was read
    fn classes(&self) -> Vec<&ProgramClass>;

    fn enum_value_info_map(&self, ty: TypeRef) -> Option<&EnumValueInfoMap>;

    /// Kept by an entry-point rule, so neither renamed nor removed
    fn is_pinned(&self, ty: TypeRef) -> bool;
    fn is_instantiated(&self, ty: TypeRef) -> bool;
    /// Named by an `instance-of`, `check-cast` or `const-class`
    fn is_used_in_runtime_type_check(&self, ty: TypeRef) -> bool;
}
