//! Enum unboxing.
//!
//! Enums that are never used as objects (no reflection, no virtual calls, no
//! library calls other than `ordinal()`) are replaced by `int` ordinals. The
//! pass runs in three steps: boxed uses are rewritten in place, the tree
//! fixer retypes every signature, and the lens code rewriter carries the new
//! types into the remaining bodies.

mod candidate_analysis;
mod enum_unboxer;
mod lens;
mod reason;
mod rewriter;

pub use enum_unboxer::{EnumUnboxer, EnumUnboxingSummary};
pub use lens::{EnumUnboxingLens, EnumUnboxingLensBuilder};
pub use reason::Reason;
pub use rewriter::{EnumUnboxingRewriter, UTILITY_CLASS_DESCRIPTOR};
