//! The whole-program representation: interned references, classes with their
//! members and bodies, and the view the passes operate on.

pub mod app_view;
pub mod class;
pub mod code;
pub mod factory;
pub mod program;

pub use app_view::AppView;
