//! Test utilities and fixtures for the shrinker
//!
//! This crate provides shared test helpers that can be used by both
//! unit tests (#[cfg(test)]) and integration tests (tests/ directory).

pub mod fixtures;
pub mod mocks;

pub use fixtures::ProgramBuilder;
pub use mocks::MockDiagnosticHandler;
