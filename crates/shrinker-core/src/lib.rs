pub mod collections;
pub mod config;
pub mod di;
pub mod diagnostics;
pub mod enums;
pub mod errors;
pub mod graph;
pub mod horizontalclassmerging;
pub mod lens;
pub mod model;
pub mod naming;
pub mod optimizer;
pub mod shaking;
pub mod string_interner;
pub mod tree_fixer;

pub use config::{CliOverrides, OptimizationLevel, ShrinkerConfig};
pub use di::Container;
pub use diagnostics::{
    CollectingDiagnosticHandler, ConsoleDiagnosticHandler, Diagnostic, DiagnosticHandler,
    DiagnosticLevel,
};
pub use enums::{EnumUnboxer, EnumUnboxingSummary, Reason};
pub use errors::CompilationError;
pub use graph::factory::ItemFactory;
pub use graph::program::Program;
pub use graph::AppView;
pub use horizontalclassmerging::{HorizontalClassMerger, HorizontalClassMergingSummary};
pub use lens::{GraphLens, LensVersion};
pub use model::{ModelError, ProgramModel};
pub use naming::MappingWriter;
pub use optimizer::{OptimizationSummary, Optimizer};
pub use tree_fixer::TreeFixer;
