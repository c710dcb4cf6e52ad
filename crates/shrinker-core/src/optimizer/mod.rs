//! The optimization pipeline.
//!
//! Structural passes run in a fixed order. Each one that changes the program
//! pushes a lens, and every body behind the new head is rewritten before the
//! next pass starts, so passes always see code at the current lens version.

mod passes;

pub use passes::{EnumUnboxingPass, HorizontalClassMergingPass, LensFlatteningPass};

use crate::config::{OptimizationLevel, ShrinkerConfig};
use crate::diagnostics::DiagnosticHandler;
use crate::enums::EnumUnboxingSummary;
use crate::errors::{CompilationError, Result};
use crate::graph::code::MethodBody;
use crate::graph::AppView;
use crate::horizontalclassmerging::HorizontalClassMergingSummary;
use crate::lens::code_rewriter::LensCodeRewriter;
use std::sync::Arc;
use tracing::{debug, info};

/// A whole-program pass
pub trait OptimizationPass {
    fn name(&self) -> &'static str;

    /// Lowest effective level the pass runs at
    fn min_level(&self) -> OptimizationLevel;

    /// Returns whether a lens with code rewritings was pushed
    fn run(&mut self, app: &mut AppView, summary: &mut OptimizationSummary) -> Result<bool>;
}

/// What the pipeline did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationSummary {
    pub passes_run: Vec<&'static str>,
    pub horizontal_merging: Option<HorizontalClassMergingSummary>,
    pub enum_unboxing: Option<EnumUnboxingSummary>,
    pub rewritten_bodies: usize,
    pub lens_flattened: bool,
}

pub struct Optimizer {
    config: Arc<ShrinkerConfig>,
    handler: Arc<dyn DiagnosticHandler>,
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Optimizer {
    pub fn new(config: Arc<ShrinkerConfig>, handler: Arc<dyn DiagnosticHandler>) -> Self {
        let mut passes: Vec<Box<dyn OptimizationPass>> = Vec::new();
        if config.horizontal_merging.enable {
            passes.push(Box::new(HorizontalClassMergingPass::new(&config.horizontal_merging)));
        }
        if config.enum_unboxing.enable {
            passes.push(Box::new(EnumUnboxingPass::new(
                &config.enum_unboxing,
                Arc::clone(&handler),
            )));
        }
        passes.push(Box::new(LensFlatteningPass));
        Self {
            config,
            handler,
            passes,
        }
    }

    /// Returns the number of registered passes
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Returns the names of all registered passes
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn optimize(&mut self, app: &mut AppView) -> Result<OptimizationSummary> {
        let level = self.config.optimization_level.effective();
        let mut summary = OptimizationSummary::default();
        if level == OptimizationLevel::O0 {
            return Ok(summary);
        }

        for pass in &mut self.passes {
            if level < pass.min_level() {
                debug!(pass = pass.name(), "Skipped below its level");
                continue;
            }
            let changed = pass.run(app, &mut summary)?;
            summary.passes_run.push(pass.name());
            if changed {
                let lens = Arc::clone(app.graph_lens());
                summary.rewritten_bodies +=
                    LensCodeRewriter::new(&lens).rewrite_program(&mut app.program, &mut app.factory);
            }
        }

        if let Err(error) = verify_bodies_at_head(app) {
            self.handler.error("pipeline", &error.to_string());
            return Err(error);
        }
        info!(
            level = ?level,
            passes = summary.passes_run.len(),
            rewritten = summary.rewritten_bodies,
            "Optimization complete"
        );
        Ok(summary)
    }
}

/// Every body must have been rewritten against the current head
fn verify_bodies_at_head(app: &AppView) -> Result<()> {
    let head = app.graph_lens().version();
    for (class, method) in app.program.methods() {
        let Some(code) = method.body.as_ref().and_then(MethodBody::as_code) else {
            continue;
        };
        if code.lens_version != head {
            return Err(CompilationError::InvariantViolation(format!(
                "{} in {} is at lens version {} but the head is {}",
                app.factory.method_to_source_string(method.reference, false),
                app.factory.java_type_name(class.ty),
                code.lens_version.as_u32(),
                head.as_u32()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnosticHandler;
    use crate::graph::factory::ItemFactory;
    use crate::graph::program::Program;

    #[test]
    fn test_passes_follow_config() {
        let mut config = ShrinkerConfig::default();
        config.enum_unboxing.enable = false;
        let optimizer = Optimizer::new(Arc::new(config), Arc::new(CollectingDiagnosticHandler::new()));
        assert_eq!(
            optimizer.pass_names(),
            vec!["horizontal-class-merging", "lens-flattening"]
        );
    }

    #[test]
    fn test_o0_runs_nothing() {
        let mut config = ShrinkerConfig::default();
        config.optimization_level = OptimizationLevel::O0;
        let mut optimizer = Optimizer::new(Arc::new(config), Arc::new(CollectingDiagnosticHandler::new()));
        let mut app = AppView::new(ItemFactory::new(), Program::new());
        let summary = optimizer.optimize(&mut app).unwrap();
        assert!(summary.passes_run.is_empty());
    }
}
