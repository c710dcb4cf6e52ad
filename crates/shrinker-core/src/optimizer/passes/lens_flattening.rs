use crate::config::OptimizationLevel;
use crate::errors::Result;
use crate::graph::code::MethodBody;
use crate::graph::AppView;
use crate::lens::AppliedLens;
use crate::optimizer::{OptimizationPass, OptimizationSummary};
use std::sync::Arc;
use tracing::debug;

/// Collapse the lens chain into one applied lens once every body is
/// rewritten. Only original-signature queries survive this.
pub struct LensFlatteningPass;

impl OptimizationPass for LensFlatteningPass {
    fn name(&self) -> &'static str {
        "lens-flattening"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O3
    }

    fn run(&mut self, app: &mut AppView, summary: &mut OptimizationSummary) -> Result<bool> {
        let head = Arc::clone(app.graph_lens());
        if head.chain_len() <= 1 {
            return Ok(false);
        }
        let applied = AppliedLens::new(&app.program, &app.factory, &head);
        let lens = applied.install(&app.program, &head)?;
        let version = lens.version();
        for class in app.program.classes_mut() {
            for method in class.methods_mut() {
                if let Some(MethodBody::Code(code)) = &mut method.body {
                    code.lens_version = version;
                }
            }
        }
        debug!(replaced = head.chain_len(), "Flattened lens chain");
        app.replace_graph_lens(lens);
        summary.lens_flattened = true;
        // No body needs rewriting against an applied lens
        Ok(false)
    }
}
