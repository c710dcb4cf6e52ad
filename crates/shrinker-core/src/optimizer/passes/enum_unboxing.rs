use crate::config::{EnumUnboxingOptions, OptimizationLevel};
use crate::diagnostics::DiagnosticHandler;
use crate::enums::EnumUnboxer;
use crate::errors::Result;
use crate::graph::AppView;
use crate::optimizer::{OptimizationPass, OptimizationSummary};
use std::sync::Arc;

pub struct EnumUnboxingPass {
    options: EnumUnboxingOptions,
    handler: Arc<dyn DiagnosticHandler>,
}

impl EnumUnboxingPass {
    pub fn new(options: &EnumUnboxingOptions, handler: Arc<dyn DiagnosticHandler>) -> Self {
        Self {
            options: options.clone(),
            handler,
        }
    }
}

impl OptimizationPass for EnumUnboxingPass {
    fn name(&self) -> &'static str {
        "enum-unboxing"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O2
    }

    fn run(&mut self, app: &mut AppView, summary: &mut OptimizationSummary) -> Result<bool> {
        let unboxer = EnumUnboxer::new(&self.options, Arc::clone(&self.handler));
        unboxer.analyze_enums(app);
        let result = unboxer.unbox_enums(app)?;
        let changed = result.is_some();
        summary.enum_unboxing = result;
        Ok(changed)
    }
}
