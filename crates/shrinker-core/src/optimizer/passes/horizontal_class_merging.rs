use crate::config::{HorizontalMergingOptions, OptimizationLevel};
use crate::errors::Result;
use crate::graph::AppView;
use crate::horizontalclassmerging::HorizontalClassMerger;
use crate::optimizer::{OptimizationPass, OptimizationSummary};

pub struct HorizontalClassMergingPass {
    merger: HorizontalClassMerger,
}

impl HorizontalClassMergingPass {
    pub fn new(options: &HorizontalMergingOptions) -> Self {
        Self {
            merger: HorizontalClassMerger::new(options),
        }
    }
}

impl OptimizationPass for HorizontalClassMergingPass {
    fn name(&self) -> &'static str {
        "horizontal-class-merging"
    }

    fn min_level(&self) -> OptimizationLevel {
        OptimizationLevel::O1
    }

    fn run(&mut self, app: &mut AppView, summary: &mut OptimizationSummary) -> Result<bool> {
        let result = self.merger.run(app)?;
        let changed = result.is_some();
        summary.horizontal_merging = result;
        Ok(changed)
    }
}
