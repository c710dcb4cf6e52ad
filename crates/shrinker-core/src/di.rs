use crate::config::ShrinkerConfig;
use crate::diagnostics::{ConsoleDiagnosticHandler, DiagnosticHandler};
use crate::optimizer::Optimizer;
use std::sync::Arc;

/// Holds the resolved [`ShrinkerConfig`] and the diagnostics sink for one
/// run, and hands out optimizers that share both
pub struct Container {
    config: Arc<ShrinkerConfig>,
    diagnostic_handler: Arc<dyn DiagnosticHandler>,
}

impl Container {
    /// Wire `config` to a console diagnostics handler
    pub fn new(config: ShrinkerConfig) -> Self {
        let diagnostic_handler = Arc::new(ConsoleDiagnosticHandler::new(config.pretty));

        Container {
            config: Arc::new(config),
            diagnostic_handler,
        }
    }

    /// Wire `config` to `diagnostic_handler` instead of the console
    pub fn with_dependencies(
        config: ShrinkerConfig,
        diagnostic_handler: Arc<dyn DiagnosticHandler>,
    ) -> Self {
        Container {
            config: Arc::new(config),
            diagnostic_handler,
        }
    }

    pub fn config(&self) -> &Arc<ShrinkerConfig> {
        &self.config
    }

    pub fn diagnostic_handler(&self) -> &Arc<dyn DiagnosticHandler> {
        &self.diagnostic_handler
    }

    /// An optimizer wired to this container's configuration and diagnostics
    pub fn optimizer(&self) -> Optimizer {
        Optimizer::new(Arc::clone(&self.config), Arc::clone(&self.diagnostic_handler))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostic_handler.has_errors()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostic_handler.error_count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostic_handler.warning_count()
    }
}
