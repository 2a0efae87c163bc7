use std::sync::Arc;

use patchwatch_core::{
    Config, Controller, ControllerRunner, RunnerStatus, SanitizedConfig, TaskDispatcher,
};

/// Shared application state
pub struct AppState {
    config: Config,
    controller: Arc<Controller>,
    dispatcher: Arc<dyn TaskDispatcher>,
    runner: Option<Arc<ControllerRunner>>,
}

impl AppState {
    pub fn new(
        config: Config,
        controller: Arc<Controller>,
        dispatcher: Arc<dyn TaskDispatcher>,
        runner: Option<Arc<ControllerRunner>>,
    ) -> Self {
        Self {
            config,
            controller,
            dispatcher,
            runner,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn controller(&self) -> &Controller {
        self.controller.as_ref()
    }

    pub fn dispatcher(&self) -> &dyn TaskDispatcher {
        self.dispatcher.as_ref()
    }

    pub fn runner_status(&self) -> RunnerStatus {
        self.runner
            .as_ref()
            .map(|runner| runner.status())
            .unwrap_or_default()
    }
}
