use convertino_core::{BackendStatus, Config, Orchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Orchestrator,
    /// Backend probe results taken at startup.
    backends: Vec<BackendStatus>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Orchestrator, backends: Vec<BackendStatus>) -> Self {
        Self {
            config,
            orchestrator,
            backends,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn backend(&self, identifier: &str) -> Option<&BackendStatus> {
        self.backends.iter().find(|b| b.identifier == identifier)
    }
}
