//! Application state shared across routes

use std::sync::Arc;

use crate::config::{Config, MatchConfig};
use crate::game::MatchRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Rules handed to every new match
    pub match_config: Arc<MatchConfig>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let match_config = Arc::new(config.match_config.clone());

        Self {
            config: Arc::new(config),
            match_config,
            match_registry: Arc::new(MatchRegistry::new()),
        }
    }
}
