use std::path::PathBuf;
use std::sync::Arc;

use crate::services::orchestrator::Orchestrator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub chrome_bin: String,
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, chrome_bin: &str, output_dir: PathBuf) -> Self {
        Self {
            orchestrator,
            chrome_bin: chrome_bin.to_string(),
            output_dir,
        }
    }
}
