use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_locator::HealConfig;

pub struct CliContext {
    config: Arc<HealConfig>,
    config_path: PathBuf,
}

impl CliContext {
    pub fn new(config: HealConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    /// Effective configuration, environment overrides included
    pub fn config(&self) -> &HealConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
