use std::sync::Arc;

use crate::application::AskService;
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub ask: Arc<AskService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(ask: Arc<AskService>, config: AppConfig) -> Self {
        Self {
            ask,
            config: Arc::new(config),
        }
    }
}
