use crate::config::AppConfig;
use crate::shared::utils::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
}

impl AppState {
    pub fn new(config: AppConfig, conn: DbPool) -> Self {
        Self { config, conn }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("conn", &"DbPool")
            .finish()
    }
}
