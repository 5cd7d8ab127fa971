use std::sync::Arc;

use anyhow::anyhow;
use pixmint_db::Database;

use crate::provider::ImageProvider;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub provider: Arc<dyn ImageProvider>,
}

impl AppStateInner {
    pub fn new(db: Database, provider: Arc<dyn ImageProvider>) -> AppState {
        Arc::new(Self { db, provider })
    }
}

/// Run a blocking DB call off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}
