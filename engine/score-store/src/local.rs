//! Local file-based score store construction

use crate::backend::{InMemoryScoreStore, LocalScoreStore, ScoreStore};
use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::postgres::PgScoreStore;
use crate::retry::RetryingStore;

/// Create a new local score store with default configuration
pub fn create_local_store(data_dir: impl Into<std::path::PathBuf>) -> Result<LocalScoreStore> {
    LocalScoreStore::with_default_config(data_dir)
}

/// Build and initialize the configured backend, wrapped in the retry policy
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn ScoreStore>> {
    config.validate().map_err(crate::StoreError::config)?;

    let store: Box<dyn ScoreStore> = match config.backend {
        StoreBackend::Memory => {
            let mut store = RetryingStore::new(InMemoryScoreStore::new(), config.retry.clone());
            store.initialize().await?;
            Box::new(store)
        }
        StoreBackend::Local => {
            let mut store =
                RetryingStore::new(LocalScoreStore::new(config.clone())?, config.retry.clone());
            store.initialize().await?;
            Box::new(store)
        }
        StoreBackend::Postgres => {
            let mut store = RetryingStore::new(
                PgScoreStore::connect(config.clone()).await?,
                config.retry.clone(),
            );
            store.initialize().await?;
            Box::new(store)
        }
    };

    tracing::info!("Opened {} score store", store.name());
    Ok(store)
}
