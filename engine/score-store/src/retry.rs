//! Bounded retry with exponential backoff around any score store

use crate::backend::ScoreStore;
use crate::config::RetryConfig;
use crate::error::{Result, StoreError};
use crate::record::{EntityScoreDocument, EntityScoreKey, TeamScoreDocument, TeamScoreKey};
use std::future::Future;
use tokio::time::sleep;
use tracing::warn;

/// Wraps a store so that writes are retried before surfacing a failure
///
/// Reads are passed through unchanged. A write that keeps failing surfaces
/// as [`StoreError::RetriesExhausted`].
pub struct RetryingStore<S> {
    inner: S,
    retry: RetryConfig,
}

impl<S: ScoreStore> RetryingStore<S> {
    pub fn new(inner: S, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    /// Access the wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Run `f` until it succeeds, a non-retryable error occurs, or attempts run out
pub async fn run_with_retry<F, Fut, T>(operation: &str, retry: &RetryConfig, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = retry.initial_delay();
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= retry.max_attempts => {
                return Err(StoreError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: e.to_string(),
                });
            }
            Err(e) => {
                warn!("{} attempt {} failed: {}, retrying in {:?}", operation, attempt, e, delay);
                sleep(delay).await;
                delay = retry.next_delay(delay);
                attempt += 1;
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: ScoreStore> ScoreStore for RetryingStore<S> {
    async fn initialize(&mut self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn upsert_team_score(&self, document: &TeamScoreDocument) -> Result<()> {
        let operation = format!("upsert {}", document.key);
        run_with_retry(&operation, &self.retry, || self.inner.upsert_team_score(document)).await
    }

    async fn upsert_entity_scores(&self, documents: &[EntityScoreDocument]) -> Result<()> {
        let operation = format!("upsert {} entity scores", documents.len());
        run_with_retry(&operation, &self.retry, || self.inner.upsert_entity_scores(documents)).await
    }

    async fn load_team_score(&self, key: &TeamScoreKey) -> Result<Option<TeamScoreDocument>> {
        self.inner.load_team_score(key).await
    }

    async fn load_entity_score(&self, key: &EntityScoreKey) -> Result<Option<EntityScoreDocument>> {
        self.inner.load_entity_score(key).await
    }

    async fn list_team_scores(&self, period: &str) -> Result<Vec<TeamScoreDocument>> {
        self.inner.list_team_scores(period).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
