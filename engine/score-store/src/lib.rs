//! # Score Store
//!
//! Persistence sink for computed fantasy scores. Team totals are keyed by
//! (team, period) and entity breakdowns by (entity, type, period); every
//! write is an upsert, so recomputing a period replaces its records instead
//! of duplicating them.
//!
//! ## Architecture
//!
//! - **ScoreStore**: async trait implemented by every backend
//! - **InMemoryScoreStore**: process-local map for tests and dry runs
//! - **LocalScoreStore**: one JSON document per key, written atomically
//! - **PgScoreStore**: PostgreSQL tables with `ON CONFLICT DO UPDATE`
//! - **RetryingStore**: bounded exponential backoff at the adapter boundary
//!
//! ## Usage
//!
//! ```rust
//! use score_store::{create_local_store, ScoreStore, TeamScoreDocument, TeamScoreKey};
//! use rust_decimal::Decimal;
//! use tempfile::TempDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let mut store = create_local_store(temp_dir.path())?;
//!     store.initialize().await?;
//!
//!     let document = TeamScoreDocument {
//!         key: TeamScoreKey::new("team-1", "2025-W07"),
//!         total_points: Decimal::new(1875, 1),
//!         payload: serde_json::json!({ "slots": [] }),
//!     };
//!     store.upsert_team_score(&document).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod local;
pub mod postgres;
pub mod record;
pub mod retry;

pub use backend::{InMemoryScoreStore, LocalScoreStore, ScoreStore};
pub use config::{RetryConfig, StoreBackend, StoreConfig};
pub use error::{Result, StoreError};
pub use local::{create_local_store, open_store};
pub use postgres::PgScoreStore;
pub use record::{EntityScoreDocument, EntityScoreKey, ScoreDocument, TeamScoreDocument, TeamScoreKey};
pub use retry::{run_with_retry, RetryingStore};
