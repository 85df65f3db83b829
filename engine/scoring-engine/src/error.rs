//! Error types for the scoring engine

use crate::models::{EntityRef, EntityType, Period};
use thiserror::Error;

/// Result type for scoring operations
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors that can occur while scoring entities and teams
#[derive(Error, Debug)]
pub enum ScoringError {
    /// Input metrics for one entity are missing or malformed; the entity is skipped
    #[error("Invalid snapshot for {entity} @ {period}: {reason}")]
    InvalidSnapshot { entity: EntityRef, period: Period, reason: String },

    /// Aggregation attempted against a lineup that can still change
    #[error("Lineup for team {team_id} @ {period} is not locked")]
    LineupNotLocked { team_id: String, period: Period },

    /// Pool depth could not be computed; fatal for the whole run
    #[error("Scarcity computation failed for {position}: {reason}")]
    ScarcityComputation { position: EntityType, reason: String },

    /// A score was computed but could not be persisted
    #[error("Failed to persist {subject}: {source}")]
    PersistenceWrite {
        subject: String,
        #[source]
        source: score_store::StoreError,
    },

    #[error("No statistics for {entity} @ {period}")]
    EntityNotFound { entity: EntityRef, period: Period },

    #[error("Unknown league '{league_id}'")]
    LeagueNotFound { league_id: String },

    #[error("No lineup for team {team_id} @ {period}")]
    LineupNotFound { team_id: String, period: Period },

    #[error("Invalid lineup for team {team_id}: {reason}")]
    InvalidLineup { team_id: String, reason: String },

    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scoring task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ScoringError {
    pub fn invalid_snapshot(entity: EntityRef, period: Period, reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot { entity, period, reason: reason.into() }
    }

    /// Errors that invalidate the whole run rather than one entity or team
    ///
    /// These come from data or infrastructure that can recover, so the
    /// scheduler retries them; anything else fails the same way every time.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            ScoringError::ScarcityComputation { .. }
                | ScoringError::PersistenceWrite { .. }
                | ScoringError::Provider(_)
                | ScoringError::Task(_)
        )
    }
}
