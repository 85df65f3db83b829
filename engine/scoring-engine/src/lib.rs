//! # Scoring Engine
//!
//! Fantasy scoring for CannaLeague. Manufacturers, strains, products,
//! pharmacies and brands earn points from their period statistics; locked
//! team lineups sum those points and collect team bonuses.
//!
//! Pipeline per run:
//!
//! 1. **RunContext** loads the period's stat rows, growth history and the
//!    scarcity table (the barrier before any scoring)
//! 2. **Normalizer** validates each row and buckets it into tiers
//! 3. **Formulas** produce base components and type bonuses
//! 4. **Bonuses** add rank, streak, consistency and decline modifiers
//! 5. **ScarcityTable** rescales entity totals by position pool depth
//! 6. **TeamAggregator** sums locked lineups and applies team bonuses
//! 7. **ScoringEngine** upserts results into a `ScoreStore` and publishes events
//!
//! Points are exact one-decimal `Decimal`s, so every stored total equals the
//! sum of its breakdown.

pub mod aggregator;
pub mod bonuses;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod formulas;
pub mod models;
pub mod normalizer;
pub mod providers;
pub mod scarcity;
pub mod scheduler;


pub use aggregator::TeamAggregator;
pub use config::ScoringConfig;
pub use context::{RunContext, ScoredEntities};
pub use engine::{CancellationFlag, RunFailure, RunReport, ScoringEngine, TeamResult};
pub use error::{Result, ScoringError};
pub use events::{EventPayload, EventSink, NullSink, RunEvents, ScoreBroadcaster, ScoringEvent};
pub use models::*;
pub use normalizer::{NormalizedMetrics, Normalizer};
pub use providers::{InMemoryProvider, LineupProvider, StatsProvider};
pub use scarcity::{PositionCalibration, ScarcityTable};
pub use scheduler::ScoringScheduler;
