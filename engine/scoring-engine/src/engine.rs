use dashmap::DashMap;
use rust_decimal::Decimal;
use score_store::{EntityScoreDocument, EntityScoreKey, ScoreStore, TeamScoreDocument, TeamScoreKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregator::TeamAggregator;
use crate::config::ScoringConfig;
use crate::context::{RunContext, ScoredEntities};
use crate::error::{Result, ScoringError};
use crate::events::{EventSink, NullSink, RunEvents};
use crate::models::{EntityRef, EntityScore, EntityType, Lineup, Period, TeamScore};
use crate::providers::{LineupProvider, StatsProvider};

/// Shared cancellation signal for a run; checked between entities and teams
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub subject: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResult {
    pub team_id: String,
    pub total_points: Decimal,
}

/// Outcome of a league run; partial results are reported, not thrown away
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub league_id: String,
    pub period: Period,
    pub entities_scored: usize,
    pub entity_failures: Vec<RunFailure>,
    pub succeeded: Vec<TeamResult>,
    pub failed: Vec<RunFailure>,
    /// Computed but not persisted; safe to retry just these
    pub unsaved: Vec<String>,
    pub complete: bool,
}

impl RunReport {
    fn new(run_id: Uuid, league_id: &str, period: Period) -> Self {
        Self {
            run_id,
            league_id: league_id.to_string(),
            period,
            entities_scored: 0,
            entity_failures: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            unsaved: Vec::new(),
            complete: false,
        }
    }

    fn fail(&mut self, subject: impl Into<String>, reason: impl Into<String>) {
        self.failed.push(RunFailure { subject: subject.into(), reason: reason.into() });
    }

    /// e.g. "9/10 teams scored, 1 failed"
    pub fn summary(&self) -> String {
        let total = self.succeeded.len() + self.failed.len() + self.unsaved_teams();
        let mut summary = format!(
            "{}/{} teams scored, {} failed",
            self.succeeded.len(),
            total,
            self.failed.len()
        );
        if !self.unsaved.is_empty() {
            summary.push_str(&format!(", {} unsaved", self.unsaved.len()));
        }
        if !self.complete {
            summary.push_str(" (incomplete)");
        }
        summary
    }

    fn unsaved_teams(&self) -> usize {
        self.unsaved.iter().filter(|s| s.starts_with("team:")).count()
    }
}

/// Command surface of the scoring core
pub struct ScoringEngine {
    config: ScoringConfig,
    stats: Arc<dyn StatsProvider>,
    lineups: Arc<dyn LineupProvider>,
    store: Arc<dyn ScoreStore>,
    sink: Arc<dyn EventSink>,
    aggregator: TeamAggregator,
    team_locks: TeamLocks,
}

impl ScoringEngine {
    pub fn new(
        config: ScoringConfig,
        stats: Arc<dyn StatsProvider>,
        lineups: Arc<dyn LineupProvider>,
        store: Arc<dyn ScoreStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        info!("🔧 Creating scoring engine with {} store", store.name());
        let aggregator = TeamAggregator::new(&config.team);
        Self { config, stats, lineups, store, sink, aggregator, team_locks: DashMap::new() }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ScoreStore> {
        &self.store
    }

    /// Score one entity against its full position pool and persist the breakdown
    pub async fn calculate_entity_score(
        &self,
        entity_id: &str,
        entity_type: EntityType,
        period: Period,
    ) -> Result<EntityScore> {
        let run_id = Uuid::new_v4();
        let entity = EntityRef::new(entity_type, entity_id);
        info!("Scoring {} @ {} (run {})", entity, period, run_id);

        let ctx = RunContext::build(run_id, self.stats.as_ref(), period, &[entity_type], &self.config).await?;
        if !ctx.contains(&entity) {
            return Err(ScoringError::EntityNotFound { entity, period });
        }

        let score = ctx.score_entity(&entity)?;
        self.save_entities(&[&score]).await?;
        self.events(run_id).entity_scored(&score).await;

        info!("✅ {} @ {}: {} pts", entity, period, score.total_points);
        Ok(score)
    }

    /// Score one team's locked lineup and upsert its canonical total
    ///
    /// An unlocked lineup fails before anything is computed or written.
    pub async fn calculate_team_score(&self, team_id: &str, period: Period) -> Result<TeamScore> {
        let run_id = Uuid::new_v4();
        let lineup = self.locked_lineup(team_id, period).await?;

        let _guard = self.lock_team(team_id, period).await;
        info!("Scoring team {} @ {} (run {})", team_id, period, run_id);

        let positions: Vec<EntityType> =
            lineup.entities().map(|e| e.entity_type).collect::<BTreeSet<_>>().into_iter().collect();
        let ctx = RunContext::build(run_id, self.stats.as_ref(), period, &positions, &self.config).await?;

        let mut scored = ScoredEntities::default();
        for entity in lineup.entities() {
            if !ctx.contains(entity) {
                continue;
            }
            match ctx.score_entity(entity) {
                Ok(score) => scored.insert_score(score),
                Err(e) => {
                    warn!("Slot entity {} unscored: {}", entity, e);
                    scored.insert_failure(entity.clone(), e.to_string());
                }
            }
        }

        let team = self.aggregator.aggregate(&lineup, &scored)?;
        let slot_scores: Vec<&EntityScore> = scored.scores().collect();
        self.save_entities(&slot_scores).await?;
        self.save_team(&team).await?;

        let events = self.events(run_id);
        for score in &slot_scores {
            events.entity_scored(score).await;
        }
        events.team_scored(&team).await;

        info!("✅ Team {} @ {}: {} pts", team_id, period, team.total_points);
        Ok(team)
    }

    /// Score every entity once, then every team of the league
    ///
    /// Entity and team failures are collected into the report. Provider and
    /// scarcity failures abort before any work; persistence exhaustion aborts
    /// the remaining writes. `run_complete` is only emitted for a complete run.
    pub async fn calculate_league_week(
        &self,
        league_id: &str,
        period: Period,
        cancel: &CancellationFlag,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        info!("🚀 Starting league run {} for {} @ {}", run_id, league_id, period);

        let teams: Vec<String> = self
            .lineups
            .league_teams(league_id)
            .await?
            .ok_or_else(|| ScoringError::LeagueNotFound { league_id: league_id.to_string() })?
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let ctx = Arc::new(
            RunContext::build(run_id, self.stats.as_ref(), period, &EntityType::ALL, &self.config).await?,
        );
        let scoring_ctx = ctx.clone();
        let scored = tokio::task::spawn_blocking(move || scoring_ctx.score_all()).await?;

        let mut report = RunReport::new(run_id, league_id, period);
        report.entities_scored = scored.scored_count();
        report.entity_failures = scored
            .failures()
            .map(|(entity, reason)| RunFailure { subject: entity.to_string(), reason: reason.to_string() })
            .collect();
        info!(
            "📊 Run {}: {} entities scored, {} skipped",
            run_id,
            report.entities_scored,
            report.entity_failures.len()
        );

        let events = self.events(run_id);
        let mut aborted = false;
        let mut cancelled = cancel.is_cancelled();

        for position in EntityType::ALL {
            let batch: Vec<&EntityScore> = scored.scores().filter(|s| s.entity_type == position).collect();
            if batch.is_empty() {
                continue;
            }
            cancelled = cancelled || cancel.is_cancelled();
            if aborted || cancelled {
                report.unsaved.extend(batch.iter().map(|s| format!("entity:{}", s.entity())));
                continue;
            }
            if let Err(e) = self.save_entities(&batch).await {
                error!("❌ Run {}: {}", run_id, e);
                report.unsaved.extend(batch.iter().map(|s| format!("entity:{}", s.entity())));
                aborted = true;
                continue;
            }
            for score in batch {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                events.entity_scored(score).await;
            }
        }

        let lineups = futures::future::join_all(teams.iter().map(|team_id| self.lineups.lineup(team_id, &period))).await;

        for (team_id, lineup) in teams.iter().zip(lineups) {
            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                report.fail(format!("team:{team_id}"), "run cancelled");
                continue;
            }
            if aborted {
                report.fail(format!("team:{team_id}"), "aborted after persistence failure");
                continue;
            }

            let lineup = match lineup {
                Ok(Some(lineup)) => lineup,
                Ok(None) => {
                    report.fail(format!("team:{team_id}"), format!("no lineup for {period}"));
                    continue;
                }
                Err(e) => {
                    report.fail(format!("team:{team_id}"), format!("lineup provider: {e:#}"));
                    continue;
                }
            };

            let _guard = self.lock_team(team_id, period).await;

            let team = match self.aggregator.aggregate(&lineup, &scored) {
                Ok(team) => team,
                Err(e) => {
                    warn!("Team {} @ {} not scored: {}", team_id, period, e);
                    report.fail(format!("team:{team_id}"), e.to_string());
                    continue;
                }
            };

            match self.save_team(&team).await {
                Ok(()) => {
                    events.team_scored(&team).await;
                    report.succeeded.push(TeamResult {
                        team_id: team_id.clone(),
                        total_points: team.total_points,
                    });
                }
                Err(e) => {
                    error!("❌ Run {}: {}", run_id, e);
                    report.unsaved.push(format!("team:{team_id}"));
                    aborted = true;
                }
            }
        }

        report.complete = !aborted && !cancelled;
        if report.complete {
            events.run_complete(&report).await;
            info!("✅ League run {} complete: {}", run_id, report.summary());
        } else {
            warn!("⚠️ League run {} incomplete: {}", run_id, report.summary());
        }
        Ok(report)
    }

    async fn locked_lineup(&self, team_id: &str, period: Period) -> Result<Lineup> {
        let lineup = self
            .lineups
            .lineup(team_id, &period)
            .await?
            .ok_or_else(|| ScoringError::LineupNotFound { team_id: team_id.to_string(), period })?;

        if !lineup.is_locked {
            return Err(ScoringError::LineupNotLocked { team_id: team_id.to_string(), period });
        }
        Ok(lineup)
    }

    /// Single-writer lock for one (team, period)
    async fn lock_team(&self, team_id: &str, period: Period) -> TeamLockGuard<'_> {
        let key = (team_id.to_string(), period);
        let lock = self
            .team_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        TeamLockGuard { locks: &self.team_locks, key, guard: Some(guard) }
    }

    #[cfg(test)]
    pub(crate) fn team_lock_count(&self) -> usize {
        self.team_locks.len()
    }

    fn events(&self, run_id: Uuid) -> RunEvents {
        let sink: Arc<dyn EventSink> =
            if self.config.events.enabled { self.sink.clone() } else { Arc::new(NullSink) };
        RunEvents::new(run_id, sink)
    }

    async fn save_entities(&self, scores: &[&EntityScore]) -> Result<()> {
        if scores.is_empty() {
            return Ok(());
        }
        let documents = scores
            .iter()
            .map(|score| entity_document(score))
            .collect::<Result<Vec<_>>>()?;

        self.store.upsert_entity_scores(&documents).await.map_err(|source| {
            ScoringError::PersistenceWrite {
                subject: format!("{} entity scores for {}", documents.len(), scores[0].period),
                source,
            }
        })
    }

    async fn save_team(&self, team: &TeamScore) -> Result<()> {
        let document = team_document(team)?;
        self.store.upsert_team_score(&document).await.map_err(|source| {
            ScoringError::PersistenceWrite { subject: format!("team score {}", document.key), source }
        })
    }
}

type TeamLocks = DashMap<(String, Period), Arc<Mutex<()>>>;

/// Held while a team is written; drops its map entry once no one else waits on it
struct TeamLockGuard<'a> {
    locks: &'a TeamLocks,
    key: (String, Period),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TeamLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Stored form of a team score; holds no run-specific data so reruns are byte-identical
pub fn team_document(team: &TeamScore) -> Result<TeamScoreDocument> {
    Ok(TeamScoreDocument {
        key: TeamScoreKey::new(team.team_id.clone(), team.period.to_string()),
        total_points: team.total_points,
        payload: serde_json::to_value(team)?,
    })
}

pub fn entity_document(score: &EntityScore) -> Result<EntityScoreDocument> {
    Ok(EntityScoreDocument {
        key: EntityScoreKey::new(
            score.entity_id.clone(),
            score.entity_type.as_str(),
            score.period.to_string(),
        ),
        total_points: score.total_points,
        payload: serde_json::to_value(score)?,
    })
}
