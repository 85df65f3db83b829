//! Explicit per-run state
//!
//! A [`RunContext`] is built once before any entity is scored: it holds the
//! period's stat rows, growth history for streaks and the scarcity table.
//! After construction it is read-only, so entities can be scored in parallel
//! and runs for different periods never share state.

use anyhow::Context as _;
use futures::future::try_join_all;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bonuses;
use crate::config::ScoringConfig;
use crate::error::{Result, ScoringError};
use crate::models::{EntityRef, EntityScore, EntityType, Period, StatSnapshot};
use crate::normalizer::Normalizer;
use crate::providers::StatsProvider;
use crate::scarcity::ScarcityTable;

pub struct RunContext {
    run_id: Uuid,
    period: Period,
    normalizer: Normalizer,
    scarcity: ScarcityTable,
    snapshots: BTreeMap<EntityRef, StatSnapshot>,
    /// Prior-period growth per entity, most recent first
    growth_history: HashMap<EntityRef, Vec<Option<f64>>>,
}

impl RunContext {
    /// Load the period's pools for `positions` and derive run-wide state
    ///
    /// This is the barrier before scoring: provider failures and empty pools
    /// fail here, before any score exists.
    pub async fn build(
        run_id: Uuid,
        stats: &dyn StatsProvider,
        period: Period,
        positions: &[EntityType],
        config: &ScoringConfig,
    ) -> Result<Self> {
        let pools = load_period(stats, period, positions).await?;

        let mut snapshots = BTreeMap::new();
        for snapshot in pools.into_iter().flatten() {
            let entity = snapshot.entity();
            if snapshot.period != period || !positions.contains(&entity.entity_type) {
                warn!("Ignoring stat row for {} @ {} returned for {}", entity, snapshot.period, period);
                continue;
            }
            if snapshots.contains_key(&entity) {
                warn!("Duplicate stat row for {} @ {}; keeping the first", entity, period);
                continue;
            }
            snapshots.insert(entity, snapshot);
        }

        let mut depths: BTreeMap<EntityType, usize> = positions.iter().map(|p| (*p, 0)).collect();
        for entity in snapshots.keys() {
            *depths.entry(entity.entity_type).or_default() += 1;
        }
        let scarcity = ScarcityTable::compute(&depths, &config.scarcity)?;
        for (position, multiplier) in scarcity.positions() {
            debug!(
                "Scarcity {}: depth {} -> x{}",
                position,
                scarcity.depth(position).unwrap_or_default(),
                multiplier
            );
        }

        let growth_history =
            load_growth_history(stats, period, positions, config.normalizer.streak_lookback, &snapshots)
                .await?;

        Ok(Self {
            run_id,
            period,
            normalizer: Normalizer::new(&config.normalizer),
            scarcity,
            snapshots,
            growth_history,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn scarcity(&self) -> &ScarcityTable {
        &self.scarcity
    }

    /// Entities with a stat row this period, in key order
    pub fn entities(&self) -> impl Iterator<Item = &EntityRef> {
        self.snapshots.keys()
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.snapshots.contains_key(entity)
    }

    /// Normalize, apply formula and modifiers, then rescale by scarcity
    pub fn score_entity(&self, entity: &EntityRef) -> Result<EntityScore> {
        let snapshot = self.snapshots.get(entity).ok_or_else(|| ScoringError::EntityNotFound {
            entity: entity.clone(),
            period: self.period,
        })?;

        let normalized = self.normalizer.normalize(snapshot)?;
        let history = self.growth_history.get(entity).map(Vec::as_slice).unwrap_or_default();
        let streak = bonuses::streak_length(normalized.growth_pct, history);

        let mut score = bonuses::score_entity(&normalized, streak);
        self.scarcity.apply(&mut score)?;
        Ok(score)
    }

    /// Score every entity in the run in parallel
    pub fn score_all(&self) -> ScoredEntities {
        let entities: Vec<&EntityRef> = self.snapshots.keys().collect();
        let results: Vec<(&EntityRef, Result<EntityScore>)> =
            entities.par_iter().map(|entity| (*entity, self.score_entity(entity))).collect();

        let mut scored = ScoredEntities::default();
        for (entity, result) in results {
            match result {
                Ok(score) => scored.insert_score(score),
                Err(e) => {
                    warn!("Skipping {} @ {}: {}", entity, self.period, e);
                    scored.insert_failure(entity.clone(), e.to_string());
                }
            }
        }
        scored
    }
}

/// Entity scores of one run, with the reason for every entity that could not be scored
#[derive(Debug, Clone, Default)]
pub struct ScoredEntities {
    scores: BTreeMap<EntityRef, EntityScore>,
    failures: BTreeMap<EntityRef, String>,
}

impl ScoredEntities {
    pub fn insert_score(&mut self, score: EntityScore) {
        let entity = score.entity();
        self.failures.remove(&entity);
        self.scores.insert(entity, score);
    }

    pub fn insert_failure(&mut self, entity: EntityRef, reason: String) {
        self.scores.remove(&entity);
        self.failures.insert(entity, reason);
    }

    pub fn remove_score(&mut self, entity: &EntityRef) -> Option<EntityScore> {
        self.scores.remove(entity)
    }

    pub fn score(&self, entity: &EntityRef) -> Option<&EntityScore> {
        self.scores.get(entity)
    }

    pub fn failure(&self, entity: &EntityRef) -> Option<&str> {
        self.failures.get(entity).map(String::as_str)
    }

    /// Scores in key order (type, then id)
    pub fn scores(&self) -> impl Iterator<Item = &EntityScore> {
        self.scores.values()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntityRef, &str)> {
        self.failures.iter().map(|(e, r)| (e, r.as_str()))
    }

    pub fn scored_count(&self) -> usize {
        self.scores.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Bulk-read one period for every position concurrently
async fn load_period(
    stats: &dyn StatsProvider,
    period: Period,
    positions: &[EntityType],
) -> Result<Vec<Vec<StatSnapshot>>> {
    let fetches = positions.iter().map(|&position| async move {
        stats
            .snapshots(position, &period)
            .await
            .with_context(|| format!("Failed to load {position} stats for {period}"))
    });
    Ok(try_join_all(fetches).await?)
}

async fn load_growth_history(
    stats: &dyn StatsProvider,
    period: Period,
    positions: &[EntityType],
    lookback: u32,
    current: &BTreeMap<EntityRef, StatSnapshot>,
) -> Result<HashMap<EntityRef, Vec<Option<f64>>>> {
    let mut prior_periods = Vec::new();
    let mut cursor = period;
    for _ in 0..lookback {
        match cursor.previous() {
            Some(previous) => {
                prior_periods.push(previous);
                cursor = previous;
            }
            None => break,
        }
    }

    let loaded = try_join_all(prior_periods.iter().map(|p| load_period(stats, *p, positions))).await?;

    let mut history: HashMap<EntityRef, Vec<Option<f64>>> =
        current.keys().map(|e| (e.clone(), vec![None; prior_periods.len()])).collect();
    for (index, (prior, pools)) in prior_periods.iter().zip(loaded).enumerate() {
        for snapshot in pools.into_iter().flatten() {
            if snapshot.period != *prior {
                continue;
            }
            if let Some(slots) = history.get_mut(&snapshot.entity()) {
                // first row wins, as for the current period
                if slots[index].is_none() {
                    slots[index] = snapshot.metrics.growth_pct;
                }
            }
        }
    }
    Ok(history)
}
