//! Collaborator contracts for stats and lineups

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{EntityType, Lineup, Period, StatSnapshot};

/// Source of per-entity statistics rows
///
/// Implementations must return at most one row per (entity, period).
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn snapshots(&self, entity_type: EntityType, period: &Period) -> anyhow::Result<Vec<StatSnapshot>>;
}

/// Source of league membership and lineup assignments
#[async_trait]
pub trait LineupProvider: Send + Sync {
    /// Team ids participating in a league, `None` if the league is unknown
    async fn league_teams(&self, league_id: &str) -> anyhow::Result<Option<Vec<String>>>;

    /// Lineup of one team for one period, if the team submitted one
    async fn lineup(&self, team_id: &str, period: &Period) -> anyhow::Result<Option<Lineup>>;
}

/// Provider backed by process memory, optionally loaded from a fixture directory
#[derive(Default)]
pub struct InMemoryProvider {
    stats: RwLock<HashMap<Period, Vec<StatSnapshot>>>,
    lineups: RwLock<HashMap<(String, Period), Lineup>>,
    leagues: RwLock<BTreeMap<String, Vec<String>>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_snapshots(&self, snapshots: impl IntoIterator<Item = StatSnapshot>) {
        let mut stats = self.stats.write().await;
        for snapshot in snapshots {
            stats.entry(snapshot.period).or_default().push(snapshot);
        }
    }

    /// Insert or replace a lineup
    pub async fn set_lineup(&self, lineup: Lineup) {
        self.lineups
            .write()
            .await
            .insert((lineup.team_id.clone(), lineup.period), lineup);
    }

    pub async fn set_league(&self, league_id: impl Into<String>, teams: Vec<String>) {
        self.leagues.write().await.insert(league_id.into(), teams);
    }

    /// Load fixtures from a directory
    ///
    /// Layout: `leagues.json` (`{"league": ["team", ...]}`),
    /// `stats/<period>.json` (array of stat rows) and
    /// `lineups/<period>.json` (array of lineups). Missing pieces are skipped.
    pub async fn from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let provider = Self::new();

        let leagues_path = dir.join("leagues.json");
        if tokio::fs::try_exists(&leagues_path).await? {
            let leagues: BTreeMap<String, Vec<String>> = read_json(&leagues_path).await?;
            *provider.leagues.write().await = leagues;
        }

        for path in json_files(&dir.join("stats")).await? {
            let rows: Vec<StatSnapshot> = read_json(&path).await?;
            debug!("Loaded {} stat rows from {}", rows.len(), path.display());
            provider.add_snapshots(rows).await;
        }

        for path in json_files(&dir.join("lineups")).await? {
            let lineups: Vec<Lineup> = read_json(&path).await?;
            for lineup in lineups {
                provider.set_lineup(lineup).await;
            }
        }

        info!(
            "📂 Loaded fixtures from {}: {} leagues, {} periods of stats, {} lineups",
            dir.display(),
            provider.leagues.read().await.len(),
            provider.stats.read().await.len(),
            provider.lineups.read().await.len()
        );
        Ok(provider)
    }
}

#[async_trait]
impl StatsProvider for InMemoryProvider {
    async fn snapshots(&self, entity_type: EntityType, period: &Period) -> anyhow::Result<Vec<StatSnapshot>> {
        let stats = self.stats.read().await;
        Ok(stats
            .get(period)
            .map(|rows| rows.iter().filter(|r| r.entity_type == entity_type).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LineupProvider for InMemoryProvider {
    async fn league_teams(&self, league_id: &str) -> anyhow::Result<Option<Vec<String>>> {
        Ok(self.leagues.read().await.get(league_id).cloned())
    }

    async fn lineup(&self, team_id: &str, period: &Period) -> anyhow::Result<Option<Lineup>> {
        Ok(self.lineups.read().await.get(&(team_id.to_string(), *period)).cloned())
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// `*.json` files in a directory, sorted by name; empty if the directory is absent
async fn json_files(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    if !tokio::fs::try_exists(dir).await? {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
