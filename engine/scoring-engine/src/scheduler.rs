use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use score_store::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::ScheduleConfig;
use crate::engine::{CancellationFlag, RunReport, ScoringEngine};
use crate::error::Result;
use crate::models::Period;

/// Weekly trigger that scores the just-finished ISO week for each configured league
pub struct ScoringScheduler {
    engine: Arc<ScoringEngine>,
    leagues: Vec<String>,
    weekday: Weekday,
    time: NaiveTime,
    retry: RetryConfig,
    cancel: CancellationFlag,
}

impl ScoringScheduler {
    pub fn new(engine: Arc<ScoringEngine>, config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            engine,
            leagues: config.leagues.clone(),
            weekday: config.weekday()?,
            time: config.time()?,
            retry: config.retry.clone(),
            cancel: CancellationFlag::new(),
        })
    }

    /// Flag shared with every run started by this scheduler
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Run until cancelled
    pub async fn start(&self) -> Result<()> {
        info!(
            "⏰ Starting scoring scheduler: {} leagues every {:?} at {} UTC",
            self.leagues.len(),
            self.weekday,
            self.time
        );

        while !self.cancel.is_cancelled() {
            let next_run = next_run_after(Utc::now(), self.weekday, self.time);
            let wait = (next_run - Utc::now()).to_std().unwrap_or(Duration::from_secs(0));
            info!("Next scoring run scheduled for: {}", next_run);
            sleep(wait).await;

            if self.cancel.is_cancelled() {
                break;
            }
            self.run_once(period_for_run(next_run)).await;
        }

        info!("Scoring scheduler stopped");
        Ok(())
    }

    /// Score every configured league for `period`, retrying run-fatal errors
    pub async fn run_once(&self, period: Period) -> Vec<(String, Result<RunReport>)> {
        let mut results = Vec::with_capacity(self.leagues.len());
        for league_id in &self.leagues {
            let result = self.run_league_with_retry(league_id, period).await;
            match &result {
                Ok(report) => info!("League {} @ {}: {}", league_id, period, report.summary()),
                Err(e) => error!("League {} @ {} failed after retries: {}", league_id, period, e),
            }
            results.push((league_id.clone(), result));
        }
        results
    }

    async fn run_league_with_retry(&self, league_id: &str, period: Period) -> Result<RunReport> {
        let mut delay = self.retry.initial_delay();
        let mut attempt = 1;

        loop {
            match self.engine.calculate_league_week(league_id, period, &self.cancel).await {
                Ok(report) => return Ok(report),
                Err(e)
                    if e.is_run_fatal()
                        && attempt < self.retry.max_attempts
                        && !self.cancel.is_cancelled() =>
                {
                    warn!("Attempt {} for league {} failed: {}, retrying in {:?}", attempt, league_id, e, delay);
                    sleep(delay).await;
                    delay = self.retry.next_delay(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// First `weekday` at `time` (UTC) strictly after `now`
pub fn next_run_after(now: DateTime<Utc>, weekday: Weekday, time: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive();
    let days_ahead = (7 + weekday.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    let candidate = (today + ChronoDuration::days(i64::from(days_ahead))).and_time(time).and_utc();

    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(7)
    }
}

/// The ISO week that ended before `run_at`
pub fn period_for_run(run_at: DateTime<Utc>) -> Period {
    Period::week_of(run_at.date_naive() - ChronoDuration::days(7))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::error::ScoringError;
    use crate::events::NullSink;
    use crate::models::Lineup;
    use crate::providers::{InMemoryProvider, LineupProvider};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use score_store::InMemoryScoreStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Lineup source that counts how often a run asked for league membership
    #[derive(Default)]
    struct CountingLeagues {
        inner: InMemoryProvider,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LineupProvider for CountingLeagues {
        async fn league_teams(&self, league_id: &str) -> anyhow::Result<Option<Vec<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.league_teams(league_id).await
        }

        async fn lineup(&self, team_id: &str, period: &Period) -> anyhow::Result<Option<Lineup>> {
            self.inner.lineup(team_id, period).await
        }
    }

    async fn scheduler_for(league_id: &str) -> (ScoringScheduler, Arc<CountingLeagues>) {
        let leagues = Arc::new(CountingLeagues::default());
        leagues.inner.set_league("league-a", vec!["team-1".to_string()]).await;

        let mut config = ScoringConfig::default();
        config.schedule.leagues = vec![league_id.to_string()];
        config.schedule.retry =
            RetryConfig { max_attempts: 3, initial_delay_ms: 1, max_delay_ms: 2, backoff_multiplier: 2.0 };

        // no stats rows at all: every position pool is empty
        let engine = Arc::new(ScoringEngine::new(
            config.clone(),
            Arc::new(InMemoryProvider::new()),
            leagues.clone(),
            Arc::new(InMemoryScoreStore::new()),
            Arc::new(NullSink),
        ));
        (ScoringScheduler::new(engine, &config.schedule).unwrap(), leagues)
    }

    #[tokio::test]
    async fn test_run_fatal_errors_are_retried() {
        let (scheduler, leagues) = scheduler_for("league-a").await;
        let results = scheduler.run_once(Period::week(2025, 7).unwrap()).await;

        assert!(matches!(results[0].1, Err(ScoringError::ScarcityComputation { .. })));
        assert_eq!(leagues.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_league_is_not_retried() {
        let (scheduler, leagues) = scheduler_for("league-z").await;
        let results = scheduler.run_once(Period::week(2025, 7).unwrap()).await;

        assert!(matches!(results[0].1, Err(ScoringError::LeagueNotFound { .. })));
        assert_eq!(leagues.calls.load(Ordering::SeqCst), 1);
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_this_week() {
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        // Wednesday 2025-07-16
        let next = next_run_after(at(2025, 7, 16, 12, 0), Weekday::Fri, six);
        assert_eq!(next, at(2025, 7, 18, 6, 0));
    }

    #[test]
    fn test_next_run_same_day_before_and_after_time() {
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        // Monday 2025-07-14
        assert_eq!(next_run_after(at(2025, 7, 14, 5, 59), Weekday::Mon, six), at(2025, 7, 14, 6, 0));
        assert_eq!(next_run_after(at(2025, 7, 14, 6, 0), Weekday::Mon, six), at(2025, 7, 21, 6, 0));
    }

    #[test]
    fn test_run_scores_previous_iso_week() {
        // Monday of 2025-W29 scores 2025-W28
        assert_eq!(period_for_run(at(2025, 7, 14, 6, 0)), Period::Week { year: 2025, week: 28 });
        // Monday of 2026-W01 scores 2025-W52
        assert_eq!(period_for_run(at(2025, 12, 29, 6, 0)), Period::Week { year: 2025, week: 52 });
    }
}
