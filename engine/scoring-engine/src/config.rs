use chrono::{NaiveTime, Weekday};
use config::{Config, Environment, File};
use score_store::{RetryConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Configuration for the scoring engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Metric normalization parameters
    pub normalizer: NormalizerConfig,

    /// Scarcity multiplier parameters
    pub scarcity: ScarcityConfig,

    /// Team bonus parameters
    pub team: TeamConfig,

    /// Score persistence
    pub store: StoreConfig,

    /// Recurring weekly run
    pub schedule: ScheduleConfig,

    /// Event emission
    pub events: EventConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Growth percentages below this floor are clamped to it
    pub growth_floor_pct: f64,

    /// Prior periods read to compute streaks
    pub streak_lookback: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScarcityConfig {
    /// Pool depth that maps to a neutral multiplier of 1.0
    pub baseline_depth: u32,

    /// Damping exponent applied to baseline / depth
    pub exponent: f64,

    /// Lower clamp for deep pools
    pub min_multiplier: f64,

    /// Upper clamp for shallow pools
    pub max_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Every starter must reach this fraction of the team median for Perfect Week
    pub perfect_week_median_ratio: f64,

    /// Lower bound of each position's share for Position Diversity
    pub diversity_min_share: f64,

    /// Upper bound of each position's share for Position Diversity
    pub diversity_max_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Run the weekly job from the `schedule` subcommand
    pub enabled: bool,

    /// Day of the weekly run (MON..SUN)
    pub weekday: String,

    /// Time of the weekly run (HH:MM, UTC)
    pub time: String,

    /// Leagues scored on every run
    pub leagues: Vec<String>,

    /// Retry policy for runs that fail before scoring starts
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Publish entity/team/run events
    pub enabled: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig { growth_floor_pct: -100.0, streak_lookback: 8 },
            scarcity: ScarcityConfig {
                baseline_depth: 100,
                exponent: 0.25,
                min_multiplier: 0.65,
                max_multiplier: 1.35,
            },
            team: TeamConfig {
                perfect_week_median_ratio: 0.5,
                diversity_min_share: 0.18,
                diversity_max_share: 0.32,
            },
            store: StoreConfig::default(),
            schedule: ScheduleConfig {
                enabled: false,
                weekday: "MON".to_string(),
                time: "06:00".to_string(),
                leagues: Vec::new(),
                retry: RetryConfig {
                    max_attempts: 3,
                    initial_delay_ms: 60_000,
                    max_delay_ms: 900_000,
                    backoff_multiplier: 2.0,
                },
            },
            events: EventConfig { enabled: true },
        }
    }
}

impl ScoringConfig {
    /// Load defaults, then an optional TOML file, then `SCORING__*` environment variables
    ///
    /// Nested keys use `__`, e.g. `SCORING__STORE__BACKEND=postgres` or
    /// `SCORING__SCHEDULE__LEAGUES=league-a,league-b`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCORING")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("schedule.leagues"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> Result<()> {
            Err(config::ConfigError::Message(msg.to_string()).into())
        }

        if self.normalizer.growth_floor_pct > 0.0 {
            return invalid("normalizer.growth_floor_pct must not be positive");
        }
        if self.scarcity.baseline_depth == 0 {
            return invalid("scarcity.baseline_depth must be greater than 0");
        }
        if !(self.scarcity.exponent >= 0.0) {
            return invalid("scarcity.exponent must be non-negative");
        }
        if !(0.0 < self.scarcity.min_multiplier
            && self.scarcity.min_multiplier <= 1.0
            && 1.0 <= self.scarcity.max_multiplier)
        {
            return invalid("scarcity multipliers must satisfy 0 < min <= 1 <= max");
        }
        if !(0.0..=1.0).contains(&self.team.perfect_week_median_ratio) {
            return invalid("team.perfect_week_median_ratio must be within [0, 1]");
        }
        if !(0.0 <= self.team.diversity_min_share
            && self.team.diversity_min_share < self.team.diversity_max_share
            && self.team.diversity_max_share <= 1.0)
        {
            return invalid("team diversity shares must satisfy 0 <= min < max <= 1");
        }

        self.store.validate().map_err(config::ConfigError::Message)?;
        self.schedule.weekday()?;
        self.schedule.time()?;
        Ok(())
    }
}

impl ScheduleConfig {
    pub fn weekday(&self) -> Result<Weekday> {
        self.weekday.parse::<Weekday>().map_err(|_| {
            config::ConfigError::Message(format!("invalid schedule.weekday '{}'", self.weekday))
                .into()
        })
    }

    pub fn time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").map_err(|_| {
            config::ConfigError::Message(format!("invalid schedule.time '{}'", self.time)).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScoringConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scarcity.baseline_depth, 100);
        assert_eq!(config.schedule.weekday().unwrap(), Weekday::Mon);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scarcity]
baseline_depth = 80
exponent = 0.5
min_multiplier = 0.7
max_multiplier = 1.3

[schedule]
enabled = true
weekday = "TUE"
time = "07:30"
leagues = ["league-a"]
"#
        )
        .unwrap();

        let config = ScoringConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.scarcity.baseline_depth, 80);
        assert_eq!(config.scarcity.exponent, 0.5);
        assert!(config.schedule.enabled);
        assert_eq!(config.schedule.weekday().unwrap(), Weekday::Tue);
        assert_eq!(config.schedule.leagues, vec!["league-a".to_string()]);
        // untouched sections keep their defaults
        assert_eq!(config.team.diversity_min_share, 0.18);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = ScoringConfig::default();
        config.scarcity.min_multiplier = 1.2;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.schedule.time = "25:99".to_string();
        assert!(config.validate().is_err());
    }
}
