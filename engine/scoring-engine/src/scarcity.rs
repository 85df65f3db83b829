//! Pool-depth scarcity multipliers
//!
//! Computed once per run from the number of eligible entities per position and
//! held read-only while entities are scored. Shallow pools are boosted and deep
//! pools damped: `m = clamp((baseline / depth) ^ exponent, min, max)`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

use crate::config::ScarcityConfig;
use crate::error::{Result, ScoringError};
use crate::models::{BonusKind, BonusPenalty, EntityScore, EntityType};

/// Multiplier precision (decimal places)
const MULTIPLIER_DP: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct ScarcityTable {
    depths: BTreeMap<EntityType, usize>,
    multipliers: BTreeMap<EntityType, Decimal>,
}

impl ScarcityTable {
    /// Build multipliers for every position in `depths`
    ///
    /// Fails if any position has an empty pool; no partial table is returned.
    pub fn compute(depths: &BTreeMap<EntityType, usize>, config: &ScarcityConfig) -> Result<Self> {
        let mut multipliers = BTreeMap::new();
        for (&position, &depth) in depths {
            if depth == 0 {
                return Err(ScoringError::ScarcityComputation {
                    position,
                    reason: "no eligible entities in pool".to_string(),
                });
            }
            let raw = multiplier_for_depth(depth, config);
            let multiplier = Decimal::from_f64(raw)
                .map(|m| m.round_dp_with_strategy(MULTIPLIER_DP, RoundingStrategy::MidpointAwayFromZero))
                .ok_or_else(|| ScoringError::ScarcityComputation {
                    position,
                    reason: format!("multiplier {raw} is not representable"),
                })?;
            multipliers.insert(position, multiplier);
        }

        Ok(Self { depths: depths.clone(), multipliers })
    }

    pub fn multiplier(&self, position: EntityType) -> Option<Decimal> {
        self.multipliers.get(&position).copied()
    }

    pub fn depth(&self, position: EntityType) -> Option<usize> {
        self.depths.get(&position).copied()
    }

    pub fn positions(&self) -> impl Iterator<Item = (EntityType, Decimal)> + '_ {
        self.multipliers.iter().map(|(p, m)| (*p, *m))
    }

    /// Rescale one entity total by its position multiplier
    ///
    /// The difference is recorded as a `scarcity_adjustment` entry so the
    /// breakdown still sums to the total. A neutral multiplier adds nothing.
    pub fn apply(&self, score: &mut EntityScore) -> Result<()> {
        let position = score.entity_type;
        let multiplier = self.multiplier(position).ok_or_else(|| ScoringError::ScarcityComputation {
            position,
            reason: "position missing from run scarcity table".to_string(),
        })?;

        score.scarcity_multiplier = multiplier;
        if multiplier == Decimal::ONE {
            return Ok(());
        }

        let scaled = rescale(score.total_points, multiplier);
        let adjustment = scaled - score.total_points;
        score.push_bonus(BonusPenalty::new(
            BonusKind::ScarcityAdjustment,
            format!("x{multiplier} (pool depth {})", self.depth(position).unwrap_or_default()),
            adjustment,
        ));
        Ok(())
    }
}

pub fn multiplier_for_depth(depth: usize, config: &ScarcityConfig) -> f64 {
    let ratio = f64::from(config.baseline_depth) / depth as f64;
    ratio.powf(config.exponent).clamp(config.min_multiplier, config.max_multiplier)
}

pub fn rescale(total: Decimal, multiplier: Decimal) -> Decimal {
    (total * multiplier).round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Summed entity totals per position
pub fn position_totals<'a>(scores: impl IntoIterator<Item = &'a EntityScore>) -> BTreeMap<EntityType, Decimal> {
    let mut totals = BTreeMap::new();
    for score in scores {
        *totals.entry(score.entity_type).or_insert(Decimal::ZERO) += score.total_points;
    }
    totals
}

/// Per-position averages of final entity totals, for tuning the scarcity band
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCalibration {
    pub averages: BTreeMap<EntityType, Decimal>,
    /// Highest minus lowest average
    pub spread: Decimal,
}

impl PositionCalibration {
    pub fn from_scores<'a>(scores: impl IntoIterator<Item = &'a EntityScore>) -> Self {
        let mut sums: BTreeMap<EntityType, (Decimal, u32)> = BTreeMap::new();
        for score in scores {
            let entry = sums.entry(score.entity_type).or_insert((Decimal::ZERO, 0));
            entry.0 += score.total_points;
            entry.1 += 1;
        }

        let averages: BTreeMap<EntityType, Decimal> = sums
            .into_iter()
            .map(|(position, (sum, count))| {
                let avg = (sum / Decimal::from(count))
                    .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
                (position, avg)
            })
            .collect();

        let max = averages.values().max().copied().unwrap_or_default();
        let min = averages.values().min().copied().unwrap_or_default();
        Self { averages, spread: max - min }
    }

    /// Averages land within `tolerance` points of each other
    pub fn is_balanced(&self, tolerance: f64) -> bool {
        self.spread.to_f64().is_some_and(|s| s <= tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::{EntityRef, EntitySignals, Period, ScoringComponent};

    fn config() -> ScarcityConfig {
        ScoringConfig::default().scarcity
    }

    fn entity_score(entity_type: EntityType, id: &str, points: Decimal) -> EntityScore {
        EntityScore::new(
            &EntityRef::new(entity_type, id),
            Period::week(2025, 7).unwrap(),
            vec![ScoringComponent {
                category: "Fixture".to_string(),
                raw_value: 0.0,
                formula: "fixed".to_string(),
                points,
            }],
            Vec::new(),
            EntitySignals::default(),
        )
    }

    #[test]
    fn test_multiplier_band() {
        let config = config();
        assert!((multiplier_for_depth(100, &config) - 1.0).abs() < 1e-12);
        // (100 / 50) ^ 0.25
        assert!((multiplier_for_depth(50, &config) - 1.189_207).abs() < 1e-6);
        assert_eq!(multiplier_for_depth(1, &config), 1.35);
        assert_eq!(multiplier_for_depth(1_000_000, &config), 0.65);
        assert!(multiplier_for_depth(400, &config) < 1.0);
    }

    #[test]
    fn test_empty_pool_is_fatal() {
        let depths = BTreeMap::from([(EntityType::Strain, 40), (EntityType::Brand, 0)]);
        match ScarcityTable::compute(&depths, &config()) {
            Err(ScoringError::ScarcityComputation { position, .. }) => {
                assert_eq!(position, EntityType::Brand)
            }
            other => panic!("Expected ScarcityComputation, got {other:?}"),
        }
    }

    #[test]
    fn test_neutral_multiplier_adds_no_entry() {
        let table =
            ScarcityTable::compute(&BTreeMap::from([(EntityType::Product, 100)]), &config()).unwrap();
        let mut score = entity_score(EntityType::Product, "p-1", Decimal::from(40));
        table.apply(&mut score).unwrap();

        assert_eq!(score.scarcity_multiplier, Decimal::ONE);
        assert!(score.bonuses.is_empty());
        assert_eq!(score.total_points, Decimal::from(40));
    }

    #[test]
    fn test_rescaling_keeps_breakdown_sum_and_mass() {
        // 16 entities: (100/16)^0.25 = 1.5811.. clamped to 1.35
        let table =
            ScarcityTable::compute(&BTreeMap::from([(EntityType::Brand, 16)]), &config()).unwrap();
        let multiplier = table.multiplier(EntityType::Brand).unwrap();
        assert_eq!(multiplier, Decimal::new(135, 2));

        let mut scores: Vec<EntityScore> = (0..16)
            .map(|i| entity_score(EntityType::Brand, &format!("b-{i}"), Decimal::new(173 + i * 37, 1)))
            .collect();
        let before = position_totals(&scores)[&EntityType::Brand];

        for score in &mut scores {
            table.apply(score).unwrap();
            assert!(score.verify_sum());
            assert_eq!(score.bonuses.last().unwrap().kind, BonusKind::ScarcityAdjustment);
        }

        let after = position_totals(&scores)[&EntityType::Brand];
        let expected = before * multiplier;
        let tolerance = Decimal::new(5, 2) * Decimal::from(scores.len());
        assert!((after - expected).abs() <= tolerance, "{after} vs {expected}");
    }

    #[test]
    fn test_apply_rejects_unknown_position() {
        let table =
            ScarcityTable::compute(&BTreeMap::from([(EntityType::Product, 50)]), &config()).unwrap();
        let mut score = entity_score(EntityType::Strain, "s-1", Decimal::from(10));
        assert!(table.apply(&mut score).is_err());
    }

    #[test]
    fn test_calibration_spread() {
        let scores = vec![
            entity_score(EntityType::Strain, "s-1", Decimal::from(40)),
            entity_score(EntityType::Strain, "s-2", Decimal::from(50)),
            entity_score(EntityType::Product, "p-1", Decimal::from(58)),
        ];
        let calibration = PositionCalibration::from_scores(&scores);
        assert_eq!(calibration.averages[&EntityType::Strain], Decimal::from(45));
        assert_eq!(calibration.spread, Decimal::from(13));
        assert!(calibration.is_balanced(15.0));
        assert!(!calibration.is_balanced(10.0));
    }
}
