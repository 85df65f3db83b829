//! Cross-period modifiers: rank, streak, decline and consistency
//!
//! These need context beyond a single stat row (prior ranks, growth history),
//! so they are evaluated after the type formula. Scarcity is applied later
//! still, once per run, by [`crate::scarcity::ScarcityTable`].

use rust_decimal::Decimal;

use crate::formulas;
use crate::models::{BonusKind, BonusPenalty, EntityScore, EntitySignals, EntityType};
use crate::normalizer::NormalizedMetrics;

/// Named streak tier shown next to the streak bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakTier {
    pub label: &'static str,
    pub points: i64,
}

/// Rank bonus by absolute finishing position; tiers are exclusive
pub fn rank_bonus(rank: Option<u32>) -> Option<BonusPenalty> {
    let rank = rank?;
    let (points, band) = match rank {
        1 => (30, "1st"),
        2..=3 => (20, "top 3"),
        4..=5 => (15, "top 5"),
        6..=10 => (10, "top 10"),
        _ => return None,
    };
    Some(BonusPenalty::new(
        BonusKind::RankBonus,
        format!("finished rank {rank} ({band})"),
        Decimal::from(points),
    ))
}

pub fn streak_tier(streak: u32) -> Option<StreakTier> {
    match streak {
        0..=1 => None,
        2 => Some(StreakTier { label: "Warming Up", points: 5 }),
        3..=4 => Some(StreakTier { label: "On Fire", points: 10 }),
        5..=7 => Some(StreakTier { label: "Blazing", points: 15 }),
        _ => Some(StreakTier { label: "Legendary", points: 25 }),
    }
}

pub fn streak_bonus(streak: u32) -> Option<BonusPenalty> {
    streak_tier(streak).map(|tier| {
        BonusPenalty::new(
            BonusKind::StreakBonus,
            format!("{} - {streak} periods of positive growth", tier.label),
            Decimal::from(tier.points),
        )
    })
}

/// Flat penalty for losing four or more positions
pub fn decline_penalty(rank_delta: Option<i32>) -> Option<BonusPenalty> {
    let delta = rank_delta.filter(|d| *d <= -4)?;
    Some(BonusPenalty::new(
        BonusKind::DeclinePenalty,
        format!("dropped {} positions", delta.unsigned_abs()),
        Decimal::from(-15),
    ))
}

/// Positive growth together with a rank gain
///
/// Manufacturers are excluded: their base formula already pays for rank
/// improvement.
pub fn consistency_bonus(
    entity_type: EntityType,
    growth_pct: Option<f64>,
    rank_delta: Option<i32>,
) -> Option<BonusPenalty> {
    if entity_type == EntityType::Manufacturer {
        return None;
    }
    let growth = growth_pct.filter(|g| *g > 0.0)?;
    let gained = rank_delta.filter(|d| *d > 0)?;
    Some(BonusPenalty::new(
        BonusKind::ConsistencyBonus,
        format!("growth {growth:.1}% and up {gained} positions"),
        Decimal::from(10),
    ))
}

/// Consecutive periods of positive growth ending at the current one
///
/// `history` holds prior-period growth, most recent first; `None` marks a
/// period without a stat row and ends the streak.
pub fn streak_length(current_growth: Option<f64>, history: &[Option<f64>]) -> u32 {
    if !current_growth.is_some_and(|g| g > 0.0) {
        return 0;
    }
    let prior = history.iter().take_while(|g| g.is_some_and(|g| g > 0.0)).count();
    1 + prior as u32
}

/// Cross-period modifiers in evaluation order
pub fn evaluate(normalized: &NormalizedMetrics, streak: u32) -> Vec<BonusPenalty> {
    [
        rank_bonus(normalized.rank),
        streak_bonus(streak),
        consistency_bonus(
            normalized.entity.entity_type,
            normalized.growth_pct,
            normalized.rank_delta,
        ),
        decline_penalty(normalized.rank_delta),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Formula components, then type bonuses, then cross-period modifiers
pub fn score_entity(normalized: &NormalizedMetrics, streak: u32) -> EntityScore {
    let formulas::FormulaOutput { components, mut bonuses } = formulas::score(normalized);
    bonuses.extend(evaluate(normalized, streak));

    let signals = EntitySignals {
        rank: normalized.rank,
        rank_delta: normalized.rank_delta,
        growth_pct: normalized.growth_pct,
        streak,
    };
    EntityScore::new(&normalized.entity, normalized.period, components, bonuses, signals)
}
