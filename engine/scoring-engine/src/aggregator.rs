//! Team aggregation over a locked lineup

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

use crate::config::TeamConfig;
use crate::context::ScoredEntities;
use crate::error::{Result, ScoringError};
use crate::models::{
    EntityScore, EntityType, Lineup, ScoringFormat, SlotScore, SlotStatus, SlotTag, TeamBonus,
    TeamBonusKind, TeamScore,
};

pub struct TeamAggregator {
    config: TeamConfig,
}

impl TeamAggregator {
    pub fn new(config: &TeamConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Sum slot totals for a locked lineup and apply team bonuses
    ///
    /// Every slot tag appears in the result in fixed order; empty and unscored
    /// slots are kept with zero points and a status explaining why.
    pub fn aggregate(&self, lineup: &Lineup, entities: &ScoredEntities) -> Result<TeamScore> {
        if !lineup.is_locked {
            return Err(ScoringError::LineupNotLocked {
                team_id: lineup.team_id.clone(),
                period: lineup.period,
            });
        }
        validate_lineup(lineup)?;

        let slots: Vec<SlotScore> = SlotTag::ALL
            .iter()
            .map(|&tag| {
                let entity = lineup
                    .slots
                    .iter()
                    .find(|s| s.tag == tag)
                    .and_then(|s| s.entity.clone());

                match entity {
                    None => SlotScore {
                        tag,
                        entity: None,
                        status: SlotStatus::Empty,
                        points: Decimal::ZERO,
                        score: None,
                    },
                    Some(entity) => match entities.score(&entity) {
                        Some(score) => SlotScore {
                            tag,
                            points: score.total_points,
                            score: Some(score.clone()),
                            entity: Some(entity),
                            status: SlotStatus::Filled,
                        },
                        None => {
                            let reason = entities
                                .failure(&entity)
                                .map(str::to_string)
                                .unwrap_or_else(|| format!("no statistics for {}", lineup.period));
                            SlotScore {
                                tag,
                                entity: Some(entity),
                                status: SlotStatus::Unscored { reason },
                                points: Decimal::ZERO,
                                score: None,
                            }
                        }
                    },
                }
            })
            .collect();

        let team_bonuses = self.team_bonuses(&slots, lineup.period.format());
        let slot_points: Decimal = slots.iter().map(|s| s.points).sum();
        let bonus_points: Decimal = team_bonuses.iter().map(|b| b.points).sum();

        Ok(TeamScore {
            team_id: lineup.team_id.clone(),
            period: lineup.period,
            format: lineup.period.format(),
            slots,
            team_bonuses,
            slot_points,
            bonus_points,
            total_points: slot_points + bonus_points,
        })
    }

    fn team_bonuses(&self, slots: &[SlotScore], format: ScoringFormat) -> Vec<TeamBonus> {
        let filled: Vec<(&SlotScore, &EntityScore)> = slots
            .iter()
            .filter_map(|s| s.score.as_ref().map(|score| (s, score)))
            .collect();

        [
            self.perfect_week(slots, &filled),
            self.position_diversity(&filled),
            momentum_master(&filled),
            format_bonus(&filled, format),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Every fixed slot filled and no starter below `ratio` x team median
    fn perfect_week(&self, slots: &[SlotScore], filled: &[(&SlotScore, &EntityScore)]) -> Option<TeamBonus> {
        let all_fixed_filled = slots
            .iter()
            .filter(|s| s.tag.required_type().is_some())
            .all(|s| s.status == SlotStatus::Filled);
        if !all_fixed_filled {
            return None;
        }

        let mut points: Vec<Decimal> = filled.iter().map(|(slot, _)| slot.points).collect();
        let median = median(&mut points)?;
        if median <= Decimal::ZERO {
            return None;
        }
        let ratio = Decimal::from_f64(self.config.perfect_week_median_ratio)?;
        let floor = median * ratio;
        if points.iter().all(|p| *p >= floor) {
            Some(team_bonus(
                TeamBonusKind::PerfectWeek,
                format!("all {} starters at or above {floor} (team median {median})", points.len()),
                50,
            ))
        } else {
            None
        }
    }

    /// Each position contributes its share of the team's slot points within the band
    fn position_diversity(&self, filled: &[(&SlotScore, &EntityScore)]) -> Option<TeamBonus> {
        let mut by_position: BTreeMap<EntityType, Decimal> = BTreeMap::new();
        for (slot, score) in filled {
            *by_position.entry(score.entity_type).or_insert(Decimal::ZERO) += slot.points;
        }
        let total: Decimal = by_position.values().copied().sum();
        if total <= Decimal::ZERO || by_position.len() < EntityType::ALL.len() {
            return None;
        }

        let (min, max) = (self.config.diversity_min_share, self.config.diversity_max_share);
        let balanced = by_position.values().all(|points| {
            (points / total).to_f64().is_some_and(|share| share >= min && share <= max)
        });
        balanced.then(|| {
            team_bonus(
                TeamBonusKind::PositionDiversity,
                format!("every position between {:.0}% and {:.0}% of team points", min * 100.0, max * 100.0),
                30,
            )
        })
    }
}

fn momentum_master(filled: &[(&SlotScore, &EntityScore)]) -> Option<TeamBonus> {
    let improved = filled.iter().filter(|(_, s)| s.signals.improved_rank()).count();
    (improved >= 3).then(|| {
        team_bonus(TeamBonusKind::MomentumMaster, format!("{improved} starters improved rank"), 20)
    })
}

/// Highest qualifying bonus for the format; ties go to the first declared
fn format_bonus(filled: &[(&SlotScore, &EntityScore)], format: ScoringFormat) -> Option<TeamBonus> {
    let count = |pred: &dyn Fn(&EntityScore) -> bool| filled.iter().filter(|(_, s)| pred(s)).count();

    let candidates: Vec<Option<TeamBonus>> = match format {
        ScoringFormat::Daily => {
            let hot = count(&|s| s.signals.streak >= 3);
            let trending = count(&|s| s.signals.growth_pct.is_some_and(|g| g >= 50.0));
            let dark_horse = filled
                .iter()
                .filter_map(|(_, s)| s.signals.rank_delta)
                .max()
                .filter(|d| *d >= 10);
            vec![
                (hot >= 3).then(|| {
                    team_bonus(TeamBonusKind::HotStreak, format!("{hot} starters on a 3+ period streak"), 15)
                }),
                (trending >= 2).then(|| {
                    team_bonus(TeamBonusKind::TrendExplosion, format!("{trending} starters grew 50%+"), 20)
                }),
                dark_horse.map(|d| {
                    team_bonus(TeamBonusKind::DarkHorse, format!("a starter climbed {d} positions"), 25)
                }),
            ]
        }
        ScoringFormat::Weekly => {
            let growing = count(&|s| s.signals.growth_pct.is_some_and(|g| g > 0.0));
            let climbing = count(&|s| s.signals.improved_rank());
            let leaders = count(&|s| s.signals.rank.is_some_and(|r| r <= 3));
            vec![
                (filled.len() >= 5 && growing == filled.len()).then(|| {
                    team_bonus(
                        TeamBonusKind::ConsistencyKing,
                        format!("all {growing} starters grew this week"),
                        25,
                    )
                }),
                (climbing >= 5).then(|| {
                    team_bonus(TeamBonusKind::SteadyClimb, format!("{climbing} starters gained rank"), 15)
                }),
                (leaders >= 3).then(|| {
                    team_bonus(TeamBonusKind::MarketLeader, format!("{leaders} starters ranked top 3"), 20)
                }),
            ]
        }
    };

    candidates.into_iter().flatten().fold(None, |best: Option<TeamBonus>, bonus| match best {
        Some(current) if current.points >= bonus.points => Some(current),
        _ => Some(bonus),
    })
}

fn team_bonus(kind: TeamBonusKind, condition: String, points: i64) -> TeamBonus {
    TeamBonus { kind, condition, points: Decimal::from(points) }
}

fn median(values: &mut [Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    values.sort();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / Decimal::TWO)
    } else {
        Some(values[mid])
    }
}

/// Reject lineups the roster service should never have produced
fn validate_lineup(lineup: &Lineup) -> Result<()> {
    let invalid = |reason: String| ScoringError::InvalidLineup { team_id: lineup.team_id.clone(), reason };

    let mut tags = HashSet::new();
    let mut entities = HashSet::new();
    for slot in &lineup.slots {
        if !tags.insert(slot.tag) {
            return Err(invalid(format!("slot {} assigned more than once", slot.tag)));
        }
        let Some(entity) = &slot.entity else { continue };
        if let Some(required) = slot.tag.required_type() {
            if entity.entity_type != required {
                return Err(invalid(format!("slot {} requires a {required}, got {entity}", slot.tag)));
            }
        }
        if !entities.insert(entity) {
            return Err(invalid(format!("{entity} is assigned to more than one slot")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::{EntityRef, EntitySignals, LineupSlot, Period, ScoringComponent};

    fn aggregator() -> TeamAggregator {
        TeamAggregator::new(&ScoringConfig::default().team)
    }

    fn entity_for(tag: SlotTag) -> EntityRef {
        let entity_type = tag.required_type().unwrap_or(EntityType::Brand);
        EntityRef::new(entity_type, format!("{}-{tag}", entity_type.as_str()))
    }

    fn lineup(period: Period, locked: bool, skip: &[SlotTag]) -> Lineup {
        Lineup {
            team_id: "team-1".to_string(),
            period,
            is_locked: locked,
            slots: SlotTag::ALL
                .iter()
                .map(|&tag| LineupSlot {
                    tag,
                    entity: (!skip.contains(&tag)).then(|| entity_for(tag)),
                })
                .collect(),
        }
    }

    fn score(entity: &EntityRef, period: Period, points: i64, signals: EntitySignals) -> EntityScore {
        EntityScore::new(
            entity,
            period,
            vec![ScoringComponent {
                category: "Fixture".to_string(),
                raw_value: points as f64,
                formula: "fixed".to_string(),
                points: Decimal::from(points),
            }],
            Vec::new(),
            signals,
        )
    }

    fn scored(lineup: &Lineup, points: i64, signals: impl Fn(SlotTag) -> EntitySignals) -> ScoredEntities {
        let mut entities = ScoredEntities::default();
        for slot in &lineup.slots {
            if let Some(entity) = &slot.entity {
                entities.insert_score(score(entity, lineup.period, points, signals(slot.tag)));
            }
        }
        entities
    }

    #[test]
    fn test_unlocked_lineup_is_rejected() {
        let period = Period::week(2025, 7).unwrap();
        let lineup = lineup(period, false, &[]);
        let entities = scored(&lineup, 10, |_| EntitySignals::default());

        match aggregator().aggregate(&lineup, &entities) {
            Err(ScoringError::LineupNotLocked { team_id, .. }) => assert_eq!(team_id, "team-1"),
            other => panic!("Expected LineupNotLocked, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_brand_slot_is_flagged() {
        let period = Period::week(2025, 7).unwrap();
        let lineup = lineup(period, true, &[SlotTag::Brd1, SlotTag::Flex]);
        let entities = scored(&lineup, 12, |_| EntitySignals::default());

        let team = aggregator().aggregate(&lineup, &entities).unwrap();

        assert_eq!(team.slots.len(), SlotTag::ALL.len());
        let brd1 = team.slots.iter().find(|s| s.tag == SlotTag::Brd1).unwrap();
        assert_eq!(brd1.status, SlotStatus::Empty);
        assert_eq!(brd1.points, Decimal::ZERO);
        assert_eq!(team.slot_points, Decimal::from(8 * 12));
        assert!(team.team_bonuses.is_empty());
        assert_eq!(team.total_points, Decimal::from(96));
        assert!(team.verify_sum());

        let json = serde_json::to_value(&team).unwrap();
        let brd1_json = &json["slots"][8];
        assert_eq!(brd1_json["tag"], "brd1");
        assert_eq!(brd1_json["status"]["status"], "empty");
    }

    #[test]
    fn test_unscored_slot_keeps_reason() {
        let period = Period::week(2025, 7).unwrap();
        let lineup = lineup(period, true, &[]);
        let mut entities = scored(&lineup, 10, |_| EntitySignals::default());
        let pharmacy = entity_for(SlotTag::Phm2);
        entities.remove_score(&pharmacy);
        entities.insert_failure(pharmacy, "missing required field 'retention_pct'".to_string());

        let team = aggregator().aggregate(&lineup, &entities).unwrap();
        let phm2 = team.slots.iter().find(|s| s.tag == SlotTag::Phm2).unwrap();
        match &phm2.status {
            SlotStatus::Unscored { reason } => assert!(reason.contains("retention_pct")),
            other => panic!("Expected unscored slot, got {other:?}"),
        }
        assert_eq!(team.slot_points, Decimal::from(90));
        // an unscored fixed slot rules out perfect week
        assert!(team.team_bonuses.iter().all(|b| b.kind != TeamBonusKind::PerfectWeek));
        assert!(team.verify_sum());
    }

    #[test]
    fn test_perfect_week_and_diversity() {
        let period = Period::week(2025, 7).unwrap();
        // flex holds a brand, so every position has two starters
        let lineup = lineup(period, true, &[]);
        let entities = scored(&lineup, 20, |_| EntitySignals::default());

        let team = aggregator().aggregate(&lineup, &entities).unwrap();
        let kinds: Vec<TeamBonusKind> = team.team_bonuses.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![TeamBonusKind::PerfectWeek, TeamBonusKind::PositionDiversity]);
        assert_eq!(team.total_points, Decimal::from(200 + 50 + 30));
        assert!(team.verify_sum());
    }

    #[test]
    fn test_only_highest_daily_bonus_is_awarded() {
        let period: Period = "2025-07-14".parse().unwrap();
        let lineup = lineup(period, true, &[]);
        let entities = scored(&lineup, 15, |tag| match tag {
            SlotTag::Mfg1 => EntitySignals { rank_delta: Some(12), streak: 3, ..Default::default() },
            SlotTag::Cstr1 | SlotTag::Prd1 => {
                EntitySignals { rank_delta: Some(1), streak: 4, ..Default::default() }
            }
            _ => EntitySignals::default(),
        });

        let team = aggregator().aggregate(&lineup, &entities).unwrap();
        assert_eq!(team.format, ScoringFormat::Daily);
        let kinds: Vec<TeamBonusKind> = team.team_bonuses.iter().map(|b| b.kind).collect();
        assert!(kinds.contains(&TeamBonusKind::MomentumMaster));
        assert!(kinds.contains(&TeamBonusKind::DarkHorse));
        assert!(!kinds.contains(&TeamBonusKind::HotStreak));
        assert!(team.verify_sum());
    }

    #[test]
    fn test_wrong_type_in_fixed_slot() {
        let period = Period::week(2025, 7).unwrap();
        let mut lineup = lineup(period, true, &[]);
        lineup.slots[0].entity = Some(EntityRef::new(EntityType::Strain, "strain-x"));

        let entities = ScoredEntities::default();
        assert!(matches!(
            aggregator().aggregate(&lineup, &entities),
            Err(ScoringError::InvalidLineup { .. })
        ));
    }

    #[test]
    fn test_median() {
        let mut odd = vec![Decimal::from(5), Decimal::from(1), Decimal::from(3)];
        assert_eq!(median(&mut odd), Some(Decimal::from(3)));
        let mut even = vec![Decimal::from(4), Decimal::from(1), Decimal::from(3), Decimal::from(2)];
        assert_eq!(median(&mut even), Some(Decimal::new(25, 1)));
        assert_eq!(median(&mut []), None);
    }
}
