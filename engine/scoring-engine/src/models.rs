use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of scored asset; doubles as the lineup position category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Manufacturer,
    Strain,
    Product,
    Pharmacy,
    Brand,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Manufacturer,
        EntityType::Strain,
        EntityType::Product,
        EntityType::Pharmacy,
        EntityType::Brand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Manufacturer => "manufacturer",
            EntityType::Strain => "strain",
            EntityType::Product => "product",
            EntityType::Pharmacy => "pharmacy",
            EntityType::Brand => "brand",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown entity type '{s}'"))
    }
}

/// Identity of a scored entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self { entity_type, entity_id: entity_id.into() }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Scoring interval: a calendar day (daily challenge) or an ISO week (season)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    Day(NaiveDate),
    Week { year: i32, week: u32 },
}

/// Game format implied by the period kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringFormat {
    Daily,
    Weekly,
}

impl Period {
    /// ISO week period, validated against the calendar
    pub fn week(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Period::Week { year, week })
    }

    /// ISO week containing `date`
    pub fn week_of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Period::Week { year: iso.year(), week: iso.week() }
    }

    pub fn format(&self) -> ScoringFormat {
        match self {
            Period::Day(_) => ScoringFormat::Daily,
            Period::Week { .. } => ScoringFormat::Weekly,
        }
    }

    /// The period immediately before this one, if the calendar has it
    pub fn previous(&self) -> Option<Period> {
        match *self {
            Period::Day(date) => date.pred_opt().map(Period::Day),
            Period::Week { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
                monday.checked_sub_signed(Duration::days(7)).map(Period::week_of)
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Period::Week { year, week } => write!(f, "{year:04}-W{week:02}"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((year, week)) = s.split_once("-W") {
            let year: i32 = year.parse().map_err(|_| format!("invalid week period '{s}'"))?;
            let week: u32 = week.parse().map_err(|_| format!("invalid week period '{s}'"))?;
            return Period::week(year, week).ok_or_else(|| format!("no such ISO week '{s}'"));
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Period::Day)
            .map_err(|_| format!("invalid period '{s}' (expected YYYY-MM-DD or YYYY-Www)"))
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// Raw upstream counters; which ones are present depends on the entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMetrics {
    pub orders: Option<f64>,
    pub revenue: Option<f64>,
    pub favorites: Option<f64>,
    pub views: Option<f64>,
    pub comments: Option<f64>,
    pub clicks: Option<f64>,
    pub growth_pct: Option<f64>,
    pub product_count: Option<f64>,
    pub pharmacy_count: Option<f64>,
    pub supply_volume_kg: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub market_share_pct: Option<f64>,
    pub avg_price: Option<f64>,
    pub avg_order_value: Option<f64>,
    pub retention_pct: Option<f64>,
    pub momentum_pct: Option<f64>,
    pub sentiment: Option<f64>,
}

/// One upstream statistics row per (entity, period); immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub period: Period,
    #[serde(default)]
    pub rank: Option<u32>,
    /// Positions gained since the previous period (negative = dropped)
    #[serde(default)]
    pub rank_delta: Option<i32>,
    #[serde(default)]
    pub metrics: RawMetrics,
}

impl StatSnapshot {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id.clone())
    }
}

/// One line of a base-points breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringComponent {
    pub category: String,
    pub raw_value: f64,
    pub formula: String,
    pub points: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    RankBonus,
    StreakBonus,
    ConsistencyBonus,
    DeclinePenalty,
    PriceStability,
    VolatilityPenalty,
    MarketShare,
    Trending,
    PremiumTier,
    PriceCrash,
    HighUsage,
    GrowthBonus,
    RetentionDrop,
    Engagement,
    Sentiment,
    ScarcityAdjustment,
}

/// A signed modifier applied after the base components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusPenalty {
    pub kind: BonusKind,
    pub condition: String,
    pub points: Decimal,
}

impl BonusPenalty {
    pub fn new(kind: BonusKind, condition: impl Into<String>, points: Decimal) -> Self {
        Self { kind, condition: condition.into(), points }
    }

    pub fn is_penalty(&self) -> bool {
        self.points.is_sign_negative() && !self.points.is_zero()
    }
}

/// Cross-period signals carried with a score for team-level evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySignals {
    pub rank: Option<u32>,
    pub rank_delta: Option<i32>,
    pub growth_pct: Option<f64>,
    pub streak: u32,
}

impl EntitySignals {
    pub fn improved_rank(&self) -> bool {
        self.rank_delta.is_some_and(|d| d > 0)
    }
}

/// Fully justified score of one entity for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityScore {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub period: Period,
    pub components: Vec<ScoringComponent>,
    pub bonuses: Vec<BonusPenalty>,
    pub signals: EntitySignals,
    pub scarcity_multiplier: Decimal,
    pub total_points: Decimal,
}

impl EntityScore {
    pub fn new(
        entity: &EntityRef,
        period: Period,
        components: Vec<ScoringComponent>,
        bonuses: Vec<BonusPenalty>,
        signals: EntitySignals,
    ) -> Self {
        let mut score = Self {
            entity_id: entity.entity_id.clone(),
            entity_type: entity.entity_type,
            period,
            components,
            bonuses,
            signals,
            scarcity_multiplier: Decimal::ONE,
            total_points: Decimal::ZERO,
        };
        score.total_points = score.base_points() + score.bonus_points();
        score
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id.clone())
    }

    pub fn base_points(&self) -> Decimal {
        self.components.iter().map(|c| c.points).sum()
    }

    /// Sum of bonuses and penalties (penalties are negative)
    pub fn bonus_points(&self) -> Decimal {
        self.bonuses.iter().map(|b| b.points).sum()
    }

    /// The stored total equals the literal sum of the breakdown
    pub fn verify_sum(&self) -> bool {
        self.total_points == self.base_points() + self.bonus_points()
    }

    pub(crate) fn push_bonus(&mut self, bonus: BonusPenalty) {
        self.total_points += bonus.points;
        self.bonuses.push(bonus);
    }
}

/// Lineup slot tags; every tag except `flex` fixes the entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotTag {
    Mfg1,
    Mfg2,
    Cstr1,
    Cstr2,
    Prd1,
    Prd2,
    Phm1,
    Phm2,
    Brd1,
    Flex,
}

impl SlotTag {
    pub const ALL: [SlotTag; 10] = [
        SlotTag::Mfg1,
        SlotTag::Mfg2,
        SlotTag::Cstr1,
        SlotTag::Cstr2,
        SlotTag::Prd1,
        SlotTag::Prd2,
        SlotTag::Phm1,
        SlotTag::Phm2,
        SlotTag::Brd1,
        SlotTag::Flex,
    ];

    /// Fixed entity type for the slot; `None` for flex
    pub fn required_type(&self) -> Option<EntityType> {
        match self {
            SlotTag::Mfg1 | SlotTag::Mfg2 => Some(EntityType::Manufacturer),
            SlotTag::Cstr1 | SlotTag::Cstr2 => Some(EntityType::Strain),
            SlotTag::Prd1 | SlotTag::Prd2 => Some(EntityType::Product),
            SlotTag::Phm1 | SlotTag::Phm2 => Some(EntityType::Pharmacy),
            SlotTag::Brd1 => Some(EntityType::Brand),
            SlotTag::Flex => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotTag::Mfg1 => "mfg1",
            SlotTag::Mfg2 => "mfg2",
            SlotTag::Cstr1 => "cstr1",
            SlotTag::Cstr2 => "cstr2",
            SlotTag::Prd1 => "prd1",
            SlotTag::Prd2 => "prd2",
            SlotTag::Phm1 => "phm1",
            SlotTag::Phm2 => "phm2",
            SlotTag::Brd1 => "brd1",
            SlotTag::Flex => "flex",
        }
    }
}

impl fmt::Display for SlotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupSlot {
    pub tag: SlotTag,
    #[serde(default)]
    pub entity: Option<EntityRef>,
}

/// Lineup assignment for one team and period, owned by the roster service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineup {
    pub team_id: String,
    pub period: Period,
    pub is_locked: bool,
    pub slots: Vec<LineupSlot>,
}

impl Lineup {
    /// Entities assigned to filled slots, in slot order
    pub fn entities(&self) -> impl Iterator<Item = &EntityRef> {
        self.slots.iter().filter_map(|s| s.entity.as_ref())
    }
}

/// How a slot contributed to the team total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotStatus {
    Filled,
    Empty,
    Unscored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotScore {
    pub tag: SlotTag,
    pub entity: Option<EntityRef>,
    pub status: SlotStatus,
    pub points: Decimal,
    pub score: Option<EntityScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamBonusKind {
    PerfectWeek,
    PositionDiversity,
    MomentumMaster,
    HotStreak,
    TrendExplosion,
    DarkHorse,
    ConsistencyKing,
    SteadyClimb,
    MarketLeader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamBonus {
    pub kind: TeamBonusKind,
    pub condition: String,
    pub points: Decimal,
}

/// Canonical team total for one period with its full breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamScore {
    pub team_id: String,
    pub period: Period,
    pub format: ScoringFormat,
    pub slots: Vec<SlotScore>,
    pub team_bonuses: Vec<TeamBonus>,
    pub slot_points: Decimal,
    pub bonus_points: Decimal,
    pub total_points: Decimal,
}

impl TeamScore {
    /// total == sum(slot points) + sum(team bonuses), and each slot matches its entity score
    pub fn verify_sum(&self) -> bool {
        let slots: Decimal = self.slots.iter().map(|s| s.points).sum();
        let bonuses: Decimal = self.team_bonuses.iter().map(|b| b.points).sum();
        let slots_consistent = self.slots.iter().all(|s| match (&s.status, &s.score) {
            (SlotStatus::Filled, Some(score)) => score.total_points == s.points && score.verify_sum(),
            (SlotStatus::Filled, None) => false,
            (_, _) => s.points.is_zero(),
        });

        slots_consistent
            && slots == self.slot_points
            && bonuses == self.bonus_points
            && self.total_points == slots + bonuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing_and_display() {
        let week: Period = "2025-W07".parse().unwrap();
        assert_eq!(week, Period::Week { year: 2025, week: 7 });
        assert_eq!(week.to_string(), "2025-W07");
        assert_eq!(week.format(), ScoringFormat::Weekly);

        let day: Period = "2025-07-14".parse().unwrap();
        assert_eq!(day.to_string(), "2025-07-14");
        assert_eq!(day.format(), ScoringFormat::Daily);

        assert!("2025-W54".parse::<Period>().is_err());
        assert!("last week".parse::<Period>().is_err());
    }

    #[test]
    fn test_previous_period_crosses_year_boundary() {
        let first_week = Period::week(2026, 1).unwrap();
        assert_eq!(first_week.previous(), Some(Period::Week { year: 2025, week: 52 }));

        let new_year: Period = "2026-01-01".parse().unwrap();
        assert_eq!(new_year.previous(), Some("2025-12-31".parse().unwrap()));
    }

    #[test]
    fn test_period_serde_uses_text_form() {
        let json = serde_json::to_string(&Period::Week { year: 2025, week: 3 }).unwrap();
        assert_eq!(json, "\"2025-W03\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Period::Week { year: 2025, week: 3 });
    }

    #[test]
    fn test_slot_types() {
        assert_eq!(SlotTag::Cstr2.required_type(), Some(EntityType::Strain));
        assert_eq!(SlotTag::Brd1.required_type(), Some(EntityType::Brand));
        assert_eq!(SlotTag::Flex.required_type(), None);
        assert_eq!(serde_json::to_string(&SlotTag::Phm1).unwrap(), "\"phm1\"");
    }

    #[test]
    fn test_entity_score_total_is_sum_of_parts() {
        let entity = EntityRef::new(EntityType::Strain, "str-1");
        let mut score = EntityScore::new(
            &entity,
            Period::week(2025, 7).unwrap(),
            vec![ScoringComponent {
                category: "favorites".to_string(),
                raw_value: 1500.0,
                formula: "favorites / 150".to_string(),
                points: Decimal::new(100, 1),
            }],
            vec![BonusPenalty::new(BonusKind::VolatilityPenalty, "price swing 25%", Decimal::from(-10))],
            EntitySignals::default(),
        );
        assert_eq!(score.total_points, Decimal::ZERO);

        score.push_bonus(BonusPenalty::new(BonusKind::RankBonus, "rank 1", Decimal::from(30)));
        assert_eq!(score.total_points, Decimal::from(30));
        assert!(score.verify_sum());
        assert!(score.bonuses[0].is_penalty());
    }
}
