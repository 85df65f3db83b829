//! Per-type scoring formulas
//!
//! Each formula is a pure function of one entity's normalized metrics and
//! returns its base components plus the type-specific bonuses. Component order
//! is fixed so breakdowns are reproducible run to run.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{BonusKind, BonusPenalty, ScoringComponent};
use crate::normalizer::{
    BrandMetrics, DemandTier, ManufacturerMetrics, NormalizedMetrics, OrderSizeTier,
    PharmacyMetrics, ProductMetrics, StrainMetrics, SupplyTier, TypedMetrics,
};

/// Base components and type-specific bonuses for one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormulaOutput {
    pub components: Vec<ScoringComponent>,
    pub bonuses: Vec<BonusPenalty>,
}

impl FormulaOutput {
    fn component(&mut self, category: &str, raw_value: f64, formula: impl Into<String>, points: f64) {
        self.components.push(ScoringComponent {
            category: category.to_string(),
            raw_value,
            formula: formula.into(),
            points: pts(points),
        });
    }

    fn bonus(&mut self, kind: BonusKind, condition: impl Into<String>, points: f64) {
        self.bonuses.push(BonusPenalty::new(kind, condition, pts(points)));
    }
}

/// Round a point value to one decimal place
pub fn pts(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Dispatch to the formula for the entity's type
pub fn score(normalized: &NormalizedMetrics) -> FormulaOutput {
    match &normalized.metrics {
        TypedMetrics::Manufacturer(m) => manufacturer(m, normalized.rank_delta),
        TypedMetrics::Strain(m) => strain(m),
        TypedMetrics::Product(m) => product(m),
        TypedMetrics::Pharmacy(m) => pharmacy(m),
        TypedMetrics::Brand(m) => brand(m),
    }
}

pub fn manufacturer(m: &ManufacturerMetrics, rank_delta: Option<i32>) -> FormulaOutput {
    let mut out = FormulaOutput::default();

    let tier = match m.supply_tier {
        SupplyTier::Powerhouse => "Powerhouse tier (>= 1000 kg)",
        SupplyTier::High => "High tier (500-999 kg)",
        SupplyTier::Steady => "Steady tier (100-499 kg)",
        SupplyTier::Emerging => "Emerging tier (< 100 kg)",
    };
    out.component("Supply Volume", m.supply_volume_kg, tier, m.supply_tier.points() as f64);
    out.component("Growth", m.growth_pct, "growth % / 5", m.growth_pct / 5.0);

    match rank_delta {
        Some(delta) => {
            let gained = f64::from(delta.max(0));
            out.component(
                "Rank Improvement",
                f64::from(delta),
                "min(positions gained x 8, 40)",
                (gained * 8.0).min(40.0),
            );
        }
        None => out.component("Rank Improvement", 0.0, "no prior period", 0.0),
    }

    out.component(
        "Product Count",
        m.product_count,
        "min(products x 1, 20)",
        m.product_count.min(20.0),
    );
    out
}

pub fn strain(m: &StrainMetrics) -> FormulaOutput {
    let mut out = FormulaOutput::default();
    out.component("Favorites", m.favorites, "favorites / 150", m.favorites / 150.0);
    out.component("Pharmacy Reach", m.pharmacy_count, "pharmacies x 4", m.pharmacy_count * 4.0);
    out.component("Product Count", m.product_count, "products x 2", m.product_count * 2.0);

    if let Some(change) = m.price_change_pct {
        if change.abs() <= 5.0 {
            out.bonus(BonusKind::PriceStability, format!("price moved {change:+.1}% (within 5%)"), 10.0);
        } else if change.abs() > 20.0 {
            out.bonus(BonusKind::VolatilityPenalty, format!("price moved {change:+.1}% (over 20%)"), -10.0);
        }
    }
    if let Some(share) = m.market_share_pct.filter(|s| *s > 50.0) {
        out.bonus(BonusKind::MarketShare, format!("market share {share:.1}% (over 50%)"), 15.0);
    }
    out
}

pub fn product(m: &ProductMetrics) -> FormulaOutput {
    let mut out = FormulaOutput::default();
    out.component("Orders", m.orders, "min(orders x 4, 100)", (m.orders * 4.0).min(100.0));

    let tier = match m.demand_tier {
        DemandTier::Hot => "Hot demand (>= 50 orders)",
        DemandTier::Strong => "Strong demand (20-49 orders)",
        DemandTier::Moderate => "Moderate demand (5-19 orders)",
        DemandTier::Low => "Low demand (< 5 orders)",
    };
    out.component("Demand Tier", m.orders, tier, m.demand_tier.points() as f64);

    if let Some(growth) = m.growth_pct.filter(|g| *g >= 25.0) {
        out.bonus(BonusKind::Trending, format!("order growth {growth:.1}% (>= 25%)"), 15.0);
    }
    if let Some(price) = m.avg_price.filter(|p| *p >= 12.0) {
        out.bonus(BonusKind::PremiumTier, format!("average price {price:.2} EUR/g (>= 12)"), 8.0);
    }
    if let Some(change) = m.price_change_pct.filter(|c| *c <= -20.0) {
        out.bonus(BonusKind::PriceCrash, format!("price dropped {change:.1}% (<= -20%)"), -15.0);
    }
    out
}

pub fn pharmacy(m: &PharmacyMetrics) -> FormulaOutput {
    let mut out = FormulaOutput::default();
    out.component("Revenue", m.revenue, "min(revenue / 800, 30)", (m.revenue / 800.0).min(30.0));
    out.component("Orders", m.orders, "min(orders x 1.5, 45)", (m.orders * 1.5).min(45.0));
    out.component(
        "Customer Retention",
        m.retention_pct,
        "min(max(0, retention % - 75), 25)",
        (m.retention_pct - 75.0).clamp(0.0, 25.0),
    );
    out.component(
        "Product Range",
        m.product_count,
        "min(products / 20, 10)",
        (m.product_count / 20.0).min(10.0),
    );

    let tier = match m.order_size_tier {
        OrderSizeTier::Large => "Large orders (>= 100 EUR)",
        OrderSizeTier::Medium => "Medium orders (60-99 EUR)",
        OrderSizeTier::Small => "Small orders (30-59 EUR)",
        OrderSizeTier::Micro => "Micro orders (< 30 EUR)",
    };
    out.component("Order Size", m.avg_order_value, tier, m.order_size_tier.points() as f64);

    if m.orders >= 100.0 {
        out.bonus(BonusKind::HighUsage, format!("{} orders (>= 100)", m.orders), 5.0);
    }
    if let Some(growth) = m.growth_pct.filter(|g| *g > 0.0) {
        out.bonus(BonusKind::GrowthBonus, format!("revenue growth {growth:.1}% x 2 / 5"), growth * 2.0 / 5.0);
    }
    if m.retention_pct < 50.0 {
        out.bonus(
            BonusKind::RetentionDrop,
            format!("retention {:.1}% (below 50%)", m.retention_pct),
            -15.0,
        );
    }
    out
}

pub fn brand(m: &BrandMetrics) -> FormulaOutput {
    let mut out = FormulaOutput::default();
    out.component("Favorites", m.favorites, "min(favorites / 200, 30)", (m.favorites / 200.0).min(30.0));
    out.component("Views", m.views, "min(views / 2000, 20)", (m.views / 2000.0).min(20.0));
    out.component("Comments", m.comments, "min(comments x 2, 15)", (m.comments * 2.0).min(15.0));
    out.component("Clicks", m.clicks, "min(clicks x 0.5, 15)", (m.clicks * 0.5).min(15.0));
    out.component(
        "Momentum",
        m.momentum_pct,
        "momentum % / 5, within [0, 20]",
        (m.momentum_pct / 5.0).clamp(0.0, 20.0),
    );

    if m.engagement_rate_pct >= 10.0 {
        out.bonus(
            BonusKind::Engagement,
            format!("engagement rate {:.1}% (>= 10%)", m.engagement_rate_pct),
            15.0,
        );
    } else if m.engagement_rate_pct >= 5.0 {
        out.bonus(
            BonusKind::Engagement,
            format!("engagement rate {:.1}% (>= 5%)", m.engagement_rate_pct),
            10.0,
        );
    }

    if let Some(sentiment) = m.sentiment {
        let points = pts((sentiment / 10.0).clamp(-10.0, 15.0));
        if !points.is_zero() {
            out.bonuses.push(BonusPenalty::new(
                BonusKind::Sentiment,
                format!("sentiment {sentiment:+.1} / 10, within [-10, 15]"),
                points,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::{EntityType, Period, RawMetrics, StatSnapshot};
    use crate::normalizer::Normalizer;

    fn normalize(entity_type: EntityType, rank_delta: Option<i32>, metrics: RawMetrics) -> NormalizedMetrics {
        let snapshot = StatSnapshot {
            entity_id: "fixture".to_string(),
            entity_type,
            period: Period::week(2025, 7).unwrap(),
            rank: Some(3),
            rank_delta,
            metrics,
        };
        Normalizer::new(&ScoringConfig::default().normalizer).normalize(&snapshot).unwrap()
    }

    fn base(out: &FormulaOutput) -> Decimal {
        out.components.iter().map(|c| c.points).sum()
    }

    #[test]
    fn test_pts_rounds_to_one_decimal() {
        assert_eq!(pts(3.25), Decimal::new(33, 1));
        assert_eq!(pts(-3.25), Decimal::new(-33, 1));
        assert_eq!(pts(26.666_666), Decimal::new(267, 1));
        assert_eq!(pts(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn test_manufacturer_fixture() {
        let normalized = normalize(
            EntityType::Manufacturer,
            Some(2),
            RawMetrics {
                supply_volume_kg: Some(650.0),
                growth_pct: Some(15.0),
                product_count: Some(25.0),
                ..Default::default()
            },
        );
        let out = score(&normalized);

        let points: Vec<Decimal> = out.components.iter().map(|c| c.points).collect();
        assert_eq!(
            points,
            vec![Decimal::from(3), Decimal::from(3), Decimal::from(16), Decimal::from(20)]
        );
        assert_eq!(base(&out), Decimal::from(42));
        assert!(out.bonuses.is_empty());
    }

    #[test]
    fn test_manufacturer_rank_improvement_is_capped() {
        let normalized = normalize(
            EntityType::Manufacturer,
            Some(9),
            RawMetrics {
                supply_volume_kg: Some(50.0),
                growth_pct: Some(0.0),
                product_count: Some(0.0),
                ..Default::default()
            },
        );
        let out = score(&normalized);
        assert_eq!(out.components[2].points, Decimal::from(40));

        let dropped = normalize(
            EntityType::Manufacturer,
            Some(-3),
            RawMetrics {
                supply_volume_kg: Some(50.0),
                growth_pct: Some(0.0),
                product_count: Some(0.0),
                ..Default::default()
            },
        );
        assert_eq!(score(&dropped).components[2].points, Decimal::ZERO);
    }

    #[test]
    fn test_manufacturer_without_prior_period() {
        let normalized = normalize(
            EntityType::Manufacturer,
            None,
            RawMetrics {
                supply_volume_kg: Some(1500.0),
                growth_pct: Some(10.0),
                product_count: Some(4.0),
                ..Default::default()
            },
        );
        let out = score(&normalized);
        assert_eq!(out.components[2].formula, "no prior period");
        assert_eq!(base(&out), Decimal::from(5 + 2 + 4));
    }

    #[test]
    fn test_pharmacy_fixture() {
        let normalized = normalize(
            EntityType::Pharmacy,
            Some(0),
            RawMetrics {
                revenue: Some(4000.0),
                orders: Some(200.0),
                retention_pct: Some(60.0),
                product_count: Some(40.0),
                avg_order_value: Some(75.0),
                growth_pct: Some(10.0),
                ..Default::default()
            },
        );
        let out = score(&normalized);

        let points: Vec<Decimal> = out.components.iter().map(|c| c.points).collect();
        assert_eq!(
            points,
            vec![
                Decimal::from(5),
                Decimal::from(45),
                Decimal::ZERO,
                Decimal::from(2),
                Decimal::from(3)
            ]
        );
        assert_eq!(base(&out), Decimal::from(55));

        let kinds: Vec<BonusKind> = out.bonuses.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BonusKind::HighUsage, BonusKind::GrowthBonus]);
        assert_eq!(out.bonuses[1].points, Decimal::from(4));
    }

    #[test]
    fn test_pharmacy_retention_drop() {
        let normalized = normalize(
            EntityType::Pharmacy,
            None,
            RawMetrics {
                revenue: Some(800.0),
                orders: Some(10.0),
                retention_pct: Some(42.0),
                product_count: Some(0.0),
                avg_order_value: Some(20.0),
                growth_pct: Some(-5.0),
                ..Default::default()
            },
        );
        let out = score(&normalized);
        assert_eq!(out.bonuses.len(), 1);
        assert_eq!(out.bonuses[0].kind, BonusKind::RetentionDrop);
        assert_eq!(out.bonuses[0].points, Decimal::from(-15));
    }

    #[test]
    fn test_product_orders_are_clamped() {
        let at_cap = score(&normalize(
            EntityType::Product,
            None,
            RawMetrics { orders: Some(50.0), ..Default::default() },
        ));
        let far_beyond = score(&normalize(
            EntityType::Product,
            None,
            RawMetrics { orders: Some(10_000.0), ..Default::default() },
        ));

        let points = |out: &FormulaOutput| -> Vec<Decimal> {
            out.components.iter().map(|c| c.points).collect()
        };
        assert_eq!(points(&at_cap), points(&far_beyond));
        assert_eq!(base(&far_beyond), Decimal::from(110));
    }

    #[test]
    fn test_product_bonuses() {
        let out = score(&normalize(
            EntityType::Product,
            None,
            RawMetrics {
                orders: Some(12.0),
                growth_pct: Some(30.0),
                avg_price: Some(14.5),
                price_change_pct: Some(-25.0),
                ..Default::default()
            },
        ));
        assert_eq!(base(&out), Decimal::from(48 + 3));
        let kinds: Vec<BonusKind> = out.bonuses.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BonusKind::Trending, BonusKind::PremiumTier, BonusKind::PriceCrash]);
        let bonus: Decimal = out.bonuses.iter().map(|b| b.points).sum();
        assert_eq!(bonus, Decimal::from(8));
    }

    #[test]
    fn test_strain_stability_and_share() {
        let out = score(&normalize(
            EntityType::Strain,
            None,
            RawMetrics {
                favorites: Some(300.0),
                pharmacy_count: Some(5.0),
                product_count: Some(3.0),
                price_change_pct: Some(-4.0),
                market_share_pct: Some(62.0),
                ..Default::default()
            },
        ));
        assert_eq!(base(&out), Decimal::from(2 + 20 + 6));
        let kinds: Vec<BonusKind> = out.bonuses.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BonusKind::PriceStability, BonusKind::MarketShare]);

        let volatile = score(&normalize(
            EntityType::Strain,
            None,
            RawMetrics {
                favorites: Some(0.0),
                pharmacy_count: Some(1.0),
                product_count: Some(1.0),
                price_change_pct: Some(21.0),
                ..Default::default()
            },
        ));
        assert_eq!(volatile.bonuses[0].kind, BonusKind::VolatilityPenalty);
        assert_eq!(volatile.bonuses[0].points, Decimal::from(-10));
    }

    #[test]
    fn test_brand_caps_engagement_and_sentiment() {
        let out = score(&normalize(
            EntityType::Brand,
            None,
            RawMetrics {
                favorites: Some(9000.0),
                views: Some(10_000.0),
                comments: Some(40.0),
                clicks: Some(60.0),
                momentum_pct: Some(150.0),
                sentiment: Some(-250.0),
                ..Default::default()
            },
        ));
        let points: Vec<Decimal> = out.components.iter().map(|c| c.points).collect();
        assert_eq!(
            points,
            vec![
                Decimal::from(30),
                Decimal::from(5),
                Decimal::from(15),
                Decimal::from(15),
                Decimal::from(20)
            ]
        );
        // (9000 + 40 + 60) / 10000 = 91%
        assert_eq!(out.bonuses[0].kind, BonusKind::Engagement);
        assert_eq!(out.bonuses[0].points, Decimal::from(15));
        assert_eq!(out.bonuses[1].kind, BonusKind::Sentiment);
        assert_eq!(out.bonuses[1].points, Decimal::from(-10));
    }

    #[test]
    fn test_component_order_is_stable() {
        let metrics = RawMetrics {
            favorites: Some(100.0),
            views: Some(1000.0),
            comments: Some(1.0),
            clicks: Some(1.0),
            ..Default::default()
        };
        let first = score(&normalize(EntityType::Brand, None, metrics.clone()));
        let second = score(&normalize(EntityType::Brand, None, metrics));
        assert_eq!(first, second);
        let categories: Vec<&str> = first.components.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(categories, vec!["Favorites", "Views", "Comments", "Clicks", "Momentum"]);
    }
}
