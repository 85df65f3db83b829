//! Metric normalization: raw stat rows into bucketed, clamped formula inputs

use serde::{Deserialize, Serialize};

use crate::config::NormalizerConfig;
use crate::error::{Result, ScoringError};
use crate::models::{EntityRef, EntityType, Period, StatSnapshot};

/// Manufacturer supply-volume tier (kg per period)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplyTier {
    Powerhouse,
    High,
    Steady,
    Emerging,
}

impl SupplyTier {
    pub fn from_volume_kg(kg: f64) -> Self {
        if kg >= 1000.0 {
            SupplyTier::Powerhouse
        } else if kg >= 500.0 {
            SupplyTier::High
        } else if kg >= 100.0 {
            SupplyTier::Steady
        } else {
            SupplyTier::Emerging
        }
    }

    pub fn points(&self) -> i64 {
        match self {
            SupplyTier::Powerhouse => 5,
            SupplyTier::High => 3,
            SupplyTier::Steady => 2,
            SupplyTier::Emerging => 1,
        }
    }
}

/// Product order-volume tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandTier {
    Hot,
    Strong,
    Moderate,
    Low,
}

impl DemandTier {
    pub fn from_orders(orders: f64) -> Self {
        if orders >= 50.0 {
            DemandTier::Hot
        } else if orders >= 20.0 {
            DemandTier::Strong
        } else if orders >= 5.0 {
            DemandTier::Moderate
        } else {
            DemandTier::Low
        }
    }

    pub fn points(&self) -> i64 {
        match self {
            DemandTier::Hot => 10,
            DemandTier::Strong => 6,
            DemandTier::Moderate => 3,
            DemandTier::Low => 0,
        }
    }
}

/// Pharmacy average order value tier (EUR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSizeTier {
    Large,
    Medium,
    Small,
    Micro,
}

impl OrderSizeTier {
    pub fn from_order_value(eur: f64) -> Self {
        if eur >= 100.0 {
            OrderSizeTier::Large
        } else if eur >= 60.0 {
            OrderSizeTier::Medium
        } else if eur >= 30.0 {
            OrderSizeTier::Small
        } else {
            OrderSizeTier::Micro
        }
    }

    pub fn points(&self) -> i64 {
        match self {
            OrderSizeTier::Large => 5,
            OrderSizeTier::Medium => 3,
            OrderSizeTier::Small => 1,
            OrderSizeTier::Micro => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManufacturerMetrics {
    pub supply_volume_kg: f64,
    pub supply_tier: SupplyTier,
    pub growth_pct: f64,
    pub product_count: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrainMetrics {
    pub favorites: f64,
    pub pharmacy_count: f64,
    pub product_count: f64,
    pub price_change_pct: Option<f64>,
    pub market_share_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductMetrics {
    pub orders: f64,
    pub demand_tier: DemandTier,
    pub growth_pct: Option<f64>,
    pub avg_price: Option<f64>,
    pub price_change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PharmacyMetrics {
    pub revenue: f64,
    pub orders: f64,
    pub retention_pct: f64,
    pub product_count: f64,
    pub avg_order_value: f64,
    pub order_size_tier: OrderSizeTier,
    pub growth_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrandMetrics {
    pub favorites: f64,
    pub views: f64,
    pub comments: f64,
    pub clicks: f64,
    pub momentum_pct: f64,
    pub sentiment: Option<f64>,
    /// (favorites + comments + clicks) / views, in percent
    pub engagement_rate_pct: f64,
}

/// Per-type formula inputs; the variant fixes which formula applies
#[derive(Debug, Clone, PartialEq)]
pub enum TypedMetrics {
    Manufacturer(ManufacturerMetrics),
    Strain(StrainMetrics),
    Product(ProductMetrics),
    Pharmacy(PharmacyMetrics),
    Brand(BrandMetrics),
}

/// Derived inputs for one snapshot; recomputed on every run, never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetrics {
    pub entity: EntityRef,
    pub period: Period,
    pub rank: Option<u32>,
    pub rank_delta: Option<i32>,
    /// Clamped growth, when the row reports one
    pub growth_pct: Option<f64>,
    pub metrics: TypedMetrics,
}

pub struct Normalizer {
    growth_floor_pct: f64,
}

impl Normalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self { growth_floor_pct: config.growth_floor_pct }
    }

    /// Validate a snapshot and derive its formula inputs
    pub fn normalize(&self, snapshot: &StatSnapshot) -> Result<NormalizedMetrics> {
        let fields = Fields { snapshot };
        let m = &snapshot.metrics;

        if snapshot.rank == Some(0) {
            return Err(fields.invalid("rank must start at 1"));
        }

        let growth = fields.signed("growth_pct", m.growth_pct)?.map(|g| self.clamp_growth(g));

        let metrics = match snapshot.entity_type {
            EntityType::Manufacturer => {
                let supply_volume_kg = fields.count("supply_volume_kg", m.supply_volume_kg)?;
                let growth_pct =
                    growth.ok_or_else(|| fields.invalid("missing required field 'growth_pct'"))?;
                TypedMetrics::Manufacturer(ManufacturerMetrics {
                    supply_volume_kg,
                    supply_tier: SupplyTier::from_volume_kg(supply_volume_kg),
                    growth_pct,
                    product_count: fields.count("product_count", m.product_count)?,
                })
            }
            EntityType::Strain => TypedMetrics::Strain(StrainMetrics {
                favorites: fields.count("favorites", m.favorites)?,
                pharmacy_count: fields.count("pharmacy_count", m.pharmacy_count)?,
                product_count: fields.count("product_count", m.product_count)?,
                price_change_pct: fields.signed("price_change_pct", m.price_change_pct)?,
                market_share_pct: fields
                    .signed("market_share_pct", m.market_share_pct)?
                    .map(|s| s.clamp(0.0, 100.0)),
            }),
            EntityType::Product => {
                let orders = fields.count("orders", m.orders)?;
                TypedMetrics::Product(ProductMetrics {
                    orders,
                    demand_tier: DemandTier::from_orders(orders),
                    growth_pct: growth,
                    avg_price: fields.optional_count("avg_price", m.avg_price)?,
                    price_change_pct: fields.signed("price_change_pct", m.price_change_pct)?,
                })
            }
            EntityType::Pharmacy => {
                let avg_order_value = fields.count("avg_order_value", m.avg_order_value)?;
                TypedMetrics::Pharmacy(PharmacyMetrics {
                    revenue: fields.count("revenue", m.revenue)?,
                    orders: fields.count("orders", m.orders)?,
                    retention_pct: fields.count("retention_pct", m.retention_pct)?.min(100.0),
                    product_count: fields.count("product_count", m.product_count)?,
                    avg_order_value,
                    order_size_tier: OrderSizeTier::from_order_value(avg_order_value),
                    growth_pct: growth,
                })
            }
            EntityType::Brand => {
                let favorites = fields.count("favorites", m.favorites)?;
                let views = fields.count("views", m.views)?;
                let comments = fields.count("comments", m.comments)?;
                let clicks = fields.count("clicks", m.clicks)?;
                let engagement_rate_pct = if views > 0.0 {
                    (favorites + comments + clicks) / views * 100.0
                } else {
                    0.0
                };
                TypedMetrics::Brand(BrandMetrics {
                    favorites,
                    views,
                    comments,
                    clicks,
                    momentum_pct: fields.signed("momentum_pct", m.momentum_pct)?.unwrap_or(0.0),
                    sentiment: fields.signed("sentiment", m.sentiment)?,
                    engagement_rate_pct,
                })
            }
        };

        Ok(NormalizedMetrics {
            entity: snapshot.entity(),
            period: snapshot.period,
            rank: snapshot.rank,
            rank_delta: snapshot.rank_delta,
            growth_pct: growth,
            metrics,
        })
    }

    pub fn clamp_growth(&self, growth_pct: f64) -> f64 {
        growth_pct.max(self.growth_floor_pct)
    }
}

/// Field accessors that turn bad values into `InvalidSnapshot`
struct Fields<'a> {
    snapshot: &'a StatSnapshot,
}

impl Fields<'_> {
    fn invalid(&self, reason: impl Into<String>) -> ScoringError {
        ScoringError::invalid_snapshot(self.snapshot.entity(), self.snapshot.period, reason)
    }

    /// Required non-negative counter
    fn count(&self, name: &str, value: Option<f64>) -> Result<f64> {
        self.optional_count(name, value)?
            .ok_or_else(|| self.invalid(format!("missing required field '{name}'")))
    }

    fn optional_count(&self, name: &str, value: Option<f64>) -> Result<Option<f64>> {
        match self.signed(name, value)? {
            Some(v) if v < 0.0 => Err(self.invalid(format!("field '{name}' is negative ({v})"))),
            other => Ok(other),
        }
    }

    /// Optional value that may be negative but must be finite
    fn signed(&self, name: &str, value: Option<f64>) -> Result<Option<f64>> {
        match value {
            Some(v) if !v.is_finite() => {
                Err(self.invalid(format!("field '{name}' is not a finite number")))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::RawMetrics;

    fn normalizer() -> Normalizer {
        Normalizer::new(&ScoringConfig::default().normalizer)
    }

    fn snapshot(entity_type: EntityType, metrics: RawMetrics) -> StatSnapshot {
        StatSnapshot {
            entity_id: "e-1".to_string(),
            entity_type,
            period: Period::week(2025, 7).unwrap(),
            rank: Some(4),
            rank_delta: Some(1),
            metrics,
        }
    }

    #[test]
    fn test_supply_tiers() {
        assert_eq!(SupplyTier::from_volume_kg(1200.0), SupplyTier::Powerhouse);
        assert_eq!(SupplyTier::from_volume_kg(500.0), SupplyTier::High);
        assert_eq!(SupplyTier::from_volume_kg(499.9), SupplyTier::Steady);
        assert_eq!(SupplyTier::from_volume_kg(0.0), SupplyTier::Emerging);
        assert_eq!(SupplyTier::High.points(), 3);
    }

    #[test]
    fn test_growth_is_clamped_to_floor() {
        let normalized = normalizer()
            .normalize(&snapshot(
                EntityType::Manufacturer,
                RawMetrics {
                    supply_volume_kg: Some(750.0),
                    growth_pct: Some(-250.0),
                    product_count: Some(12.0),
                    ..Default::default()
                },
            ))
            .unwrap();

        assert_eq!(normalized.growth_pct, Some(-100.0));
        match normalized.metrics {
            TypedMetrics::Manufacturer(m) => {
                assert_eq!(m.growth_pct, -100.0);
                assert_eq!(m.supply_tier, SupplyTier::High);
            }
            other => panic!("Expected manufacturer metrics, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_field_is_invalid() {
        let err = normalizer()
            .normalize(&snapshot(
                EntityType::Pharmacy,
                RawMetrics {
                    revenue: Some(4000.0),
                    orders: Some(200.0),
                    avg_order_value: Some(75.0),
                    ..Default::default()
                },
            ))
            .unwrap_err();

        match err {
            ScoringError::InvalidSnapshot { entity, reason, .. } => {
                assert_eq!(entity.entity_type, EntityType::Pharmacy);
                assert!(reason.contains("retention_pct"), "unexpected reason: {reason}");
            }
            other => panic!("Expected InvalidSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_and_non_finite_values_are_invalid() {
        let negative = snapshot(
            EntityType::Product,
            RawMetrics { orders: Some(-3.0), ..Default::default() },
        );
        assert!(normalizer().normalize(&negative).is_err());

        let nan = snapshot(
            EntityType::Product,
            RawMetrics { orders: Some(10.0), growth_pct: Some(f64::NAN), ..Default::default() },
        );
        assert!(normalizer().normalize(&nan).is_err());
    }

    #[test]
    fn test_brand_engagement_rate() {
        let normalized = normalizer()
            .normalize(&snapshot(
                EntityType::Brand,
                RawMetrics {
                    favorites: Some(300.0),
                    views: Some(5000.0),
                    comments: Some(100.0),
                    clicks: Some(200.0),
                    ..Default::default()
                },
            ))
            .unwrap();

        match normalized.metrics {
            TypedMetrics::Brand(b) => {
                assert!((b.engagement_rate_pct - 12.0).abs() < 1e-9);
                assert_eq!(b.momentum_pct, 0.0);
            }
            other => panic!("Expected brand metrics, got {other:?}"),
        }
    }

    #[test]
    fn test_rank_zero_is_invalid() {
        let mut row = snapshot(
            EntityType::Product,
            RawMetrics { orders: Some(10.0), ..Default::default() },
        );
        row.rank = Some(0);
        assert!(normalizer().normalize(&row).is_err());
    }
}
