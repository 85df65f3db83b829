//! PostgreSQL score store

use crate::backend::ScoreStore;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::record::{EntityScoreDocument, EntityScoreKey, TeamScoreDocument, TeamScoreKey};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Score store backed by the `team_scores` and `entity_scores` tables
pub struct PgScoreStore {
    config: StoreConfig,
    pool: PgPool,
}

impl PgScoreStore {
    /// Connect to the configured database
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        config.validate().map_err(StoreError::config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { config, pool })
    }
}

#[async_trait::async_trait]
impl ScoreStore for PgScoreStore {
    async fn initialize(&mut self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Postgres score store initialized ({} max connections)", self.config.max_connections);
        Ok(())
    }

    async fn upsert_team_score(&self, document: &TeamScoreDocument) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO team_scores (team_id, period, total_points, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (team_id, period) DO UPDATE SET
                total_points = EXCLUDED.total_points,
                payload = EXCLUDED.payload
            "#,
        )
        .bind(&document.key.team_id)
        .bind(&document.key.period)
        .bind(document.total_points)
        .bind(&document.payload)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Upserted {}: {} rows affected", document.key, result.rows_affected());
        Ok(())
    }

    async fn upsert_entity_scores(&self, documents: &[EntityScoreDocument]) -> Result<()> {
        // One transaction per batch: either the whole batch lands or none of it
        let mut tx = self.pool.begin().await?;
        for document in documents {
            sqlx::query(
                r#"
                INSERT INTO entity_scores (entity_id, entity_type, period, total_points, payload)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (entity_id, entity_type, period) DO UPDATE SET
                    total_points = EXCLUDED.total_points,
                    payload = EXCLUDED.payload
                "#,
            )
            .bind(&document.key.entity_id)
            .bind(&document.key.entity_type)
            .bind(&document.key.period)
            .bind(document.total_points)
            .bind(&document.payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn load_team_score(&self, key: &TeamScoreKey) -> Result<Option<TeamScoreDocument>> {
        let row = sqlx::query(
            "SELECT total_points, payload FROM team_scores WHERE team_id = $1 AND period = $2",
        )
        .bind(&key.team_id)
        .bind(&key.period)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<_> {
            let total_points: Decimal = row.try_get("total_points")?;
            let payload: serde_json::Value = row.try_get("payload")?;
            Ok(TeamScoreDocument { key: key.clone(), total_points, payload })
        })
        .transpose()
    }

    async fn load_entity_score(&self, key: &EntityScoreKey) -> Result<Option<EntityScoreDocument>> {
        let row = sqlx::query(
            "SELECT total_points, payload FROM entity_scores \
             WHERE entity_id = $1 AND entity_type = $2 AND period = $3",
        )
        .bind(&key.entity_id)
        .bind(&key.entity_type)
        .bind(&key.period)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<_> {
            let total_points: Decimal = row.try_get("total_points")?;
            let payload: serde_json::Value = row.try_get("payload")?;
            Ok(EntityScoreDocument { key: key.clone(), total_points, payload })
        })
        .transpose()
    }

    async fn list_team_scores(&self, period: &str) -> Result<Vec<TeamScoreDocument>> {
        let rows = sqlx::query(
            "SELECT team_id, total_points, payload FROM team_scores \
             WHERE period = $1 ORDER BY team_id",
        )
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<TeamScoreDocument> {
                Ok(TeamScoreDocument {
                    key: TeamScoreKey::new(row.try_get::<String, _>("team_id")?, period),
                    total_points: row.try_get("total_points")?,
                    payload: row.try_get("payload")?,
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
